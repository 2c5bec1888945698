use rand::rngs::StdRng;
use rand::Rng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

use crate::storage::Measurement;
use crate::Profiler;

// ─── Plan ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct LoadPlan {
    /// Number of concurrent Tokio tasks adding measurements
    #[serde(default = "default_concurrency")]
    pub concurrency: u32,

    /// Measurements added by each task
    #[serde(default = "default_iterations")]
    pub iterations: u32,

    /// Route patterns the measurements are spread over
    #[serde(default = "default_endpoints")]
    pub endpoints: Vec<String>,

    /// Percentage of measurements that are GETs (the rest are POSTs)
    #[serde(default = "default_read_pct")]
    pub read_pct: u8,

    /// Base seed; worker `i` uses `seed + i`
    #[serde(default = "default_seed")]
    pub seed: u64,
}

fn default_concurrency() -> u32 {
    10
}
fn default_iterations() -> u32 {
    100
}
fn default_endpoints() -> Vec<String> {
    vec!["/api/users/:id".into(), "/api/products/:id".into()]
}
fn default_read_pct() -> u8 {
    70
}
fn default_seed() -> u64 {
    1000
}

impl Default for LoadPlan {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            iterations: default_iterations(),
            endpoints: default_endpoints(),
            read_pct: default_read_pct(),
            seed: default_seed(),
        }
    }
}

impl LoadPlan {
    pub fn validate(&self) -> Result<(), String> {
        if self.concurrency == 0 || self.concurrency > 500 {
            return Err("concurrency must be between 1 and 500".into());
        }
        if self.iterations == 0 || self.iterations > 100_000 {
            return Err("iterations must be between 1 and 100000".into());
        }
        if self.endpoints.is_empty() {
            return Err("at least one endpoint is required".into());
        }
        if self.read_pct > 100 {
            return Err("read_pct must be between 0 and 100".into());
        }
        Ok(())
    }
}

// ─── Report ──────────────────────────────────────────────────────

/// What was sent for one (endpoint, method) pair.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SentTotals {
    pub endpoint_name: String,
    pub method: String,
    pub calls: u64,
    pub anon_calls: u64,
    pub cache_hits: u64,
    pub query_count: u64,
    pub total_time: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct LoadReport {
    /// Only measurements the store accepted are counted here.
    pub per_key: Vec<SentTotals>,
    pub failed: u64,
    pub elapsed_ms: u64,
}

impl LoadReport {
    pub fn total_calls(&self) -> u64 {
        self.per_key.iter().map(|t| t.calls).sum()
    }
}

type Tally = BTreeMap<(String, String), SentTotals>;

// ─── Public entry point ──────────────────────────────────────────

/// Spawns `concurrency` Tokio tasks that each add `iterations` random
/// measurements through `profiler`, then merges what every task sent.
/// An invalid plan is rejected before any task starts.
pub async fn run(profiler: Arc<Profiler>, plan: LoadPlan) -> Result<LoadReport, String> {
    plan.validate()?;
    let started = Instant::now();
    let plan = Arc::new(plan);

    let mut handles = Vec::with_capacity(plan.concurrency as usize);
    for worker_id in 0..plan.concurrency {
        let profiler = profiler.clone();
        let plan = plan.clone();

        handles.push(tokio::spawn(async move {
            worker(worker_id, profiler, plan).await
        }));
    }

    let mut tally = Tally::new();
    let mut failed = 0;
    for h in handles {
        match h.await {
            Ok((local, local_failed)) => {
                merge(&mut tally, local);
                failed += local_failed;
            }
            Err(e) => warn!(error = %e, "load worker panicked"),
        }
    }

    let report = LoadReport {
        per_key: tally.into_values().collect(),
        failed,
        elapsed_ms: started.elapsed().as_millis() as u64,
    };
    info!(
        calls = report.total_calls(),
        failed = report.failed,
        elapsed_ms = report.elapsed_ms,
        "load run finished"
    );
    Ok(report)
}

// ─── Worker loop ─────────────────────────────────────────────────

async fn worker(id: u32, profiler: Arc<Profiler>, plan: Arc<LoadPlan>) -> (Tally, u64) {
    // Each worker gets its own deterministic RNG seeded uniquely.
    let mut rng = StdRng::seed_from_u64(plan.seed.wrapping_add(id as u64));
    let mut tally = Tally::new();
    let mut failed = 0;

    for _ in 0..plan.iterations {
        let m = random_measurement(&mut rng, &plan);
        match profiler.add(&m).await {
            Ok(()) => record(&mut tally, &m),
            Err(e) => {
                warn!(worker = id, error = %e, "load measurement rejected");
                failed += 1;
            }
        }
    }

    (tally, failed)
}

fn random_measurement(rng: &mut StdRng, plan: &LoadPlan) -> Measurement {
    let endpoint = &plan.endpoints[rng.gen_range(0..plan.endpoints.len())];
    let method = if rng.gen_range(0u8..100) < plan.read_pct {
        "GET"
    } else {
        "POST"
    };

    let duration = rng.gen_range(0.001..0.250f64);
    let query_count = rng.gen_range(0..8u64);
    let query_time = if query_count == 0 {
        0.0
    } else {
        duration * rng.gen_range(0.1..0.9f64)
    };

    Measurement::new(endpoint.as_str(), method)
        .anonymous(rng.gen_bool(0.3))
        .cache_hit(method == "GET" && rng.gen_bool(0.4))
        .queries(query_count, query_time)
        .duration(duration)
}

fn record(tally: &mut Tally, m: &Measurement) {
    let entry = tally
        .entry((m.endpoint_name.clone(), m.method.clone()))
        .or_insert_with(|| SentTotals {
            endpoint_name: m.endpoint_name.clone(),
            method: m.method.clone(),
            ..SentTotals::default()
        });
    entry.calls += 1;
    entry.anon_calls += u64::from(m.is_anon_call);
    entry.cache_hits += u64::from(m.is_cache_hit);
    entry.query_count += m.query_count;
    entry.total_time += m.call_duration;
}

fn merge(into: &mut Tally, from: Tally) {
    for (key, t) in from {
        let entry = into.entry(key).or_insert_with(|| SentTotals {
            endpoint_name: t.endpoint_name.clone(),
            method: t.method.clone(),
            ..SentTotals::default()
        });
        entry.calls += t.calls;
        entry.anon_calls += t.anon_calls;
        entry.cache_hits += t.cache_hits;
        entry.query_count += t.query_count;
        entry.total_time += t.total_time;
    }
}
