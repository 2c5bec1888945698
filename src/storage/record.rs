use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, StorageError};

// ─── Write side ──────────────────────────────────────────────────

/// Scalar facts about one finished request.
/// The middleware computes these; storage only accumulates them.
#[derive(Debug, Clone, PartialEq)]
pub struct Measurement {
    /// Logical handler identity, e.g. "/api/users/:id"
    pub endpoint_name: String,
    pub method: String,
    pub is_anon_call: bool,
    pub is_cache_hit: bool,
    /// Seconds spent in backing queries
    pub query_time: f64,
    pub query_count: u64,
    /// Seconds of wall time for the whole call
    pub call_duration: f64,
}

impl Measurement {
    pub fn new(endpoint_name: impl Into<String>, method: impl Into<String>) -> Self {
        Self {
            endpoint_name: endpoint_name.into(),
            method: method.into(),
            is_anon_call: false,
            is_cache_hit: false,
            query_time: 0.0,
            query_count: 0,
            call_duration: 0.0,
        }
    }

    pub fn anonymous(mut self, yes: bool) -> Self {
        self.is_anon_call = yes;
        self
    }

    pub fn cache_hit(mut self, yes: bool) -> Self {
        self.is_cache_hit = yes;
        self
    }

    pub fn queries(mut self, count: u64, time: f64) -> Self {
        self.query_count = count;
        self.query_time = time;
        self
    }

    pub fn duration(mut self, secs: f64) -> Self {
        self.call_duration = secs;
        self
    }

    /// Rejects negative or non-finite timings before they reach a store.
    pub fn validate(&self) -> Result<(), StorageError> {
        for (name, value) in [
            ("query_time", self.query_time),
            ("call_duration", self.call_duration),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(StorageError::InvalidMeasurement(format!(
                    "{name} must be a non-negative number, got {value}"
                )));
            }
        }
        Ok(())
    }
}

// ─── Stored row ──────────────────────────────────────────────────

/// Running totals for one (endpoint, method) pair.
/// Only these raw counters are ever persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateRecord {
    pub endpoint_name: String,
    pub method: String,
    pub anon_calls: u64,
    pub cache_hits: u64,
    pub query_total_time: f64,
    pub query_total_count: u64,
    pub total_calls: u64,
    pub total_time: f64,
}

impl AggregateRecord {
    /// All-zero row, written the first time a key is observed.
    pub fn empty(endpoint_name: impl Into<String>, method: impl Into<String>) -> Self {
        Self {
            endpoint_name: endpoint_name.into(),
            method: method.into(),
            anon_calls: 0,
            cache_hits: 0,
            query_total_time: 0.0,
            query_total_count: 0,
            total_calls: 0,
            total_time: 0.0,
        }
    }

    /// Fold one measurement into the running totals.
    /// Counters saturate at `u64::MAX` instead of wrapping.
    pub fn apply(&mut self, m: &Measurement) {
        self.anon_calls = self.anon_calls.saturating_add(u64::from(m.is_anon_call));
        self.cache_hits = self.cache_hits.saturating_add(u64::from(m.is_cache_hit));
        self.query_total_time += m.query_time;
        self.query_total_count = self.query_total_count.saturating_add(m.query_count);
        self.total_calls = self.total_calls.saturating_add(1);
        self.total_time += m.call_duration;
    }
}

// ─── Read side ───────────────────────────────────────────────────

/// Values computed from the raw counters at read time.
/// Every ratio is 0 when its denominator is 0.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DerivedStats {
    pub anon_ratio: f64,
    pub cache_hit_ratio: f64,
    pub query_count_per_call: u64,
    pub query_time_ratio: f64,
    pub time_per_call: f64,
}

impl DerivedStats {
    pub fn from_record(r: &AggregateRecord) -> Self {
        if r.total_calls == 0 {
            return Self::zero();
        }

        let calls = r.total_calls as f64;
        let query_time_ratio = if r.total_time == 0.0 {
            0.0
        } else {
            100.0 * r.query_total_time / r.total_time
        };

        Self {
            anon_ratio: 100.0 * r.anon_calls as f64 / calls,
            cache_hit_ratio: 100.0 * r.cache_hits as f64 / calls,
            query_count_per_call: (r.query_total_count as f64 / calls).round() as u64,
            query_time_ratio,
            time_per_call: r.total_time / calls,
        }
    }

    pub fn zero() -> Self {
        Self {
            anon_ratio: 0.0,
            cache_hit_ratio: 0.0,
            query_count_per_call: 0,
            query_time_ratio: 0.0,
            time_per_call: 0.0,
        }
    }
}

/// One row of a `fetch_all` snapshot: the stored counters plus derived values.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProfileEntry {
    #[serde(flatten)]
    pub record: AggregateRecord,
    #[serde(flatten)]
    pub stats: DerivedStats,
}

impl From<AggregateRecord> for ProfileEntry {
    fn from(record: AggregateRecord) -> Self {
        let stats = DerivedStats::from_record(&record);
        Self { record, stats }
    }
}

// ─── Fields & ordering ───────────────────────────────────────────

/// Every attribute of a [`ProfileEntry`] that can be sorted on or exported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    EndpointName,
    Method,
    AnonCalls,
    CacheHits,
    QueryTotalTime,
    QueryTotalCount,
    TotalCalls,
    TotalTime,
    AnonRatio,
    CacheHitRatio,
    QueryCountPerCall,
    QueryTimeRatio,
    TimePerCall,
}

/// A borrowed attribute value, comparable within one field.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FieldValue<'a> {
    Text(&'a str),
    Count(u64),
    Float(f64),
}

impl FieldValue<'_> {
    fn cmp_same(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::Text(a), Self::Text(b)) => a.cmp(b),
            (Self::Count(a), Self::Count(b)) => a.cmp(b),
            (Self::Float(a), Self::Float(b)) => a.total_cmp(b),
            // One field always yields one variant
            _ => Ordering::Equal,
        }
    }
}

impl Field {
    pub const ALL: [Field; 13] = [
        Field::EndpointName,
        Field::Method,
        Field::AnonCalls,
        Field::CacheHits,
        Field::QueryTotalTime,
        Field::QueryTotalCount,
        Field::TotalCalls,
        Field::TotalTime,
        Field::AnonRatio,
        Field::CacheHitRatio,
        Field::QueryCountPerCall,
        Field::QueryTimeRatio,
        Field::TimePerCall,
    ];

    /// Attribute name; doubles as the SQL column or alias in the table store.
    pub fn name(self) -> &'static str {
        match self {
            Field::EndpointName => "endpoint_name",
            Field::Method => "method",
            Field::AnonCalls => "anon_calls",
            Field::CacheHits => "cache_hits",
            Field::QueryTotalTime => "query_total_time",
            Field::QueryTotalCount => "query_total_count",
            Field::TotalCalls => "total_calls",
            Field::TotalTime => "total_time",
            Field::AnonRatio => "anon_ratio",
            Field::CacheHitRatio => "cache_hit_ratio",
            Field::QueryCountPerCall => "query_count_per_call",
            Field::QueryTimeRatio => "query_time_ratio",
            Field::TimePerCall => "time_per_call",
        }
    }

    pub fn value(self, e: &ProfileEntry) -> FieldValue<'_> {
        let r = &e.record;
        let s = &e.stats;
        match self {
            Field::EndpointName => FieldValue::Text(&r.endpoint_name),
            Field::Method => FieldValue::Text(&r.method),
            Field::AnonCalls => FieldValue::Count(r.anon_calls),
            Field::CacheHits => FieldValue::Count(r.cache_hits),
            Field::QueryTotalTime => FieldValue::Float(r.query_total_time),
            Field::QueryTotalCount => FieldValue::Count(r.query_total_count),
            Field::TotalCalls => FieldValue::Count(r.total_calls),
            Field::TotalTime => FieldValue::Float(r.total_time),
            Field::AnonRatio => FieldValue::Float(s.anon_ratio),
            Field::CacheHitRatio => FieldValue::Float(s.cache_hit_ratio),
            Field::QueryCountPerCall => FieldValue::Count(s.query_count_per_call),
            Field::QueryTimeRatio => FieldValue::Float(s.query_time_ratio),
            Field::TimePerCall => FieldValue::Float(s.time_per_call),
        }
    }
}

impl FromStr for Field {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Field::ALL
            .into_iter()
            .find(|f| f.name() == s)
            .ok_or_else(|| ConfigError::UnknownAttribute(s.to_owned()))
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One sort key. Parsed from `"total_time"` or `"-total_time"` (descending).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderBy {
    pub field: Field,
    pub descending: bool,
}

impl OrderBy {
    pub fn asc(field: Field) -> Self {
        Self { field, descending: false }
    }

    pub fn desc(field: Field) -> Self {
        Self { field, descending: true }
    }

    /// Parse a comma-separated list such as `"-total_time,method"`.
    pub fn parse_list(s: &str) -> Result<Vec<OrderBy>, ConfigError> {
        s.split(',')
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .map(str::parse)
            .collect()
    }
}

impl FromStr for OrderBy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (name, descending) = match s.strip_prefix('-') {
            Some(rest) => (rest, true),
            None => (s, false),
        };
        let field = name
            .parse::<Field>()
            .map_err(|_| ConfigError::UnknownOrdering(s.to_owned()))?;
        Ok(Self { field, descending })
    }
}

/// Multi-key comparison: the first key whose values differ decides.
pub fn compare(a: &ProfileEntry, b: &ProfileEntry, ordering: &[OrderBy]) -> Ordering {
    for key in ordering {
        let ord = key.field.value(a).cmp_same(&key.field.value(b));
        if ord != Ordering::Equal {
            return if key.descending { ord.reverse() } else { ord };
        }
    }
    Ordering::Equal
}

/// Sort a snapshot in memory. Stable, so ties keep their fetch order.
pub fn sort_entries(entries: &mut [ProfileEntry], ordering: &[OrderBy]) {
    if !ordering.is_empty() {
        entries.sort_by(|a, b| compare(a, b, ordering));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(name: &str, total_calls: u64, total_time: f64) -> AggregateRecord {
        AggregateRecord {
            total_calls,
            total_time,
            ..AggregateRecord::empty(name, "GET")
        }
    }

    #[test]
    fn apply_saturates_counters() {
        let mut r = AggregateRecord::empty("v", "GET");
        r.apply(&Measurement::new("v", "GET").queries(u64::MAX, 0.5).duration(1.0));
        r.apply(&Measurement::new("v", "GET").queries(1, 0.5).duration(1.0));

        assert_eq!(r.query_total_count, u64::MAX);
        assert_eq!(r.total_calls, 2);
        assert_eq!(r.query_total_time, 1.0);
        assert_eq!(DerivedStats::from_record(&r).query_count_per_call, u64::MAX / 2 + 1);
    }

    #[test]
    fn derived_values_match_reference_row() {
        let r = AggregateRecord {
            anon_calls: 8,
            cache_hits: 3,
            query_total_time: 40.0,
            query_total_count: 20,
            ..record("app.view", 10, 50.0)
        };
        let s = DerivedStats::from_record(&r);

        assert_eq!(s.anon_ratio, 80.0);
        assert_eq!(s.cache_hit_ratio, 30.0);
        assert_eq!(s.query_count_per_call, 2);
        assert_eq!(s.query_time_ratio, 80.0);
        assert_eq!(s.time_per_call, 5.0);
    }

    #[test]
    fn zero_calls_yield_zero_stats() {
        let s = DerivedStats::from_record(&AggregateRecord::empty("app.view", "GET"));
        assert_eq!(s, DerivedStats::zero());
    }

    #[test]
    fn zero_total_time_keeps_time_ratio_at_zero() {
        let r = AggregateRecord {
            query_total_time: 1.5,
            ..record("app.view", 3, 0.0)
        };
        assert_eq!(DerivedStats::from_record(&r).query_time_ratio, 0.0);
    }

    #[test]
    fn query_count_per_call_rounds() {
        let r = AggregateRecord {
            query_total_count: 5,
            ..record("app.view", 2, 1.0)
        };
        assert_eq!(DerivedStats::from_record(&r).query_count_per_call, 3);
    }

    #[test]
    fn apply_increments_every_counter() {
        let mut r = AggregateRecord::empty("app.view", "GET");
        r.apply(
            &Measurement::new("app.view", "GET")
                .anonymous(true)
                .cache_hit(true)
                .queries(3, 2.0)
                .duration(4.0),
        );
        r.apply(&Measurement::new("app.view", "GET").queries(1, 0.5).duration(1.0));

        assert_eq!(r.anon_calls, 1);
        assert_eq!(r.cache_hits, 1);
        assert_eq!(r.query_total_count, 4);
        assert_eq!(r.query_total_time, 2.5);
        assert_eq!(r.total_calls, 2);
        assert_eq!(r.total_time, 5.0);
    }

    #[test]
    fn negative_timings_are_rejected() {
        let m = Measurement::new("v", "GET").duration(-1.0);
        assert!(matches!(m.validate(), Err(StorageError::InvalidMeasurement(_))));

        let m = Measurement::new("v", "GET").queries(1, f64::NAN);
        assert!(m.validate().is_err());
    }

    #[test]
    fn parses_ordering_keys() {
        let keys = OrderBy::parse_list("-total_time, method,").unwrap();
        assert_eq!(
            keys,
            vec![OrderBy::desc(Field::TotalTime), OrderBy::asc(Field::Method)]
        );
        assert!(matches!(
            "-nope".parse::<OrderBy>(),
            Err(ConfigError::UnknownOrdering(_))
        ));
    }

    #[test]
    fn sorts_descending_then_falls_back_on_ties() {
        let mut entries: Vec<ProfileEntry> = vec![
            record("b", 1, 7.0).into(),
            record("c", 1, 10.0).into(),
            record("a", 1, 3.0).into(),
        ];
        sort_entries(&mut entries, &[OrderBy::desc(Field::TotalTime)]);
        let names: Vec<_> = entries.iter().map(|e| e.record.endpoint_name.as_str()).collect();
        assert_eq!(names, ["c", "b", "a"]);

        let mut entries: Vec<ProfileEntry> = vec![
            record("b", 2, 5.0).into(),
            record("a", 2, 5.0).into(),
            record("c", 1, 9.0).into(),
        ];
        sort_entries(
            &mut entries,
            &[OrderBy::desc(Field::TotalCalls), OrderBy::asc(Field::EndpointName)],
        );
        let names: Vec<_> = entries.iter().map(|e| e.record.endpoint_name.as_str()).collect();
        assert_eq!(names, ["a", "b", "c"]);
    }
}
