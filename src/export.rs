//! CSV export of a profiler snapshot.
//!
//! Columns are configured as `(name, format, attr)` triples. The format is a
//! pattern with exactly one placeholder, either `{}` or `{:.N}` (N decimal
//! places), optionally surrounded by literal text: `"{:.1}%"` renders 80 as
//! `80.0%`. Output uses CRLF line endings.

use crate::config::ColumnConfig;
use crate::error::{ConfigError, ExportError};
use crate::storage::{Field, FieldValue, ProfileEntry};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValueFormat {
    prefix: String,
    precision: Option<usize>,
    suffix: String,
}

impl ValueFormat {
    pub fn parse(pattern: &str) -> Result<Self, ConfigError> {
        let invalid = |reason: &str| ConfigError::InvalidFormat {
            pattern: pattern.to_owned(),
            reason: reason.to_owned(),
        };

        let open = pattern.find('{').ok_or_else(|| invalid("missing placeholder"))?;
        let close = pattern[open..]
            .find('}')
            .map(|i| open + i)
            .ok_or_else(|| invalid("unterminated placeholder"))?;

        let prefix = &pattern[..open];
        let spec = &pattern[open + 1..close];
        let suffix = &pattern[close + 1..];
        if suffix.contains(|c: char| c == '{' || c == '}') || prefix.contains('}') {
            return Err(invalid("more than one placeholder"));
        }

        let precision = if spec.is_empty() {
            None
        } else {
            let digits = spec
                .strip_prefix(":.")
                .ok_or_else(|| invalid("expected `{}` or `{:.N}`"))?;
            let digits = digits.strip_suffix('f').unwrap_or(digits);
            let n = digits
                .parse::<usize>()
                .map_err(|_| invalid("precision must be a number"))?;
            Some(n)
        };

        Ok(Self {
            prefix: prefix.to_owned(),
            precision,
            suffix: suffix.to_owned(),
        })
    }

    pub fn render(&self, value: FieldValue<'_>) -> String {
        let body = match (value, self.precision) {
            (FieldValue::Text(s), _) => s.to_owned(),
            (FieldValue::Count(n), None) => n.to_string(),
            (FieldValue::Count(n), Some(p)) => format!("{:.*}", p, n as f64),
            // Debug keeps a trailing ".0" on whole numbers
            (FieldValue::Float(x), None) => format!("{x:?}"),
            (FieldValue::Float(x), Some(p)) => format!("{:.*}", p, x),
        };
        format!("{}{}{}", self.prefix, body, self.suffix)
    }
}

/// One configured export column.
#[derive(Debug, Clone, PartialEq)]
pub struct ReportColumn {
    pub name: String,
    pub format: ValueFormat,
    pub attr: Field,
}

impl ReportColumn {
    pub fn parse(config: &ColumnConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            name: config.name.clone(),
            format: ValueFormat::parse(&config.format)?,
            attr: config.attr.parse()?,
        })
    }

    pub fn render(&self, entry: &ProfileEntry) -> String {
        self.format.render(self.attr.value(entry))
    }
}

/// Header row of display names, then one formatted row per entry.
pub fn write_csv(entries: &[ProfileEntry], columns: &[ReportColumn]) -> Result<String, ExportError> {
    let mut writer = csv::WriterBuilder::new()
        .terminator(csv::Terminator::CRLF)
        .from_writer(Vec::new());

    writer.write_record(columns.iter().map(|c| c.name.as_str()))?;
    for entry in entries {
        writer.write_record(columns.iter().map(|c| c.render(entry)))?;
    }

    let bytes = writer.into_inner().map_err(|e| e.into_error())?;
    String::from_utf8(bytes).map_err(|_| ExportError::Encoding)
}
