//! Single-line state records: `value|epoch[|extra]`.
//!
//! Records are tiny, written often, and read by many short-lived processes.
//! Decoding is strict: anything that fails shape validation reads as absent,
//! never as a favorable value.

use serde::Deserialize;

use crate::core::types::{GateState, TestStatus};

pub const FIELD_SEPARATOR: char = '|';

/// A decoded state record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateRecord {
    pub value: String,
    /// Wall-clock seconds since the Unix epoch at write time.
    pub epoch: u64,
    pub extra: Option<String>,
}

/// JSON spelling of a record, accepted on read for older writers.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct JsonRecord {
    value: String,
    epoch: u64,
    #[serde(default)]
    extra: Option<String>,
}

impl StateRecord {
    pub fn new(value: impl Into<String>, epoch: u64) -> Self {
        Self {
            value: value.into(),
            epoch,
            extra: None,
        }
    }

    pub fn with_extra(mut self, extra: impl Into<String>) -> Self {
        self.extra = Some(extra.into());
        self
    }

    /// Encode as one pipe-delimited line with trailing newline.
    pub fn encode(&self) -> String {
        let mut line = format!("{}{}{}", self.value, FIELD_SEPARATOR, self.epoch);
        if let Some(extra) = &self.extra {
            line.push(FIELD_SEPARATOR);
            line.push_str(extra);
        }
        line.push('\n');
        line
    }

    /// Decode pipe- or JSON-encoded text. Returns `None` on any shape violation.
    pub fn decode(raw: &str) -> Option<Self> {
        let trimmed = raw.trim_end_matches(['\n', '\r']);
        if trimmed.trim().is_empty() || trimmed.contains('\n') {
            return None;
        }
        let record = if trimmed.trim_start().starts_with('{') {
            let json: JsonRecord = serde_json::from_str(trimmed).ok()?;
            StateRecord {
                value: json.value,
                epoch: json.epoch,
                extra: json.extra,
            }
        } else {
            let mut fields = trimmed.splitn(3, FIELD_SEPARATOR);
            let value = fields.next()?.to_string();
            let epoch_field = fields.next()?;
            if epoch_field.is_empty() || !epoch_field.bytes().all(|b| b.is_ascii_digit()) {
                return None;
            }
            let epoch = epoch_field.parse().ok()?;
            let extra = fields.next().map(str::to_string);
            StateRecord {
                value,
                epoch,
                extra,
            }
        };
        if !is_valid_value(&record.value) {
            return None;
        }
        Some(record)
    }

    /// Age in seconds relative to `now`. Future epochs count as age zero.
    pub fn age_secs(&self, now: u64) -> u64 {
        now.saturating_sub(self.epoch)
    }

    pub fn is_stale(&self, now: u64, max_age_secs: u64) -> bool {
        self.age_secs(now) > max_age_secs
    }

    /// Parse the value into a typed record value.
    pub fn parse_value<V: RecordValue>(&self) -> Option<V> {
        V::parse(&self.value)
    }
}

fn is_valid_value(value: &str) -> bool {
    !value.is_empty() && value.trim() == value && !value.contains(FIELD_SEPARATOR)
}

/// Typed value stored in a [`StateRecord`].
pub trait RecordValue: Sized {
    fn parse(raw: &str) -> Option<Self>;
    fn encode(&self) -> &'static str;
}

impl RecordValue for GateState {
    fn parse(raw: &str) -> Option<Self> {
        // `absent` is deliberately not parseable: it is the meaning of no record.
        match raw {
            "needs-verification" => Some(GateState::NeedsVerification),
            "pending" => Some(GateState::Pending),
            "verified" => Some(GateState::Verified),
            _ => None,
        }
    }

    fn encode(&self) -> &'static str {
        self.as_str()
    }
}

impl RecordValue for TestStatus {
    fn parse(raw: &str) -> Option<Self> {
        match raw {
            "pass" => Some(TestStatus::Pass),
            "fail" => Some(TestStatus::Fail),
            _ => None,
        }
    }

    fn encode(&self) -> &'static str {
        self.as_str()
    }
}

/// Classification of a raw record read against a staleness window.
///
/// Corruption is checked before staleness: a record whose epoch cannot be
/// parsed has no meaningful age, so it is `Corrupt`, never `Stale`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordRead<V> {
    Absent,
    Corrupt,
    Stale { value: V, epoch: u64 },
    Fresh { value: V, epoch: u64 },
}

impl<V> RecordRead<V> {
    /// Value usable as evidence. Absent, corrupt, and stale all mean "no evidence".
    pub fn into_fresh(self) -> Option<V> {
        match self {
            RecordRead::Fresh { value, .. } => Some(value),
            _ => None,
        }
    }
}

/// Classify raw record text (`None` = file missing).
pub fn classify_read<V: RecordValue>(
    raw: Option<&str>,
    now: u64,
    max_age_secs: Option<u64>,
) -> RecordRead<V> {
    let Some(raw) = raw else {
        return RecordRead::Absent;
    };
    if raw.trim().is_empty() {
        return RecordRead::Absent;
    }
    let Some(record) = StateRecord::decode(raw) else {
        return RecordRead::Corrupt;
    };
    let Some(value) = record.parse_value::<V>() else {
        return RecordRead::Corrupt;
    };
    match max_age_secs {
        Some(max_age) if record.is_stale(now, max_age) => RecordRead::Stale {
            value,
            epoch: record.epoch,
        },
        _ => RecordRead::Fresh {
            value,
            epoch: record.epoch,
        },
    }
}
