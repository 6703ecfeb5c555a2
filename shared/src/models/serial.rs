//! Serial number templates
//!
//! Every store configures, per document kind, the prefix, the zero padding
//! and the window over which the counter is monotonic before resetting.

use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::DocumentKind;

/// When the serial counter starts over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResetPolicy {
    #[default]
    Never,
    Monthly,
    Yearly,
}

impl ResetPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResetPolicy::Never => "never",
            ResetPolicy::Monthly => "monthly",
            ResetPolicy::Yearly => "yearly",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "never" => Some(ResetPolicy::Never),
            "monthly" => Some(ResetPolicy::Monthly),
            "yearly" => Some(ResetPolicy::Yearly),
            _ => None,
        }
    }
}

/// Per-kind serial number template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerialTemplate {
    pub prefix: String,
    /// Zero-padded width of the counter part
    pub padding: u32,
    #[serde(default)]
    pub reset: ResetPolicy,
}

impl SerialTemplate {
    /// Template used when the store has not configured one for the kind.
    pub fn default_for(kind: DocumentKind) -> Self {
        Self {
            prefix: kind.serial_prefix().to_string(),
            padding: 5,
            reset: ResetPolicy::Never,
        }
    }

    /// Key of the reset window containing `now`: `YYYYMM` for monthly,
    /// `YYYY` for yearly, a fixed string otherwise.
    pub fn window_key(&self, now: DateTime<Utc>) -> String {
        match self.reset {
            ResetPolicy::Never => "static".to_string(),
            ResetPolicy::Monthly => format!("{:04}{:02}", now.year(), now.month()),
            ResetPolicy::Yearly => format!("{:04}", now.year()),
        }
    }

    /// Counter cache key for a (store, kind) pair within the window.
    pub fn counter_key(&self, store_id: Uuid, kind: DocumentKind, now: DateTime<Utc>) -> String {
        format!(
            "counter:{}:{}:{}",
            store_id,
            kind.as_str(),
            self.window_key(now)
        )
    }

    /// Format an issued counter value as the document serial.
    pub fn format(&self, number: i64) -> String {
        format!(
            "{}-{:0width$}",
            self.prefix,
            number,
            width = self.padding as usize
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 12, 0, 0).unwrap()
    }

    #[test]
    fn window_keys_follow_reset_policy() {
        let mut t = SerialTemplate::default_for(DocumentKind::Sales);
        assert_eq!(t.window_key(at(2026, 8, 7)), "static");

        t.reset = ResetPolicy::Monthly;
        assert_eq!(t.window_key(at(2026, 8, 7)), "202608");

        t.reset = ResetPolicy::Yearly;
        assert_eq!(t.window_key(at(2026, 8, 7)), "2026");
    }

    #[test]
    fn serial_is_prefixed_and_zero_padded() {
        let t = SerialTemplate {
            prefix: "INV".to_string(),
            padding: 5,
            reset: ResetPolicy::Never,
        };
        assert_eq!(t.format(42), "INV-00042");
        assert_eq!(t.format(123456), "INV-123456");
    }

    #[test]
    fn counter_key_includes_store_kind_and_window() {
        let t = SerialTemplate {
            prefix: "INV".to_string(),
            padding: 5,
            reset: ResetPolicy::Monthly,
        };
        let store = Uuid::nil();
        assert_eq!(
            t.counter_key(store, DocumentKind::Sales, at(2026, 8, 7)),
            format!("counter:{}:sales:202608", store)
        );
    }
}
