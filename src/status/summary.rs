// src/status/summary.rs

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::Serialize;

/// Status of a single control result row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Ok,
    Alarm,
    Error,
    Info,
    Skip,
}

impl FromStr for Status {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "ok" => Ok(Status::Ok),
            "alarm" => Ok(Status::Alarm),
            "error" => Ok(Status::Error),
            "info" => Ok(Status::Info),
            "skip" => Ok(Status::Skip),
            other => Err(format!("invalid row status: {other}")),
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Status::Ok => "ok",
            Status::Alarm => "alarm",
            Status::Error => "error",
            Status::Info => "info",
            Status::Skip => "skip",
        };
        f.write_str(s)
    }
}

/// Counter vector over `{ok, alarm, error, info, skip}`.
///
/// Merging is commutative and associative, so the aggregate at any group is
/// independent of the order in which its children complete. A parent's
/// summary equals the pointwise sum of its children's summaries once all
/// children have reported.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatusSummary {
    pub ok: u32,
    pub alarm: u32,
    pub error: u32,
    pub info: u32,
    pub skip: u32,
}

impl StatusSummary {
    /// A summary counting a single row/leaf with the given status.
    pub fn of(status: Status) -> Self {
        let mut s = Self::default();
        s.add(status);
        s
    }

    /// Count one more row with the given status.
    pub fn add(&mut self, status: Status) {
        match status {
            Status::Ok => self.ok += 1,
            Status::Alarm => self.alarm += 1,
            Status::Error => self.error += 1,
            Status::Info => self.info += 1,
            Status::Skip => self.skip += 1,
        }
    }

    /// Pointwise addition of another summary into this one.
    pub fn merge(&mut self, other: &StatusSummary) {
        self.ok += other.ok;
        self.alarm += other.alarm;
        self.error += other.error;
        self.info += other.info;
        self.skip += other.skip;
    }

    pub fn total(&self) -> u32 {
        self.ok + self.alarm + self.error + self.info + self.skip
    }
}

impl fmt::Display for StatusSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ok={} alarm={} error={} info={} skip={}",
            self.ok, self.alarm, self.error, self.info, self.skip
        )
    }
}

/// Per-severity-label breakdown, with the same summation invariant per label.
pub type SeveritySummary = BTreeMap<String, StatusSummary>;

/// Merge `summary` into the entry for `label`, creating it if absent.
pub fn merge_severity(map: &mut SeveritySummary, label: &str, summary: &StatusSummary) {
    map.entry(label.to_string()).or_default().merge(summary);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_is_commutative() {
        let a = StatusSummary {
            ok: 1,
            alarm: 2,
            ..StatusSummary::default()
        };
        let b = StatusSummary {
            error: 3,
            skip: 1,
            ..StatusSummary::default()
        };

        let mut ab = a;
        ab.merge(&b);
        let mut ba = b;
        ba.merge(&a);
        assert_eq!(ab, ba);
        assert_eq!(ab.total(), 7);
    }

    #[test]
    fn severity_map_accumulates_per_label() {
        let mut map = SeveritySummary::new();
        merge_severity(&mut map, "high", &StatusSummary::of(Status::Alarm));
        merge_severity(&mut map, "high", &StatusSummary::of(Status::Ok));
        merge_severity(&mut map, "low", &StatusSummary::of(Status::Skip));

        assert_eq!(map["high"].alarm, 1);
        assert_eq!(map["high"].ok, 1);
        assert_eq!(map["low"].skip, 1);
    }

    #[test]
    fn status_parses_known_values_only() {
        assert_eq!("ALARM".parse::<Status>().unwrap(), Status::Alarm);
        assert!("warn".parse::<Status>().is_err());
    }
}
