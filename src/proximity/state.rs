use std::collections::HashMap;

use chrono::{DateTime, Utc};

/// Last known inside/outside verdict per report.
///
/// Unknown ids read as outside. Owned by the scan worker, which runs one scan at
/// a time, so no interior locking is needed.
#[derive(Debug, Default)]
pub struct ProximityStateStore {
    inside: HashMap<String, bool>,
    last_reset_at: Option<DateTime<Utc>>,
}

impl ProximityStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_inside(&self, report_id: &str) -> bool {
        self.inside.get(report_id).copied().unwrap_or(false)
    }

    pub fn set_inside(&mut self, report_id: &str, is_inside: bool) {
        match self.inside.get_mut(report_id) {
            Some(entry) => *entry = is_inside,
            None => {
                self.inside.insert(report_id.to_string(), is_inside);
            }
        }
    }

    /// Forget everything. Reports still in range show up as fresh entries on
    /// the next scan.
    pub fn reset_all(&mut self) {
        self.inside.clear();
        self.last_reset_at = Some(Utc::now());
    }

    pub fn len(&self) -> usize {
        self.inside.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inside.is_empty()
    }

    pub fn last_reset_at(&self) -> Option<DateTime<Utc>> {
        self.last_reset_at
    }
}
