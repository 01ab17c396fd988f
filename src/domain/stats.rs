use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub total: u64,
    pub last_24_hours: u64,
    pub by_severity: BTreeMap<String, u64>,
    pub by_source: BTreeMap<String, u64>,
}

/// Record counts bucketed by age, used by the retention view.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgeReport {
    pub total: u64,
    pub last_24_hours: u64,
    pub by_age: AgeBuckets,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgeBuckets {
    pub today: u64,
    pub yesterday: u64,
    pub last_week: u64,
    pub last_month: u64,
    pub older: u64,
}

impl AgeBuckets {
    #[must_use]
    pub fn sum(&self) -> u64 {
        self.today + self.yesterday + self.last_week + self.last_month + self.older
    }
}
