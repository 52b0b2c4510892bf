use serde::{Deserialize, Serialize};

/// slurmrestd wraps optional numeric fields in a `{number, set, infinite}`
/// envelope rather than using a bare `null`.
#[derive(Deserialize, Serialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FlagType {
    #[serde(default)]
    pub number: i64,
    #[serde(default)]
    pub set: bool,
    #[serde(default)]
    pub infinite: bool,
}

impl FlagType {
    /// The value if the field is actually populated (set and not infinite).
    pub fn value(&self) -> Option<i64> {
        (self.set && !self.infinite).then_some(self.number)
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, Default)]
pub struct SlurmResponse {
    #[serde(default)]
    pub nodes: Vec<SlurmNode>,
    #[serde(default)]
    pub jobs: Vec<SlurmJob>,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default)]
pub struct SlurmNode {
    pub name: String,
    #[serde(default)]
    pub architecture: String,
    #[serde(default)]
    pub features: Vec<String>,
    #[serde(default)]
    pub state: Vec<String>,
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub comment: String,
    #[serde(default)]
    pub reservation: String,
    #[serde(default)]
    pub boot_time: FlagType,
    #[serde(default)]
    pub slurmd_start_time: FlagType,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default)]
pub struct SlurmJob {
    pub job_id: i64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub command: String,
    #[serde(default)]
    pub comment: String,
    #[serde(default)]
    pub user_name: String,
    #[serde(default)]
    pub submit_time: FlagType,
    #[serde(default)]
    pub start_time: FlagType,
    #[serde(default)]
    pub job_state: String,
    #[serde(default)]
    pub priority: FlagType,
    #[serde(default)]
    pub restart_cnt: i64,
    #[serde(default)]
    pub nodes: String,
}
