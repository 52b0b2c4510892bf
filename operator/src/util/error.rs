use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("kube error: {0}")]
    Kube(#[from] kube::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid identifier: {0}")]
    InvalidIdentifier(String),

    #[error("invalid host range: {0}")]
    HostRange(String),

    #[error("invalid physical host comment: {0}")]
    PhysicalHostComment(String),

    #[error("scheduler request failed: {0}")]
    SchedulerRequest(String),

    #[error("scheduler request timed out")]
    SchedulerTimeout,

    #[error("missing object key: {0}")]
    MissingKey(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("leader election error: {0}")]
    LeaderElection(String),
}

pub type Result<T> = std::result::Result<T, Error>;
