use thiserror::Error;

/// The metrics source could not produce samples
#[derive(Debug, Error)]
pub enum GatherError {
    #[error("Registry inconsistency: {reason}")]
    Inconsistent { reason: String },

    #[error("Metrics source unavailable: {reason}")]
    Unavailable { reason: String },
}

/// Delivering samples to the gateway failed
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Network failure talking to {endpoint}: {reason}")]
    Network { endpoint: String, reason: String },

    #[error("Gateway {endpoint} rejected push with HTTP {status}: {body}")]
    Rejected {
        endpoint: String,
        status: u16,
        body: String,
    },

    #[error("Failed to serialize samples: {reason}")]
    Serialization { reason: String },
}

/// Invalid construction parameters for a push job
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Job name must not be empty")]
    EmptyJobName,

    #[error("Invalid job name '{job_name}': {reason}")]
    InvalidJobName { job_name: String, reason: String },

    #[error("Invalid gateway endpoint '{endpoint}': {reason}")]
    InvalidEndpoint { endpoint: String, reason: String },

    #[error("Push interval must be greater than zero")]
    ZeroInterval,
}

/// Lifecycle misuse of the push scheduler
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("No Tokio runtime available to run the push loop")]
    RuntimeUnavailable,
}

/// Why a single guarded push did not deliver its samples
#[derive(Debug, Error)]
pub enum PushError {
    #[error(transparent)]
    Gather(#[from] GatherError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("Push panicked: {message}")]
    Panicked { message: String },
}
