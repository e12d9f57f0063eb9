use thiserror::Error;

#[derive(Error, Debug)]
pub enum DevsetupError {
    /// The agent answered with an error body or a failed operation.
    #[error("{0}")]
    Agent(String),

    #[error("Cannot reach devsetup-agent at {url}. Is it running? ({source})")]
    Unreachable {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Unauthorized: set --token or DEVSETUP_AGENT_TOKEN to the agent's token")]
    Unauthorized,

    #[error("API request failed: {0}")]
    Api(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Dialog error: {0}")]
    Dialog(#[from] dialoguer::Error),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, DevsetupError>;
