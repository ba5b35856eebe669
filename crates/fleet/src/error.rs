use thiserror::Error;

#[derive(Debug, Error)]
pub enum FleetError {
    #[error("Command execution failed: {command}: {stderr}")]
    CommandFailed { command: String, stderr: String },

    #[error("Command not found: {0}")]
    CommandNotFound(String),

    #[error("Azure CLI not authenticated, run `az login` on the server: {0}")]
    NotAuthenticated(String),

    #[error("Cluster not found in clusters config: {0}")]
    ClusterNotFound(String),

    #[error("Invalid clusters config: {0}")]
    ClusterConfig(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl FleetError {
    pub fn command_failed(command: impl Into<String>, stderr: impl Into<String>) -> Self {
        Self::CommandFailed {
            command: command.into(),
            stderr: stderr.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, FleetError>;
