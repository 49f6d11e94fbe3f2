use thiserror::Error;

#[derive(Error, Debug)]
pub enum ModelError {
    #[error("Configuration Error: {0}")]
    Config(String),
    #[error("Serialization Error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("YAML Error: {0}")]
    Yaml(String),
    #[error("Network Error: {0}")]
    Network(String),
    #[error("Brokerage Error: {0}")]
    Brokerage(String),
    #[error("Store Error: {0}")]
    Store(String),
    #[error("WebSocket Error: {0}")]
    WebSocket(String),
    #[error("Strategy Error: {0}")]
    Strategy(String),
}

impl From<reqwest::Error> for ModelError {
    fn from(error: reqwest::Error) -> Self {
        ModelError::Network(error.to_string())
    }
}

impl From<serde_yaml::Error> for ModelError {
    fn from(error: serde_yaml::Error) -> Self {
        ModelError::Yaml(error.to_string())
    }
}

pub type Result<T, E = ModelError> = std::result::Result<T, E>;
