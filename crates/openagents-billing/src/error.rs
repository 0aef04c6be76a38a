#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("wildcard host must contain exactly one '*': {0}")]
    InvalidWildcardHost(String),
    #[error("service name must not be empty")]
    EmptyServiceName,
    #[error("scheme must not be empty")]
    EmptyScheme,
    #[error("invalid page url: {0}")]
    InvalidPageUrl(String),
    #[error("invalid value for {key}: {value}")]
    InvalidEnv { key: String, value: String },
}

/// Failure reported by a remote collaborator (method call or data feed).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RemoteError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("api error ({status}): {code}: {message}")]
    Api {
        status: u16,
        code: String,
        message: String,
    },
    #[error("parse error: {0}")]
    Parse(String),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("internal: {0}")]
    Internal(String),
}

#[derive(Debug, thiserror::Error)]
pub enum BillingError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("remote error: {0}")]
    Remote(#[from] RemoteError),
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    #[error("prompt already finished")]
    Finished,
}
