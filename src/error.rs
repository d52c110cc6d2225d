use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read registry file: {0}")]
    ReadFile(#[from] std::io::Error),
    #[error("failed to parse registry: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("validation error: {0}")]
    Validation(String),
    #[error("missing credential: {0}")]
    MissingCredential(String),
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("HTTP request failed for {url}: {source}")]
    Http { url: String, source: reqwest::Error },
    #[error("failed to parse feed from {url}: {message}")]
    Parse { url: String, message: String },
    #[error("invalid source URL '{url}': {message}")]
    InvalidUrl { url: String, message: String },
    #[error(transparent)]
    GitHub(#[from] GitHubError),
}

#[derive(Debug, Error)]
pub enum GitHubError {
    #[error("GitHub rate limit exceeded (status {status})")]
    RateLimit { status: u16 },
    #[error("GitHub API error: {0}")]
    Api(String),
    #[error("GitHub request failed: {0}")]
    Http(#[from] reqwest::Error),
}

#[derive(Debug, Error)]
pub enum EvalError {
    #[error("LLM provider request failed: {0}")]
    Request(String),
    #[error("LLM response was not usable JSON: {0}")]
    Parse(String),
}
