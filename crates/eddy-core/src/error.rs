//! Error types for the Eddy validator.
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AddressError {
    #[error("empty address")] Empty,
    #[error("missing 0x prefix")] MissingPrefix,
    #[error("invalid length: {0} hex characters")] InvalidLength(usize),
    #[error("invalid character: {0}")] InvalidCharacter(char),
}

/// Failures of an HTTP or GraphQL query, after any retries.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("request to {url} timed out after {timeout_secs}s")] Timeout { url: String, timeout_secs: u64 },
    #[error("rate limited by {url} after {attempts} attempts")] RateLimited { url: String, attempts: u32 },
    #[error("{url} returned HTTP {status}: {body}")] Status { url: String, status: u16, body: String },
    #[error("transport error for {url}: {reason}")] Transport { url: String, reason: String },
    #[error("malformed response from {url}: {reason}")] Decode { url: String, reason: String },
    #[error("graphql error from {url}: {message}")] GraphQl { url: String, message: String },
    #[error("pagination at {url} exceeded {max_pages} pages")] TooManyPages { url: String, max_pages: u32 },
}

impl FetchError {
    /// Whether the failure is worth another attempt (timeouts, 5xx, 429, connect errors).
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Timeout { .. } | Self::RateLimited { .. } | Self::Transport { .. } => true,
            Self::Status { status, .. } => *status == 429 || *status >= 500,
            Self::Decode { .. } | Self::GraphQl { .. } | Self::TooManyPages { .. } => false,
        }
    }
}

/// Failures talking to the ledger or getting a submission included.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error("ledger connection failed: {0}")] Connection(String),
    #[error("ledger connection lost")] Disconnected,
    #[error("ledger rpc: {0}")] Rpc(String),
    #[error("submission not included within {secs}s")] Timeout { secs: u64 },
    #[error("dispatch error: {reason}")] Dispatch { reason: String },
    #[error("transaction dropped from pool")] Dropped,
    #[error("transaction invalid: {0}")] Invalid(String),
    #[error("status stream closed before inclusion")] StreamClosed,
    #[error("signing key: {0}")] SigningKey(String),
    #[error("encoding: {0}")] Encoding(String),
    #[error("mismatched lengths: {uids} uids, {weights} weights")] LengthMismatch { uids: usize, weights: usize },
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuantizeError {
    #[error("no weights to quantize")] EmptyInput,
    #[error("weights sum to zero")] ZeroTotal,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} is required")] Missing(String),
    #[error("{var}: {reason}")] Invalid { var: String, reason: String },
}

/// Outcome of one scheduler step.
///
/// Degenerate-but-valid inputs (no votes, all-zero scores) are not errors;
/// they are handled by fallbacks inside the pipeline.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PipelineError {
    #[error(transparent)] Network(#[from] FetchError),
    #[error(transparent)] Ledger(#[from] LedgerError),
    #[error("invalid record {record}: {reason}")] Validation { record: String, reason: String },
    #[error("empty input: {0}")] EmptyInput(String),
    #[error("fatal: {0}")] Fatal(String),
    #[error("{errors} consecutive failed iterations (limit {limit})")] ErrorBudgetExhausted { errors: u32, limit: u32 },
}

impl PipelineError {
    /// Short label used in log lines.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Network(_) => "network",
            Self::Ledger(_) => "ledger",
            Self::Validation { .. } => "validation",
            Self::EmptyInput(_) => "empty_input",
            Self::Fatal(_) => "fatal",
            Self::ErrorBudgetExhausted { .. } => "error_budget",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_classification() {
        let url = "http://indexer".to_string();
        assert!(FetchError::Timeout { url: url.clone(), timeout_secs: 30 }.is_transient());
        assert!(FetchError::Status { url: url.clone(), status: 503, body: String::new() }.is_transient());
        assert!(!FetchError::Status { url: url.clone(), status: 404, body: String::new() }.is_transient());
        assert!(!FetchError::Decode { url, reason: "eof".into() }.is_transient());
    }

    #[test]
    fn display_dispatch_error() {
        let e = LedgerError::Dispatch { reason: "SubtensorModule.SettingWeightsTooFast".into() };
        assert_eq!(e.to_string(), "dispatch error: SubtensorModule.SettingWeightsTooFast");
    }

    #[test]
    fn from_fetch_error() {
        let fetch = FetchError::GraphQl { url: "u".into(), message: "bad".into() };
        let err: PipelineError = fetch.clone().into();
        assert_eq!(err, PipelineError::Network(fetch));
        assert_eq!(err.kind(), "network");
    }

    #[test]
    fn from_ledger_error() {
        let err: PipelineError = LedgerError::Dropped.into();
        assert_eq!(err.kind(), "ledger");
        assert_eq!(err.to_string(), "transaction dropped from pool");
    }

    #[test]
    fn display_error_budget() {
        let err = PipelineError::ErrorBudgetExhausted { errors: 5, limit: 5 };
        assert_eq!(err.to_string(), "5 consecutive failed iterations (limit 5)");
    }
}
