use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExchangeError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("HTTP status {status}: {body}")]
    Status {
        status: reqwest::StatusCode,
        body: String,
    },

    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Unexpected data from exchange: {0}")]
    UnexpectedData(String),
}

impl ExchangeError {
    /// Timeouts, connection failures (including a connection dropped while
    /// the body was being read), 5xx and 429 are worth another attempt.
    /// Anything the server rejected or we could not parse is not.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Http(e) => {
                e.is_timeout()
                    || e.is_connect()
                    || e.is_request()
                    || e.is_body()
                    || (e.is_decode() && caused_by_io(e))
            }
            Self::Status { status, .. } => {
                status.is_server_error() || *status == reqwest::StatusCode::TOO_MANY_REQUESTS
            }
            Self::Parse(_) | Self::UnexpectedData(_) => false,
        }
    }
}

/// Reading a response body decodes it, so a reset or truncated stream
/// surfaces as a decode error with an I/O error somewhere underneath.
fn caused_by_io(e: &reqwest::Error) -> bool {
    let mut source = std::error::Error::source(e);
    while let Some(cause) = source {
        if cause.is::<std::io::Error>() {
            return true;
        }
        source = cause.source();
    }
    false
}

/// Cycle-wide failure of one refresh. Cloned out to every caller that
/// coalesced onto the same cycle, hence the owned strings.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum RefreshError {
    #[error("instrument listing failed: {0}")]
    Listing(String),

    #[error("exchange listed no instruments")]
    NoInstruments,

    #[error("history fetch failed for all {attempted} candidate instruments")]
    AllHistoriesFailed { attempted: usize },

    #[error("refresh task ended without reporting a result")]
    Aborted,
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum QueryError {
    #[error("no funding data available: {0}")]
    Unavailable(String),
}

#[derive(Debug, Error)]
pub enum PersistError {
    #[error("cache file I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("cache file is not a valid snapshot record: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{key}={value:?} is invalid: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_errors_split_on_retryability() {
        let server = ExchangeError::Status {
            status: reqwest::StatusCode::BAD_GATEWAY,
            body: String::new(),
        };
        let throttled = ExchangeError::Status {
            status: reqwest::StatusCode::TOO_MANY_REQUESTS,
            body: String::new(),
        };
        let rejected = ExchangeError::Status {
            status: reqwest::StatusCode::UNPROCESSABLE_ENTITY,
            body: "bad coin".into(),
        };

        assert!(server.is_transient());
        assert!(throttled.is_transient());
        assert!(!rejected.is_transient());
    }

    #[test]
    fn malformed_payloads_are_not_retried() {
        let parse = serde_json::from_str::<u64>("nope").unwrap_err();
        assert!(!ExchangeError::Parse(parse).is_transient());
        assert!(!ExchangeError::UnexpectedData("missing ctx".into()).is_transient());
    }
}
