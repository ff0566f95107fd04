use std::fmt::{Display, Formatter};
use std::future::Future;
use std::pin::Pin;

use time::Date;

use crate::domain::Symbol;
use crate::validation::RawBarRow;

/// Fetch-level error classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FetchErrorKind {
    Network,
    Timeout,
    RateLimited,
    InvalidRequest,
    Internal,
}

/// Structured error returned by a [`BarFetcher`].
///
/// Every kind is scoped to one symbol; the coordinator records it and moves on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchError {
    kind: FetchErrorKind,
    message: String,
    retryable: bool,
}

impl FetchError {
    pub fn network(message: impl Into<String>) -> Self {
        Self {
            kind: FetchErrorKind::Network,
            message: message.into(),
            retryable: true,
        }
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self {
            kind: FetchErrorKind::Timeout,
            message: message.into(),
            retryable: true,
        }
    }

    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self {
            kind: FetchErrorKind::RateLimited,
            message: message.into(),
            retryable: true,
        }
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self {
            kind: FetchErrorKind::InvalidRequest,
            message: message.into(),
            retryable: false,
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            kind: FetchErrorKind::Internal,
            message: message.into(),
            retryable: false,
        }
    }

    pub const fn kind(&self) -> FetchErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// Whether the next scheduled cycle may succeed where this one failed.
    pub const fn retryable(&self) -> bool {
        self.retryable
    }

    pub const fn code(&self) -> &'static str {
        match self.kind {
            FetchErrorKind::Network => "fetch.network",
            FetchErrorKind::Timeout => "fetch.timeout",
            FetchErrorKind::RateLimited => "fetch.rate_limited",
            FetchErrorKind::InvalidRequest => "fetch.invalid_request",
            FetchErrorKind::Internal => "fetch.internal",
        }
    }
}

impl Display for FetchError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.message, self.code())
    }
}

impl std::error::Error for FetchError {}

/// Inclusive date window requested from the fetch capability.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    pub symbol: Symbol,
    pub start: Date,
    pub end: Date,
}

impl FetchRequest {
    pub fn new(symbol: Symbol, start: Date, end: Date) -> Result<Self, FetchError> {
        if start > end {
            return Err(FetchError::invalid_request(format!(
                "fetch window start {start} is after end {end}"
            )));
        }
        Ok(Self { symbol, start, end })
    }
}

pub type FetchFuture<'a> =
    Pin<Box<dyn Future<Output = Result<Vec<RawBarRow>, FetchError>> + Send + 'a>>;

/// Opaque source of raw daily rows.
///
/// Implementations own their transport, retry and backoff policy. The coordinator only
/// throttles calls and bounds them with a timeout.
pub trait BarFetcher: Send + Sync {
    fn fetch<'a>(&'a self, req: FetchRequest) -> FetchFuture<'a>;
}

#[cfg(test)]
mod tests {
    use time::macros::date;

    use super::*;

    #[test]
    fn transport_failures_are_retryable() {
        assert!(FetchError::network("connection reset").retryable());
        assert!(FetchError::timeout("30s elapsed").retryable());
        assert!(!FetchError::invalid_request("unknown symbol").retryable());
    }

    #[test]
    fn display_includes_stable_code() {
        let err = FetchError::rate_limited("429 from upstream");
        assert_eq!(err.to_string(), "429 from upstream (fetch.rate_limited)");
    }

    #[test]
    fn rejects_inverted_window() {
        let symbol = Symbol::parse("IWM").expect("symbol");
        let err = FetchRequest::new(symbol, date!(2024 - 05 - 02), date!(2024 - 05 - 01))
            .expect_err("must fail");
        assert_eq!(err.kind(), FetchErrorKind::InvalidRequest);
    }
}
