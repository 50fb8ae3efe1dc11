//! Crate-level error types shared by the store, transport and configuration layers.
//!
//! Callers of the request pipeline never see these directly: every failed call surfaces as a
//! [`NormalizedError`](crate::pipeline::NormalizedError). The types here cover construction-time
//! failures and the building blocks the normalization stage consumes.

// std
use std::time::Duration as StdDuration;
// self
use crate::_prelude::*;

/// Crate-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Canonical error exposed by construction and session-management APIs.
#[derive(Debug, ThisError)]
pub enum Error {
	/// Storage-layer failure.
	#[error("{0}")]
	Storage(
		#[from]
		#[source]
		crate::store::StoreError,
	),
	/// Local configuration problem.
	#[error(transparent)]
	Config(#[from] ConfigError),
}

/// Configuration and validation failures.
#[derive(Debug, ThisError)]
pub enum ConfigError {
	/// HTTP client could not be constructed.
	#[error("HTTP client could not be constructed.")]
	HttpClientBuild {
		/// Underlying transport builder failure.
		#[source]
		source: BoxError,
	},
	/// Configuration document could not be parsed.
	#[error("Configuration could not be parsed.")]
	Parse {
		/// Structured parsing failure naming the offending field.
		#[source]
		source: serde_path_to_error::Error<serde_json::Error>,
	},
	/// The API base URL is empty.
	#[error("The API base URL must not be empty.")]
	MissingBaseUrl,
	/// The public API key for the identity endpoint is empty.
	#[error("The public API key must not be empty.")]
	MissingApiKey,
	/// The request timeout is zero.
	#[error("The request timeout must be greater than zero.")]
	ZeroTimeout,
	/// The identity endpoint uses a scheme other than http/https.
	#[error("Identity endpoint scheme `{scheme}` is not supported.")]
	UnsupportedIdentityScheme {
		/// Scheme found on the configured URL.
		scheme: String,
	},
}
impl ConfigError {
	/// Wraps a transport's builder failure inside [`ConfigError`].
	pub fn http_client_build(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::HttpClientBuild { source: Box::new(src) }
	}
}
impl From<ReqwestError> for ConfigError {
	fn from(e: ReqwestError) -> Self {
		Self::http_client_build(e)
	}
}

/// Failures where no HTTP response was received at all.
#[derive(Debug, ThisError)]
pub enum TransportError {
	/// Underlying HTTP client reported a network failure.
	#[error("Network error occurred while dispatching the request.")]
	Network {
		/// Transport-specific network error.
		#[source]
		source: BoxError,
	},
	/// The request did not complete within its budget.
	#[error("Request did not complete within {after:?}.")]
	Timeout {
		/// Budget that elapsed.
		after: StdDuration,
	},
	/// Underlying IO failure surfaced during transport.
	#[error("I/O error occurred while dispatching the request.")]
	Io(#[from] std::io::Error),
}
impl TransportError {
	/// Wraps a transport-specific network error.
	pub fn network(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::Network { source: Box::new(src) }
	}

	/// Returns `true` when the failure is an elapsed timeout budget.
	pub fn is_timeout(&self) -> bool {
		matches!(self, Self::Timeout { .. })
	}
}
impl From<ReqwestError> for TransportError {
	fn from(e: ReqwestError) -> Self {
		Self::network(e)
	}
}
