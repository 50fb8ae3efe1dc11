//! Timeout enforcement and the single caller-visible error shape.

// std
use std::time::Duration as StdDuration;
// crates.io
use serde_json::Value;
use time::format_description::well_known::Rfc3339;
// self
use crate::{
	_prelude::*,
	error::TransportError,
	http::{HttpResponse, HttpTransport, RequestDescriptor},
	obs::{self, Stage, StageOutcome},
	pipeline::{Dispatch, DispatchFuture},
};

/// Message used when no response was received, including timeouts.
pub const CONNECTIVITY_MESSAGE: &str =
	"Unable to connect to the server. Check your internet connection.";
/// Message used for statuses without a dedicated entry.
pub const GENERIC_MESSAGE: &str = "An unexpected error occurred.";

/// Returns the default message for `status`.
pub fn default_message(status: u16) -> &'static str {
	match status {
		0 => CONNECTIVITY_MESSAGE,
		400 => "The request is invalid.",
		401 => "Unauthorized access. Please sign in again.",
		403 => "You do not have permission to perform this operation.",
		404 => "The requested resource was not found.",
		500 => "Server error. Please try again later.",
		503 => "The server is temporarily unavailable.",
		_ => GENERIC_MESSAGE,
	}
}

/// Coarse classification of a [`NormalizedError`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
	/// No response was received.
	Transport,
	/// The request budget elapsed.
	Timeout,
	/// The API answered `401`; the session has been invalidated.
	Unauthorized,
	/// Any other non-2xx answer, or an undecodable payload.
	Application,
}

/// What a [`NormalizedError`] was built from.
#[derive(Clone, Debug)]
pub enum ErrorCause {
	/// The failing response had no body.
	Empty,
	/// JSON body of the failing response.
	Body(Value),
	/// Non-JSON body of the failing response.
	Text(String),
	/// Transport failure where no response arrived.
	Transport(Arc<TransportError>),
	/// A payload could not be encoded or decoded.
	Decode(String),
}
impl ErrorCause {
	/// Renders the cause with sensitive fields and e-mail addresses masked.
	pub fn redacted(&self) -> String {
		match self {
			Self::Empty => String::new(),
			Self::Body(value) => obs::redact_json(value).to_string(),
			Self::Text(text) => obs::redact_text(text),
			Self::Transport(e) => e.to_string(),
			Self::Decode(message) => obs::redact_text(message),
		}
	}
}

/// The only error shape callers of the pipeline observe.
#[derive(Clone, Debug, ThisError)]
#[error("{message} (status {status})")]
pub struct NormalizedError {
	/// HTTP status, or `0` when no response was received.
	pub status: u16,
	/// Server-supplied `message`, or the default for `status`.
	pub message: String,
	/// Underlying cause.
	pub cause: ErrorCause,
	/// RFC 3339 instant at which the error was produced.
	pub timestamp: String,
}
impl NormalizedError {
	/// Builds the error for a non-2xx response.
	pub fn from_response(response: &HttpResponse) -> Self {
		let status = response.status.as_u16();
		let cause = if response.body.is_empty() {
			ErrorCause::Empty
		} else {
			match serde_json::from_slice::<Value>(&response.body) {
				Ok(value) => ErrorCause::Body(value),
				Err(_) => ErrorCause::Text(String::from_utf8_lossy(&response.body).into_owned()),
			}
		};
		let message = match &cause {
			ErrorCause::Body(value) => body_message(value),
			_ => None,
		}
		.unwrap_or_else(|| default_message(status).to_owned());

		Self::new(status, message, cause)
	}

	/// Builds the error for a failure where no response arrived.
	pub fn from_transport(error: TransportError) -> Self {
		Self::new(0, CONNECTIVITY_MESSAGE.to_owned(), ErrorCause::Transport(Arc::new(error)))
	}

	/// Builds the error for a payload that could not be encoded or decoded.
	pub fn decode(status: u16, detail: impl Display) -> Self {
		Self::new(status, GENERIC_MESSAGE.to_owned(), ErrorCause::Decode(detail.to_string()))
	}

	fn new(status: u16, message: String, cause: ErrorCause) -> Self {
		let timestamp = OffsetDateTime::now_utc().format(&Rfc3339).unwrap_or_default();

		Self { status, message, cause, timestamp }
	}

	/// Classifies the error.
	pub fn kind(&self) -> ErrorKind {
		match (self.status, &self.cause) {
			(0, ErrorCause::Transport(e)) if e.is_timeout() => ErrorKind::Timeout,
			(0, ErrorCause::Transport(_)) => ErrorKind::Transport,
			(401, _) => ErrorKind::Unauthorized,
			_ => ErrorKind::Application,
		}
	}

	/// Returns `true` when the API answered `401`.
	pub fn is_unauthorized(&self) -> bool {
		self.status == 401
	}
}

fn body_message(value: &Value) -> Option<String> {
	value.get("message").and_then(Value::as_str).filter(|text| !text.is_empty()).map(str::to_owned)
}

/// Innermost stage: bounds each dispatch by a timeout and converts every failure into exactly one
/// [`NormalizedError`]. It never retries.
#[derive(Clone, Debug)]
pub struct ErrorNormalizer<T> {
	transport: T,
	timeout: StdDuration,
	logging_enabled: bool,
}
impl<T> ErrorNormalizer<T>
where
	T: HttpTransport,
{
	/// Wraps `transport` with the given budget.
	pub fn new(transport: T, timeout: StdDuration) -> Self {
		Self { transport, timeout, logging_enabled: false }
	}

	/// Enables or disables error log events.
	pub fn with_logging(mut self, enabled: bool) -> Self {
		self.logging_enabled = enabled;

		self
	}

	/// Budget applied to each dispatch.
	pub fn timeout(&self) -> StdDuration {
		self.timeout
	}
}
impl<T> Dispatch for ErrorNormalizer<T>
where
	T: HttpTransport,
{
	fn dispatch(&self, request: RequestDescriptor) -> DispatchFuture<'_> {
		Box::pin(async move {
			let sending = self.transport.send(request);
			let result = match tokio::time::timeout(self.timeout, sending).await {
				Ok(Ok(response)) if response.is_success() => Ok(response),
				Ok(Ok(response)) => Err(NormalizedError::from_response(&response)),
				Ok(Err(e)) => Err(NormalizedError::from_transport(e)),
				Err(_) =>
					Err(NormalizedError::from_transport(TransportError::Timeout { after: self.timeout })),
			};

			match &result {
				Ok(_) => obs::record_stage_outcome(Stage::Normalize, StageOutcome::Success),
				Err(e) => {
					obs::record_stage_outcome(Stage::Normalize, StageOutcome::Failure);
					obs::error_event(self.logging_enabled, e);
				},
			}

			result
		})
	}
}

#[cfg(test)]
mod tests {
	// crates.io
	use reqwest::StatusCode;
	// self
	use super::*;

	#[test]
	fn message_table_matches_known_statuses() {
		assert_eq!(default_message(0), CONNECTIVITY_MESSAGE);
		assert_eq!(default_message(404), "The requested resource was not found.");
		assert_eq!(default_message(503), "The server is temporarily unavailable.");
		assert_eq!(default_message(418), GENERIC_MESSAGE);
	}

	#[test]
	fn body_message_overrides_the_table() {
		let response =
			HttpResponse::new(StatusCode::NOT_FOUND, br#"{"message":"Custom","code":"PGRST116"}"#.to_vec());
		let error = NormalizedError::from_response(&response);

		assert_eq!(error.status, 404);
		assert_eq!(error.message, "Custom");
		assert_eq!(error.kind(), ErrorKind::Application);
		assert!(matches!(error.cause, ErrorCause::Body(_)));
	}

	#[test]
	fn empty_or_foreign_bodies_fall_back_to_the_table() {
		let error = NormalizedError::from_response(&HttpResponse::new(
			StatusCode::FORBIDDEN,
			br#"{"message":""}"#.to_vec(),
		));

		assert_eq!(error.message, default_message(403));

		let error = NormalizedError::from_response(&HttpResponse::new(
			StatusCode::SERVICE_UNAVAILABLE,
			b"<html>down</html>".to_vec(),
		));

		assert_eq!(error.message, default_message(503));
		assert!(matches!(error.cause, ErrorCause::Text(ref text) if text == "<html>down</html>"));

		let error =
			NormalizedError::from_response(&HttpResponse::new(StatusCode::UNAUTHORIZED, Vec::new()));

		assert!(matches!(error.cause, ErrorCause::Empty));
		assert_eq!(error.kind(), ErrorKind::Unauthorized);
	}

	#[test]
	fn transport_failures_have_status_zero() {
		let timeout = NormalizedError::from_transport(TransportError::Timeout {
			after: StdDuration::from_millis(50),
		});

		assert_eq!(timeout.status, 0);
		assert_eq!(timeout.message, CONNECTIVITY_MESSAGE);
		assert_eq!(timeout.kind(), ErrorKind::Timeout);

		let io = NormalizedError::from_transport(TransportError::Io(std::io::Error::other("reset")));

		assert_eq!(io.kind(), ErrorKind::Transport);
	}

	#[test]
	fn timestamp_is_rfc3339() {
		let error = NormalizedError::decode(200, "expected a list");

		assert!(OffsetDateTime::parse(&error.timestamp, &Rfc3339).is_ok());
		assert_eq!(error.message, GENERIC_MESSAGE);
	}

	#[test]
	fn redacted_cause_masks_secrets() {
		let error = NormalizedError::from_response(&HttpResponse::new(
			StatusCode::BAD_REQUEST,
			br#"{"message":"bad","email":"tech@plant.example.com"}"#.to_vec(),
		));

		assert!(!error.cause.redacted().contains("tech@plant.example.com"));
	}
}
