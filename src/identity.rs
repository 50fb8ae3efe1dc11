//! Token exchanges against the identity service.
//!
//! Both grants `POST` a JSON body to the configured token endpoint with a `grant_type` query
//! parameter and the public `apikey` header. A successful response must carry the new
//! `access_token`/`refresh_token` pair; the expiry comes from `expires_at`, then `expires_in`, then
//! the `exp` claim of the access token.

// std
use std::time::Duration as StdDuration;
// crates.io
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use reqwest::header::{CONTENT_TYPE, HeaderName, HeaderValue};
use serde_json::Value;
// self
use crate::{
	_prelude::*,
	auth::Credential,
	config::PipelineConfig,
	error::TransportError,
	http::{HttpResponse, HttpTransport, RequestDescriptor},
	store::StoreError,
};

/// Header carrying the public API key.
pub const API_KEY_HEADER: &str = "apikey";

/// Why an identity exchange failed.
#[derive(Debug, ThisError)]
pub enum IdentityError {
	/// The identity endpoint answered with a non-2xx status.
	#[error("Identity endpoint rejected the {grant} grant with status {status}: {message}.")]
	Rejected {
		/// Grant label.
		grant: &'static str,
		/// HTTP status code.
		status: u16,
		/// Server-supplied or generic description.
		message: String,
	},
	/// No response was received.
	#[error(transparent)]
	Transport(#[from] TransportError),
	/// The success body could not be parsed.
	#[error("Identity endpoint returned malformed JSON.")]
	ResponseParse {
		/// Structured parsing failure.
		#[source]
		source: serde_path_to_error::Error<serde_json::Error>,
		/// HTTP status code.
		status: u16,
	},
	/// The success body carried an empty token.
	#[error("Identity endpoint returned an empty {field}.")]
	MissingToken {
		/// Name of the empty field.
		field: &'static str,
	},
	/// No expiry could be derived from the response.
	#[error("Identity endpoint response does not state when the access token expires.")]
	MissingExpiry,
	/// The new credential could not be persisted.
	#[error(transparent)]
	Storage(#[from] StoreError),
	/// The session was cleared while the refresh was pending, so its result was discarded.
	#[error("Session was cleared before the refreshed credential could be stored.")]
	SessionCleared,
	/// The configured endpoint or API key cannot be used in a request.
	#[error("Identity request could not be built: {reason}.")]
	InvalidRequest {
		/// What was wrong.
		reason: String,
	},
}
impl IdentityError {
	/// HTTP status associated with the failure, when a response was received.
	pub fn status(&self) -> Option<u16> {
		match self {
			Self::Rejected { status, .. } | Self::ResponseParse { status, .. } => Some(*status),
			_ => None,
		}
	}
}

/// Grant types the identity endpoint is asked for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Grant {
	/// `grant_type=refresh_token`.
	RefreshToken,
	/// `grant_type=password`.
	Password,
}
impl Grant {
	/// Returns the wire value of the `grant_type` parameter.
	pub const fn as_str(self) -> &'static str {
		match self {
			Grant::RefreshToken => "refresh_token",
			Grant::Password => "password",
		}
	}
}
impl Display for Grant {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

#[derive(Deserialize)]
struct GrantResponse {
	access_token: String,
	refresh_token: String,
	#[serde(default)]
	expires_at: Option<i64>,
	#[serde(default)]
	expires_in: Option<i64>,
}

#[derive(Deserialize)]
struct JwtClaims {
	exp: i64,
}

/// Client for the identity service's token endpoint.
#[derive(Clone)]
pub struct IdentityClient {
	endpoint: Url,
	api_key: String,
	timeout: StdDuration,
	transport: Arc<dyn HttpTransport>,
}
impl IdentityClient {
	/// Creates a client for `endpoint`, sending `api_key` and bounding each call by `timeout`.
	pub fn new(
		endpoint: Url,
		api_key: impl Into<String>,
		timeout: StdDuration,
		transport: Arc<dyn HttpTransport>,
	) -> Self {
		Self { endpoint, api_key: api_key.into(), timeout, transport }
	}

	/// Creates a client from the identity settings in `config`.
	pub fn from_config(config: &PipelineConfig, transport: Arc<dyn HttpTransport>) -> Self {
		Self::new(
			config.identity_url.clone(),
			config.public_api_key.clone(),
			config.request_timeout(),
			transport,
		)
	}

	/// Token endpoint this client talks to.
	pub fn endpoint(&self) -> &Url {
		&self.endpoint
	}

	/// Exchanges `refresh_token` for a new credential. Nothing is persisted here.
	pub async fn refresh(&self, refresh_token: &str) -> Result<Credential, IdentityError> {
		let body = serde_json::json!({ "refresh_token": refresh_token });

		self.exchange(Grant::RefreshToken, &body).await
	}

	/// Exchanges e-mail and password for a credential. Nothing is persisted here.
	pub async fn sign_in(&self, email: &str, password: &str) -> Result<Credential, IdentityError> {
		let body = serde_json::json!({ "email": email, "password": password });

		self.exchange(Grant::Password, &body).await
	}

	async fn exchange(&self, grant: Grant, body: &Value) -> Result<Credential, IdentityError> {
		let request = self.build_request(grant, body)?;
		let sending = self.transport.send(request);
		let response = match tokio::time::timeout(self.timeout, sending).await {
			Ok(result) => result?,
			Err(_) => return Err(TransportError::Timeout { after: self.timeout }.into()),
		};

		if !response.is_success() {
			return Err(IdentityError::Rejected {
				grant: grant.as_str(),
				status: response.status.as_u16(),
				message: rejection_message(&response),
			});
		}

		parse_grant(&response, OffsetDateTime::now_utc())
	}

	fn build_request(
		&self,
		grant: Grant,
		body: &Value,
	) -> Result<RequestDescriptor, IdentityError> {
		let mut url = self.endpoint.clone();

		url.query_pairs_mut().append_pair("grant_type", grant.as_str());

		let api_key = HeaderValue::from_str(&self.api_key)
			.map_err(|e| IdentityError::InvalidRequest { reason: e.to_string() })?;
		let payload = serde_json::to_vec(body)
			.map_err(|e| IdentityError::InvalidRequest { reason: e.to_string() })?;

		Ok(RequestDescriptor::post(url.as_str())
			.with_header(HeaderName::from_static(API_KEY_HEADER), api_key)
			.with_header(CONTENT_TYPE, HeaderValue::from_static("application/json"))
			.with_body(payload))
	}
}
impl Debug for IdentityClient {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("IdentityClient")
			.field("endpoint", &self.endpoint.as_str())
			.field("timeout", &self.timeout)
			.finish()
	}
}

fn parse_grant(response: &HttpResponse, now: OffsetDateTime) -> Result<Credential, IdentityError> {
	let status = response.status.as_u16();
	let mut deserializer = serde_json::Deserializer::from_slice(&response.body);
	let grant: GrantResponse = serde_path_to_error::deserialize(&mut deserializer)
		.map_err(|source| IdentityError::ResponseParse { source, status })?;

	if grant.access_token.is_empty() {
		return Err(IdentityError::MissingToken { field: "access_token" });
	}
	if grant.refresh_token.is_empty() {
		return Err(IdentityError::MissingToken { field: "refresh_token" });
	}

	let expires_at = grant
		.expires_at
		.or_else(|| grant.expires_in.map(|secs| now.unix_timestamp().saturating_add(secs)))
		.or_else(|| jwt_expiry(&grant.access_token))
		.ok_or(IdentityError::MissingExpiry)?;

	Ok(Credential::new(grant.access_token, grant.refresh_token, expires_at))
}

fn rejection_message(response: &HttpResponse) -> String {
	const MESSAGE_FIELDS: [&str; 3] = ["error_description", "msg", "message"];

	serde_json::from_slice::<Value>(&response.body)
		.ok()
		.and_then(|body| {
			MESSAGE_FIELDS.iter().find_map(|field| {
				body.get(*field)
					.and_then(Value::as_str)
					.filter(|text| !text.is_empty())
					.map(str::to_owned)
			})
		})
		.unwrap_or_else(|| {
			format!("identity endpoint returned status {}", response.status.as_u16())
		})
}

/// Reads the `exp` claim from a JWT without verifying it.
fn jwt_expiry(token: &str) -> Option<i64> {
	let payload = token.split('.').nth(1)?;
	let bytes = URL_SAFE_NO_PAD.decode(payload.trim_end_matches('=')).ok()?;

	serde_json::from_slice::<JwtClaims>(&bytes).ok().map(|claims| claims.exp)
}

#[cfg(test)]
mod tests {
	// crates.io
	use reqwest::StatusCode;
	use time::macros;
	// self
	use super::*;

	fn ok(body: &str) -> HttpResponse {
		HttpResponse::new(StatusCode::OK, body.as_bytes().to_vec())
	}

	fn jwt_with_exp(exp: i64) -> String {
		let header = URL_SAFE_NO_PAD.encode(b"{\"alg\":\"HS256\"}");
		let claims = URL_SAFE_NO_PAD.encode(format!("{{\"exp\":{exp},\"sub\":\"u-1\"}}"));

		format!("{header}.{claims}.signature")
	}

	#[test]
	fn absolute_expiry_wins() {
		let now = macros::datetime!(2025-01-01 00:00 UTC);
		let credential = parse_grant(
			&ok(r#"{"access_token":"a","refresh_token":"r","expires_at":1735693200,"expires_in":9}"#),
			now,
		)
		.expect("Grant with absolute expiry should parse.");

		assert_eq!(credential, Credential::new("a", "r", 1_735_693_200));
	}

	#[test]
	fn relative_expiry_is_anchored_at_now() {
		let now = macros::datetime!(2025-01-01 00:00 UTC);
		let credential =
			parse_grant(&ok(r#"{"access_token":"a","refresh_token":"r","expires_in":3600}"#), now)
				.expect("Grant with relative expiry should parse.");

		assert_eq!(credential.expires_at, now.unix_timestamp() + 3600);
	}

	#[test]
	fn jwt_claim_is_the_last_resort() {
		let now = macros::datetime!(2025-01-01 00:00 UTC);
		let token = jwt_with_exp(1_735_700_000);
		let body = format!(r#"{{"access_token":"{token}","refresh_token":"r"}}"#);
		let credential = parse_grant(&ok(&body), now).expect("Grant with JWT expiry should parse.");

		assert_eq!(credential.expires_at, 1_735_700_000);

		let err = parse_grant(&ok(r#"{"access_token":"opaque","refresh_token":"r"}"#), now)
			.expect_err("Opaque tokens without expiry should be rejected.");

		assert!(matches!(err, IdentityError::MissingExpiry));
	}

	#[test]
	fn missing_refresh_token_names_the_field() {
		let err = parse_grant(
			&ok(r#"{"access_token":"a","expires_in":60}"#),
			macros::datetime!(2025-01-01 00:00 UTC),
		)
		.expect_err("Grants without a refresh token should be rejected.");
		let IdentityError::ResponseParse { source, status } = err else {
			panic!("Expected a parse error, got {err:?}.");
		};

		assert_eq!(status, 200);
		assert!(source.inner().to_string().contains("refresh_token"));

		let err = parse_grant(
			&ok(r#"{"access_token":"a","refresh_token":"","expires_in":60}"#),
			macros::datetime!(2025-01-01 00:00 UTC),
		)
		.expect_err("Empty refresh tokens should be rejected.");

		assert!(matches!(err, IdentityError::MissingToken { field: "refresh_token" }));
	}

	#[test]
	fn rejection_message_prefers_server_fields() {
		let response = HttpResponse::new(
			StatusCode::BAD_REQUEST,
			br#"{"error":"invalid_grant","error_description":"Refresh Token Not Found"}"#.to_vec(),
		);

		assert_eq!(rejection_message(&response), "Refresh Token Not Found");

		let response = HttpResponse::new(
			StatusCode::BAD_REQUEST,
			br#"{"msg":"Invalid login credentials"}"#.to_vec(),
		);

		assert_eq!(rejection_message(&response), "Invalid login credentials");

		let response = HttpResponse::new(StatusCode::BAD_GATEWAY, b"<html>".to_vec());

		assert_eq!(rejection_message(&response), "identity endpoint returned status 502");
	}

	#[test]
	fn rejections_render_as_sentences() {
		let err = IdentityError::Rejected {
			grant: Grant::Password.as_str(),
			status: 400,
			message: "Invalid login credentials".into(),
		};

		assert_eq!(
			err.to_string(),
			"Identity endpoint rejected the password grant with status 400: Invalid login credentials."
		);
	}

	#[test]
	fn grant_labels_match_wire_values() {
		assert_eq!(Grant::RefreshToken.to_string(), "refresh_token");
		assert_eq!(Grant::Password.as_str(), "password");
	}
}
