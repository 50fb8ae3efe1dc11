//! Typed data-access calls over the [`Pipeline`].
//!
//! [`ApiClient`] is what feature code talks to: it serializes request bodies, appends query
//! parameters, and decodes JSON responses. Every failure, including one while encoding or decoding,
//! is reported as a [`NormalizedError`].

// crates.io
use reqwest::header::{CONTENT_TYPE, HeaderValue};
use serde::de::DeserializeOwned;
use url::form_urlencoded;
// self
use crate::{
	_prelude::*,
	auth::Credential,
	config::PipelineConfig,
	http::{HttpResponse, HttpTransport, ReqwestTransport, RequestDescriptor},
	identity::IdentityError,
	lifecycle::SessionState,
	pipeline::{NormalizedError, Pipeline, SessionListener},
	store::{KeyValueStore, StoreError},
};

/// JSON client over the authenticated pipeline.
#[derive(Debug)]
pub struct ApiClient<T = ReqwestTransport>
where
	T: HttpTransport,
{
	pipeline: Pipeline<T>,
}
impl ApiClient {
	/// Builds a client over a fresh reqwest-backed pipeline.
	pub fn new(
		config: &PipelineConfig,
		backend: Arc<dyn KeyValueStore>,
		listener: Arc<dyn SessionListener>,
	) -> Result<Self> {
		Ok(Self { pipeline: Pipeline::new(config, backend, listener)? })
	}
}
impl<T> ApiClient<T>
where
	T: HttpTransport,
{
	/// Wraps an existing pipeline.
	pub fn with_pipeline(pipeline: Pipeline<T>) -> Self {
		Self { pipeline }
	}

	/// Underlying pipeline.
	pub fn pipeline(&self) -> &Pipeline<T> {
		&self.pipeline
	}

	/// `GET endpoint`, appending every parameter whose value is present.
	pub async fn get<R>(
		&self,
		endpoint: &str,
		params: &[(&str, Option<&str>)],
	) -> Result<R, NormalizedError>
	where
		R: DeserializeOwned,
	{
		self.call(RequestDescriptor::get(with_query(endpoint, params))).await
	}

	/// `POST endpoint` with a JSON body.
	pub async fn post<B, R>(&self, endpoint: &str, body: &B) -> Result<R, NormalizedError>
	where
		B: ?Sized + Serialize,
		R: DeserializeOwned,
	{
		self.call(json_request(RequestDescriptor::post(endpoint), body)?).await
	}

	/// `PUT endpoint` with a JSON body.
	pub async fn put<B, R>(&self, endpoint: &str, body: &B) -> Result<R, NormalizedError>
	where
		B: ?Sized + Serialize,
		R: DeserializeOwned,
	{
		self.call(json_request(RequestDescriptor::put(endpoint), body)?).await
	}

	/// `PATCH endpoint` with a JSON body.
	pub async fn patch<B, R>(&self, endpoint: &str, body: &B) -> Result<R, NormalizedError>
	where
		B: ?Sized + Serialize,
		R: DeserializeOwned,
	{
		self.call(json_request(RequestDescriptor::patch(endpoint), body)?).await
	}

	/// `DELETE endpoint`.
	pub async fn delete<R>(&self, endpoint: &str) -> Result<R, NormalizedError>
	where
		R: DeserializeOwned,
	{
		self.call(RequestDescriptor::delete(endpoint)).await
	}

	/// `GET endpoint/id`.
	pub async fn get_by_id<R>(&self, endpoint: &str, id: impl Display) -> Result<R, NormalizedError>
	where
		R: DeserializeOwned,
	{
		self.get(&format!("{endpoint}/{id}"), &[]).await
	}

	/// `POST endpoint` with `data`.
	pub async fn create<B, R>(&self, endpoint: &str, data: &B) -> Result<R, NormalizedError>
	where
		B: ?Sized + Serialize,
		R: DeserializeOwned,
	{
		self.post(endpoint, data).await
	}

	/// `PUT endpoint/id` with `data`.
	pub async fn update<B, R>(
		&self,
		endpoint: &str,
		id: impl Display,
		data: &B,
	) -> Result<R, NormalizedError>
	where
		B: ?Sized + Serialize,
		R: DeserializeOwned,
	{
		self.put(&format!("{endpoint}/{id}"), data).await
	}

	/// `DELETE endpoint/id`.
	pub async fn remove<R>(&self, endpoint: &str, id: impl Display) -> Result<R, NormalizedError>
	where
		R: DeserializeOwned,
	{
		self.delete(&format!("{endpoint}/{id}")).await
	}

	/// Signs in and stores the issued credential.
	pub async fn sign_in(&self, email: &str, password: &str) -> Result<Credential, IdentityError> {
		self.pipeline.lifecycle().sign_in(email, password).await
	}

	/// Clears the stored credential.
	pub fn sign_out(&self) -> Result<(), StoreError> {
		self.pipeline.lifecycle().sign_out()
	}

	/// Current session state.
	pub fn session_state(&self) -> SessionState {
		self.pipeline.lifecycle().session_state(OffsetDateTime::now_utc())
	}

	async fn call<R>(&self, request: RequestDescriptor) -> Result<R, NormalizedError>
	where
		R: DeserializeOwned,
	{
		decode(self.pipeline.send(request).await?)
	}
}

fn with_query(endpoint: &str, params: &[(&str, Option<&str>)]) -> String {
	let mut query = form_urlencoded::Serializer::new(String::new());
	let mut appended = false;

	for (name, value) in params {
		if let Some(value) = value {
			query.append_pair(name, value);

			appended = true;
		}
	}

	if !appended {
		return endpoint.to_owned();
	}

	let separator = if endpoint.contains('?') { '&' } else { '?' };

	format!("{endpoint}{separator}{}", query.finish())
}

fn json_request<B>(request: RequestDescriptor, body: &B) -> Result<RequestDescriptor, NormalizedError>
where
	B: ?Sized + Serialize,
{
	let bytes = serde_json::to_vec(body).map_err(|e| NormalizedError::decode(0, e))?;

	Ok(request
		.with_header(CONTENT_TYPE, HeaderValue::from_static("application/json"))
		.with_body(bytes))
}

fn decode<R>(response: HttpResponse) -> Result<R, NormalizedError>
where
	R: DeserializeOwned,
{
	let body: &[u8] =
		if response.body.iter().all(u8::is_ascii_whitespace) { b"null" } else { &response.body };

	serde_json::from_slice(body).map_err(|e| NormalizedError::decode(response.status.as_u16(), e))
}

#[cfg(test)]
mod tests {
	// crates.io
	use reqwest::StatusCode;
	// self
	use super::*;
	use crate::pipeline::ErrorCause;

	#[test]
	fn absent_query_values_are_skipped() {
		assert_eq!(with_query("/devices", &[("plant", None)]), "/devices");
		assert_eq!(
			with_query(
				"/devices",
				&[("plant", Some("north hall")), ("status", None), ("limit", Some("5"))],
			),
			"/devices?plant=north+hall&limit=5",
		);
		assert_eq!(
			with_query("/devices?select=*", &[("id", Some("eq.7"))]),
			"/devices?select=*&id=eq.7",
		);
	}

	#[test]
	fn json_bodies_carry_a_content_type() {
		let request = json_request(RequestDescriptor::post("/work_orders"), &serde_json::json!({
			"title": "Replace bearing"
		}))
		.expect("JSON values should serialize.");

		assert_eq!(
			request.headers().get(CONTENT_TYPE),
			Some(&HeaderValue::from_static("application/json")),
		);
		assert_eq!(request.body(), Some(&br#"{"title":"Replace bearing"}"#[..]));
	}

	#[test]
	fn unserializable_bodies_become_normalized_errors() {
		let mut body = std::collections::BTreeMap::new();

		body.insert(vec![1_u8], "non-string key");

		let err = json_request(RequestDescriptor::post("/parts"), &body)
			.expect_err("Maps with sequence keys should not serialize.");

		assert_eq!(err.status, 0);
		assert!(matches!(err.cause, ErrorCause::Decode(_)));
	}

	#[test]
	fn empty_bodies_decode_as_null() {
		let decoded: Option<u32> = decode(HttpResponse::new(StatusCode::NO_CONTENT, Vec::new()))
			.expect("Empty bodies should decode as null.");

		assert_eq!(decoded, None);

		decode::<()>(HttpResponse::new(StatusCode::OK, b" \n".to_vec()))
			.expect("Whitespace bodies should decode as unit.");
	}

	#[test]
	fn decode_failures_keep_the_response_status() {
		let err = decode::<Vec<u32>>(HttpResponse::new(StatusCode::OK, br#"{"id":1}"#.to_vec()))
			.expect_err("An object is not a list.");

		assert_eq!(err.status, 200);
		assert!(matches!(err.cause, ErrorCause::Decode(_)));
	}
}
