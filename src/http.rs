//! Transport primitives shared by every pipeline stage.
//!
//! [`RequestDescriptor`] is the immutable description of one outbound call. Stages that need to
//! change it build a new descriptor, so the undecorated original can always be dispatched again.
//! [`HttpTransport`] is the crate's only dependency on an HTTP stack; [`ReqwestTransport`] is the
//! default implementation, and tests substitute fakes.

// std
use std::ops::Deref;
// crates.io
use reqwest::{
	Method, StatusCode,
	header::{HeaderMap, HeaderName, HeaderValue},
};
// self
use crate::{_prelude::*, error::TransportError};

/// Boxed future returned by [`HttpTransport::send`].
pub type TransportFuture<'a> =
	Pin<Box<dyn Future<Output = Result<HttpResponse, TransportError>> + 'a + Send>>;

/// Abstraction over HTTP stacks able to execute a [`RequestDescriptor`].
///
/// Implementations return every response that arrives, whatever its status; only failures where
/// no response was received are errors. Timeouts are enforced by the caller.
pub trait HttpTransport
where
	Self: 'static + Send + Sync,
{
	/// Sends `request` and resolves once the full response body has been read.
	fn send(&self, request: RequestDescriptor) -> TransportFuture<'_>;
}
impl<T> HttpTransport for Arc<T>
where
	T: ?Sized + HttpTransport,
{
	fn send(&self, request: RequestDescriptor) -> TransportFuture<'_> {
		self.as_ref().send(request)
	}
}

/// One outbound call: method, absolute or relative URL, headers, and an optional body.
///
/// Header names are case-insensitive.
#[derive(Clone, Debug)]
pub struct RequestDescriptor {
	method: Method,
	url: String,
	headers: HeaderMap,
	body: Option<Vec<u8>>,
}
impl RequestDescriptor {
	/// Creates a descriptor without headers or body.
	pub fn new(method: Method, url: impl Into<String>) -> Self {
		Self { method, url: url.into(), headers: HeaderMap::new(), body: None }
	}

	/// Shorthand for a `GET` descriptor.
	pub fn get(url: impl Into<String>) -> Self {
		Self::new(Method::GET, url)
	}

	/// Shorthand for a `POST` descriptor.
	pub fn post(url: impl Into<String>) -> Self {
		Self::new(Method::POST, url)
	}

	/// Shorthand for a `PUT` descriptor.
	pub fn put(url: impl Into<String>) -> Self {
		Self::new(Method::PUT, url)
	}

	/// Shorthand for a `PATCH` descriptor.
	pub fn patch(url: impl Into<String>) -> Self {
		Self::new(Method::PATCH, url)
	}

	/// Shorthand for a `DELETE` descriptor.
	pub fn delete(url: impl Into<String>) -> Self {
		Self::new(Method::DELETE, url)
	}

	/// Returns a copy with `name` set to `value`, replacing any previous value.
	pub fn with_header(&self, name: HeaderName, value: HeaderValue) -> Self {
		let mut next = self.clone();

		next.headers.insert(name, value);

		next
	}

	/// Returns a copy without any `name` header.
	pub fn without_header(&self, name: HeaderName) -> Self {
		let mut next = self.clone();

		next.headers.remove(name);

		next
	}

	/// Returns a copy targeting `url`.
	pub fn with_url(&self, url: impl Into<String>) -> Self {
		let mut next = self.clone();

		next.url = url.into();

		next
	}

	/// Returns a copy carrying `body`.
	pub fn with_body(&self, body: impl Into<Vec<u8>>) -> Self {
		let mut next = self.clone();

		next.body = Some(body.into());

		next
	}

	/// HTTP method.
	pub fn method(&self) -> &Method {
		&self.method
	}

	/// Target URL as given, possibly relative.
	pub fn url(&self) -> &str {
		&self.url
	}

	/// Request headers.
	pub fn headers(&self) -> &HeaderMap {
		&self.headers
	}

	/// Request body, if any.
	pub fn body(&self) -> Option<&[u8]> {
		self.body.as_deref()
	}

	/// Returns `true` when the URL starts with an `http://` or `https://` scheme.
	pub fn is_absolute(&self) -> bool {
		has_http_scheme(&self.url)
	}
}

/// Fully buffered HTTP response.
#[derive(Clone, Debug)]
pub struct HttpResponse {
	/// Status code.
	pub status: StatusCode,
	/// Response headers.
	pub headers: HeaderMap,
	/// Raw response body.
	pub body: Vec<u8>,
}
impl HttpResponse {
	/// Creates a response without headers.
	pub fn new(status: StatusCode, body: impl Into<Vec<u8>>) -> Self {
		Self { status, headers: HeaderMap::new(), body: body.into() }
	}

	/// Returns `true` for 2xx statuses.
	pub fn is_success(&self) -> bool {
		self.status.is_success()
	}
}

/// Thin wrapper around [`ReqwestClient`] so shared HTTP behavior lives in one place.
#[derive(Clone, Debug, Default)]
pub struct ReqwestTransport(pub ReqwestClient);
impl ReqwestTransport {
	/// Wraps an existing reqwest [`ReqwestClient`].
	pub fn with_client(client: ReqwestClient) -> Self {
		Self(client)
	}
}
impl AsRef<ReqwestClient> for ReqwestTransport {
	fn as_ref(&self) -> &ReqwestClient {
		&self.0
	}
}
impl Deref for ReqwestTransport {
	type Target = ReqwestClient;

	fn deref(&self) -> &Self::Target {
		&self.0
	}
}
impl HttpTransport for ReqwestTransport {
	fn send(&self, request: RequestDescriptor) -> TransportFuture<'_> {
		let client = self.0.clone();

		Box::pin(async move {
			let RequestDescriptor { method, url, headers, body } = request;
			let mut builder = client.request(method, url).headers(headers);

			if let Some(body) = body {
				builder = builder.body(body);
			}

			let response = builder.send().await?;
			let status = response.status();
			let headers = response.headers().to_owned();
			let body = response.bytes().await?.to_vec();

			Ok(HttpResponse { status, headers, body })
		})
	}
}

pub(crate) fn has_http_scheme(url: &str) -> bool {
	let lowered = url.get(..8).unwrap_or(url).to_ascii_lowercase();

	lowered.starts_with("http://") || lowered.starts_with("https://")
}

#[cfg(test)]
mod tests {
	// crates.io
	use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
	// self
	use super::*;

	#[test]
	fn decoration_leaves_the_original_untouched() {
		let original = RequestDescriptor::get("/devices");
		let decorated = original
			.with_url("https://api.example.co/devices")
			.with_header(AUTHORIZATION, HeaderValue::from_static("Bearer t"));

		assert_eq!(original.url(), "/devices");
		assert!(original.headers().is_empty());
		assert_eq!(decorated.url(), "https://api.example.co/devices");
		assert_eq!(
			decorated.headers().get("authorization"),
			Some(&HeaderValue::from_static("Bearer t")),
		);
	}

	#[test]
	fn header_names_are_case_insensitive() {
		let request = RequestDescriptor::post("/parts")
			.with_header(CONTENT_TYPE, HeaderValue::from_static("application/json"))
			.with_body(b"{}".to_vec());

		assert!(request.headers().contains_key("Content-Type"));
		assert!(request.headers().contains_key("content-type"));
		assert_eq!(request.body(), Some(&b"{}"[..]));
		assert_eq!(request.method(), &Method::POST);
	}

	#[test]
	fn scheme_detection_covers_case_and_short_inputs() {
		assert!(has_http_scheme("https://files.example.co/manual.pdf"));
		assert!(has_http_scheme("HTTP://legacy.example.co"));
		assert!(!has_http_scheme("/devices"));
		assert!(!has_http_scheme("http"));
		assert!(!has_http_scheme("httpbin/devices"));
		assert!(!has_http_scheme("ftp://files.example.co"));
	}
}
