//! Pure request transforms: base-URL resolution and bearer attachment.

// crates.io
use reqwest::header::{AUTHORIZATION, HeaderValue};
// self
use crate::{
	_prelude::*,
	auth::TokenSecret,
	http::RequestDescriptor,
	obs::{self, Stage},
};

/// Resolves relative URLs against the API base and attaches bearer credentials.
///
/// Every transform returns a new descriptor and leaves its input untouched.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RequestDecorator {
	base_url: String,
}
impl RequestDecorator {
	/// Creates a decorator prefixing relative URLs with `base_url`.
	pub fn new(base_url: impl Into<String>) -> Self {
		Self { base_url: base_url.into() }
	}

	/// Prefix applied to relative URLs.
	pub fn base_url(&self) -> &str {
		&self.base_url
	}

	/// Prefixes a relative URL with the base URL. Absolute `http(s)` URLs pass through unchanged,
	/// which makes the transform idempotent.
	pub fn with_base_url(&self, request: &RequestDescriptor) -> RequestDescriptor {
		if request.is_absolute() {
			return request.clone();
		}

		request.with_url(join(&self.base_url, request.url()))
	}

	/// Sets `Authorization: Bearer <token>`, replacing any previous value.
	///
	/// A token that is not a valid header value is never sent; the request is returned without
	/// any `Authorization` header instead.
	pub fn with_bearer(&self, request: &RequestDescriptor, token: &TokenSecret) -> RequestDescriptor {
		match HeaderValue::from_str(&format!("Bearer {}", token.expose())) {
			Ok(mut value) => {
				value.set_sensitive(true);

				request.with_header(AUTHORIZATION, value)
			},
			Err(e) => {
				obs::warn(Stage::Auth, "Stored access token is not a valid header value.", &e);

				request.without_header(AUTHORIZATION)
			},
		}
	}
}

fn join(base: &str, path: &str) -> String {
	match (base.ends_with('/'), path.starts_with('/')) {
		(true, true) => format!("{base}{}", &path[1..]),
		(false, false) if !path.is_empty() && !path.starts_with('?') => format!("{base}/{path}"),
		_ => format!("{base}{path}"),
	}
}
