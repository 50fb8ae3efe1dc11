//! The access/refresh token pair persisted between requests.

// self
use crate::{_prelude::*, auth::secret::TokenSecret};

/// Bearer credential issued by the identity service.
///
/// The pair is always replaced as a whole: a refresh or login produces a new value and the
/// store writes it under a single key, so an access token never sits next to a refresh token
/// from a different exchange.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
	/// Access token sent as `Authorization: Bearer <token>`.
	pub access_token: TokenSecret,
	/// Refresh token exchanged for a new pair.
	pub refresh_token: TokenSecret,
	/// Server-asserted absolute expiry of `access_token`, in epoch seconds.
	pub expires_at: i64,
}
impl Credential {
	/// Creates a credential from raw token strings and an epoch-seconds expiry.
	pub fn new(
		access_token: impl Into<String>,
		refresh_token: impl Into<String>,
		expires_at: i64,
	) -> Self {
		Self {
			access_token: TokenSecret::new(access_token),
			refresh_token: TokenSecret::new(refresh_token),
			expires_at,
		}
	}

	/// Returns the expiry as a UTC instant, or `None` when it falls outside the supported range.
	pub fn expires_at_utc(&self) -> Option<OffsetDateTime> {
		OffsetDateTime::from_unix_timestamp(self.expires_at).ok()
	}

	/// Seconds left before the access token expires; negative once it has.
	pub fn remaining_at(&self, now: OffsetDateTime) -> i64 {
		self.expires_at.saturating_sub(now.unix_timestamp())
	}
}
impl Debug for Credential {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("Credential")
			.field("access_token", &"<redacted>")
			.field("refresh_token", &"<redacted>")
			.field("expires_at", &self.expires_at)
			.finish()
	}
}

#[cfg(test)]
mod tests {
	// crates.io
	use time::macros;
	// self
	use super::*;

	#[test]
	fn debug_output_hides_both_tokens() {
		let credential = Credential::new("access-secret", "refresh-secret", 1_700_000_000);
		let rendered = format!("{credential:?}");

		assert!(!rendered.contains("access-secret"));
		assert!(!rendered.contains("refresh-secret"));
		assert!(rendered.contains("1700000000"));
	}

	#[test]
	fn serialized_shape_uses_snake_case_fields() {
		let credential = Credential::new("a", "r", 42);
		let value =
			serde_json::to_value(&credential).expect("Credential should serialize to JSON.");

		assert_eq!(
			value,
			serde_json::json!({ "access_token": "a", "refresh_token": "r", "expires_at": 42 }),
		);
	}

	#[test]
	fn remaining_seconds_track_the_clock() {
		let now = macros::datetime!(2025-01-01 00:00 UTC);
		let credential = Credential::new("a", "r", now.unix_timestamp() + 90);

		assert_eq!(credential.remaining_at(now), 90);
		assert_eq!(credential.remaining_at(now + Duration::seconds(120)), -30);
		assert_eq!(credential.expires_at_utc(), Some(now + Duration::seconds(90)));
	}
}
