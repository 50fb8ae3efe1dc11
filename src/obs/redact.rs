//! Redaction applied to payloads before they reach a log sink.

// std
use std::sync::OnceLock;
// crates.io
use regex::Regex;
use serde_json::Value;

const SENSITIVE_KEY_FRAGMENTS: [&str; 6] = ["password", "token", "secret", "key", "email", "user"];

/// Placeholder written over sensitive object values.
pub const REDACTED: &str = "[REDACTED]";
/// Placeholder written over e-mail addresses found inside strings.
pub const EMAIL_REDACTED: &str = "[EMAIL_REDACTED]";

/// Returns a copy of `value` safe to log.
///
/// Object entries whose key contains a sensitive fragment are replaced wholesale; e-mail
/// addresses inside every remaining string are masked.
pub fn redact_json(value: &Value) -> Value {
	match value {
		Value::String(text) => Value::String(redact_text(text)),
		Value::Array(items) => Value::Array(items.iter().map(redact_json).collect()),
		Value::Object(entries) => Value::Object(
			entries
				.iter()
				.map(|(key, value)| {
					let redacted = if is_sensitive_key(key) {
						Value::String(REDACTED.into())
					} else {
						redact_json(value)
					};

					(key.clone(), redacted)
				})
				.collect(),
		),
		other => other.clone(),
	}
}

/// Masks e-mail addresses in free text.
pub fn redact_text(text: &str) -> String {
	match email_pattern() {
		Some(pattern) => pattern.replace_all(text, EMAIL_REDACTED).into_owned(),
		None => text.to_owned(),
	}
}

fn is_sensitive_key(key: &str) -> bool {
	let lowered = key.to_ascii_lowercase();

	SENSITIVE_KEY_FRAGMENTS.iter().any(|fragment| lowered.contains(fragment))
}

fn email_pattern() -> Option<&'static Regex> {
	static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();

	PATTERN
		.get_or_init(|| Regex::new(r"[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}").ok())
		.as_ref()
}

#[cfg(test)]
mod tests {
	// crates.io
	use serde_json::json;
	// self
	use super::*;

	#[test]
	fn sensitive_keys_are_replaced_at_any_depth() {
		let payload = json!({
			"status": 400,
			"access_token": "abc",
			"details": { "UserName": "jane", "hint": "retry" },
			"items": [{ "apiKey": "k" }],
		});

		assert_eq!(
			redact_json(&payload),
			json!({
				"status": 400,
				"access_token": REDACTED,
				"details": { "UserName": REDACTED, "hint": "retry" },
				"items": [{ "apiKey": REDACTED }],
			}),
		);
	}

	#[test]
	fn emails_inside_strings_are_masked() {
		assert_eq!(
			redact_text("Invite sent to line.lead@plant.example.com today"),
			"Invite sent to [EMAIL_REDACTED] today",
		);
		assert_eq!(redact_json(&json!("no address here")), json!("no address here"));
	}
}
