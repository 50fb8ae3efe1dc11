//! Deployment configuration for the request pipeline.
//!
//! Values come either from a JSON document ([`PipelineConfig::from_json_slice`]) or from the
//! [`PipelineConfigBuilder`]. Both paths run the same validation before a config is handed out.

// std
use std::time::Duration as StdDuration;
// self
use crate::{_prelude::*, error::ConfigError, pipeline::LOGIN_PATH, store::CredentialStore};

/// Settings recognized by the pipeline.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineConfig {
	/// Prefix applied to every relative request path.
	pub api_base_url: String,
	/// Budget for one dispatched request, in milliseconds.
	#[serde(default = "PipelineConfig::default_timeout_ms")]
	pub request_timeout_ms: u64,
	/// Emits per-request and per-error log events when `true`.
	#[serde(default)]
	pub logging_enabled: bool,
	/// Token endpoint of the identity service used for login and refresh exchanges.
	pub identity_url: Url,
	/// Public key sent as the `apikey` header to the identity endpoint.
	pub public_api_key: String,
	/// Client-side route the session listener is pointed at after invalidation.
	#[serde(default = "PipelineConfig::default_login_path")]
	pub login_path: String,
	/// URL fragments identifying login endpoints that skip credential handling.
	#[serde(default = "PipelineConfig::default_bypass_paths")]
	pub bypass_paths: Vec<String>,
	/// Key-value store key that holds the serialized credential.
	#[serde(default = "PipelineConfig::default_credential_key")]
	pub credential_key: String,
	/// Keys from superseded storage schemes that are cleared alongside the credential.
	#[serde(default = "PipelineConfig::default_legacy_keys")]
	pub legacy_keys: Vec<String>,
}
impl PipelineConfig {
	/// Request budget used when none is configured.
	pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;

	/// Starts a builder from the three settings that have no default.
	pub fn builder(
		api_base_url: impl Into<String>,
		identity_url: Url,
		public_api_key: impl Into<String>,
	) -> PipelineConfigBuilder {
		PipelineConfigBuilder::new(api_base_url.into(), identity_url, public_api_key.into())
	}

	/// Parses and validates a JSON configuration document.
	pub fn from_json_slice(bytes: &[u8]) -> Result<Self, ConfigError> {
		let mut deserializer = serde_json::Deserializer::from_slice(bytes);
		let config: Self = serde_path_to_error::deserialize(&mut deserializer)
			.map_err(|source| ConfigError::Parse { source })?;

		config.validate()?;

		Ok(config)
	}

	/// Checks the invariants every consumer relies on.
	pub fn validate(&self) -> Result<(), ConfigError> {
		if self.api_base_url.trim().is_empty() {
			return Err(ConfigError::MissingBaseUrl);
		}
		if self.public_api_key.trim().is_empty() {
			return Err(ConfigError::MissingApiKey);
		}
		if self.request_timeout_ms == 0 {
			return Err(ConfigError::ZeroTimeout);
		}

		match self.identity_url.scheme() {
			"http" | "https" => Ok(()),
			other => Err(ConfigError::UnsupportedIdentityScheme { scheme: other.to_owned() }),
		}
	}

	/// Request budget as a [`std::time::Duration`].
	pub fn request_timeout(&self) -> StdDuration {
		StdDuration::from_millis(self.request_timeout_ms)
	}

	fn default_timeout_ms() -> u64 {
		Self::DEFAULT_TIMEOUT_MS
	}

	fn default_login_path() -> String {
		LOGIN_PATH.into()
	}

	fn default_bypass_paths() -> Vec<String> {
		vec!["/auth/login".into()]
	}

	fn default_credential_key() -> String {
		CredentialStore::DEFAULT_KEY.into()
	}

	fn default_legacy_keys() -> Vec<String> {
		CredentialStore::DEFAULT_LEGACY_KEYS.iter().map(|key| (*key).to_owned()).collect()
	}
}

/// Builder for [`PipelineConfig`].
#[derive(Clone, Debug)]
pub struct PipelineConfigBuilder {
	config: PipelineConfig,
}
impl PipelineConfigBuilder {
	fn new(api_base_url: String, identity_url: Url, public_api_key: String) -> Self {
		Self {
			config: PipelineConfig {
				api_base_url,
				request_timeout_ms: PipelineConfig::DEFAULT_TIMEOUT_MS,
				logging_enabled: false,
				identity_url,
				public_api_key,
				login_path: PipelineConfig::default_login_path(),
				bypass_paths: PipelineConfig::default_bypass_paths(),
				credential_key: PipelineConfig::default_credential_key(),
				legacy_keys: PipelineConfig::default_legacy_keys(),
			},
		}
	}

	/// Sets the per-request budget in milliseconds.
	pub fn request_timeout_ms(mut self, timeout_ms: u64) -> Self {
		self.config.request_timeout_ms = timeout_ms;

		self
	}

	/// Enables or disables request/error log events.
	pub fn logging_enabled(mut self, enabled: bool) -> Self {
		self.config.logging_enabled = enabled;

		self
	}

	/// Overrides the login route handed to the session listener.
	pub fn login_path(mut self, path: impl Into<String>) -> Self {
		self.config.login_path = path.into();

		self
	}

	/// Adds a URL fragment whose requests skip credential handling.
	pub fn bypass_path(mut self, fragment: impl Into<String>) -> Self {
		self.config.bypass_paths.push(fragment.into());

		self
	}

	/// Overrides the credential storage key.
	pub fn credential_key(mut self, key: impl Into<String>) -> Self {
		self.config.credential_key = key.into();

		self
	}

	/// Replaces the legacy keys cleared on invalidation.
	pub fn legacy_keys<I, S>(mut self, keys: I) -> Self
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		self.config.legacy_keys = keys.into_iter().map(Into::into).collect();

		self
	}

	/// Validates and returns the configuration.
	pub fn build(self) -> Result<PipelineConfig, ConfigError> {
		self.config.validate()?;

		Ok(self.config)
	}
}
