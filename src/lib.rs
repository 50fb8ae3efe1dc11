//! The authenticated request pipeline behind the plant-maintenance dashboard: bearer
//! credentials on every call, transparent refresh before they lapse, session invalidation on
//! `401`, and one normalized error shape for everything that goes wrong.

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

pub mod auth;
pub mod client;
pub mod config;
pub mod error;
pub mod http;
pub mod identity;
pub mod lifecycle;
pub mod obs;
pub mod pipeline;
pub mod store;
#[cfg(any(test, feature = "test"))]
pub mod _preludet {
	//! Convenience re-exports and helpers for integration tests; enabled via `cfg(test)` or the
	//! `test` crate feature.

	pub use crate::_prelude::*;

	// self
	use crate::{
		auth::Credential,
		config::PipelineConfig,
		pipeline::SessionListener,
		store::{CredentialStore, MemoryStore},
	};

	/// Public API key used by every test configuration.
	pub const TEST_API_KEY: &str = "anon-test-key";

	/// Builds a configuration pointing the API at `api_base_url` and the identity service at
	/// `identity_url`, with a short request timeout suitable for tests.
	pub fn test_config(api_base_url: &str, identity_url: &str) -> PipelineConfig {
		PipelineConfig::builder(
			api_base_url,
			Url::parse(identity_url).expect("Identity URL fixture should parse."),
			TEST_API_KEY,
		)
		.request_timeout_ms(2_000)
		.build()
		.expect("Test pipeline configuration should be valid.")
	}

	/// Creates a credential store over a fresh in-memory backend, returning the backend too so
	/// tests can inspect raw keys.
	pub fn memory_credential_store(config: &PipelineConfig) -> (CredentialStore, Arc<MemoryStore>) {
		let backend = Arc::new(MemoryStore::default());
		let store = CredentialStore::from_config(backend.clone(), config);

		(store, backend)
	}

	/// Builds a credential whose access token expires `expires_in` after the current clock.
	pub fn credential_expiring_in(access: &str, refresh: &str, expires_in: Duration) -> Credential {
		Credential::new(access, refresh, (OffsetDateTime::now_utc() + expires_in).unix_timestamp())
	}

	/// Session listener that records every redirect target it receives.
	#[derive(Clone, Debug, Default)]
	pub struct RecordingListener(Arc<Mutex<Vec<String>>>);
	impl RecordingListener {
		/// Returns all redirect targets observed so far.
		pub fn redirects(&self) -> Vec<String> {
			self.0.lock().clone()
		}
	}
	impl SessionListener for RecordingListener {
		fn session_invalidated(&self, redirect_to: &str) {
			self.0.lock().push(redirect_to.to_owned());
		}
	}
}

mod _prelude {
	pub use std::{
		collections::HashMap,
		error::Error as StdError,
		fmt::{Debug, Display, Formatter, Result as FmtResult},
		future::Future,
		pin::Pin,
		sync::Arc,
	};

	pub use async_lock::Mutex as AsyncMutex;
	pub use parking_lot::{Mutex, RwLock};
	pub use reqwest::{Client as ReqwestClient, Error as ReqwestError};
	pub use serde::{Deserialize, Serialize};
	pub use thiserror::Error as ThisError;
	pub use time::{Duration, OffsetDateTime};
	pub use url::Url;

	pub use crate::error::{Error, Result};
}

pub use reqwest;
pub use url;
#[cfg(test)] use {color_eyre as _, httpmock as _};
