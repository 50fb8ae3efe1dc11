//! The authenticated request pipeline.
//!
//! Every data-access call passes through two stages in a fixed order:
//!
//! 1. [`AuthMiddleware`] resolves the URL, attaches or refreshes the bearer credential, and clears
//!    the session when the API answers `401`;
//! 2. [`ErrorNormalizer`] enforces the request budget and turns every failure into one
//!    [`NormalizedError`].
//!
//! [`Pipeline`] assembles both stages from a [`PipelineConfig`].

pub mod auth;
pub mod decorate;
pub mod normalize;

pub use auth::AuthMiddleware;
pub use decorate::RequestDecorator;
pub use normalize::{ErrorCause, ErrorKind, ErrorNormalizer, NormalizedError};

// self
use crate::{
	_prelude::*,
	config::PipelineConfig,
	error::ConfigError,
	http::{HttpResponse, HttpTransport, ReqwestTransport, RequestDescriptor},
	identity::IdentityClient,
	lifecycle::TokenLifecycle,
	store::{CredentialStore, KeyValueStore},
};

/// Route handed to the session listener after invalidation unless configured otherwise.
pub const LOGIN_PATH: &str = "/login";

/// Boxed future returned by [`Dispatch::dispatch`].
pub type DispatchFuture<'a> =
	Pin<Box<dyn Future<Output = Result<HttpResponse, NormalizedError>> + 'a + Send>>;

/// A pipeline stage able to carry a request to completion.
pub trait Dispatch
where
	Self: Send + Sync,
{
	/// Dispatches `request`, resolving to a 2xx response or a [`NormalizedError`].
	fn dispatch(&self, request: RequestDescriptor) -> DispatchFuture<'_>;
}

/// Receives session invalidation notices so the host can route the user to sign in again.
pub trait SessionListener
where
	Self: Send + Sync,
{
	/// Called once per `401` answer, after the stored credential was cleared.
	fn session_invalidated(&self, redirect_to: &str);
}
impl<F> SessionListener for F
where
	F: Fn(&str) + Send + Sync,
{
	fn session_invalidated(&self, redirect_to: &str) {
		self(redirect_to)
	}
}

/// Listener that ignores invalidation notices.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopListener;
impl SessionListener for NoopListener {
	fn session_invalidated(&self, _: &str) {}
}

/// Both stages wired over one transport and one credential store.
#[derive(Debug)]
pub struct Pipeline<T = ReqwestTransport>
where
	T: HttpTransport,
{
	auth: AuthMiddleware<ErrorNormalizer<Arc<T>>>,
}
impl Pipeline {
	/// Builds a pipeline over a fresh reqwest client.
	pub fn new(
		config: &PipelineConfig,
		backend: Arc<dyn KeyValueStore>,
		listener: Arc<dyn SessionListener>,
	) -> Result<Self> {
		let client = ReqwestClient::builder().build().map_err(ConfigError::from)?;

		Self::with_transport(
			config,
			backend,
			Arc::new(ReqwestTransport::with_client(client)),
			listener,
		)
	}
}
impl<T> Pipeline<T>
where
	T: HttpTransport,
{
	/// Builds a pipeline over `transport`, which also carries the identity exchanges.
	pub fn with_transport(
		config: &PipelineConfig,
		backend: Arc<dyn KeyValueStore>,
		transport: Arc<T>,
		listener: Arc<dyn SessionListener>,
	) -> Result<Self> {
		config.validate()?;

		let store = CredentialStore::from_config(backend, config);
		let identity = IdentityClient::from_config(config, transport.clone());
		let lifecycle = TokenLifecycle::new(store, identity);
		let normalizer = ErrorNormalizer::new(transport, config.request_timeout())
			.with_logging(config.logging_enabled);
		let auth = AuthMiddleware::from_config(config, normalizer, lifecycle, listener);

		Ok(Self { auth })
	}

	/// Sends `request` through every stage.
	pub async fn send(&self, request: RequestDescriptor) -> Result<HttpResponse, NormalizedError> {
		self.auth.handle(request).await
	}

	/// Lifecycle manager shared by the stages.
	pub fn lifecycle(&self) -> &TokenLifecycle {
		self.auth.lifecycle()
	}

	/// Decorator used for URL resolution.
	pub fn decorator(&self) -> &RequestDecorator {
		self.auth.decorator()
	}
}
impl<T> Dispatch for Pipeline<T>
where
	T: HttpTransport,
{
	fn dispatch(&self, request: RequestDescriptor) -> DispatchFuture<'_> {
		Box::pin(self.send(request))
	}
}
