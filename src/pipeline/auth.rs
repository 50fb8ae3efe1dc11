//! Outer stage: credential lookup, pre-emptive refresh, and session invalidation on `401`.

// crates.io
use url::Position;
// self
use crate::{
	_prelude::*,
	config::PipelineConfig,
	http::{HttpResponse, RequestDescriptor},
	identity::IdentityError,
	lifecycle::{TokenLifecycle, TokenState},
	obs::{self, Stage, StageOutcome, StageSpan},
	pipeline::{
		Dispatch, DispatchFuture, LOGIN_PATH, NormalizedError, RequestDecorator, SessionListener,
	},
};

/// Decorates each request with the current credential and reacts to `401` answers.
///
/// Requests to the identity endpoint, or whose URL contains one of the bypass fragments, are only
/// resolved against the base URL. Every other request:
///
/// 1. goes out without credentials when none are stored;
/// 2. is preceded by a shared refresh when the stored credential is close to expiry, falling back
///    to the current token if that refresh fails;
/// 3. is preceded by a shared refresh when the stored credential is expired, going out without
///    credentials if that refresh fails;
/// 4. clears the session and notifies the listener once when the API answers `401`.
///
/// Failures from the inner stage are returned unchanged.
pub struct AuthMiddleware<D> {
	next: D,
	lifecycle: TokenLifecycle,
	decorator: RequestDecorator,
	listener: Arc<dyn SessionListener>,
	login_path: String,
	bypass_paths: Vec<String>,
	logging_enabled: bool,
}
impl<D> AuthMiddleware<D>
where
	D: Dispatch,
{
	/// Wraps `next` with the default login route and bypass fragments.
	pub fn new(
		next: D,
		lifecycle: TokenLifecycle,
		decorator: RequestDecorator,
		listener: Arc<dyn SessionListener>,
	) -> Self {
		Self {
			next,
			lifecycle,
			decorator,
			listener,
			login_path: LOGIN_PATH.into(),
			bypass_paths: vec!["/auth/login".into()],
			logging_enabled: false,
		}
	}

	/// Wraps `next` using the routes, fragments, and logging switch from `config`.
	pub fn from_config(
		config: &PipelineConfig,
		next: D,
		lifecycle: TokenLifecycle,
		listener: Arc<dyn SessionListener>,
	) -> Self {
		Self {
			login_path: config.login_path.clone(),
			bypass_paths: config.bypass_paths.clone(),
			logging_enabled: config.logging_enabled,
			..Self::new(next, lifecycle, RequestDecorator::new(config.api_base_url.clone()), listener)
		}
	}

	/// Overrides the route handed to the listener on invalidation.
	pub fn with_login_path(mut self, path: impl Into<String>) -> Self {
		self.login_path = path.into();

		self
	}

	/// Adds a URL fragment whose requests skip credential handling.
	pub fn with_bypass_path(mut self, fragment: impl Into<String>) -> Self {
		self.bypass_paths.push(fragment.into());

		self
	}

	/// Enables or disables per-request log events.
	pub fn with_logging(mut self, enabled: bool) -> Self {
		self.logging_enabled = enabled;

		self
	}

	/// Lifecycle manager consulted for credentials.
	pub fn lifecycle(&self) -> &TokenLifecycle {
		&self.lifecycle
	}

	/// Decorator used for URL resolution and bearer attachment.
	pub fn decorator(&self) -> &RequestDecorator {
		&self.decorator
	}

	/// Returns `true` when a resolved URL must skip credential handling.
	pub fn is_bypassed(&self, url: &str) -> bool {
		let endpoint = self.lifecycle.identity().endpoint();

		url.starts_with(&endpoint[..Position::AfterPath])
			|| self
				.bypass_paths
				.iter()
				.any(|fragment| !fragment.is_empty() && url.contains(fragment.as_str()))
	}

	/// Runs `request` through this stage and the inner ones.
	pub async fn handle(&self, request: RequestDescriptor) -> Result<HttpResponse, NormalizedError> {
		const STAGE: Stage = Stage::Auth;

		let span = StageSpan::new(STAGE, "handle");

		obs::record_stage_outcome(STAGE, StageOutcome::Attempt);

		let result = span
			.instrument(async move {
				let resolved = self.decorator.with_base_url(&request);

				obs::request_event(self.logging_enabled, resolved.method().as_str(), resolved.url());

				if self.is_bypassed(resolved.url()) {
					return self.next.dispatch(resolved).await;
				}

				let authorized = self.authorize(&resolved).await;
				let result = self.next.dispatch(authorized).await;

				if matches!(&result, Err(e) if e.is_unauthorized()) {
					self.invalidate();
				}

				result
			})
			.await;

		obs::record_stage_outcome(
			STAGE,
			if result.is_ok() { StageOutcome::Success } else { StageOutcome::Failure },
		);

		result
	}

	async fn authorize(&self, resolved: &RequestDescriptor) -> RequestDescriptor {
		match self.lifecycle.inspect(OffsetDateTime::now_utc()) {
			(TokenState::Valid, Some(current)) =>
				self.decorator.with_bearer(resolved, &current.access_token),
			// Failures are logged by the lifecycle; the current token is still usable unless the
			// session was cleared meanwhile.
			(TokenState::ExpiringSoon, Some(current)) =>
				match self.lifecycle.refresh_shared(&current).await {
					Ok(fresh) => self.decorator.with_bearer(resolved, &fresh.access_token),
					Err(IdentityError::SessionCleared) => resolved.clone(),
					Err(_) => self.decorator.with_bearer(resolved, &current.access_token),
				},
			// The expired token is never sent, but its refresh token may still be accepted.
			(TokenState::Expired, Some(current)) =>
				match self.lifecycle.refresh_shared(&current).await {
					Ok(fresh) => self.decorator.with_bearer(resolved, &fresh.access_token),
					Err(_) => resolved.clone(),
				},
			_ => resolved.clone(),
		}
	}

	fn invalidate(&self) {
		if let Err(e) = self.lifecycle.sign_out() {
			obs::warn(Stage::Auth, "Failed to clear the session after a 401.", &e);
		}

		self.listener.session_invalidated(&self.login_path);
	}
}
impl<D> Dispatch for AuthMiddleware<D>
where
	D: Dispatch,
{
	fn dispatch(&self, request: RequestDescriptor) -> DispatchFuture<'_> {
		Box::pin(self.handle(request))
	}
}
impl<D> Debug for AuthMiddleware<D> {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("AuthMiddleware")
			.field("lifecycle", &self.lifecycle)
			.field("decorator", &self.decorator)
			.field("login_path", &self.login_path)
			.field("bypass_paths", &self.bypass_paths)
			.field("logging_enabled", &self.logging_enabled)
			.finish()
	}
}
