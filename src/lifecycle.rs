//! Token lifecycle: classifying the stored credential and refreshing it.
//!
//! [`classify`] decides whether a credential can be sent as is, should be refreshed first, or is
//! unusable. [`TokenLifecycle`] performs the refresh exchange and persists its result, and offers
//! [`TokenLifecycle::refresh_shared`] so concurrent callers that all observed the same expiring
//! credential share a single exchange.

mod metrics;

pub use metrics::RefreshMetrics;

// std
use std::sync::atomic::{AtomicUsize, Ordering};
// self
use crate::{
	_prelude::*,
	auth::Credential,
	identity::{IdentityClient, IdentityError},
	obs::{self, Stage, StageOutcome, StageSpan},
	store::{CompareAndSwapOutcome, CredentialStore, StoreError},
};

/// Credentials expiring within this many seconds are treated as already expired.
pub const EXPIRY_BUFFER_SECS: i64 = 60;
/// Credentials expiring within this many seconds are refreshed before use.
pub const REFRESH_WINDOW_SECS: i64 = 300;

/// Usability of a stored credential at a given instant.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TokenState {
	/// No credential is stored.
	Absent,
	/// More than [`REFRESH_WINDOW_SECS`] remain.
	Valid,
	/// Usable, but within [`REFRESH_WINDOW_SECS`] of expiry.
	ExpiringSoon,
	/// Within [`EXPIRY_BUFFER_SECS`] of expiry, or past it.
	Expired,
}

/// Derived session state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SessionState {
	/// No credential is stored.
	Unauthenticated,
	/// A credential is stored and no refresh is running.
	Authenticated,
	/// A shared refresh exchange is in flight.
	Refreshing,
}

/// Classifies `credential` at `now`.
pub fn classify(credential: Option<&Credential>, now: OffsetDateTime) -> TokenState {
	let Some(credential) = credential else {
		return TokenState::Absent;
	};
	let now = now.unix_timestamp();

	if credential.expires_at <= now.saturating_add(EXPIRY_BUFFER_SECS) {
		TokenState::Expired
	} else if credential.expires_at <= now.saturating_add(REFRESH_WINDOW_SECS) {
		TokenState::ExpiringSoon
	} else {
		TokenState::Valid
	}
}

/// Owns the refresh and sign-in exchanges and every write they make to the credential store.
#[derive(Clone)]
pub struct TokenLifecycle {
	store: CredentialStore,
	identity: IdentityClient,
	refresh_guard: Arc<AsyncMutex<()>>,
	in_flight: Arc<AtomicUsize>,
	/// Shared counters for refresh exchanges.
	pub refresh_metrics: Arc<RefreshMetrics>,
}
impl TokenLifecycle {
	/// Creates a lifecycle manager writing to `store` and exchanging through `identity`.
	pub fn new(store: CredentialStore, identity: IdentityClient) -> Self {
		Self {
			store,
			identity,
			refresh_guard: Default::default(),
			in_flight: Default::default(),
			refresh_metrics: Default::default(),
		}
	}

	/// Credential store this manager writes to.
	pub fn store(&self) -> &CredentialStore {
		&self.store
	}

	/// Identity client used for exchanges.
	pub fn identity(&self) -> &IdentityClient {
		&self.identity
	}

	/// Reads the stored credential and classifies it at `now`.
	pub fn inspect(&self, now: OffsetDateTime) -> (TokenState, Option<Credential>) {
		let current = self.store.read();

		(classify(current.as_ref(), now), current)
	}

	/// Derives the session state at `now`.
	pub fn session_state(&self, now: OffsetDateTime) -> SessionState {
		if self.in_flight.load(Ordering::Acquire) > 0 {
			return SessionState::Refreshing;
		}

		match self.inspect(now).0 {
			TokenState::Absent => SessionState::Unauthenticated,
			_ => SessionState::Authenticated,
		}
	}

	/// Exchanges `refresh_token` and persists the new credential before returning it.
	///
	/// On failure the store is left untouched. Concurrent calls are not deduplicated; see
	/// [`TokenLifecycle::refresh_shared`].
	pub async fn refresh(&self, refresh_token: &str) -> Result<Credential, IdentityError> {
		const STAGE: Stage = Stage::Refresh;

		let span = StageSpan::new(STAGE, "refresh");

		obs::record_stage_outcome(STAGE, StageOutcome::Attempt);

		let result = span
			.instrument(async move {
				self.refresh_metrics.record_attempt();

				let credential = self.identity.refresh(refresh_token).await?;

				self.store.write(&credential)?;

				Ok(credential)
			})
			.await;

		self.finish_refresh(&result);

		result
	}

	/// Refreshes on behalf of a caller that observed `observed` as expiring, sharing the exchange
	/// with concurrent callers.
	///
	/// Callers queue on one lock. A caller that gets the lock after another caller already
	/// rotated the pair receives the stored credential without a second exchange, unless that
	/// credential is itself expired. Exchanges always use the stored refresh token, never one
	/// that may already have been rotated out. The result is written with a compare-and-swap
	/// against that token, so a session cleared while the exchange runs stays cleared.
	pub async fn refresh_shared(&self, observed: &Credential) -> Result<Credential, IdentityError> {
		const STAGE: Stage = Stage::Refresh;

		let span = StageSpan::new(STAGE, "refresh_shared");

		span.instrument(async move {
			let _singleflight = self.refresh_guard.lock().await;
			let now = OffsetDateTime::now_utc();
			let stored = self.store.read().ok_or(IdentityError::SessionCleared)?;

			if stored.refresh_token != observed.refresh_token
				&& classify(Some(&stored), now) != TokenState::Expired
			{
				self.refresh_metrics.record_coalesced();

				return Ok(stored);
			}

			let _in_flight = InFlight::enter(&self.in_flight);

			obs::record_stage_outcome(STAGE, StageOutcome::Attempt);
			self.refresh_metrics.record_attempt();

			let expected = stored.refresh_token.expose();
			let result = match self.identity.refresh(expected).await {
				Ok(credential) => self.swap_in(expected, credential),
				Err(e) => Err(e),
			};

			self.finish_refresh(&result);

			result
		})
		.await
	}

	/// Signs in with e-mail and password and persists the issued credential.
	pub async fn sign_in(&self, email: &str, password: &str) -> Result<Credential, IdentityError> {
		const STAGE: Stage = Stage::SignIn;

		let span = StageSpan::new(STAGE, "sign_in");

		obs::record_stage_outcome(STAGE, StageOutcome::Attempt);

		let result = span
			.instrument(async move {
				let credential = self.identity.sign_in(email, password).await?;

				self.store.write(&credential)?;

				Ok(credential)
			})
			.await;

		match &result {
			Ok(_) => obs::record_stage_outcome(STAGE, StageOutcome::Success),
			Err(e) => {
				obs::record_stage_outcome(STAGE, StageOutcome::Failure);
				obs::warn(STAGE, "Sign-in failed.", e);
			},
		}

		result
	}

	/// Ends the session by clearing the credential and legacy keys.
	pub fn sign_out(&self) -> Result<(), StoreError> {
		self.store.clear()?;
		obs::info(Stage::Auth, "Session cleared.");

		Ok(())
	}

	fn swap_in(&self, expected: &str, credential: Credential) -> Result<Credential, IdentityError> {
		match self.store.compare_and_swap(expected, &credential)? {
			CompareAndSwapOutcome::Updated => Ok(credential),
			// Replaced by a sign-in while the exchange ran; the newer session wins.
			CompareAndSwapOutcome::RefreshMismatch =>
				self.store.read().ok_or(IdentityError::SessionCleared),
			CompareAndSwapOutcome::Missing => Err(IdentityError::SessionCleared),
		}
	}

	fn finish_refresh(&self, result: &Result<Credential, IdentityError>) {
		match result {
			Ok(_) => {
				self.refresh_metrics.record_success();
				obs::record_stage_outcome(Stage::Refresh, StageOutcome::Success);
			},
			Err(e) => {
				self.refresh_metrics.record_failure();
				obs::record_stage_outcome(Stage::Refresh, StageOutcome::Failure);
				obs::warn(Stage::Refresh, "Token refresh failed.", e);
			},
		}
	}
}
impl Debug for TokenLifecycle {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("TokenLifecycle")
			.field("store", &self.store)
			.field("identity", &self.identity)
			.field("refresh_metrics", &self.refresh_metrics)
			.finish()
	}
}

/// Marks a refresh exchange as running until dropped, including on cancellation.
struct InFlight<'a>(&'a AtomicUsize);
impl<'a> InFlight<'a> {
	fn enter(counter: &'a AtomicUsize) -> Self {
		counter.fetch_add(1, Ordering::AcqRel);

		Self(counter)
	}
}
impl Drop for InFlight<'_> {
	fn drop(&mut self) {
		self.0.fetch_sub(1, Ordering::AcqRel);
	}
}

#[cfg(test)]
mod tests {
	// crates.io
	use time::macros;
	// self
	use super::*;

	fn expiring_in(now: OffsetDateTime, secs: i64) -> Credential {
		Credential::new("access", "refresh", now.unix_timestamp() + secs)
	}

	#[test]
	fn classify_covers_every_boundary() {
		let now = macros::datetime!(2025-01-01 12:00 UTC);

		assert_eq!(classify(None, now), TokenState::Absent);
		assert_eq!(classify(Some(&expiring_in(now, -10)), now), TokenState::Expired);
		assert_eq!(classify(Some(&expiring_in(now, 30)), now), TokenState::Expired);
		assert_eq!(classify(Some(&expiring_in(now, 60)), now), TokenState::Expired);
		assert_eq!(classify(Some(&expiring_in(now, 61)), now), TokenState::ExpiringSoon);
		assert_eq!(classify(Some(&expiring_in(now, 300)), now), TokenState::ExpiringSoon);
		assert_eq!(classify(Some(&expiring_in(now, 301)), now), TokenState::Valid);
		assert_eq!(classify(Some(&expiring_in(now, 3_600)), now), TokenState::Valid);
	}

	#[test]
	fn classify_saturates_at_extreme_expiries() {
		let now = macros::datetime!(2025-01-01 12:00 UTC);

		assert_eq!(classify(Some(&Credential::new("a", "r", i64::MAX)), now), TokenState::Valid);
		assert_eq!(classify(Some(&Credential::new("a", "r", i64::MIN)), now), TokenState::Expired);
	}

	#[test]
	fn in_flight_guard_releases_on_drop() {
		let counter = AtomicUsize::new(0);

		{
			let _first = InFlight::enter(&counter);
			let _second = InFlight::enter(&counter);

			assert_eq!(counter.load(Ordering::Acquire), 2);
		}

		assert_eq!(counter.load(Ordering::Acquire), 0);
	}
}
