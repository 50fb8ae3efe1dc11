//! Observability helpers for pipeline stages.
//!
//! # Feature Flags
//!
//! - Enable `tracing` (on by default) to emit structured spans named `plantgate.stage` with the
//!   `stage` and `call_site` fields, plus the request/error events gated by
//!   [`PipelineConfig::logging_enabled`](crate::config::PipelineConfig::logging_enabled).
//! - Enable `metrics` to increment the `plantgate_stage_total` counter for every
//!   attempt/success/failure, labeled by `stage` + `outcome`.

mod metrics;
mod redact;
mod tracing;

pub use metrics::*;
pub use redact::*;
pub use tracing::*;

// self
use crate::_prelude::*;

/// Pipeline stages observed by the crate.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Stage {
	/// Credential lookup, decoration, and `401` handling.
	Auth,
	/// Timeout enforcement and error normalization.
	Normalize,
	/// Refresh-token exchange.
	Refresh,
	/// Password sign-in exchange.
	SignIn,
	/// Credential persistence.
	Store,
}
impl Stage {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			Stage::Auth => "auth",
			Stage::Normalize => "normalize",
			Stage::Refresh => "refresh",
			Stage::SignIn => "sign_in",
			Stage::Store => "store",
		}
	}
}
impl Display for Stage {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Outcome labels recorded for each stage invocation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StageOutcome {
	/// Entry to a stage.
	Attempt,
	/// Successful completion.
	Success,
	/// Failure propagated back to the caller.
	Failure,
}
impl StageOutcome {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			StageOutcome::Attempt => "attempt",
			StageOutcome::Success => "success",
			StageOutcome::Failure => "failure",
		}
	}
}
impl Display for StageOutcome {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}
