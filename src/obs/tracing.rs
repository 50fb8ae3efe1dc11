// self
use crate::{_prelude::*, obs::Stage, pipeline::NormalizedError};

/// Type alias that resolves to an instrumented future when tracing is enabled.
#[cfg(feature = "tracing")]
pub type InstrumentedStage<F> = tracing::instrument::Instrumented<F>;
/// Passthrough future type when tracing is disabled.
#[cfg(not(feature = "tracing"))]
pub type InstrumentedStage<F> = F;

/// A span builder used by pipeline stages.
#[derive(Clone, Debug)]
pub struct StageSpan {
	#[cfg(feature = "tracing")]
	span: tracing::Span,
}
impl StageSpan {
	/// Creates a new span tagged with the provided stage + call site.
	pub fn new(stage: Stage, call_site: &'static str) -> Self {
		#[cfg(feature = "tracing")]
		{
			let span = tracing::info_span!("plantgate.stage", stage = stage.as_str(), call_site);

			Self { span }
		}
		#[cfg(not(feature = "tracing"))]
		{
			let _ = (stage, call_site);

			Self {}
		}
	}

	/// Instruments an async block without holding a guard across `.await` points.
	pub fn instrument<Fut>(&self, fut: Fut) -> InstrumentedStage<Fut>
	where
		Fut: Future,
	{
		#[cfg(feature = "tracing")]
		{
			use tracing::Instrument;

			fut.instrument(self.span.clone())
		}
		#[cfg(not(feature = "tracing"))]
		{
			fut
		}
	}
}

/// Emits a warning that is always logged, independent of the request logging switch.
pub(crate) fn warn(stage: Stage, message: &str, detail: &dyn Display) {
	#[cfg(feature = "tracing")]
	{
		tracing::warn!(stage = stage.as_str(), detail = %detail, "{message}");
	}
	#[cfg(not(feature = "tracing"))]
	{
		let _ = (stage, message, detail);
	}
}

/// Emits an informational event that is always logged.
pub(crate) fn info(stage: Stage, message: &str) {
	#[cfg(feature = "tracing")]
	{
		tracing::info!(stage = stage.as_str(), "{message}");
	}
	#[cfg(not(feature = "tracing"))]
	{
		let _ = (stage, message);
	}
}

/// Logs an outbound request when request logging is enabled.
pub(crate) fn request_event(enabled: bool, method: &str, url: &str) {
	if !enabled {
		return;
	}

	#[cfg(feature = "tracing")]
	{
		tracing::debug!(method, url, "Dispatching HTTP request.");
	}
	#[cfg(not(feature = "tracing"))]
	{
		let _ = (method, url);
	}
}

/// Logs a normalized failure, with its cause redacted, when request logging is enabled.
pub(crate) fn error_event(enabled: bool, error: &NormalizedError) {
	if !enabled {
		return;
	}

	#[cfg(feature = "tracing")]
	{
		tracing::error!(
			status = error.status,
			message = %error.message,
			cause = %error.cause.redacted(),
			timestamp = %error.timestamp,
			"HTTP request failed."
		);
	}
	#[cfg(not(feature = "tracing"))]
	{
		let _ = error;
	}
}
