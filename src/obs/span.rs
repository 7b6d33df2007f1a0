// self
use crate::{_prelude::*, obs::Operation};

/// Type alias that resolves to an instrumented future when tracing is enabled.
#[cfg(feature = "tracing")]
pub type InstrumentedOperation<F> = tracing::instrument::Instrumented<F>;
/// Passthrough future type when tracing is disabled.
#[cfg(not(feature = "tracing"))]
pub type InstrumentedOperation<F> = F;

/// A span wrapping one operation.
#[derive(Clone, Debug)]
pub struct OperationSpan {
	#[cfg(feature = "tracing")]
	span: tracing::Span,
}
impl OperationSpan {
	/// Creates a new span tagged with the provided operation + stage.
	pub fn new(operation: Operation, stage: &'static str) -> Self {
		#[cfg(feature = "tracing")]
		{
			let span = tracing::info_span!(
				"entra_apim_probe.operation",
				operation = operation.as_str(),
				stage
			);

			Self { span }
		}
		#[cfg(not(feature = "tracing"))]
		{
			let _ = (operation, stage);

			Self {}
		}
	}

	/// Instruments an async block without holding a guard across `.await` points.
	pub fn instrument<Fut>(&self, fut: Fut) -> InstrumentedOperation<Fut>
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

/// Emits a warning event for an operation.
pub fn warn(operation: Operation, message: &dyn Display) {
	#[cfg(feature = "tracing")]
	{
		tracing::warn!(operation = operation.as_str(), "{message}");
	}
	#[cfg(not(feature = "tracing"))]
	{
		let _ = (operation, message);
	}
}

/// Emits an error event for an operation.
pub fn error(operation: Operation, message: &dyn Display) {
	#[cfg(feature = "tracing")]
	{
		tracing::error!(operation = operation.as_str(), "{message}");
	}
	#[cfg(not(feature = "tracing"))]
	{
		let _ = (operation, message);
	}
}

/// Emits a debug event for an operation.
pub fn debug(operation: Operation, message: &dyn Display) {
	#[cfg(feature = "tracing")]
	{
		tracing::debug!(operation = operation.as_str(), "{message}");
	}
	#[cfg(not(feature = "tracing"))]
	{
		let _ = (operation, message);
	}
}
