//! Optional observability helpers for console and provider operations.
//!
//! # Feature Flags
//!
//! - Enable `tracing` to emit spans named `entra_apim_probe.operation` with the `operation` and
//!   `stage` fields, plus warning/error events. Events never carry token material.
//! - Enable `metrics` to increment the `entra_apim_probe_operation_total` counter for every
//!   attempt/success/failure/redirect, labeled by `operation` + `outcome`.

mod counter;
mod span;

pub use counter::*;
pub use span::*;

// self
use crate::_prelude::*;

/// Operations observed by the crate.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Operation {
	/// Interactive sign-in redirect.
	SignIn,
	/// Sign-out redirect.
	SignOut,
	/// Processing of a redirect callback.
	HandleRedirect,
	/// Cache lookup or refresh without user interaction.
	AcquireTokenSilent,
	/// Interactive token redirect.
	AcquireTokenRedirect,
	/// Bearer-authenticated gateway call.
	CallApi,
}
impl Operation {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			Operation::SignIn => "sign_in",
			Operation::SignOut => "sign_out",
			Operation::HandleRedirect => "handle_redirect",
			Operation::AcquireTokenSilent => "acquire_token_silent",
			Operation::AcquireTokenRedirect => "acquire_token_redirect",
			Operation::CallApi => "call_api",
		}
	}
}
impl Display for Operation {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Outcome labels recorded for each attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Outcome {
	/// Entry to an operation.
	Attempt,
	/// Successful completion.
	Success,
	/// Completed by handing a navigation to the host.
	Redirect,
	/// Failure surfaced to the caller.
	Failure,
}
impl Outcome {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			Outcome::Attempt => "attempt",
			Outcome::Success => "success",
			Outcome::Redirect => "redirect",
			Outcome::Failure => "failure",
		}
	}
}
impl Display for Outcome {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}
