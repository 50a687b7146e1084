//! Error types, one `enum` per concern.
//!
//! None of these escape a server request cycle: dispatch, render and session failures are folded into
//! `error` replies by [`Channel`](`crate::server::Channel`), and client-side failures become
//! [`Diagnostic`](`crate::client::Diagnostic`)s.

use core::panic::Location;
use thiserror::Error;

/// Failure raised by handler code (a [`Reflex`](`crate::server::Reflex`) method or callback).
///
/// Captures where it was constructed, which stands in for the first backtrace frame in error replies.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct HandlerError {
	message: String,
	location: Option<&'static Location<'static>>,
}
impl HandlerError {
	#[must_use]
	#[track_caller]
	pub fn new(message: impl Into<String>) -> Self {
		Self {
			message: message.into(),
			location: Some(Location::caller()),
		}
	}

	/// An error whose origin is unknown, for example a caught panic.
	#[must_use]
	pub fn unlocated(message: impl Into<String>) -> Self {
		Self {
			message: message.into(),
			location: None,
		}
	}

	#[must_use]
	pub fn message(&self) -> &str {
		&self.message
	}

	/// `file:line:column` of the construction site, if known.
	#[must_use]
	pub fn frame(&self) -> Option<String> {
		self.location.map(|location| format!("{}:{}:{}", location.file(), location.line(), location.column()))
	}
}

#[derive(Debug, Error)]
pub enum DispatchError {
	#[error("malformed reflex target {0:?}, expected `Handler#method`")]
	MalformedTarget(String),
	#[error("no reflex handler is registered for {0:?}")]
	Resolution(String),
	#[error("{handler} has no client-callable method {method:?}")]
	UnknownMethod { handler: String, method: String },
	#[error("wrong number of arguments for {handler}#{method} (given {given}, expected {expected})")]
	Arity {
		handler: String,
		method: String,
		expected: String,
		given: usize,
	},
	#[error("{0}")]
	Handler(HandlerError),
	#[error(transparent)]
	Protocol(#[from] ProtocolError),
	#[error(transparent)]
	Session(#[from] SessionError),
}
impl DispatchError {
	/// The first backtrace frame, only known for handler failures.
	#[must_use]
	pub fn frame(&self) -> Option<String> {
		match self {
			Self::Handler(error) => error.frame(),
			_ => None,
		}
	}
}

#[derive(Debug, Error)]
pub enum RenderError {
	#[error("page render failed: {0}")]
	Page(String),
	#[error("fragment {name:?} failed to render: {reason}")]
	Fragment { name: String, reason: String },
	#[error("renderer panicked: {0}")]
	Panicked(String),
}

#[derive(Debug, Error)]
pub enum SessionError {
	#[error("session store rejected the commit for session {session_id:?}: {reason}")]
	Commit { session_id: String, reason: String },
	#[error("session {0:?} could not be loaded")]
	Load(String),
}

#[derive(Debug, Error)]
pub enum TransportError {
	#[error("transport is not connected")]
	NotConnected,
	#[error("the connection layer rejected the subscription")]
	Rejected,
	#[error("could not encode message: {0}")]
	Encode(#[from] serde_json::Error),
	#[error("transport failure: {0}")]
	Io(String),
}

/// Failure to apply one operation to the document.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ExecuteError {
	#[error("no element matches {0:?}")]
	TargetMissing(String),
	#[error("operation {0:?} is missing its {1}")]
	Incomplete(&'static str, &'static str),
}

#[derive(Debug, Error)]
pub enum ProtocolError {
	#[error("protocol version mismatch: server speaks {server:?}, client speaks {client:?}")]
	VersionMismatch { server: String, client: String },
	#[error("malformed message: {0}")]
	Malformed(#[from] serde_json::Error),
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SelectorError {
	#[error("empty selector")]
	Empty,
	#[error("unexpected {found:?} at byte {at} in selector {selector:?}")]
	Unexpected { selector: String, found: char, at: usize },
	#[error("unterminated {what} in selector {selector:?}")]
	Unterminated { selector: String, what: &'static str },
}

#[derive(Debug, Error)]
pub enum ConfigError {
	#[error("invalid configuration: {0}")]
	Toml(#[from] toml::de::Error),
}
