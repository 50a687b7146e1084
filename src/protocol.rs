//! Server → client wire shapes.
//!
//! One [`Reply`] is one transport message. Operations that carry a [`CorrelationId`] belong to that invocation's batch;
//! operations without one are piggyback operations with no lifecycle attached.

use crate::{envelope::CorrelationId, resolver::Locator};
use serde::{Deserialize, Serialize};

/// Version marker both sides compare before touching anything else.
pub const PROTOCOL_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Name of the event error replies are dispatched as.
pub const SERVER_MESSAGE_EVENT: &str = "reflex:server-message";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reply {
	pub protocol_version: String,
	pub operations: Vec<Operation>,
}

impl Reply {
	#[must_use]
	pub fn new(operations: Vec<Operation>) -> Self {
		Self {
			protocol_version: PROTOCOL_VERSION.to_owned(),
			operations,
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum OperationKind {
	/// Replace the target's children (the executor may morph).
	ReplaceChildren,
	/// Replace the target's content verbatim with `html`.
	Replace,
	DispatchEvent,
	/// Nothing to apply; exists to drive the lifecycle.
	None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MorphMode {
	Page,
	Selector,
	Nothing,
}

impl MorphMode {
	#[must_use]
	pub fn as_str(self) -> &'static str {
		match self {
			Self::Page => "page",
			Self::Selector => "selector",
			Self::Nothing => "nothing",
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Subject {
	Success,
	Error,
	Halted,
	Nothing,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerMessage {
	pub subject: Subject,
	#[serde(default)]
	pub body: serde_json::Value,
}

/// Invocation data echoed back on every tagged operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Echo {
	pub target: String,
	pub url: String,
	pub tab_id: String,
	pub element: Locator,
	pub controller: Locator,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Operation {
	pub kind: OperationKind,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub selector: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub html: Option<String>,
	/// Event name, for [`OperationKind::DispatchEvent`].
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub name: Option<String>,
	#[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
	pub detail: serde_json::Value,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub correlation_id: Option<CorrelationId>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub echo: Option<Echo>,
	#[serde(default)]
	pub is_last_of_batch: bool,
	pub morph_mode: MorphMode,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub server_message: Option<ServerMessage>,
}

impl Operation {
	/// An untagged operation.
	#[must_use]
	pub fn new(kind: OperationKind, morph_mode: MorphMode) -> Self {
		Self {
			kind,
			selector: None,
			html: None,
			name: None,
			detail: serde_json::Value::Null,
			correlation_id: None,
			echo: None,
			is_last_of_batch: false,
			morph_mode,
			server_message: None,
		}
	}

	#[must_use]
	pub fn with_selector(mut self, selector: impl Into<String>) -> Self {
		self.selector = Some(selector.into());
		self
	}

	#[must_use]
	pub fn with_html(mut self, html: impl Into<String>) -> Self {
		self.html = Some(html.into());
		self
	}

	#[must_use]
	pub fn with_server_message(mut self, subject: Subject, body: serde_json::Value) -> Self {
		self.server_message = Some(ServerMessage { subject, body });
		self
	}

	#[must_use]
	pub fn tagged(mut self, correlation_id: CorrelationId, echo: Echo) -> Self {
		self.correlation_id = Some(correlation_id);
		self.echo = Some(echo);
		self
	}

	#[must_use]
	pub fn is_tagged(&self) -> bool {
		self.correlation_id.is_some()
	}

	#[must_use]
	pub fn subject(&self) -> Option<Subject> {
		self.server_message.as_ref().map(|message| message.subject)
	}
}

/// Marks the last tagged operation of each correlation id as such.
pub fn mark_last_of_batch(operations: &mut [Operation]) {
	let mut seen = hashbrown::HashSet::new();
	for operation in operations.iter_mut().rev() {
		if let Some(id) = &operation.correlation_id {
			operation.is_last_of_batch = seen.insert(id.clone());
		}
	}
}
