//! Client half: invoking reflexes and applying what comes back.
//!
//! A [`Client`] owns its document and transport. Server messages are queued in an [`Inbox`] by the transport and
//! processed by [`Client::pump`]. Lifecycle notifications raised while a message is processed are delivered once it
//! has been fully applied.

mod counter;
mod executor;
mod lifecycle;
mod registry;

pub use counter::{CountSaturatedError, Countdown};
pub use executor::{Executor, ReplaceExecutor};
pub use lifecycle::{LifecycleStage, Notification};
pub use registry::{FinalStage, Outcome, PendingReflex, Record, ReflexResult, Registry, Stage};

use crate::{
	config::ClientConfig,
	dom::Dom,
	envelope::{CorrelationId, Invocation, InvokeOptions},
	error::{ExecuteError, ProtocolError, TransportError},
	protocol::{Operation, Reply},
	resolver, scanner,
	transport::{Inbox, Transport},
};
use futures::channel::oneshot;
use hashbrown::{HashMap, HashSet};
use serde_json::json;
use std::collections::VecDeque;
use tracing::{debug, instrument, warn};

/// A lifecycle notification, resolved against the current document.
#[derive(Debug, Clone)]
pub struct LifecycleEvent<N> {
	pub notification: Notification,
	pub element: N,
	pub controller: N,
	/// Milliseconds since the invocation was recorded by this client.
	pub elapsed_ms: f64,
}

/// Problems the client ran into. Never fatal.
#[derive(Debug, Clone, PartialEq)]
pub enum Diagnostic {
	/// One per discarded message.
	VersionMismatch { server: String, client: String },
	Malformed(String),
	/// Debug only.
	StaleUrl { expected: String, actual: String },
	/// Debug only. A tagged operation for a retired invocation.
	UnknownCorrelation(CorrelationId),
	/// Debug only. A notification was dropped because its element is gone.
	ElementMissing { correlation_id: CorrelationId, stage: LifecycleStage },
	Execute(ExecuteError),
	Forbidden(CorrelationId),
	Transport(String),
}

impl Diagnostic {
	fn is_verbose(&self) -> bool {
		matches!(self, Self::StaleUrl { .. } | Self::UnknownCorrelation(_) | Self::ElementMissing { .. })
	}
}

type Listener<T> = Box<dyn FnMut(&T)>;

pub struct Client<D: Dom, T: Transport> {
	dom: D,
	transport: T,
	config: ClientConfig,
	tab_id: String,
	registry: Registry,
	inbox: Inbox,
	outbox: VecDeque<Invocation>,
	executor: Box<dyn Executor<D>>,
	notifications: VecDeque<Notification>,
	listeners: Vec<Listener<LifecycleEvent<D::Node>>>,
	diagnostics: Vec<Listener<Diagnostic>>,
}

impl<D: Dom, T: Transport> core::fmt::Debug for Client<D, T> {
	fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
		f.debug_struct("Client")
			.field("tab_id", &self.tab_id)
			.field("registry", &self.registry)
			.field("inbox", &self.inbox.len())
			.field("outbox", &self.outbox.len())
			.finish_non_exhaustive()
	}
}

impl<D: Dom, T: Transport> Client<D, T> {
	pub fn new(dom: D, mut transport: T, config: ClientConfig) -> Self {
		let inbox = Inbox::new();
		transport.on_message(inbox.handler());
		Self {
			dom,
			transport,
			config,
			tab_id: uuid::Uuid::new_v4().to_string(),
			registry: Registry::new(),
			inbox,
			outbox: VecDeque::new(),
			executor: Box::new(ReplaceExecutor),
			notifications: VecDeque::new(),
			listeners: Vec::new(),
			diagnostics: Vec::new(),
		}
	}

	#[must_use]
	pub fn with_executor(mut self, executor: Box<dyn Executor<D>>) -> Self {
		self.executor = executor;
		self
	}

	#[must_use]
	pub fn with_tab_id(mut self, tab_id: impl Into<String>) -> Self {
		self.tab_id = tab_id.into();
		self
	}

	pub fn dom(&self) -> &D {
		&self.dom
	}

	pub fn dom_mut(&mut self) -> &mut D {
		&mut self.dom
	}

	pub fn transport(&self) -> &T {
		&self.transport
	}

	pub fn transport_mut(&mut self) -> &mut T {
		&mut self.transport
	}

	pub fn config(&self) -> &ClientConfig {
		&self.config
	}

	pub fn registry(&self) -> &Registry {
		&self.registry
	}

	pub fn tab_id(&self) -> &str {
		&self.tab_id
	}

	/// Raw server messages waiting for [`Client::pump`].
	pub fn inbox(&self) -> &Inbox {
		&self.inbox
	}

	pub fn on_lifecycle(&mut self, listener: impl FnMut(&LifecycleEvent<D::Node>) + 'static) {
		self.listeners.push(Box::new(listener));
	}

	pub fn on_diagnostic(&mut self, listener: impl FnMut(&Diagnostic) + 'static) {
		self.diagnostics.push(Box::new(listener));
	}

	/// Wires `data-reflex` elements to the reflex controller. See [`scanner::scan`].
	pub fn scan(&mut self) -> usize {
		scanner::scan(&mut self.dom, &self.config)
	}

	/// Invokes the reflex `event` is bound to on `node`, if the scanner wired one.
	pub fn handle_event(&mut self, node: &D::Node, event: &str) -> Option<PendingReflex> {
		let target = scanner::wired_target(&self.dom, &self.config, node, event)?;
		let controller = scanner::controller_for(&self.dom, &self.config, node);
		Some(self.invoke(
			node,
			&target,
			Vec::new(),
			InvokeOptions {
				controller,
				..InvokeOptions::default()
			},
		))
	}

	/// Starts an invocation of `target` on behalf of `element`.
	///
	/// `before` fires synchronously, before anything is handed to the transport. While disconnected, the invocation
	/// is queued until [`Client::connect`].
	#[instrument(skip(self, element, args, options))]
	pub fn invoke(&mut self, element: &D::Node, target: &str, args: Vec<serde_json::Value>, options: InvokeOptions<D::Node>) -> PendingReflex {
		let invocation = Invocation::capture(&self.dom, &self.config, &self.tab_id, element, target, args, options);
		let (sender, receiver) = oneshot::channel();
		let record = Record::local(&invocation, self.dom.now_ms(), sender);
		let before = record.notification(LifecycleStage::Before);
		self.registry.insert(record);

		let controller = resolver::resolve(&self.dom, &invocation.controller).unwrap_or_else(|| element.clone());
		self.fire(before, element.clone(), controller);

		let pending = PendingReflex::new(invocation.correlation_id.clone(), receiver);
		self.transmit(invocation);
		pending
	}

	/// (Re-)connects the transport and sends everything queued meanwhile, oldest first.
	///
	/// # Errors
	///
	/// Iff the transport could not connect.
	pub fn connect(&mut self) -> Result<(), TransportError> {
		self.transport.connect()?;
		let queued: Vec<_> = self.outbox.drain(..).collect();
		for invocation in queued {
			self.transmit(invocation);
		}
		Ok(())
	}

	pub fn disconnect(&mut self) {
		self.transport.disconnect();
	}

	/// Processes every message in the inbox. Returns how many there were.
	pub fn pump(&mut self) -> usize {
		let messages = self.inbox.drain();
		let count = messages.len();
		for message in messages {
			self.receive(&message);
		}
		count
	}

	/// Processes one raw server message, then delivers the notifications it raised.
	pub fn receive(&mut self, raw: &str) {
		self.process(raw);
		self.flush_notifications();
	}

	fn transmit(&mut self, invocation: Invocation) {
		let id = invocation.correlation_id.clone();
		if !self.transport.is_connected() {
			self.queue(invocation);
			return;
		}
		match self.transport.send(&self.config.channel_identifier, &invocation) {
			Ok(()) => {
				if let Some(record) = self.registry.get_mut(&id) {
					record.stage = Stage::Sent;
				}
			}
			Err(TransportError::NotConnected) => self.queue(invocation),
			Err(TransportError::Rejected) => {
				if let Some(mut record) = self.registry.retire(&id) {
					record.stage = Stage::Forbidden;
					record.resolve(Outcome::Forbidden);
				}
				self.diagnose(Diagnostic::Forbidden(id));
			}
			Err(error) => {
				if let Some(mut record) = self.registry.retire(&id) {
					record.stage = Stage::Error;
					record.resolve(Outcome::Error(error.to_string()));
				}
				self.diagnose(Diagnostic::Transport(error.to_string()));
			}
		}
	}

	fn queue(&mut self, invocation: Invocation) {
		debug!(correlation_id = %invocation.correlation_id, "Transport not connected, queueing.");
		if let Some(record) = self.registry.get_mut(&invocation.correlation_id) {
			record.stage = Stage::Queued;
		}
		self.outbox.push_back(invocation);
	}

	fn process(&mut self, raw: &str) {
		let value: serde_json::Value = match serde_json::from_str(raw) {
			Ok(value) => value,
			Err(error) => {
				#[cfg(feature = "dangerous-logging")]
				debug!("Malformed message: {:?}", raw);
				return self.diagnose(Diagnostic::Malformed(ProtocolError::from(error).to_string()));
			}
		};

		let server_version = value.get("protocolVersion").and_then(serde_json::Value::as_str).unwrap_or_default().to_owned();
		if server_version != self.config.protocol_version {
			return self.diagnose(Diagnostic::VersionMismatch {
				server: server_version,
				client: self.config.protocol_version.clone(),
			});
		}

		let reply: Reply = match serde_json::from_value(value) {
			Ok(reply) => reply,
			Err(error) => return self.diagnose(Diagnostic::Malformed(ProtocolError::from(error).to_string())),
		};

		let location = self.dom.location();
		if let Some(echo) = reply.operations.iter().filter_map(|operation| operation.echo.as_ref()).find(|echo| echo.url != location) {
			let diagnostic = Diagnostic::StaleUrl {
				expected: echo.url.clone(),
				actual: location,
			};
			return self.diagnose(diagnostic);
		}

		let active = self.claim(&reply.operations);

		let permanent_attribute = self.config.permanent_attribute_name.clone();
		for operation in &reply.operations {
			let id = match &operation.correlation_id {
				Some(id) if active.contains(id) => Some(id),
				Some(_) => continue,
				None => None,
			};
			if let Some(record) = id.and_then(|id| self.registry.get_mut(id)) {
				self.notifications.extend(record.before_apply());
			}
			if let Err(error) = self.executor.execute(&mut self.dom, operation, &permanent_attribute) {
				self.diagnose(Diagnostic::Execute(error));
			}
			if let Some(record) = id.and_then(|id| self.registry.get_mut(id)) {
				self.notifications.extend(record.after_apply());
			}
		}
	}

	/// Decides which correlation ids in `operations` this client handles, creating records for invocations from
	/// other tabs of the same session.
	fn claim(&mut self, operations: &[Operation]) -> HashSet<CorrelationId> {
		let mut order = Vec::new();
		let mut batches: HashMap<&CorrelationId, Vec<&Operation>> = HashMap::new();
		for operation in operations {
			if let Some(id) = &operation.correlation_id {
				batches
					.entry(id)
					.or_insert_with(|| {
						order.push(id);
						Vec::new()
					})
					.push(operation);
			}
		}

		let mut active = HashSet::new();
		for id in order {
			let batch = &batches[id];
			let echo = batch.iter().find_map(|operation| operation.echo.as_ref());
			if self.config.isolate && echo.map_or(true, |echo| echo.tab_id != self.tab_id) {
				continue;
			}
			if self.registry.get(id).is_none() {
				if self.registry.is_retired(id) {
					self.diagnose(Diagnostic::UnknownCorrelation(id.clone()));
					continue;
				}
				match echo {
					Some(echo) => {
						let record = Record::foreign(id.clone(), echo, self.dom.now_ms());
						self.registry.insert(record);
					}
					None => continue,
				}
			}
			if let Some(record) = self.registry.get_mut(id) {
				record.prepare(batch);
			}
			active.insert(id.clone());
		}
		active
	}

	/// Delivers queued notifications, retiring records whose final notification went out.
	pub fn flush_notifications(&mut self) {
		while let Some(notification) = self.notifications.pop_front() {
			let id = notification.correlation_id.clone();
			let is_final = notification.is_final;
			let element = resolver::relocate(&self.dom, &notification.element, notification.fingerprint.as_ref());
			let controller = resolver::relocate(&self.dom, &notification.controller, None).or_else(|| element.clone());
			match element.zip(controller) {
				Some((element, controller)) => self.fire(notification, element, controller),
				None => {
					let stage = notification.stage;
					#[cfg(feature = "log-paths")]
					debug!(element = %notification.element, controller = %notification.controller, ?stage, "Notification target not found.");
					self.diagnose(Diagnostic::ElementMissing { correlation_id: id.clone(), stage });
				}
			}
			if is_final {
				self.registry.retire(&id);
			}
		}
	}

	fn fire(&mut self, notification: Notification, element: D::Node, controller: D::Node) {
		let elapsed_ms = self.dom.now_ms() - notification.created_at;
		let detail = json!({
			"correlationId": notification.correlation_id,
			"target": notification.target,
			"stage": notification.stage.as_str(),
			"payload": notification.payload,
			"elapsedMs": elapsed_ms,
		});
		self.dom.dispatch_event(&element, &notification.stage.event_name(), &detail);
		let event = LifecycleEvent {
			notification,
			element,
			controller,
			elapsed_ms,
		};
		for listener in &mut self.listeners {
			listener(&event);
		}
	}

	fn diagnose(&mut self, diagnostic: Diagnostic) {
		if diagnostic.is_verbose() {
			if !self.config.debug {
				return;
			}
			debug!(?diagnostic, "Reflex diagnostic.");
		} else {
			warn!(?diagnostic, "Reflex diagnostic.");
		}
		for listener in &mut self.diagnostics {
			listener(&diagnostic);
		}
	}
}
