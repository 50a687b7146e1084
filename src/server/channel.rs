//! The server request cycle.

use super::{
	broadcaster::Broadcaster,
	dispatcher::{DispatchOutcome, Dispatcher, HandlerRegistry},
	log::{OperationRecord, ReflexLogger, TracingLogger},
	render::Renderer,
	session::{RequestContext, ResponseContext, Session, SessionStore},
};
use crate::{
	config::{ServerConfig, VersionPolicy},
	envelope::Invocation,
	error::{ProtocolError, TransportError},
	protocol::Reply,
};
use std::{sync::Arc, time::Instant};
use tracing::{error, instrument, warn};

/// Where replies go. One stream per client session.
pub trait Publisher {
	/// # Errors
	///
	/// Iff the reply could not be handed to the transport.
	fn publish(&self, stream: &str, reply: &Reply) -> Result<(), TransportError>;
}

pub struct Channel {
	config: ServerConfig,
	dispatcher: Dispatcher,
	renderer: Arc<dyn Renderer>,
	sessions: Arc<dyn SessionStore>,
	logger: Arc<dyn ReflexLogger>,
}

impl core::fmt::Debug for Channel {
	fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
		f.debug_struct("Channel").field("config", &self.config).field("dispatcher", &self.dispatcher).finish_non_exhaustive()
	}
}

impl Channel {
	#[must_use]
	pub fn new(config: ServerConfig, registry: HandlerRegistry, renderer: Arc<dyn Renderer>, sessions: Arc<dyn SessionStore>) -> Self {
		Self {
			dispatcher: Dispatcher::new(registry, config.default_method.clone()),
			config,
			renderer,
			sessions,
			logger: Arc::new(TracingLogger),
		}
	}

	#[must_use]
	pub fn with_logger(mut self, logger: Arc<dyn ReflexLogger>) -> Self {
		self.logger = logger;
		self
	}

	#[must_use]
	pub fn config(&self) -> &ServerConfig {
		&self.config
	}

	/// Decodes one raw client message addressed to `identifier` and [`perform`](`Channel::perform`)s it.
	///
	/// Messages for other identifiers and undecodable messages are dropped with a warning, since there is no
	/// correlation id to answer them with.
	pub fn receive(&self, identifier: &str, session_id: &str, raw: &str, publisher: &dyn Publisher) -> Option<Reply> {
		if identifier != self.config.channel_identifier {
			warn!("Ignoring message for unknown channel {:?}.", identifier);
			return None;
		}
		match serde_json::from_str::<Invocation>(raw) {
			Ok(invocation) => Some(self.perform(session_id, &invocation, publisher)),
			Err(error) => {
				warn!("{}", ProtocolError::from(error));
				None
			}
		}
	}

	/// Dispatches, renders, publishes, then commits the session. The session commit is best-effort.
	///
	/// A session that fails to load is answered with an `error` reply and never written back.
	#[instrument(skip(self, invocation, publisher), fields(correlation_id = %invocation.correlation_id, target = %invocation.target))]
	pub fn perform(&self, session_id: &str, invocation: &Invocation, publisher: &dyn Publisher) -> Reply {
		let started = Instant::now();

		let (outcome, session) = match self.sessions.load(session_id) {
			Ok(mut session) => (self.dispatch(invocation, &mut session), Some(session)),
			Err(load_error) => {
				error!("Not dispatching: {}", load_error);
				(DispatchOutcome::failed(load_error.into()), None)
			}
		};

		let empty = Session::new();
		let reply = Broadcaster::new(self.renderer.as_ref(), &self.config.protocol_version).broadcast(invocation, &outcome, session.as_ref().unwrap_or(&empty));
		let duration_ms = started.elapsed().as_secs_f64() * 1000.0;

		if let Err(publish_error) = publisher.publish(session_id, &reply) {
			error!("Could not publish reply: {}", publish_error);
		}

		if let Some(session) = session {
			let request = RequestContext {
				session_id: session_id.to_owned(),
				correlation_id: invocation.correlation_id.clone(),
				url: invocation.url.clone(),
			};
			if let Err(commit_error) = self.sessions.commit(&request, &ResponseContext { session }) {
				error!("{}", commit_error);
			}
		}

		if self.config.log_operations && !invocation.options.suppress_logging {
			let tagged: Vec<_> = reply.operations.iter().filter(|operation| operation.is_tagged()).collect();
			for (operation_index, operation) in tagged.iter().enumerate() {
				self.logger.log(&OperationRecord {
					session_id: session_id.to_owned(),
					correlation_id: invocation.correlation_id.clone(),
					target: invocation.target.clone(),
					selector: operation.selector.clone(),
					operation_index,
					total_operations: tagged.len(),
					duration_ms,
					mode: operation.morph_mode,
				});
			}
		}

		reply
	}

	fn dispatch(&self, invocation: &Invocation, session: &mut Session) -> DispatchOutcome {
		match self.check_version(invocation) {
			Ok(()) => self.dispatcher.dispatch(invocation, session),
			Err(mismatch) => {
				warn!("Rejecting invocation: {}", mismatch);
				DispatchOutcome::failed(mismatch.into())
			}
		}
	}

	fn check_version(&self, invocation: &Invocation) -> Result<(), ProtocolError> {
		if invocation.version == self.config.protocol_version {
			return Ok(());
		}
		let mismatch = ProtocolError::VersionMismatch {
			server: self.config.protocol_version.clone(),
			client: invocation.version.clone(),
		};
		match self.config.on_version_mismatch {
			VersionPolicy::Warn => {
				warn!("{}", mismatch);
				Ok(())
			}
			VersionPolicy::Reject => Err(mismatch),
		}
	}
}
