//! The bidirectional message channel between client and server.
//!
//! The client never handles server messages re-entrantly: [`Transport`]s push raw messages into an [`Inbox`],
//! which [`Client::pump`](`crate::client::Client::pump`) drains.

use crate::{envelope::Invocation, error::TransportError};
use std::{cell::RefCell, collections::VecDeque, rc::Rc};

pub type MessageHandler = Box<dyn FnMut(String)>;

pub trait Transport {
	/// Sends `invocation` to the server channel named `identifier`.
	///
	/// # Errors
	///
	/// [`TransportError::NotConnected`] while disconnected, [`TransportError::Rejected`] iff the connection layer
	/// refused the subscription.
	fn send(&mut self, identifier: &str, invocation: &Invocation) -> Result<(), TransportError>;

	/// Installs the handler server messages are delivered to.
	fn on_message(&mut self, handler: MessageHandler);

	fn is_connected(&self) -> bool;

	/// # Errors
	///
	/// Iff the connection could not be (re-)established.
	fn connect(&mut self) -> Result<(), TransportError>;

	fn disconnect(&mut self);
}

/// A shared queue of raw server messages.
#[derive(Debug, Clone, Default)]
pub struct Inbox(Rc<RefCell<VecDeque<String>>>);

impl Inbox {
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	/// A [`MessageHandler`] that appends to this inbox.
	#[must_use]
	pub fn handler(&self) -> MessageHandler {
		let queue = Rc::clone(&self.0);
		Box::new(move |message| queue.borrow_mut().push_back(message))
	}

	pub fn push(&self, message: impl Into<String>) {
		self.0.borrow_mut().push_back(message.into());
	}

	pub fn drain(&self) -> Vec<String> {
		self.0.borrow_mut().drain(..).collect()
	}

	#[must_use]
	pub fn len(&self) -> usize {
		self.0.borrow().len()
	}

	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.0.borrow().is_empty()
	}
}

#[cfg(not(target_arch = "wasm32"))]
pub use loopback::{LoopbackHub, LoopbackTransport};

#[cfg(not(target_arch = "wasm32"))]
mod loopback {
	use super::{MessageHandler, Transport};
	use crate::{
		envelope::Invocation,
		error::TransportError,
		protocol::Reply,
		server::{Channel, Publisher},
	};
	use hashbrown::HashSet;
	use std::{
		cell::RefCell,
		collections::VecDeque,
		rc::Rc,
		sync::Arc,
	};
	use tracing::{debug, trace};

	struct Subscriber {
		id: usize,
		stream: String,
		connected: bool,
		handler: Option<MessageHandler>,
	}

	struct Hub {
		channel: Arc<Channel>,
		subscribers: Vec<Subscriber>,
		next_id: usize,
		held: bool,
		pending: VecDeque<(String, String)>,
		rejected: HashSet<String>,
	}

	impl Hub {
		fn deliver(&mut self, stream: &str, message: &str) {
			for subscriber in self.subscribers.iter_mut().filter(|subscriber| subscriber.connected && subscriber.stream == stream) {
				if let Some(handler) = &mut subscriber.handler {
					handler(message.to_owned());
				}
			}
		}
	}

	#[derive(Default)]
	struct Collected(RefCell<Vec<(String, String)>>);

	impl Publisher for Collected {
		fn publish(&self, stream: &str, reply: &Reply) -> Result<(), TransportError> {
			let message = serde_json::to_string(reply)?;
			self.0.borrow_mut().push((stream.to_owned(), message));
			Ok(())
		}
	}

	/// An in-process connection layer in front of one [`Channel`].
	///
	/// Replies are broadcast to every connected transport subscribed to the invoking session's stream, which is
	/// how several tabs of one session observe each other's invocations.
	#[derive(Clone)]
	pub struct LoopbackHub(Rc<RefCell<Hub>>);

	impl core::fmt::Debug for LoopbackHub {
		fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
			let hub = self.0.borrow();
			f.debug_struct("LoopbackHub").field("subscribers", &hub.subscribers.len()).field("held", &hub.held).field("pending", &hub.pending.len()).finish()
		}
	}

	impl LoopbackHub {
		#[must_use]
		pub fn new(channel: Arc<Channel>) -> Self {
			Self(Rc::new(RefCell::new(Hub {
				channel,
				subscribers: Vec::new(),
				next_id: 0,
				held: false,
				pending: VecDeque::new(),
				rejected: HashSet::new(),
			})))
		}

		/// A new, connected transport for `session_id`.
		#[must_use]
		pub fn transport(&self, session_id: impl Into<String>) -> LoopbackTransport {
			let mut hub = self.0.borrow_mut();
			let id = hub.next_id;
			hub.next_id += 1;
			hub.subscribers.push(Subscriber {
				id,
				stream: session_id.into(),
				connected: true,
				handler: None,
			});
			LoopbackTransport { hub: self.clone(), id }
		}

		/// Refuse further sends for `session_id`, as a connection layer denying the subscription would.
		pub fn reject(&self, session_id: impl Into<String>) {
			self.0.borrow_mut().rejected.insert(session_id.into());
		}

		/// Queue replies instead of delivering them, until [`LoopbackHub::release`].
		pub fn hold(&self) {
			self.0.borrow_mut().held = true;
		}

		/// Delivers everything queued while held, in order, and stops holding.
		pub fn release(&self) {
			let mut hub = self.0.borrow_mut();
			hub.held = false;
			while let Some((stream, message)) = hub.pending.pop_front() {
				hub.deliver(&stream, &message);
			}
		}

		/// Takes the queued replies (`(stream, message)`) out without delivering them.
		pub fn take_pending(&self) -> Vec<(String, String)> {
			self.0.borrow_mut().pending.drain(..).collect()
		}

		/// Delivers a raw message to `stream` right away.
		pub fn inject(&self, stream: &str, message: &str) {
			self.0.borrow_mut().deliver(stream, message);
		}
	}

	#[derive(Debug)]
	pub struct LoopbackTransport {
		hub: LoopbackHub,
		id: usize,
	}

	impl LoopbackTransport {
		fn with_subscriber<R>(&self, f: impl FnOnce(&mut Subscriber) -> R) -> Option<R> {
			self.hub.0.borrow_mut().subscribers.iter_mut().find(|subscriber| subscriber.id == self.id).map(f)
		}
	}

	impl Transport for LoopbackTransport {
		fn send(&mut self, identifier: &str, invocation: &Invocation) -> Result<(), TransportError> {
			let (stream, channel) = {
				let hub = self.hub.0.borrow();
				let subscriber = hub.subscribers.iter().find(|subscriber| subscriber.id == self.id).ok_or(TransportError::NotConnected)?;
				if !subscriber.connected {
					return Err(TransportError::NotConnected);
				}
				if hub.rejected.contains(&subscriber.stream) {
					return Err(TransportError::Rejected);
				}
				(subscriber.stream.clone(), Arc::clone(&hub.channel))
			};

			let raw = serde_json::to_string(invocation)?;
			trace!(%raw, "Sending.");
			let published = Collected::default();
			channel.receive(identifier, &stream, &raw, &published);

			let mut hub = self.hub.0.borrow_mut();
			for (stream, message) in published.0.into_inner() {
				if hub.held {
					debug!("Holding reply for {:?}.", stream);
					hub.pending.push_back((stream, message));
				} else {
					hub.deliver(&stream, &message);
				}
			}
			Ok(())
		}

		fn on_message(&mut self, handler: MessageHandler) {
			self.with_subscriber(|subscriber| subscriber.handler = Some(handler));
		}

		fn is_connected(&self) -> bool {
			self.with_subscriber(|subscriber| subscriber.connected).unwrap_or(false)
		}

		fn connect(&mut self) -> Result<(), TransportError> {
			self.with_subscriber(|subscriber| subscriber.connected = true).ok_or(TransportError::NotConnected)
		}

		fn disconnect(&mut self) {
			self.with_subscriber(|subscriber| subscriber.connected = false);
		}
	}
}
