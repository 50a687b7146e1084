use crate::{
	envelope::Invocation,
	error::TransportError,
	transport::{MessageHandler, Transport},
};
use std::{cell::RefCell, rc::Rc};
use tracing::{debug, trace, warn};
use wasm_bindgen::{closure::Closure, JsCast};
use web_sys::{CloseEvent, MessageEvent, WebSocket};

/// Close code a server uses to refuse the subscription.
pub const REJECTED_CLOSE_CODE: u16 = 4403;

#[derive(Default)]
struct Shared {
	handler: Option<MessageHandler>,
	wake: Option<Box<dyn FnMut()>>,
	rejected: bool,
}

/// A [`Transport`] over a browser [`WebSocket`].
///
/// Each invocation is sent as one text frame `{"identifier": …, "data": …}`. Every text frame received is a reply.
#[allow(clippy::type_complexity)]
pub struct WebSocketTransport {
	url: String,
	socket: Option<WebSocket>,
	shared: Rc<RefCell<Shared>>,
	on_message: Closure<dyn FnMut(MessageEvent)>,
	on_close: Closure<dyn FnMut(CloseEvent)>,
}

impl core::fmt::Debug for WebSocketTransport {
	fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
		f.debug_struct("WebSocketTransport").field("url", &self.url).field("socket", &self.socket).finish_non_exhaustive()
	}
}

impl WebSocketTransport {
	/// A disconnected transport for `url`. Call [`Transport::connect`] to open it.
	#[must_use]
	pub fn new(url: impl Into<String>) -> Self {
		let shared = Rc::new(RefCell::new(Shared::default()));
		let on_message = {
			let shared = Rc::clone(&shared);
			Closure::wrap(Box::new(move |event: MessageEvent| {
				let text = match event.data().as_string() {
					Some(text) => text,
					None => return warn!("Ignoring non-text frame."),
				};
				trace!(%text, "Received.");
				// Taken out so the callbacks may touch the transport.
				let (handler, wake) = {
					let mut shared = shared.borrow_mut();
					(shared.handler.take(), shared.wake.take())
				};
				if let Some(mut handler) = handler {
					handler(text);
					shared.borrow_mut().handler.get_or_insert(handler);
				}
				if let Some(mut wake) = wake {
					wake();
					shared.borrow_mut().wake.get_or_insert(wake);
				}
			}) as Box<dyn FnMut(MessageEvent)>)
		};
		let on_close = {
			let shared = Rc::clone(&shared);
			Closure::wrap(Box::new(move |event: CloseEvent| {
				debug!(code = event.code(), reason = %event.reason(), "Socket closed.");
				if event.code() == REJECTED_CLOSE_CODE {
					shared.borrow_mut().rejected = true;
				}
			}) as Box<dyn FnMut(CloseEvent)>)
		};
		Self {
			url: url.into(),
			socket: None,
			shared,
			on_message,
			on_close,
		}
	}

	/// Called after each delivered message, typically to [`pump`](`crate::client::Client::pump`) the client.
	pub fn set_wake(&mut self, wake: impl FnMut() + 'static) {
		self.shared.borrow_mut().wake = Some(Box::new(wake));
	}
}

impl Transport for WebSocketTransport {
	fn send(&mut self, identifier: &str, invocation: &Invocation) -> Result<(), TransportError> {
		if self.shared.borrow().rejected {
			return Err(TransportError::Rejected);
		}
		let socket = self.socket.as_ref().filter(|socket| socket.ready_state() == WebSocket::OPEN).ok_or(TransportError::NotConnected)?;
		let frame = serde_json::to_string(&serde_json::json!({ "identifier": identifier, "data": invocation }))?;
		socket.send_with_str(&frame).map_err(|error| TransportError::Io(format!("{:?}", error)))
	}

	fn on_message(&mut self, handler: MessageHandler) {
		self.shared.borrow_mut().handler = Some(handler);
	}

	fn is_connected(&self) -> bool {
		self.socket.as_ref().map_or(false, |socket| socket.ready_state() == WebSocket::OPEN)
	}

	fn connect(&mut self) -> Result<(), TransportError> {
		if self.is_connected() {
			return Ok(());
		}
		let socket = WebSocket::new(&self.url).map_err(|error| TransportError::Io(format!("{:?}", error)))?;
		socket.set_onmessage(Some(self.on_message.as_ref().unchecked_ref()));
		socket.set_onclose(Some(self.on_close.as_ref().unchecked_ref()));
		self.shared.borrow_mut().rejected = false;
		self.socket = Some(socket);
		Ok(())
	}

	fn disconnect(&mut self) {
		if let Some(socket) = self.socket.take() {
			socket.set_onmessage(None);
			socket.set_onclose(None);
			if let Err(error) = socket.close() {
				warn!("Failed to close socket: {:?}", error);
			}
		}
	}
}

impl Drop for WebSocketTransport {
	fn drop(&mut self) {
		self.disconnect();
	}
}
