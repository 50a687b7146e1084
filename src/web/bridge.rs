use super::{WebDocument, WebSocketTransport};
use crate::{client::Client, transport::Transport};
use std::{
	cell::RefCell,
	rc::{Rc, Weak},
};
use tracing::{error, trace_span, warn};
use wasm_bindgen::{closure::Closure, JsCast};
use web_sys::Element;

/// Delegates DOM events at the document to [`Client::handle_event`], for as long as it lives.
#[allow(clippy::type_complexity)]
pub struct EventBridge {
	document: web_sys::Document,
	events: Vec<String>,
	common_handler: Closure<dyn Fn(web_sys::Event)>,
}

impl core::fmt::Debug for EventBridge {
	fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
		f.debug_struct("EventBridge").field("events", &self.events).finish_non_exhaustive()
	}
}

impl EventBridge {
	/// Listens for `events` on the client's document.
	pub fn attach<T: Transport + 'static>(client: &Rc<RefCell<Client<WebDocument, T>>>, events: &[&str]) -> Self {
		let weak = Rc::downgrade(client);
		let document = client.borrow().dom().document().clone();
		let common_handler = Closure::wrap(Box::new(move |event: web_sys::Event| {
			let span = trace_span!("common_handler", event = %event.type_());
			let _enter = span.enter();
			dispatch(&weak, &event);
		}) as Box<dyn Fn(web_sys::Event)>);

		for &name in events {
			if let Err(error) = document.add_event_listener_with_callback(name, common_handler.as_ref().unchecked_ref()) {
				error!("Failed to add event listener {:?}: {:?}", name, error);
			}
		}

		Self {
			document,
			events: events.iter().map(|&name| name.to_owned()).collect(),
			common_handler,
		}
	}

	/// Makes the client process replies as soon as the socket delivers them.
	pub fn pump_on_message(client: &Rc<RefCell<Client<WebDocument, WebSocketTransport>>>) {
		let weak = Rc::downgrade(client);
		client.borrow_mut().transport_mut().set_wake(move || {
			if let Some(client) = weak.upgrade() {
				match client.try_borrow_mut() {
					Ok(mut client) => {
						client.pump();
					}
					Err(_) => warn!("Client busy, replies stay queued until the next pump."),
				}
			}
		});
	}
}

fn dispatch<T: Transport>(client: &Weak<RefCell<Client<WebDocument, T>>>, event: &web_sys::Event) {
	let client = match client.upgrade() {
		Some(client) => client,
		None => return,
	};
	let mut client = match client.try_borrow_mut() {
		Ok(client) => client,
		Err(_) => return warn!("Client busy, dropping {:?} event.", event.type_()),
	};

	let action_attribute = client.config().action_attribute.clone();
	let mut current = event.target().and_then(|target| target.dyn_into::<Element>().ok());
	while let Some(element) = current {
		if element.has_attribute(&action_attribute) {
			if client.handle_event(&element, &event.type_()).is_some() {
				if event.type_() == "submit" {
					event.prevent_default();
				}
				return;
			}
		}
		current = element.parent_element();
	}
}

impl Drop for EventBridge {
	fn drop(&mut self) {
		for name in &self.events {
			if let Err(error) = self.document.remove_event_listener_with_callback(name, self.common_handler.as_ref().unchecked_ref()) {
				error!("Failed to remove event listener {:?}: {:?}", name, error);
			}
		}
	}
}
