//! Browser bindings: [`Dom`] over [`web_sys`], a WebSocket [`Transport`](`crate::transport::Transport`) and DOM
//! event delegation.

mod bridge;
mod websocket;

pub use bridge::EventBridge;
pub use websocket::WebSocketTransport;

use crate::dom::Dom;
use wasm_bindgen::{JsCast, JsValue};
use web_sys::{Attr, CustomEvent, CustomEventInit, Element, HtmlInputElement, HtmlOptionElement, HtmlSelectElement, HtmlTextAreaElement, NamedNodeMap};
use tracing::{error, warn};

/// The live document of the current window.
#[derive(Debug, Clone)]
pub struct WebDocument {
	document: web_sys::Document,
}

impl WebDocument {
	/// The current window's document, if there is one.
	#[must_use]
	pub fn current() -> Option<Self> {
		web_sys::window().and_then(|window| window.document()).map(Self::from_document)
	}

	#[must_use]
	pub fn from_document(document: web_sys::Document) -> Self {
		Self { document }
	}

	#[must_use]
	pub fn document(&self) -> &web_sys::Document {
		&self.document
	}
}

impl Dom for WebDocument {
	type Node = Element;

	fn location(&self) -> String {
		self.document.location().and_then(|location| location.href().ok()).unwrap_or_default()
	}

	fn now_ms(&self) -> f64 {
		js_sys::Date::now()
	}

	fn document_element(&self) -> Option<Element> {
		self.document.document_element()
	}

	fn body(&self) -> Option<Element> {
		self.document.body().map(Into::into)
	}

	fn element_by_id(&self, id: &str) -> Option<Element> {
		self.document.get_element_by_id(id)
	}

	fn query_selector_all(&self, selector: &str) -> Vec<Element> {
		match self.document.query_selector_all(selector) {
			Ok(list) => (0..list.length()).filter_map(|i| list.item(i)).filter_map(|node| node.dyn_into::<Element>().ok()).collect(),
			Err(error) => {
				warn!("Invalid selector {:?}: {:?}", selector, error);
				Vec::new()
			}
		}
	}

	fn parent(&self, node: &Element) -> Option<Element> {
		node.parent_element()
	}

	fn children(&self, node: &Element) -> Vec<Element> {
		let children = node.children();
		(0..children.length()).filter_map(|i| children.item(i)).collect()
	}

	fn tag_name(&self, node: &Element) -> String {
		node.tag_name().to_ascii_lowercase()
	}

	fn attributes(&self, node: &Element) -> Vec<(String, String)> {
		load_attributes(&node.attributes())
	}

	fn attribute(&self, node: &Element, name: &str) -> Option<String> {
		node.get_attribute(name)
	}

	fn set_attribute(&mut self, node: &Element, name: &str, value: &str) {
		if let Err(error) = node.set_attribute(name, value) {
			error!("Failed to set attribute {:?}: {:?}", name, error);
		}
	}

	fn is_connected(&self, node: &Element) -> bool {
		node.is_connected()
	}

	fn value(&self, node: &Element) -> Option<String> {
		if let Some(input) = node.dyn_ref::<HtmlInputElement>() {
			Some(input.value())
		} else if let Some(text_area) = node.dyn_ref::<HtmlTextAreaElement>() {
			Some(text_area.value())
		} else if let Some(select) = node.dyn_ref::<HtmlSelectElement>() {
			Some(select.value())
		} else {
			node.dyn_ref::<HtmlOptionElement>().map(HtmlOptionElement::value)
		}
	}

	fn checked(&self, node: &Element) -> bool {
		node.dyn_ref::<HtmlInputElement>().map_or(false, HtmlInputElement::checked)
	}

	fn selected(&self, node: &Element) -> bool {
		node.dyn_ref::<HtmlOptionElement>().map_or(false, HtmlOptionElement::selected)
	}

	fn inner_html(&self, node: &Element) -> String {
		node.inner_html()
	}

	fn text_content(&self, node: &Element) -> String {
		node.text_content().unwrap_or_default()
	}

	fn set_inner_html(&mut self, node: &Element, html: &str) {
		node.set_inner_html(html);
	}

	fn replace_node(&mut self, old: &Element, new: &Element) {
		match old.parent_node() {
			Some(parent) => {
				if let Err(error) = parent.replace_child(new, old) {
					error!("Failed to replace node: {:?}", error);
				}
			}
			None => warn!("Cannot replace a detached node."),
		}
	}

	fn dispatch_event(&mut self, node: &Element, name: &str, detail: &serde_json::Value) {
		let detail = js_sys::JSON::parse(&detail.to_string()).unwrap_or(JsValue::NULL);
		let mut init = CustomEventInit::new();
		init.bubbles(true).detail(&detail);
		match CustomEvent::new_with_event_init_dict(name, &init) {
			Ok(event) => {
				if let Err(error) = node.dispatch_event(&event) {
					error!("Failed to dispatch {:?}: {:?}", name, error);
				}
			}
			Err(error) => error!("Failed to create event {:?}: {:?}", name, error),
		}
	}
}

pub fn load_attributes(attributes: &NamedNodeMap) -> Vec<(String, String)> {
	(0..attributes.length()).filter_map(|i| attributes.item(i)).map(|attribute| load_attribute(&attribute)).collect()
}

pub fn load_attribute(attribute: &Attr) -> (String, String) {
	(attribute.name(), attribute.value())
}
