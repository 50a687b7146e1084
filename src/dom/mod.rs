//! Element-level document access.
//!
//! [`Dom`] is the capability the resolver, the scanner, the patch executor and the [`Client`](`crate::client::Client`)
//! are written against. [`MemoryDocument`](`memory::MemoryDocument`) implements it natively,
//! [`WebDocument`](`crate::web::WebDocument`) over [`web_sys`] on `wasm32`.
//!
//! Only elements are addressable. Text and comment nodes are reachable through the HTML accessors alone.

use core::fmt::Debug;

pub mod memory;
pub mod parse;

pub use memory::{MemoryDocument, NodeId};

pub trait Dom {
	/// A cheap handle to one element. Equality is node identity.
	type Node: Clone + PartialEq + Debug;

	/// The current document location (`document.location.href`).
	fn location(&self) -> String;

	/// Milliseconds since an arbitrary, fixed epoch.
	fn now_ms(&self) -> f64;

	/// The `<html>` element.
	fn document_element(&self) -> Option<Self::Node>;

	fn body(&self) -> Option<Self::Node>;

	fn element_by_id(&self, id: &str) -> Option<Self::Node>;

	/// All connected elements matching `selector`, in document order.
	/// Invalid selectors match nothing.
	fn query_selector_all(&self, selector: &str) -> Vec<Self::Node>;

	fn query_selector(&self, selector: &str) -> Option<Self::Node> {
		self.query_selector_all(selector).into_iter().next()
	}

	/// The parent *element*, if any.
	fn parent(&self, node: &Self::Node) -> Option<Self::Node>;

	/// Element children, in order.
	fn children(&self, node: &Self::Node) -> Vec<Self::Node>;

	/// Lower-case tag name.
	fn tag_name(&self, node: &Self::Node) -> String;

	/// All attributes in source order.
	fn attributes(&self, node: &Self::Node) -> Vec<(String, String)>;

	fn attribute(&self, node: &Self::Node, name: &str) -> Option<String> {
		self.attributes(node).into_iter().find(|(n, _)| n == name).map(|(_, value)| value)
	}

	fn set_attribute(&mut self, node: &Self::Node, name: &str, value: &str);

	/// Whether `node` is (still) part of the document tree.
	fn is_connected(&self, node: &Self::Node) -> bool;

	/// The live `value` property of form controls, [`None`] for other elements.
	fn value(&self, node: &Self::Node) -> Option<String>;

	fn checked(&self, node: &Self::Node) -> bool;

	fn selected(&self, node: &Self::Node) -> bool;

	fn inner_html(&self, node: &Self::Node) -> String;

	fn text_content(&self, node: &Self::Node) -> String;

	/// Replaces all children of `node` with the parsed `html`.
	fn set_inner_html(&mut self, node: &Self::Node, html: &str);

	/// Swaps `old` out of the tree and puts `new` in its place. `new` is detached from wherever it was first.
	fn replace_node(&mut self, old: &Self::Node, new: &Self::Node);

	/// Dispatches a bubbling custom event with a JSON `detail` at `node`.
	fn dispatch_event(&mut self, node: &Self::Node, name: &str, detail: &serde_json::Value);

	/// The nearest inclusive ancestor satisfying `predicate`.
	fn closest(&self, node: &Self::Node, mut predicate: impl FnMut(&Self, &Self::Node) -> bool) -> Option<Self::Node>
	where
		Self: Sized,
	{
		let mut current = Some(node.clone());
		while let Some(candidate) = current {
			if predicate(self, &candidate) {
				return Some(candidate);
			}
			current = self.parent(&candidate);
		}
		None
	}

	/// Every connected element in document order, starting with [`Dom::document_element`].
	fn descendants(&self) -> Vec<Self::Node> {
		let mut out = Vec::new();
		let mut stack: Vec<Self::Node> = self.document_element().into_iter().collect();
		while let Some(node) = stack.pop() {
			let mut children = self.children(&node);
			children.reverse();
			out.push(node);
			stack.extend(children);
		}
		out
	}
}

/// Whether a whitespace-separated token list contains `token`.
pub(crate) fn has_token(list: &str, token: &str) -> bool {
	list.split_ascii_whitespace().any(|t| t == token)
}
