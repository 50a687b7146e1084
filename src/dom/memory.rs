//! Arena-backed in-memory document.
//!
//! Detached nodes stay in the arena, so handles to replaced elements remain valid but report
//! [`is_connected`](`Dom::is_connected`) as `false`, just like live DOM nodes do.

use super::{
	parse::{self, Token},
	Dom,
};
use crate::selector::SelectorList;
use tracing::{trace, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u32);

impl NodeId {
	const DOCUMENT: Self = Self(0);

	fn index(self) -> usize {
		self.0 as usize
	}
}

#[derive(Debug, Clone)]
enum Data {
	Document,
	Element { name: String, attributes: Vec<(String, String)> },
	Text(String),
	Comment(String),
}

#[derive(Debug, Clone)]
struct Slot {
	data: Data,
	parent: Option<NodeId>,
	children: Vec<NodeId>,
	/// Live property overrides, as set through user interaction.
	value: Option<String>,
	checked: Option<bool>,
	selected: Option<bool>,
}

/// One custom event dispatched through [`Dom::dispatch_event`].
#[derive(Debug, Clone, PartialEq)]
pub struct DispatchedEvent {
	pub target: NodeId,
	pub name: String,
	pub detail: serde_json::Value,
}

#[derive(Debug, Clone)]
pub struct MemoryDocument {
	slots: Vec<Slot>,
	location: String,
	clock: f64,
	events: Vec<DispatchedEvent>,
}

impl Default for MemoryDocument {
	fn default() -> Self {
		Self {
			slots: vec![Slot {
				data: Data::Document,
				parent: None,
				children: Vec::new(),
				value: None,
				checked: None,
				selected: None,
			}],
			location: "about:blank".to_owned(),
			clock: 0.0,
			events: Vec::new(),
		}
	}
}

impl MemoryDocument {
	/// Parses a complete document.
	#[must_use]
	pub fn parse(html: &str) -> Self {
		let mut document = Self::default();
		let tokens = parse::tokenize(html);
		document.build(NodeId::DOCUMENT, tokens);
		document
	}

	#[must_use]
	pub fn with_location(mut self, location: impl Into<String>) -> Self {
		self.location = location.into();
		self
	}

	pub fn set_location(&mut self, location: impl Into<String>) {
		self.location = location.into();
	}

	/// Moves the clock reported by [`Dom::now_ms`] forward.
	pub fn advance_clock(&mut self, ms: f64) {
		self.clock += ms;
	}

	/// Sets the live `value` property, as typing into a control would.
	pub fn set_value(&mut self, node: &NodeId, value: impl Into<String>) {
		self.slots[node.index()].value = Some(value.into());
	}

	pub fn set_checked(&mut self, node: &NodeId, checked: bool) {
		self.slots[node.index()].checked = Some(checked);
	}

	pub fn set_selected(&mut self, node: &NodeId, selected: bool) {
		self.slots[node.index()].selected = Some(selected);
	}

	/// Custom events dispatched so far, oldest first.
	#[must_use]
	pub fn events(&self) -> &[DispatchedEvent] {
		&self.events
	}

	/// Takes ownership of the dispatched events, leaving the log empty.
	pub fn take_events(&mut self) -> Vec<DispatchedEvent> {
		core::mem::take(&mut self.events)
	}

	/// Parses `html` as detached nodes (of any kind) and returns them in order.
	pub fn parse_fragment(&mut self, html: &str) -> Vec<NodeId> {
		let holder = self.push(Data::Document, None);
		self.build(holder, parse::tokenize(html));
		let nodes = core::mem::take(&mut self.slots[holder.index()].children);
		for node in &nodes {
			self.slots[node.index()].parent = None;
		}
		nodes
	}

	/// Removes `node` from its parent, keeping it in the arena.
	pub fn detach(&mut self, node: &NodeId) {
		if let Some(parent) = self.slots[node.index()].parent.take() {
			self.slots[parent.index()].children.retain(|child| child != node);
		}
	}

	pub fn append_child(&mut self, parent: &NodeId, child: &NodeId) {
		self.detach(child);
		self.slots[child.index()].parent = Some(*parent);
		self.slots[parent.index()].children.push(*child);
	}

	/// Serializes `node` including its own tag.
	#[must_use]
	pub fn outer_html(&self, node: &NodeId) -> String {
		let mut out = String::new();
		self.serialize(*node, &mut out);
		out
	}

	/// Serializes the whole document.
	#[must_use]
	pub fn html(&self) -> String {
		self.inner_html(&NodeId::DOCUMENT)
	}

	fn push(&mut self, data: Data, parent: Option<NodeId>) -> NodeId {
		#[allow(clippy::cast_possible_truncation)]
		let id = NodeId(self.slots.len() as u32);
		self.slots.push(Slot {
			data,
			parent,
			children: Vec::new(),
			value: None,
			checked: None,
			selected: None,
		});
		if let Some(parent) = parent {
			self.slots[parent.index()].children.push(id);
		}
		id
	}

	fn element_name(&self, node: NodeId) -> Option<&str> {
		match &self.slots[node.index()].data {
			Data::Element { name, .. } => Some(name.as_str()),
			_ => None,
		}
	}

	fn build(&mut self, root: NodeId, tokens: Vec<Token>) {
		let mut open = vec![root];
		for token in tokens {
			let top = *open.last().unwrap_or(&root);
			match token {
				Token::Doctype(_) => (),
				Token::Comment(text) => {
					self.push(Data::Comment(text), Some(top));
				}
				Token::Text(text) => {
					self.push(Data::Text(text), Some(top));
				}
				Token::StartTag { name, attributes, self_closing } => {
					let mut parent = top;
					if open.len() > 1 && parse::SELF_NESTING_FORBIDDEN.contains(&name.as_str()) && self.element_name(parent) == Some(name.as_str()) {
						open.pop();
						parent = *open.last().unwrap_or(&root);
					}
					let void = parse::is_void(&name);
					let element = self.push(Data::Element { name, attributes }, Some(parent));
					if !void && !self_closing {
						open.push(element);
					}
				}
				Token::EndTag(name) => {
					// Index 0 is `root`, which is never closed.
					let matching = open.iter().skip(1).rposition(|&node| self.element_name(node) == Some(name.as_str()));
					match matching {
						Some(position) => open.truncate(position + 1),
						None => trace!("Ignoring unmatched end tag </{}>.", name),
					}
				}
			}
		}
	}

	fn serialize(&self, node: NodeId, out: &mut String) {
		let slot = &self.slots[node.index()];
		match &slot.data {
			Data::Document => self.serialize_children(node, out),
			Data::Text(text) => {
				let raw = slot.parent.and_then(|parent| self.element_name(parent)).map_or(false, parse::is_raw_text);
				if raw {
					out.push_str(text);
				} else {
					parse::escape_text(text, out);
				}
			}
			Data::Comment(text) => {
				out.push_str("<!--");
				out.push_str(text);
				out.push_str("-->");
			}
			Data::Element { name, attributes } => {
				out.push('<');
				out.push_str(name);
				for (attribute, value) in attributes {
					out.push(' ');
					out.push_str(attribute);
					out.push_str("=\"");
					parse::escape_attribute(value, out);
					out.push('"');
				}
				out.push('>');
				if !parse::is_void(name) {
					self.serialize_children(node, out);
					out.push_str("</");
					out.push_str(name);
					out.push('>');
				}
			}
		}
	}

	fn serialize_children(&self, node: NodeId, out: &mut String) {
		for &child in &self.slots[node.index()].children {
			self.serialize(child, out);
		}
	}

	fn collect_text(&self, node: NodeId, out: &mut String) {
		for &child in &self.slots[node.index()].children {
			match &self.slots[child.index()].data {
				Data::Text(text) => out.push_str(text),
				Data::Element { .. } => self.collect_text(child, out),
				Data::Comment(_) | Data::Document => (),
			}
		}
	}

	fn first_descendant(&self, mut predicate: impl FnMut(NodeId) -> bool) -> Option<NodeId> {
		self.descendants().into_iter().find(|&node| predicate(node))
	}
}

impl Dom for MemoryDocument {
	type Node = NodeId;

	fn location(&self) -> String {
		self.location.clone()
	}

	fn now_ms(&self) -> f64 {
		self.clock
	}

	fn document_element(&self) -> Option<NodeId> {
		self.slots[NodeId::DOCUMENT.index()].children.iter().copied().find(|&child| self.element_name(child).is_some())
	}

	fn body(&self) -> Option<NodeId> {
		self.first_descendant(|node| self.element_name(node) == Some("body"))
	}

	fn element_by_id(&self, id: &str) -> Option<NodeId> {
		self.first_descendant(|node| self.attribute(&node, "id").as_deref() == Some(id))
	}

	fn query_selector_all(&self, selector: &str) -> Vec<NodeId> {
		match selector.parse::<SelectorList>() {
			Ok(selector) => self.descendants().into_iter().filter(|node| selector.matches(self, node)).collect(),
			Err(error) => {
				warn!("Invalid selector: {}", error);
				Vec::new()
			}
		}
	}

	fn parent(&self, node: &NodeId) -> Option<NodeId> {
		self.slots[node.index()].parent.filter(|&parent| self.element_name(parent).is_some())
	}

	fn children(&self, node: &NodeId) -> Vec<NodeId> {
		self.slots[node.index()].children.iter().copied().filter(|&child| self.element_name(child).is_some()).collect()
	}

	fn tag_name(&self, node: &NodeId) -> String {
		self.element_name(*node).unwrap_or_default().to_owned()
	}

	fn attributes(&self, node: &NodeId) -> Vec<(String, String)> {
		match &self.slots[node.index()].data {
			Data::Element { attributes, .. } => attributes.clone(),
			_ => Vec::new(),
		}
	}

	fn set_attribute(&mut self, node: &NodeId, name: &str, value: &str) {
		if let Data::Element { attributes, .. } = &mut self.slots[node.index()].data {
			match attributes.iter_mut().find(|(n, _)| n == name) {
				Some((_, existing)) => value.clone_into(existing),
				None => attributes.push((name.to_owned(), value.to_owned())),
			}
		}
	}

	fn is_connected(&self, node: &NodeId) -> bool {
		let mut current = *node;
		loop {
			if current == NodeId::DOCUMENT {
				return true;
			}
			match self.slots[current.index()].parent {
				Some(parent) => current = parent,
				None => return false,
			}
		}
	}

	fn value(&self, node: &NodeId) -> Option<String> {
		let slot = &self.slots[node.index()];
		match self.element_name(*node)? {
			"input" => slot.value.clone().or_else(|| self.attribute(node, "value")).or_else(|| {
				let checkable = matches!(self.attribute(node, "type").as_deref(), Some("checkbox" | "radio"));
				Some(if checkable { "on".to_owned() } else { String::new() })
			}),
			"button" => slot.value.clone().or_else(|| self.attribute(node, "value")).or_else(|| Some(String::new())),
			"option" => slot.value.clone().or_else(|| self.attribute(node, "value")).or_else(|| Some(self.text_content(node))),
			"textarea" => slot.value.clone().or_else(|| Some(self.text_content(node))),
			"select" => {
				if let Some(value) = &slot.value {
					return Some(value.clone());
				}
				let options = self.query_options(*node);
				let selected = options.iter().find(|option| self.selected(option)).or_else(|| options.first());
				Some(selected.and_then(|option| self.value(option)).unwrap_or_default())
			}
			_ => None,
		}
	}

	fn checked(&self, node: &NodeId) -> bool {
		self.slots[node.index()].checked.unwrap_or_else(|| self.attribute(node, "checked").is_some())
	}

	fn selected(&self, node: &NodeId) -> bool {
		self.slots[node.index()].selected.unwrap_or_else(|| self.attribute(node, "selected").is_some())
	}

	fn inner_html(&self, node: &NodeId) -> String {
		let mut out = String::new();
		self.serialize_children(*node, &mut out);
		out
	}

	fn text_content(&self, node: &NodeId) -> String {
		let mut out = String::new();
		self.collect_text(*node, &mut out);
		out
	}

	fn set_inner_html(&mut self, node: &NodeId, html: &str) {
		let old = core::mem::take(&mut self.slots[node.index()].children);
		for child in old {
			self.slots[child.index()].parent = None;
		}
		for child in self.parse_fragment(html) {
			self.append_child(node, &child);
		}
	}

	fn replace_node(&mut self, old: &NodeId, new: &NodeId) {
		if old == new {
			return;
		}
		self.detach(new);
		let parent = match self.slots[old.index()].parent.take() {
			Some(parent) => parent,
			None => return warn!("Cannot replace a detached node."),
		};
		let siblings = &mut self.slots[parent.index()].children;
		if let Some(position) = siblings.iter().position(|child| child == old) {
			siblings[position] = *new;
		}
		self.slots[new.index()].parent = Some(parent);
	}

	fn dispatch_event(&mut self, node: &NodeId, name: &str, detail: &serde_json::Value) {
		self.events.push(DispatchedEvent {
			target: *node,
			name: name.to_owned(),
			detail: detail.clone(),
		});
	}

	/// Unlike live documents, a parsed fragment may have several top-level elements. All of them are walked.
	fn descendants(&self) -> Vec<NodeId> {
		let mut out = Vec::new();
		let mut stack: Vec<NodeId> = self.slots[NodeId::DOCUMENT.index()].children.iter().rev().copied().filter(|&child| self.element_name(child).is_some()).collect();
		while let Some(node) = stack.pop() {
			out.push(node);
			stack.extend(self.children(&node).into_iter().rev());
		}
		out
	}
}

impl MemoryDocument {
	fn query_options(&self, select: NodeId) -> Vec<NodeId> {
		let mut options = Vec::new();
		let mut stack = vec![select];
		while let Some(node) = stack.pop() {
			for child in self.children(&node).into_iter().rev() {
				if self.element_name(child) == Some("option") {
					options.push(child);
				} else {
					stack.push(child);
				}
			}
		}
		options.sort();
		options
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn parse_and_serialize() {
		let html = r#"<!DOCTYPE html><html><head><title>a &amp; b</title></head><body><ul><li>one<li>two</ul><br><p class="x">1 &lt; 2</p></body></html>"#;
		let document = MemoryDocument::parse(html);
		let body = document.body().unwrap();
		assert_eq!(document.inner_html(&body), r#"<ul><li>one</li><li>two</li></ul><br><p class="x">1 &lt; 2</p>"#);
		assert_eq!(document.query_selector_all("li").len(), 2);
	}

	#[test]
	fn replaced_nodes_are_disconnected() {
		let mut document = MemoryDocument::parse(r#"<html><body><div id="a"><span id="b"></span></div></body></html>"#);
		let a = document.element_by_id("a").unwrap();
		let b = document.element_by_id("b").unwrap();
		document.set_inner_html(&a, "<i id=\"c\"></i>");
		assert!(!document.is_connected(&b));
		assert_eq!(document.element_by_id("b"), None);
		assert!(document.is_connected(&document.element_by_id("c").unwrap()));
	}

	#[test]
	fn form_values() {
		let mut document = MemoryDocument::parse(
			r#"<html><body><input id="i" value="x"><textarea id="t">hello</textarea><select id="s"><option>a</option><option value="B" selected>b</option></select></body></html>"#,
		);
		let input = document.element_by_id("i").unwrap();
		assert_eq!(document.value(&input).as_deref(), Some("x"));
		document.set_value(&input, "y");
		assert_eq!(document.value(&input).as_deref(), Some("y"));
		assert_eq!(document.value(&document.element_by_id("t").unwrap()).as_deref(), Some("hello"));
		assert_eq!(document.value(&document.element_by_id("s").unwrap()).as_deref(), Some("B"));
	}
}
