//! Declarative wiring.
//!
//! `data-reflex="click->Counter#increment"` on an element makes [`scan`] add the matching action descriptor
//! (`click->reflex#perform`) to its `data-action` and make sure a reflex controller is in scope. Scanning is
//! idempotent, so it can be rerun after every patch.

use crate::{config::ClientConfig, dom::{self, Dom}, selector};
use tracing::trace;

/// One `event->Handler#method` entry of a `data-reflex` attribute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Binding {
	/// [`None`] means the element's [`default_event`].
	pub event: Option<String>,
	pub target: String,
}

/// Parses a whitespace-separated list of `[event->]Handler#method` entries.
#[must_use]
pub fn parse_bindings(value: &str) -> Vec<Binding> {
	value
		.split_ascii_whitespace()
		.filter_map(|entry| match entry.split_once("->") {
			Some((event, target)) if !event.is_empty() && !target.is_empty() => Some(Binding {
				event: Some(event.to_owned()),
				target: target.to_owned(),
			}),
			Some(_) => {
				trace!("Skipping malformed reflex binding {:?}.", entry);
				None
			}
			None => Some(Binding {
				event: None,
				target: entry.to_owned(),
			}),
		})
		.collect()
}

/// The event an element triggers its reflex on when the binding doesn't name one.
pub fn default_event<D: Dom>(dom: &D, node: &D::Node) -> &'static str {
	match dom.tag_name(node).as_str() {
		"form" => "submit",
		"select" => "change",
		"textarea" => "input",
		"input" => match dom.attribute(node, "type").unwrap_or_default().to_ascii_lowercase().as_str() {
			"checkbox" | "radio" | "file" => "change",
			"submit" | "button" | "reset" | "image" => "click",
			_ => "input",
		},
		_ => "click",
	}
}

fn descriptor(event: &str, config: &ClientConfig) -> String {
	format!("{}->{}#perform", event, config.controller_identifier)
}

/// The nearest inclusive ancestor with the reflex controller attached.
pub fn controller_for<D: Dom>(dom: &D, config: &ClientConfig, node: &D::Node) -> Option<D::Node> {
	dom.closest(node, |dom, candidate| {
		dom.attribute(candidate, &config.controller_attribute).map_or(false, |controllers| dom::has_token(&controllers, &config.controller_identifier))
	})
}

/// The reflex target `event` on `node` invokes, if it has been wired by [`scan`].
pub fn wired_target<D: Dom>(dom: &D, config: &ClientConfig, node: &D::Node, event: &str) -> Option<String> {
	let actions = dom.attribute(node, &config.action_attribute)?;
	if !dom::has_token(&actions, &descriptor(event, config)) {
		return None;
	}
	let fallback = default_event(dom, node);
	parse_bindings(&dom.attribute(node, &config.reflex_attribute)?)
		.into_iter()
		.find(|binding| binding.event.as_deref().unwrap_or(fallback) == event)
		.map(|binding| binding.target)
}

/// Wires every element carrying the reflex attribute. Returns how many elements were changed.
pub fn scan<D: Dom>(dom: &mut D, config: &ClientConfig) -> usize {
	let nodes = dom.query_selector_all(&format!("[{}]", selector::escape_ident(&config.reflex_attribute)));
	let mut changed = 0;
	for node in nodes {
		let mut touched = false;

		let bindings = parse_bindings(&dom.attribute(&node, &config.reflex_attribute).unwrap_or_default());
		let fallback = default_event(dom, &node);
		let mut actions = dom.attribute(&node, &config.action_attribute).unwrap_or_default();
		for binding in &bindings {
			let descriptor = descriptor(binding.event.as_deref().unwrap_or(fallback), config);
			if !dom::has_token(&actions, &descriptor) {
				if !actions.trim().is_empty() {
					actions.push(' ');
				}
				actions.push_str(&descriptor);
				touched = true;
			}
		}
		if touched {
			dom.set_attribute(&node, &config.action_attribute, actions.trim());
		}

		if controller_for(dom, config, &node).is_none() {
			let mut controllers = dom.attribute(&node, &config.controller_attribute).unwrap_or_default();
			if !controllers.trim().is_empty() {
				controllers.push(' ');
			}
			controllers.push_str(&config.controller_identifier);
			dom.set_attribute(&node, &config.controller_attribute, controllers.trim());
			touched = true;
		}

		if touched {
			trace!(?node, "Wired reflex element.");
			changed += 1;
		}
	}
	changed
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::dom::MemoryDocument;

	#[test]
	fn bindings() {
		assert_eq!(
			parse_bindings(" click->Counter#increment  Todo#toggle ->x "),
			[
				Binding {
					event: Some("click".to_owned()),
					target: "Counter#increment".to_owned()
				},
				Binding {
					event: None,
					target: "Todo#toggle".to_owned()
				},
			]
		);
	}

	#[test]
	fn defaults_by_element() {
		let document = MemoryDocument::parse(
			r#"<html><body><form id="f"></form><input id="t"><input id="c" type="checkbox"><select id="s"></select><textarea id="a"></textarea><a id="l"></a></body></html>"#,
		);
		let event = |id| default_event(&document, &document.element_by_id(id).unwrap());
		assert_eq!(event("f"), "submit");
		assert_eq!(event("t"), "input");
		assert_eq!(event("c"), "change");
		assert_eq!(event("s"), "change");
		assert_eq!(event("a"), "input");
		assert_eq!(event("l"), "click");
	}
}
