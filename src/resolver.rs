//! Finding "the same element" again after the page changed underneath it.
//!
//! A [`Locator`] is a structural path, cheap and exact as long as the tree shape holds.
//! A [`Fingerprint`] is a content snapshot, which survives the element being replaced by an equivalent one elsewhere.
//!
//! Two structurally different elements with equal fingerprints are indistinguishable here:
//! [`find_by_fingerprint`] returns the first one in document order.

use crate::{dom::Dom, selector};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{instrument, trace};

/// Derived keys in [`Fingerprint::attributes`] that reflect live state rather than markup.
pub const VOLATILE_KEYS: &[&str] = &["value", "checked", "selected"];

/// An XPath-like structural path to one element.
///
/// Either rooted at the document (`/html/body/div[2]/span[1]`) or at the nearest ancestor-or-self carrying an id
/// (`//*[@id='todo-3']/input[1]`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Locator(String);

impl Locator {
	#[must_use]
	pub fn as_str(&self) -> &str {
		&self.0
	}

	/// A locator from a previously serialized path. Malformed paths simply never resolve.
	#[must_use]
	pub fn from_path(path: impl Into<String>) -> Self {
		Self(path.into())
	}
}

impl core::fmt::Display for Locator {
	fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
		f.write_str(&self.0)
	}
}

/// Attribute snapshot of an element, captured when an invocation is sent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Fingerprint {
	pub tag_name: String,
	/// Every markup attribute plus the derived [`VOLATILE_KEYS`].
	pub attributes: BTreeMap<String, String>,
	/// Checked/selected values of a same-`name` checkbox group or a multi-select.
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub values: Vec<String>,
	#[serde(default, skip_serializing_if = "Option::is_none", rename = "innerHTML")]
	pub inner_html: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub text_content: Option<String>,
}

impl Fingerprint {
	#[must_use]
	pub fn get(&self, name: &str) -> Option<&str> {
		self.attributes.get(name).map(String::as_str)
	}

	/// Whether `key` can be used to look the element up again.
	#[must_use]
	pub fn is_stable_key(key: &str) -> bool {
		!VOLATILE_KEYS.contains(&key) && !key.contains('.') && !key.contains(':')
	}

	/// A selector matching elements with this tag and all stable attributes.
	#[must_use]
	pub fn to_selector(&self) -> String {
		let mut selector = if self.tag_name.is_empty() { "*".to_owned() } else { selector::escape_ident(&self.tag_name) };
		for (key, value) in self.attributes.iter().filter(|(key, _)| Self::is_stable_key(key)) {
			selector.push('[');
			selector.push_str(&selector::escape_ident(key));
			selector.push_str("=\"");
			selector.push_str(&selector::escape_quoted(value));
			selector.push_str("\"]");
		}
		selector
	}
}

#[instrument(skip(dom))]
pub fn locate<D: Dom>(dom: &D, node: &D::Node) -> Locator {
	let mut steps = Vec::new();
	let mut current = node.clone();
	let root = loop {
		// An id with both quote kinds can't be written as an id root.
		if let Some(id) = dom.attribute(&current, "id").filter(|id| !id.is_empty() && !(id.contains('\'') && id.contains('"'))) {
			break id_root(&id);
		}
		let tag = dom.tag_name(&current);
		match (tag.as_str(), dom.parent(&current)) {
			("html", _) => break "/html".to_owned(),
			("body", _) => break "/html/body".to_owned(),
			(_, None) => break String::new(),
			(_, Some(parent)) => {
				let index = dom.children(&parent).into_iter().take_while(|sibling| *sibling != current).filter(|sibling| dom.tag_name(sibling) == tag).count() + 1;
				steps.push(format!("{}[{}]", tag, index));
				current = parent;
			}
		}
	};

	let mut path = root;
	for step in steps.into_iter().rev() {
		path.push('/');
		path.push_str(&step);
	}
	trace!(%path, "Located element.");
	Locator(path)
}

fn id_root(id: &str) -> String {
	if id.contains('\'') {
		format!("//*[@id=\"{}\"]", id)
	} else {
		format!("//*[@id='{}']", id)
	}
}

/// Resolves `locator` to the single element it describes, if it still exists.
pub fn resolve<D: Dom>(dom: &D, locator: &Locator) -> Option<D::Node> {
	let path = locator.as_str();
	let (mut current, rest) = if let Some(quoted) = path.strip_prefix("//*[@id=") {
		let quote = quoted.chars().next().filter(|&c| c == '\'' || c == '"')?;
		let body = &quoted[1..];
		let end = body.find(quote)?;
		let rest = body[end + 1..].strip_prefix(']')?;
		(dom.element_by_id(&body[..end])?, rest)
	} else if let Some(rest) = path.strip_prefix("/html") {
		(dom.document_element().filter(|html| dom.tag_name(html) == "html")?, rest)
	} else {
		return None;
	};

	for step in rest.split('/').filter(|step| !step.is_empty()) {
		let (tag, index) = match step.split_once('[') {
			Some((tag, index)) => (tag, index.strip_suffix(']')?.parse::<usize>().ok()?),
			None => (step, 1),
		};
		current = dom.children(&current).into_iter().filter(|child| dom.tag_name(child) == tag).nth(index.checked_sub(1)?)?;
	}
	Some(current)
}

/// Captures every attribute of `node` plus its live form state.
#[instrument(skip(dom))]
pub fn fingerprint<D: Dom>(dom: &D, node: &D::Node) -> Fingerprint {
	let tag_name = dom.tag_name(node);
	let mut attributes: BTreeMap<String, String> = dom.attributes(node).into_iter().collect();
	let mut values = Vec::new();

	let input_type = dom.attribute(node, "type").unwrap_or_default().to_ascii_lowercase();
	let name = dom.attribute(node, "name").filter(|name| !name.is_empty());
	let mut value = dom.value(node);

	if tag_name == "input" && input_type == "checkbox" {
		if let Some(name) = &name {
			let group = dom.query_selector_all(&format!("input[type=\"checkbox\"][name=\"{}\"]", selector::escape_quoted(name)));
			if group.len() > 1 {
				values = group.iter().filter(|member| dom.checked(member)).filter_map(|member| dom.value(member)).collect();
				value = Some(values.join(","));
			}
		}
	} else if tag_name == "select" && dom.attribute(node, "multiple").is_some() {
		values = options(dom, node).iter().filter(|option| dom.selected(option)).filter_map(|option| dom.value(option)).collect();
		value = Some(values.join(","));
	}

	if let Some(value) = value {
		attributes.insert("value".to_owned(), value);
	}
	attributes.insert("checked".to_owned(), dom.checked(node).to_string());
	attributes.insert("selected".to_owned(), dom.selected(node).to_string());

	Fingerprint {
		tag_name,
		attributes,
		values,
		inner_html: None,
		text_content: None,
	}
}

fn options<D: Dom>(dom: &D, select: &D::Node) -> Vec<D::Node> {
	let mut out = Vec::new();
	for child in dom.children(select) {
		if dom.tag_name(&child) == "option" {
			out.push(child);
		} else {
			out.extend(options(dom, &child));
		}
	}
	out
}

/// Looks an element up by the stable part of its fingerprint, falling back to its id.
#[instrument(skip(dom, fingerprint), fields(tag = %fingerprint.tag_name))]
pub fn find_by_fingerprint<D: Dom>(dom: &D, fingerprint: &Fingerprint) -> Option<D::Node> {
	dom.query_selector(&fingerprint.to_selector()).or_else(|| fingerprint.get("id").filter(|id| !id.is_empty()).and_then(|id| dom.element_by_id(id)))
}

/// [`resolve`]s `locator` if it still names a connected element, otherwise tries [`find_by_fingerprint`].
pub fn relocate<D: Dom>(dom: &D, locator: &Locator, fingerprint: Option<&Fingerprint>) -> Option<D::Node> {
	resolve(dom, locator).filter(|node| dom.is_connected(node)).or_else(|| fingerprint.and_then(|fingerprint| find_by_fingerprint(dom, fingerprint)))
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::dom::MemoryDocument;

	const PAGE: &str = r#"<html><body><main><p>one</p><div id="list"><span>a</span><span>b</span></div></main><div><input type="checkbox" name="tags" value="x" checked><input type="checkbox" name="tags" value="y"><input type="checkbox" name="tags" value="z" checked><select id="m" multiple><option selected>1</option><option>2</option><option selected>3</option></select></div></body></html>"#;

	#[test]
	fn locators() {
		let document = MemoryDocument::parse(PAGE);
		let spans = document.query_selector_all("span");
		assert_eq!(locate(&document, &spans[1]).as_str(), "//*[@id='list']/span[2]");
		let p = document.query_selector("p").unwrap();
		assert_eq!(locate(&document, &p).as_str(), "/html/body/main[1]/p[1]");
		for node in document.descendants() {
			assert_eq!(resolve(&document, &locate(&document, &node)), Some(node));
		}
		assert_eq!(resolve(&document, &Locator::from_path("/html/body/main[1]/p[2]")), None);
		assert_eq!(resolve(&document, &Locator::from_path("garbage")), None);
	}

	#[test]
	fn group_values() {
		let document = MemoryDocument::parse(PAGE);
		let checkbox = document.query_selector("input").unwrap();
		let fingerprint = fingerprint(&document, &checkbox);
		assert_eq!(fingerprint.values, ["x", "z"]);
		assert_eq!(fingerprint.get("value"), Some("x,z"));
		assert_eq!(fingerprint.get("checked"), Some("true"));

		let select = document.element_by_id("m").unwrap();
		assert_eq!(super::fingerprint(&document, &select).values, ["1", "3"]);
	}

	#[test]
	fn live_state_is_not_part_of_the_lookup() {
		let mut document = MemoryDocument::parse(r#"<html><body><input name="q" value="a"></body></html>"#);
		let input = document.query_selector("input").unwrap();
		let fingerprint = fingerprint(&document, &input);
		assert_eq!(fingerprint.get("value"), Some("a"));
		assert_eq!(fingerprint.to_selector(), r#"input[name="q"]"#);

		document.set_value(&input, "typed");
		assert_eq!(find_by_fingerprint(&document, &fingerprint), Some(input));
	}

	#[test]
	fn relocation_falls_back_to_the_fingerprint() {
		let mut document = MemoryDocument::parse(r#"<html><body><ul><li class="item">a</li><li class="item" data-n="2">b</li></ul></body></html>"#);
		let b = document.query_selector_all("li")[1];
		let locator = locate(&document, &b);
		let fingerprint = fingerprint(&document, &b);

		let ul = document.query_selector("ul").unwrap();
		document.set_inner_html(&ul, r#"<li class="item" data-n="2">b</li>"#);
		let moved = relocate(&document, &locator, Some(&fingerprint)).unwrap();
		assert_ne!(moved, b);
		assert_eq!(document.text_content(&moved), "b");
		assert_eq!(relocate(&document, &locator, None), None);
	}

	#[test]
	fn equal_fingerprints_resolve_to_the_first_match() {
		let mut document = MemoryDocument::parse(r#"<html><body><ul><li class="item">a</li><li class="item">b</li><li class="item">c</li></ul></body></html>"#);
		let c = document.query_selector_all("li")[2];
		let locator = locate(&document, &c);
		let fingerprint = fingerprint(&document, &c);

		let ul = document.query_selector("ul").unwrap();
		document.set_inner_html(&ul, r#"<li class="item">x</li><li class="item">y</li>"#);
		let found = relocate(&document, &locator, Some(&fingerprint)).unwrap();
		assert_eq!(document.text_content(&found), "x");
	}

	#[test]
	fn ids_with_both_quotes_are_located_structurally() {
		let mut document = MemoryDocument::parse(r#"<html><body><div><span>a</span></div><div><span>b</span></div></body></html>"#);
		let b = document.query_selector_all("span")[1];
		document.set_attribute(&b, "id", "it's \"b\"");
		let locator = locate(&document, &b);
		assert_eq!(locator.as_str(), "/html/body/div[2]/span[1]");
		assert_eq!(resolve(&document, &locator), Some(b));

		let a = document.query_selector("span").unwrap();
		document.set_attribute(&a, "id", "it's");
		let locator = locate(&document, &a);
		assert_eq!(locator.as_str(), r#"//*[@id="it's"]"#);
		assert_eq!(resolve(&document, &locator), Some(a));
	}
}
