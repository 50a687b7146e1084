//! The client → server invocation.

use crate::{
	config::ClientConfig,
	dom::Dom,
	protocol::Echo,
	resolver::{self, Fingerprint, Locator},
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Identifies one invocation for its whole life. Generated client-side, echoed verbatim by the server.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrelationId(String);

impl CorrelationId {
	#[must_use]
	pub fn generate() -> Self {
		Self(uuid::Uuid::new_v4().to_string())
	}

	#[must_use]
	pub fn as_str(&self) -> &str {
		&self.0
	}
}

impl From<&str> for CorrelationId {
	fn from(id: &str) -> Self {
		Self(id.to_owned())
	}
}

impl core::fmt::Display for CorrelationId {
	fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
		f.write_str(&self.0)
	}
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct InvocationOptions {
	/// Resolve the result after all operations were applied, instead of when the last one is about to be.
	pub resolve_late: bool,
	pub suppress_logging: bool,
	#[serde(rename = "includeInnerHTML")]
	pub include_inner_html: bool,
	pub include_text_content: bool,
	/// Elements carrying this attribute keep their identity across patches.
	pub permanent_attribute_name: String,
}

/// Client-side knobs for one [`Client::invoke`](`crate::client::Client::invoke`) call.
#[derive(Debug, Clone)]
pub struct InvokeOptions<N> {
	/// Explicit patch regions. Defaults to `data-reflex-root`, then [`ClientConfig::default_selectors`].
	pub selectors: Option<Vec<String>>,
	/// The element bound to the handler. Defaults to the nearest `data-controller` ancestor.
	pub controller: Option<N>,
	pub resolve_late: Option<bool>,
	pub suppress_logging: bool,
	pub include_inner_html: bool,
	pub include_text_content: bool,
	/// Serialized form parameters.
	pub params: BTreeMap<String, serde_json::Value>,
}

impl<N> Default for InvokeOptions<N> {
	fn default() -> Self {
		Self {
			selectors: None,
			controller: None,
			resolve_late: None,
			suppress_logging: false,
			include_inner_html: false,
			include_text_content: false,
			params: BTreeMap::new(),
		}
	}
}

/// One client-initiated action. Immutable once sent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Invocation {
	pub correlation_id: CorrelationId,
	/// `Handler#method`, the method may be omitted.
	pub target: String,
	#[serde(default)]
	pub args: Vec<serde_json::Value>,
	pub attrs: Fingerprint,
	pub element: Locator,
	pub controller: Locator,
	pub selectors: Vec<String>,
	pub url: String,
	pub tab_id: String,
	/// The client's protocol version.
	pub version: String,
	#[serde(default)]
	pub params: BTreeMap<String, serde_json::Value>,
	#[serde(default)]
	pub options: InvocationOptions,
}

impl Invocation {
	/// Snapshots `element` and its surroundings into a new invocation of `target`.
	#[allow(clippy::too_many_arguments)]
	pub fn capture<D: Dom>(dom: &D, config: &ClientConfig, tab_id: &str, element: &D::Node, target: &str, args: Vec<serde_json::Value>, options: InvokeOptions<D::Node>) -> Self {
		let controller = options
			.controller
			.clone()
			.or_else(|| dom.closest(element, |dom, node| dom.attribute(node, &config.controller_attribute).map_or(false, |value| !value.trim().is_empty())))
			.unwrap_or_else(|| element.clone());

		let selectors = options.selectors.clone().unwrap_or_else(|| {
			dom.closest(element, |dom, node| dom.attribute(node, &config.root_attribute).is_some())
				.and_then(|root| dom.attribute(&root, &config.root_attribute))
				.map(|roots| roots.split(',').map(str::trim).filter(|s| !s.is_empty()).map(str::to_owned).collect::<Vec<_>>())
				.filter(|selectors| !selectors.is_empty())
				.unwrap_or_else(|| config.default_selectors.clone())
		});

		let mut attrs = resolver::fingerprint(dom, element);
		if options.include_inner_html {
			attrs.inner_html = Some(dom.inner_html(element));
		}
		if options.include_text_content {
			attrs.text_content = Some(dom.text_content(element));
		}

		Self {
			correlation_id: CorrelationId::generate(),
			target: target.to_owned(),
			args,
			attrs,
			element: resolver::locate(dom, element),
			controller: resolver::locate(dom, &controller),
			selectors,
			url: dom.location(),
			tab_id: tab_id.to_owned(),
			version: config.protocol_version.clone(),
			params: options.params,
			options: InvocationOptions {
				resolve_late: options.resolve_late.unwrap_or(config.resolve_late),
				suppress_logging: options.suppress_logging,
				include_inner_html: options.include_inner_html,
				include_text_content: options.include_text_content,
				permanent_attribute_name: config.permanent_attribute_name.clone(),
			},
		}
	}

	/// The data every tagged reply operation carries back.
	#[must_use]
	pub fn echo(&self) -> Echo {
		Echo {
			target: self.target.clone(),
			url: self.url.clone(),
			tab_id: self.tab_id.clone(),
			element: self.element.clone(),
			controller: self.controller.clone(),
		}
	}
}
