use super::session::Session;
use crate::error::RenderError;
use std::collections::BTreeMap;

/// Everything a re-render may depend on.
#[derive(Debug, Clone, Copy)]
pub struct RenderRequest<'a> {
	pub url: &'a str,
	pub session: &'a Session,
	/// Values the handler exposed via [`ReflexContext::assign`](`super::ReflexContext::assign`).
	pub assigns: &'a serde_json::Map<String, serde_json::Value>,
	pub params: &'a BTreeMap<String, serde_json::Value>,
}

/// The view layer. Produces HTML, knows nothing about reflexes.
pub trait Renderer: Send + Sync {
	/// Renders the whole page at `request.url`.
	///
	/// # Errors
	///
	/// Iff the page could not be rendered.
	fn render_full_page(&self, request: &RenderRequest<'_>) -> Result<String, RenderError>;

	/// Renders the named partial.
	///
	/// # Errors
	///
	/// Iff the fragment is unknown or failed to render.
	fn render_fragment(&self, name: &str, request: &RenderRequest<'_>) -> Result<String, RenderError>;
}
