//! Applying operations to the document.

use crate::{
	dom::Dom,
	error::ExecuteError,
	protocol::{Operation, OperationKind},
	selector,
};
use tracing::trace;

/// Applies one operation. Implementations are free to morph instead of replacing, as long as the resulting
/// document is equivalent.
pub trait Executor<D: Dom> {
	/// # Errors
	///
	/// Iff the operation's target does not exist or the operation is incomplete.
	fn execute(&mut self, dom: &mut D, operation: &Operation, permanent_attribute: &str) -> Result<(), ExecuteError>;
}

/// Replaces content wholesale, except for elements carrying the permanent attribute, which are carried over as-is.
#[derive(Debug, Default, Clone, Copy)]
pub struct ReplaceExecutor;

impl<D: Dom> Executor<D> for ReplaceExecutor {
	fn execute(&mut self, dom: &mut D, operation: &Operation, permanent_attribute: &str) -> Result<(), ExecuteError> {
		match operation.kind {
			OperationKind::None => Ok(()),
			OperationKind::ReplaceChildren | OperationKind::Replace => {
				let selector = operation.selector.as_deref().ok_or(ExecuteError::Incomplete("replace", "selector"))?;
				let html = operation.html.as_deref().ok_or(ExecuteError::Incomplete("replace", "html"))?;
				let target = dom.query_selector(selector).ok_or_else(|| ExecuteError::TargetMissing(selector.to_owned()))?;

				let permanent = if operation.kind == OperationKind::ReplaceChildren {
					permanent_descendants(dom, &target, permanent_attribute)
				} else {
					Vec::new()
				};
				#[cfg(feature = "dangerous-logging")]
				trace!("Replacing {:?} with {:?}.", selector, html);
				dom.set_inner_html(&target, html);
				for (id, old) in permanent {
					match dom.element_by_id(&id) {
						Some(new) => {
							trace!("Keeping permanent element #{}.", id);
							dom.replace_node(&new, &old);
						}
						None => trace!("Permanent element #{} was removed.", id),
					}
				}
				Ok(())
			}
			OperationKind::DispatchEvent => {
				let name = operation.name.as_deref().ok_or(ExecuteError::Incomplete("dispatchEvent", "name"))?;
				let target = match operation.selector.as_deref() {
					Some(selector) => dom.query_selector(selector).ok_or_else(|| ExecuteError::TargetMissing(selector.to_owned()))?,
					None => dom.document_element().ok_or_else(|| ExecuteError::TargetMissing("html".to_owned()))?,
				};
				dom.dispatch_event(&target, name, &operation.detail);
				Ok(())
			}
		}
	}
}

/// Permanent elements below `target` that have an id to find their replacements by.
fn permanent_descendants<D: Dom>(dom: &D, target: &D::Node, attribute: &str) -> Vec<(String, D::Node)> {
	if attribute.is_empty() {
		return Vec::new();
	}
	dom.query_selector_all(&format!("[{}]", selector::escape_ident(attribute)))
		.into_iter()
		.filter(|node| node != target && dom.closest(node, |_, ancestor| ancestor == target).is_some())
		.filter_map(|node| dom.attribute(&node, "id").filter(|id| !id.is_empty()).map(|id| (id, node)))
		.collect()
}
