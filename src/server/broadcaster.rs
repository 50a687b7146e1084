//! Turns a [`DispatchOutcome`] into the reply for one invocation.

use super::{
	dispatcher::{catch_panic, DispatchOutcome, Morph, MorphContent, Status},
	render::{RenderRequest, Renderer},
	session::Session,
};
use crate::{
	dom::{Dom, MemoryDocument},
	envelope::Invocation,
	error::RenderError,
	protocol::{mark_last_of_batch, MorphMode, Operation, OperationKind, Reply, Subject, SERVER_MESSAGE_EVENT},
};
use serde_json::json;
use tracing::{debug, warn};

pub struct Broadcaster<'a> {
	renderer: &'a dyn Renderer,
	protocol_version: &'a str,
}

impl<'a> Broadcaster<'a> {
	#[must_use]
	pub fn new(renderer: &'a dyn Renderer, protocol_version: &'a str) -> Self {
		Self { renderer, protocol_version }
	}

	/// Every operation in the result, except piggyback operations, is tagged with the invocation's correlation id.
	pub fn broadcast(&self, invocation: &Invocation, outcome: &DispatchOutcome, session: &Session) -> Reply {
		let mut operations = match (&outcome.status, &outcome.error) {
			(Status::Error, error) => {
				let message = error.as_ref().map_or_else(|| "reflex failed".to_owned(), ToString::to_string);
				let frame = error.as_ref().and_then(|error| error.frame());
				vec![error_operation(&message, frame.as_deref())]
			}
			(Status::Halted, _) => vec![Operation::new(OperationKind::None, MorphMode::Nothing).with_server_message(Subject::Halted, json!(null))],
			(Status::Success, _) => {
				let request = RenderRequest {
					url: &invocation.url,
					session,
					assigns: &outcome.assigns,
					params: &invocation.params,
				};
				let rendered = match &outcome.morph {
					Morph::Nothing => Ok(vec![nothing()]),
					Morph::Page => self.page(&request, &invocation.selectors),
					Morph::Selectors(morphs) => self.selectors(&request, morphs),
				};
				rendered.unwrap_or_else(|error| {
					warn!("Re-render failed: {}", error);
					vec![error_operation(&error.to_string(), None)]
				})
			}
		};

		let echo = invocation.echo();
		operations = operations.into_iter().map(|operation| operation.tagged(invocation.correlation_id.clone(), echo.clone())).collect();
		mark_last_of_batch(&mut operations);

		if outcome.status != Status::Error {
			operations.extend(outcome.piggyback.iter().cloned());
		}

		Reply {
			protocol_version: self.protocol_version.to_owned(),
			operations,
		}
	}

	/// Renders the whole page and extracts each selector's children from it. Selectors absent from the render are skipped.
	fn page(&self, request: &RenderRequest<'_>, selectors: &[String]) -> Result<Vec<Operation>, RenderError> {
		let html = catch_panic(|| self.renderer.render_full_page(request)).unwrap_or_else(|message| Err(RenderError::Panicked(message)))?;
		let document = MemoryDocument::parse(&html);
		let operations: Vec<_> = selectors
			.iter()
			.filter_map(|selector| match document.query_selector(selector) {
				Some(node) => Some(Operation::new(OperationKind::ReplaceChildren, MorphMode::Page).with_selector(selector.as_str()).with_html(document.inner_html(&node))),
				None => {
					debug!("Selector {:?} is missing from the rendered page.", selector);
					None
				}
			})
			.collect();
		Ok(if operations.is_empty() { vec![nothing()] } else { operations })
	}

	fn selectors(&self, request: &RenderRequest<'_>, morphs: &[(String, MorphContent)]) -> Result<Vec<Operation>, RenderError> {
		let mut operations = Vec::with_capacity(morphs.len());
		for (selector, content) in morphs {
			let html = match content {
				MorphContent::Html(html) => html.clone(),
				MorphContent::Fragment(name) => catch_panic(|| self.renderer.render_fragment(name, request)).unwrap_or_else(|message| Err(RenderError::Panicked(message)))?,
			};
			let fragment = MemoryDocument::parse(&html);
			operations.push(match fragment.query_selector(selector) {
				Some(node) => Operation::new(OperationKind::ReplaceChildren, MorphMode::Selector).with_selector(selector.as_str()).with_html(fragment.inner_html(&node)),
				None => Operation::new(OperationKind::Replace, MorphMode::Selector).with_selector(selector.as_str()).with_html(html),
			});
		}
		Ok(operations)
	}
}

fn nothing() -> Operation {
	Operation::new(OperationKind::None, MorphMode::Nothing).with_server_message(Subject::Nothing, json!(null))
}

fn error_operation(message: &str, frame: Option<&str>) -> Operation {
	let mut operation = Operation::new(OperationKind::DispatchEvent, MorphMode::Nothing).with_server_message(Subject::Error, json!(message));
	operation.name = Some(SERVER_MESSAGE_EVENT.to_owned());
	operation.detail = json!({ "message": message, "frame": frame });
	operation
}
