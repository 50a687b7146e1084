mod common;

use common::{record_stages, stages, Fixture, TestClient};
use reflex_dom::{
	client::{Executor, LifecycleStage::*, Outcome, PendingReflex, ReplaceExecutor},
	dom::{Dom, MemoryDocument},
	envelope::InvokeOptions,
	error::ExecuteError,
	protocol::{mark_last_of_batch, MorphMode, Operation, OperationKind, Reply, Subject},
};
use serde_json::json;
use std::{cell::RefCell, rc::Rc};

/// Invokes `target` from the increment button and returns the raw reply, undelivered.
fn reply_for(fixture: &Fixture, client: &mut TestClient, target: &str, args: Vec<serde_json::Value>, options: InvokeOptions<reflex_dom::dom::NodeId>) -> (PendingReflex, Reply) {
	fixture.hub.hold();
	let button = client.dom().element_by_id("increment").unwrap();
	let pending = client.invoke(&button, target, args, options);
	let mut held = fixture.hub.take_pending();
	fixture.hub.release();
	assert_eq!(held.len(), 1);
	let (stream, message) = held.remove(0);
	assert_eq!(stream, common::SESSION);
	client.inbox().push(message.clone());
	(pending, serde_json::from_str(&message).unwrap())
}

#[test]
fn page_mode_extracts_each_selector() {
	let fixture = Fixture::new();
	let mut client = fixture.client();
	let options = InvokeOptions {
		selectors: Some(vec!["#count".to_owned(), "#missing".to_owned(), "#sidebar".to_owned()]),
		..InvokeOptions::default()
	};
	let (mut pending, reply) = reply_for(&fixture, &mut client, "Counter#increment", Vec::new(), options);

	assert_eq!(reply.operations.len(), 2);
	assert!(reply.operations.iter().all(|operation| operation.kind == OperationKind::ReplaceChildren && operation.morph_mode == MorphMode::Page));
	assert_eq!(reply.operations[0].selector.as_deref(), Some("#count"));
	assert_eq!(reply.operations[0].html.as_deref(), Some("1"));
	assert_eq!(reply.operations[1].selector.as_deref(), Some("#sidebar"));
	assert_eq!(reply.operations.iter().filter(|operation| operation.is_last_of_batch).count(), 1);
	assert!(reply.operations[1].is_last_of_batch);
	assert!(reply.operations.iter().all(|operation| operation.correlation_id.as_ref() == Some(pending.correlation_id())));

	client.pump();
	assert_eq!(pending.try_result().unwrap().outcome, Outcome::Success);
	assert_eq!(client.dom().text_content(&client.dom().element_by_id("count").unwrap()), "1");
}

#[test]
fn page_mode_without_any_selector_match_is_nothing() {
	let fixture = Fixture::new();
	let mut client = fixture.client();
	let log = record_stages(&mut client);
	let options = InvokeOptions {
		selectors: Some(vec!["#missing".to_owned()]),
		..InvokeOptions::default()
	};
	let (mut pending, reply) = reply_for(&fixture, &mut client, "Counter#increment", Vec::new(), options);

	assert_eq!(reply.operations.len(), 1);
	assert_eq!(reply.operations[0].kind, OperationKind::None);
	assert_eq!(reply.operations[0].subject(), Some(Subject::Nothing));

	client.pump();
	assert_eq!(stages(&log), [Before, Nothing, After, Finalize]);
	assert_eq!(pending.try_result().unwrap().outcome, Outcome::Nothing);
}

#[test]
fn data_reflex_root_picks_the_patch_regions() {
	let fixture = Fixture::new();
	let mut client = fixture.client();
	let app = client.dom().element_by_id("app").unwrap();
	client.dom_mut().set_attribute(&app, "data-reflex-root", "#count, #sidebar");

	let (_pending, reply) = reply_for(&fixture, &mut client, "Counter#increment", Vec::new(), InvokeOptions::default());
	let selectors: Vec<_> = reply.operations.iter().filter_map(|operation| operation.selector.as_deref()).collect();
	assert_eq!(selectors, ["#count", "#sidebar"]);
}

#[test]
fn selector_mode_morphs_children_of_a_matching_fragment() {
	let fixture = Fixture::new();
	let mut client = fixture.client();
	let (mut pending, reply) = reply_for(&fixture, &mut client, "Counter#patch", Vec::new(), InvokeOptions::default());

	assert_eq!(reply.operations.len(), 1);
	let operation = &reply.operations[0];
	assert_eq!(operation.kind, OperationKind::ReplaceChildren);
	assert_eq!(operation.morph_mode, MorphMode::Selector);
	assert_eq!(operation.html.as_deref(), Some("1"));

	let sidebar = client.dom().element_by_id("sidebar").unwrap();
	client.pump();
	assert_eq!(pending.try_result().unwrap().outcome, Outcome::Success);
	assert_eq!(client.dom().text_content(&client.dom().element_by_id("count").unwrap()), "1");
	// Nothing outside the selector was touched.
	assert_eq!(client.dom().element_by_id("sidebar"), Some(sidebar));
}

#[test]
fn selector_mode_replaces_verbatim_without_a_match() {
	let fixture = Fixture::new();
	let mut client = fixture.client();
	let (_pending, reply) = reply_for(&fixture, &mut client, "Counter#verbatim", Vec::new(), InvokeOptions::default());

	assert_eq!(reply.operations[0].kind, OperationKind::Replace);
	assert_eq!(reply.operations[0].html.as_deref(), Some("just text"));

	client.pump();
	assert_eq!(client.dom().inner_html(&client.dom().element_by_id("count").unwrap()), "just text");
}

#[test]
fn selector_mode_renders_fragments_after_the_handler() {
	let fixture = Fixture::new();
	let mut client = fixture.client();
	let (_pending, reply) = reply_for(&fixture, &mut client, "Counter#partial", vec![json!("count")], InvokeOptions::default());
	assert_eq!(reply.operations[0].html.as_deref(), Some("1"));
}

#[test]
fn fragment_render_failures_are_errors() {
	let fixture = Fixture::new();
	let mut client = fixture.client();
	let (mut pending, reply) = reply_for(&fixture, &mut client, "Counter#partial", vec![json!("nope")], InvokeOptions::default());

	assert_eq!(reply.operations[0].subject(), Some(Subject::Error));
	client.pump();
	match pending.try_result().unwrap().outcome {
		Outcome::Error(message) => assert!(message.contains("no such partial"), "{}", message),
		other => panic!("unexpected outcome {:?}", other),
	}
}

#[test]
fn piggyback_operations_have_no_lifecycle() {
	let fixture = Fixture::new();
	let mut client = fixture.client();
	let log = record_stages(&mut client);
	let (_pending, reply) = reply_for(&fixture, &mut client, "Counter#notify", Vec::new(), InvokeOptions::default());

	assert_eq!(reply.operations.len(), 2);
	assert!(reply.operations[0].is_tagged());
	assert!(!reply.operations[1].is_tagged());
	assert_eq!(reply.operations[1].kind, OperationKind::DispatchEvent);

	client.pump();
	assert_eq!(stages(&log), [Before, Nothing, After, Finalize]);
	let sidebar = client.dom().element_by_id("sidebar").unwrap();
	let notified = client.dom().events().iter().find(|event| event.name == "counter:notified").unwrap();
	assert_eq!(notified.target, sidebar);
	assert_eq!(notified.detail, json!({ "count": 0 }));
}

#[test]
fn resolve_late_still_resolves_once() {
	let fixture = Fixture::new();
	let mut client = fixture.client();
	let options = InvokeOptions {
		resolve_late: Some(true),
		..InvokeOptions::default()
	};
	let (mut pending, _reply) = reply_for(&fixture, &mut client, "Counter#increment", Vec::new(), options);
	client.pump();
	assert_eq!(pending.try_result().unwrap().outcome, Outcome::Success);
	assert!(pending.try_result().is_none());
}

/// Applies operations normally, noting before each one whether the result was already available.
struct Watching {
	pending: Rc<RefCell<PendingReflex>>,
	resolved: bool,
	seen: Rc<RefCell<Vec<bool>>>,
}

impl Executor<MemoryDocument> for Watching {
	fn execute(&mut self, dom: &mut MemoryDocument, operation: &Operation, permanent_attribute: &str) -> Result<(), ExecuteError> {
		self.resolved = self.resolved || self.pending.borrow_mut().try_result().is_some();
		self.seen.borrow_mut().push(self.resolved);
		ReplaceExecutor.execute(dom, operation, permanent_attribute)
	}
}

/// Answers an invocation with three tagged patches between untagged events.
fn availability_per_operation(resolve_late: bool) -> Vec<bool> {
	let fixture = Fixture::new();
	let mut client = fixture.client();
	let options = InvokeOptions {
		resolve_late: Some(resolve_late),
		..InvokeOptions::default()
	};
	let (pending, reply) = reply_for(&fixture, &mut client, "Counter#increment", Vec::new(), options);
	client.inbox().drain();

	let id = reply.operations[0].correlation_id.clone().unwrap();
	let echo = reply.operations[0].echo.clone().unwrap();
	let patch = |selector: &str, html: &str| {
		Operation::new(OperationKind::ReplaceChildren, MorphMode::Selector)
			.with_selector(selector)
			.with_html(html)
			.tagged(id.clone(), echo.clone())
	};
	let mut notice = Operation::new(OperationKind::DispatchEvent, MorphMode::Nothing);
	notice.name = Some("counter:noticed".to_owned());
	let mut operations = vec![notice.clone(), patch("#count", "1"), notice.clone(), patch("#sidebar", "changed"), patch("#items", "<li>c</li>"), notice];
	mark_last_of_batch(&mut operations);

	let pending = Rc::new(RefCell::new(pending));
	let seen = Rc::new(RefCell::new(Vec::new()));
	let mut client = client.with_executor(Box::new(Watching {
		pending: Rc::clone(&pending),
		resolved: false,
		seen: Rc::clone(&seen),
	}));
	client.receive(&serde_json::to_string(&Reply::new(operations)).unwrap());

	assert_eq!(client.dom().text_content(&client.dom().element_by_id("sidebar").unwrap()), "changed");
	assert!(client.registry().is_empty());
	seen.take()
}

#[test]
fn results_resolve_before_the_last_tagged_operation() {
	assert_eq!(availability_per_operation(false), [false, false, false, false, true, true]);
}

#[test]
fn late_results_resolve_after_the_last_tagged_operation() {
	assert_eq!(availability_per_operation(true), [false, false, false, false, false, true]);
}
