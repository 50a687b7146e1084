mod common;

use common::{record_diagnostics, record_stages, stages, Fixture};
use reflex_dom::{
	client::{Diagnostic, LifecycleStage::*, Outcome},
	config::ClientConfig,
	dom::Dom,
	envelope::InvokeOptions,
};

#[test]
fn other_tabs_of_the_session_see_the_lifecycle() {
	let fixture = Fixture::new();
	let mut first = fixture.client();
	let mut second = fixture.client();
	let first_log = record_stages(&mut first);
	let second_log = record_stages(&mut second);

	let button = first.dom().element_by_id("increment").unwrap();
	let mut pending = first.invoke(&button, "Counter#increment", Vec::new(), InvokeOptions::default());
	first.pump();
	second.pump();

	assert_eq!(stages(&first_log), [Before, Success, After, Finalize]);
	assert_eq!(stages(&second_log), [Success, After, Finalize]);
	assert_eq!(pending.try_result().unwrap().outcome, Outcome::Success);

	// Both tabs applied the patch, and neither keeps a record around.
	for client in [&first, &second] {
		assert_eq!(client.dom().text_content(&client.dom().element_by_id("count").unwrap()), "1");
		assert!(client.registry().is_empty());
	}
	assert!(second.registry().is_retired(pending.correlation_id()));
}

#[test]
fn isolated_tabs_ignore_foreign_invocations() {
	let fixture = Fixture::new();
	let mut first = fixture.client();
	let mut second = fixture.client_with(ClientConfig {
		isolate: true,
		..ClientConfig::default()
	});
	let second_log = record_stages(&mut second);

	let button = first.dom().element_by_id("increment").unwrap();
	let _pending = first.invoke(&button, "Counter#increment", Vec::new(), InvokeOptions::default());
	let before = second.dom().html();
	second.pump();

	assert!(stages(&second_log).is_empty());
	assert_eq!(second.dom().html(), before);
	assert!(second.registry().is_empty());
}

#[test]
fn isolated_tabs_still_handle_their_own() {
	let fixture = Fixture::new();
	let mut client = fixture.client_with(ClientConfig {
		isolate: true,
		..ClientConfig::default()
	});
	let log = record_stages(&mut client);

	let button = client.dom().element_by_id("increment").unwrap();
	let _pending = client.invoke(&button, "Counter#increment", Vec::new(), InvokeOptions::default());
	client.pump();
	assert_eq!(stages(&log), [Before, Success, After, Finalize]);
}

#[test]
fn other_sessions_hear_nothing() {
	let fixture = Fixture::new();
	let mut first = fixture.client();
	let document = reflex_dom::dom::MemoryDocument::parse(&common::page(0)).with_location(common::URL);
	let mut stranger = reflex_dom::Client::new(document, fixture.hub.transport("session-2"), ClientConfig::default());

	let button = first.dom().element_by_id("increment").unwrap();
	let _pending = first.invoke(&button, "Counter#increment", Vec::new(), InvokeOptions::default());
	assert_eq!(stranger.pump(), 0);
}

#[test]
fn missing_elements_drop_notifications_but_still_retire() {
	let fixture = Fixture::new();
	let mut client = fixture.client_with(ClientConfig {
		debug: true,
		..ClientConfig::default()
	});
	let log = record_stages(&mut client);
	let diagnostics = record_diagnostics(&mut client);

	let items = client.dom().element_by_id("items").unwrap();
	let item = client.dom().query_selector_all(".item")[1];
	let mut pending = client.invoke(&item, "Counter#noop", Vec::new(), InvokeOptions::default());
	client.dom_mut().set_inner_html(&items, "");
	client.pump();

	assert_eq!(stages(&log), [Before]);
	assert_eq!(pending.try_result().unwrap().outcome, Outcome::Nothing);
	assert!(client.registry().is_empty());
	let missing: Vec<_> = diagnostics
		.borrow()
		.iter()
		.filter_map(|diagnostic| match diagnostic {
			Diagnostic::ElementMissing { stage, .. } => Some(*stage),
			_ => None,
		})
		.collect();
	assert_eq!(missing, [Nothing, After, Finalize]);
}

#[test]
fn replaced_elements_are_found_by_fingerprint() {
	let fixture = Fixture::new();
	let mut client = fixture.client();
	let log = record_stages(&mut client);

	let items = client.dom().element_by_id("items").unwrap();
	let b = client.dom().query_selector_all(".item")[1];
	let _pending = client.invoke(&b, "Counter#noop", Vec::new(), InvokeOptions::default());
	// `b` moves to first position, so its locator (`li[2]`) no longer resolves.
	client.dom_mut().set_inner_html(&items, r#"<li class="item">b</li>"#);
	client.pump();

	let replacement = client.dom().query_selector(".item").unwrap();
	let log = log.borrow();
	assert_eq!(log.len(), 4);
	assert!(log[1..].iter().all(|(_, element)| *element == replacement));
}
