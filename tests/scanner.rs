mod common;

use common::{record_stages, stages, Fixture};
use reflex_dom::{
	client::{LifecycleStage::*, Outcome},
	config::ClientConfig,
	dom::{Dom, MemoryDocument},
	scanner,
};

#[test]
fn scan_wires_elements_once() {
	let mut document = MemoryDocument::parse(
		r#"<html><body><div id="app" data-controller="reflex"><button id="a" data-reflex="Counter#increment">+</button><input id="b" data-reflex="change->Todo#rename blur->Todo#save" data-action="focus->other#thing"></div><a id="c" data-reflex="Nav#go"></a></body></html>"#,
	);
	let config = ClientConfig::default();

	assert_eq!(scanner::scan(&mut document, &config), 3);
	let attribute = |document: &MemoryDocument, id: &str, name: &str| document.attribute(&document.element_by_id(id).unwrap(), name);

	assert_eq!(attribute(&document, "a", "data-action").as_deref(), Some("click->reflex#perform"));
	assert_eq!(attribute(&document, "b", "data-action").as_deref(), Some("focus->other#thing change->reflex#perform blur->reflex#perform"));
	// Inside #app, the existing controller is in scope.
	assert_eq!(attribute(&document, "a", "data-controller"), None);
	// Outside of it, the element becomes its own controller.
	assert_eq!(attribute(&document, "c", "data-controller").as_deref(), Some("reflex"));

	let before = document.html();
	assert_eq!(scanner::scan(&mut document, &config), 0);
	assert_eq!(document.html(), before);
}

#[test]
fn wired_targets() {
	let mut document = MemoryDocument::parse(r#"<html><body><input id="b" data-reflex="change->Todo#rename blur->Todo#save"></body></html>"#);
	let config = ClientConfig::default();
	let input = document.element_by_id("b").unwrap();
	assert_eq!(scanner::wired_target(&document, &config, &input, "blur"), None);

	scanner::scan(&mut document, &config);
	assert_eq!(scanner::wired_target(&document, &config, &input, "blur").as_deref(), Some("Todo#save"));
	assert_eq!(scanner::wired_target(&document, &config, &input, "change").as_deref(), Some("Todo#rename"));
	assert_eq!(scanner::wired_target(&document, &config, &input, "input"), None);
	assert_eq!(scanner::controller_for(&document, &config, &input), Some(input));
}

#[test]
fn events_on_wired_elements_invoke_their_reflex() {
	let fixture = Fixture::new();
	let mut client = fixture.client();
	let log = record_stages(&mut client);
	let button = client.dom().element_by_id("increment").unwrap();

	assert!(client.handle_event(&button, "click").is_none());
	assert_eq!(client.scan(), 1);
	assert!(client.handle_event(&button, "mouseover").is_none());

	let mut pending = client.handle_event(&button, "click").unwrap();
	client.pump();
	assert_eq!(stages(&log), [Before, Success, After, Finalize]);
	assert_eq!(pending.try_result().unwrap().outcome, Outcome::Success);
	assert_eq!(fixture.count(), 1);

	// The patched-in button is unwired until the next scan.
	let button = client.dom().element_by_id("increment").unwrap();
	assert!(client.handle_event(&button, "click").is_none());
	assert_eq!(client.scan(), 1);
	assert!(client.handle_event(&button, "click").is_some());
}
