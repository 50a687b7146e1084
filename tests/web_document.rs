#![cfg(target_arch = "wasm32")]

use reflex_dom::{
	config::ClientConfig,
	dom::Dom,
	resolver, scanner,
	web::WebDocument,
};
use std::{cell::RefCell, rc::Rc};
use wasm_bindgen::{closure::Closure, JsCast};
use wasm_bindgen_test::{wasm_bindgen_test, wasm_bindgen_test_configure};
use web_sys::{window, CustomEvent, HtmlBodyElement};

wasm_bindgen_test_configure!(run_in_browser);

static mut LOG_INITIALIZED: bool = false;

fn setup(html: &str) -> WebDocument {
	unsafe {
		if !LOG_INITIALIZED {
			tracing_wasm::set_as_global_default();
			LOG_INITIALIZED = true;
		}
	}

	let body = window().unwrap().document().unwrap().body().unwrap().dyn_into::<HtmlBodyElement>().unwrap();
	body.set_inner_html(html);
	WebDocument::current().unwrap()
}

#[wasm_bindgen_test]
fn locate_and_resolve() {
	let document = setup(r#"<ul id="todos"><li>a</li><li><input name="done" type="checkbox" checked></li></ul><p>x</p>"#);

	let input = document.query_selector("input").unwrap();
	let locator = resolver::locate(&document, &input);
	assert_eq!(locator.as_str(), "//*[@id='todos']/li[2]/input[1]");
	assert_eq!(resolver::resolve(&document, &locator), Some(input.clone()));

	let fingerprint = resolver::fingerprint(&document, &input);
	assert_eq!(fingerprint.tag_name, "input");
	assert_eq!(fingerprint.get("checked"), Some("true"));
	assert_eq!(resolver::find_by_fingerprint(&document, &fingerprint), Some(input));
}

#[wasm_bindgen_test]
fn scan_and_dispatch() {
	let mut document = setup(r#"<div id="app" data-controller="reflex"><button id="go" data-reflex="Nav#go">go</button></div>"#);
	let config = ClientConfig::default();

	assert_eq!(scanner::scan(&mut document, &config), 1);
	let button = document.element_by_id("go").unwrap();
	assert_eq!(document.attribute(&button, "data-action").as_deref(), Some("click->reflex#perform"));
	assert_eq!(scanner::wired_target(&document, &config, &button, "click").as_deref(), Some("Nav#go"));

	let details = Rc::new(RefCell::new(Vec::new()));
	let listener = {
		let details = Rc::clone(&details);
		Closure::<dyn FnMut(CustomEvent)>::wrap(Box::new(move |event: CustomEvent| {
			details.borrow_mut().push(js_sys::JSON::stringify(&event.detail()).unwrap().as_string().unwrap());
		}))
	};
	let app = document.element_by_id("app").unwrap();
	app.add_event_listener_with_callback("reflex:success", listener.as_ref().unchecked_ref()).unwrap();

	// Bubbles up from the button.
	document.dispatch_event(&button, "reflex:success", &serde_json::json!({ "stage": "success" }));
	assert_eq!(*details.borrow(), [r#"{"stage":"success"}"#]);

	app.remove_event_listener_with_callback("reflex:success", listener.as_ref().unchecked_ref()).unwrap();
}
