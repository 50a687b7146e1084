#![allow(dead_code)]

use reflex_dom::{
	client::{Client, Diagnostic, LifecycleStage},
	config::{ClientConfig, ServerConfig},
	dom::{MemoryDocument, NodeId},
	error::{HandlerError, RenderError},
	server::{Arity, Channel, HandlerRegistry, MemorySessionStore, Method, Reflex, ReflexContext, RenderRequest, Renderer, SessionStore},
	transport::{LoopbackHub, LoopbackTransport},
};
use serde_json::Value;
use std::{cell::RefCell, rc::Rc, sync::Arc};

pub const URL: &str = "http://localhost/counter";
pub const SESSION: &str = "session-1";

pub type TestClient = Client<MemoryDocument, LoopbackTransport>;

pub fn count(session: &serde_json::Map<String, Value>) -> i64 {
	session.get("count").and_then(Value::as_i64).unwrap_or(0)
}

pub fn page(count: i64) -> String {
	format!(
		concat!(
			r#"<html><head><title>Counter</title></head><body>"#,
			r#"<div id="app" data-controller="reflex"><p id="count">{}</p>"#,
			r#"<button id="increment" data-reflex="click->Counter#increment">+</button>"#,
			r#"<ul id="items"><li class="item">a</li><li class="item">b</li></ul></div>"#,
			r#"<aside id="sidebar">static</aside>"#,
			r#"</body></html>"#,
		),
		count
	)
}

/// Renders [`page`] from the session's count.
pub struct Page;

impl Renderer for Page {
	fn render_full_page(&self, request: &RenderRequest<'_>) -> Result<String, RenderError> {
		Ok(page(count(request.session)))
	}

	fn render_fragment(&self, name: &str, request: &RenderRequest<'_>) -> Result<String, RenderError> {
		match name {
			"count" => Ok(format!(r#"<p id="count">{}</p>"#, count(request.session))),
			_ => Err(RenderError::Fragment {
				name: name.to_owned(),
				reason: "no such partial".to_owned(),
			}),
		}
	}
}

const COUNTER_METHODS: &[Method] = &[
	Method::new("increment", Arity::between(0, 1)),
	Method::new("patch", Arity::exactly(0)),
	Method::new("partial", Arity::exactly(1)),
	Method::new("verbatim", Arity::exactly(0)),
	Method::new("noop", Arity::exactly(0)),
	Method::new("notify", Arity::exactly(0)),
	Method::new("fail", Arity::exactly(0)),
	Method::new("explode", Arity::exactly(0)),
	Method::new("add", Arity::exactly(2)),
];

pub struct Counter;

impl Counter {
	fn bump(cx: &mut ReflexContext<'_>, by: i64) -> i64 {
		let count = count(cx.session()) + by;
		cx.session_mut().insert("count".to_owned(), count.into());
		count
	}
}

impl Reflex for Counter {
	fn methods(&self) -> &[Method] {
		COUNTER_METHODS
	}

	fn before_reflex(&mut self, cx: &mut ReflexContext<'_>) -> Result<(), HandlerError> {
		if cx.params().contains_key("halt") {
			cx.halt();
		}
		Ok(())
	}

	fn call(&mut self, method: &str, args: &[Value], cx: &mut ReflexContext<'_>) -> Result<(), HandlerError> {
		match method {
			"increment" => {
				let by = args.first().and_then(Value::as_i64).unwrap_or(1);
				Self::bump(cx, by);
			}
			"patch" => {
				let count = Self::bump(cx, 1);
				cx.morph("#count", format!(r#"<p id="count">{}</p>"#, count));
			}
			"partial" => {
				Self::bump(cx, 1);
				let name = args[0].as_str().unwrap_or_default().to_owned();
				cx.morph_fragment("#count", name);
			}
			"verbatim" => cx.morph("#count", "just text"),
			"noop" => cx.morph_nothing(),
			"notify" => {
				cx.morph_nothing();
				cx.dispatch_event(Some("#sidebar"), "counter:notified", serde_json::json!({ "count": count(cx.session()) }));
			}
			"add" => {
				let sum = args.iter().filter_map(Value::as_i64).sum();
				Self::bump(cx, sum);
			}
			"fail" => return Err(HandlerError::new("counter is broken")),
			"explode" => panic!("counter exploded"),
			_ => unreachable!(),
		}
		Ok(())
	}

	fn rescue(&mut self, _error: &reflex_dom::error::DispatchError, cx: &mut ReflexContext<'_>) {
		cx.session_mut().insert("rescued".to_owned(), true.into());
	}
}

/// A channel serving [`Counter`].
pub fn channel(config: ServerConfig, renderer: Arc<dyn Renderer>, sessions: Arc<dyn SessionStore>) -> Channel {
	let mut registry = HandlerRegistry::new();
	registry.register("CounterReflex", |_| Box::new(Counter));
	Channel::new(config, registry, renderer, sessions)
}

pub struct Fixture {
	pub hub: LoopbackHub,
	pub sessions: Arc<MemorySessionStore>,
}

impl Fixture {
	pub fn new() -> Self {
		Self::with_config(ServerConfig::default())
	}

	pub fn with_config(config: ServerConfig) -> Self {
		let sessions = Arc::new(MemorySessionStore::new());
		let channel = channel(config, Arc::new(Page), sessions.clone());
		Self::with_channel(channel, sessions)
	}

	/// `sessions` must be what `channel` ends up storing into.
	pub fn with_channel(channel: Channel, sessions: Arc<MemorySessionStore>) -> Self {
		Self {
			hub: LoopbackHub::new(Arc::new(channel)),
			sessions,
		}
	}

	pub fn client(&self) -> TestClient {
		self.client_with(ClientConfig::default())
	}

	pub fn client_with(&self, config: ClientConfig) -> TestClient {
		let document = MemoryDocument::parse(&page(0)).with_location(URL);
		Client::new(document, self.hub.transport(SESSION), config)
	}

	pub fn count(&self) -> i64 {
		self.sessions.snapshot(SESSION).as_ref().map_or(0, count)
	}
}

pub type StageLog = Rc<RefCell<Vec<(LifecycleStage, NodeId)>>>;

/// Records every lifecycle notification with the element it was delivered at.
pub fn record_stages(client: &mut TestClient) -> StageLog {
	let stages = Rc::new(RefCell::new(Vec::new()));
	let log = Rc::clone(&stages);
	client.on_lifecycle(move |event| log.borrow_mut().push((event.notification.stage, event.element)));
	stages
}

/// Just the stages.
pub fn stages(log: &StageLog) -> Vec<LifecycleStage> {
	log.borrow().iter().map(|(stage, _)| *stage).collect()
}

pub fn record_diagnostics(client: &mut TestClient) -> Rc<RefCell<Vec<Diagnostic>>> {
	let diagnostics = Rc::new(RefCell::new(Vec::new()));
	let log = Rc::clone(&diagnostics);
	client.on_diagnostic(move |diagnostic| log.borrow_mut().push(diagnostic.clone()));
	diagnostics
}
