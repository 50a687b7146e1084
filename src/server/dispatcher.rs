//! Resolves `Handler#method` targets against a registry and runs them.
//!
//! Handlers declare their client-callable surface through [`Reflex::methods`]. Anything not listed there is
//! unreachable from the wire, whatever the handler's [`Reflex::call`] would do with it.

use super::session::Session;
use crate::{
	envelope::Invocation,
	error::{DispatchError, HandlerError},
	protocol::{Operation, OperationKind, MorphMode},
	resolver::Fingerprint,
};
use core::fmt;
use hashbrown::HashMap;
use serde_json::{Map, Value};
use std::{
	collections::BTreeMap,
	panic::{self, AssertUnwindSafe},
};
use tracing::{debug, instrument, warn};

/// How many positional arguments a method accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Arity {
	required: usize,
	/// [`None`] means any number of trailing arguments.
	optional: Option<usize>,
}

impl Arity {
	#[must_use]
	pub const fn exactly(count: usize) -> Self {
		Self { required: count, optional: Some(0) }
	}

	/// `required` arguments, followed by up to `optional` more.
	#[must_use]
	pub const fn between(required: usize, optional: usize) -> Self {
		Self { required, optional: Some(optional) }
	}

	#[must_use]
	pub const fn at_least(required: usize) -> Self {
		Self { required, optional: None }
	}

	#[must_use]
	pub fn accepts(self, given: usize) -> bool {
		given >= self.required && self.optional.map_or(true, |optional| given <= self.required + optional)
	}
}

impl fmt::Display for Arity {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self.optional {
			Some(0) => write!(f, "{}", self.required),
			Some(optional) => write!(f, "{}..{}", self.required, self.required + optional),
			None => write!(f, "{}+", self.required),
		}
	}
}

/// One client-callable method.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Method {
	pub name: &'static str,
	pub arity: Arity,
}

impl Method {
	#[must_use]
	pub const fn new(name: &'static str, arity: Arity) -> Self {
		Self { name, arity }
	}
}

/// A server-side reflex handler. A fresh instance is constructed per invocation.
pub trait Reflex {
	/// The methods clients may call.
	fn methods(&self) -> &[Method];

	/// Runs `method`. Only called for names listed in [`Reflex::methods`] with an accepted number of `args`.
	///
	/// # Errors
	///
	/// Any [`HandlerError`] becomes an `error` reply.
	fn call(&mut self, method: &str, args: &[Value], cx: &mut ReflexContext<'_>) -> Result<(), HandlerError>;

	/// Runs before [`Reflex::call`]. Calling [`ReflexContext::halt`] here skips the method.
	///
	/// # Errors
	///
	/// Same as [`Reflex::call`].
	fn before_reflex(&mut self, cx: &mut ReflexContext<'_>) -> Result<(), HandlerError> {
		let _ = cx;
		Ok(())
	}

	/// Runs after a [`Reflex::call`] that neither failed nor halted.
	///
	/// # Errors
	///
	/// Same as [`Reflex::call`].
	fn after_reflex(&mut self, cx: &mut ReflexContext<'_>) -> Result<(), HandlerError> {
		let _ = cx;
		Ok(())
	}

	/// Sees handler failures before they are broadcast.
	fn rescue(&mut self, error: &DispatchError, cx: &mut ReflexContext<'_>) {
		let _ = (error, cx);
	}
}

pub type Factory = Box<dyn Fn(&Invocation) -> Box<dyn Reflex> + Send + Sync>;

/// Handler constructors by name.
#[derive(Default)]
pub struct HandlerRegistry {
	factories: HashMap<String, Factory>,
}

impl fmt::Debug for HandlerRegistry {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_set().entries(self.factories.keys()).finish()
	}
}

impl HandlerRegistry {
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	pub fn register(&mut self, name: impl Into<String>, factory: impl Fn(&Invocation) -> Box<dyn Reflex> + Send + Sync + 'static) -> &mut Self {
		self.factories.insert(name.into(), Box::new(factory));
		self
	}

	/// Looks `name` up as given, then with a `Reflex` suffix.
	#[must_use]
	pub fn resolve(&self, name: &str) -> Option<&Factory> {
		self.factories.get(name).or_else(|| {
			if name.ends_with("Reflex") {
				None
			} else {
				self.factories.get(format!("{}Reflex", name).as_str())
			}
		})
	}
}

/// A read-only view of the invoking element, as captured client-side.
#[derive(Debug, Clone, Copy)]
pub struct Element<'a> {
	fingerprint: &'a Fingerprint,
}

impl<'a> Element<'a> {
	#[must_use]
	pub fn tag_name(&self) -> &'a str {
		&self.fingerprint.tag_name
	}

	#[must_use]
	pub fn attribute(&self, name: &str) -> Option<&'a str> {
		self.fingerprint.get(name)
	}

	#[must_use]
	pub fn id(&self) -> Option<&'a str> {
		self.attribute("id")
	}

	#[must_use]
	pub fn value(&self) -> Option<&'a str> {
		self.attribute("value")
	}

	/// All values of a checkbox group or multi-select.
	#[must_use]
	pub fn values(&self) -> &'a [String] {
		&self.fingerprint.values
	}

	#[must_use]
	pub fn checked(&self) -> bool {
		self.attribute("checked") == Some("true")
	}

	/// `data-*` attributes with the prefix dropped and dashes turned into underscores.
	#[must_use]
	pub fn dataset(&self) -> BTreeMap<String, &'a str> {
		self.fingerprint
			.attributes
			.iter()
			.filter_map(|(name, value)| name.strip_prefix("data-").map(|key| (key.replace('-', "_"), value.as_str())))
			.collect()
	}

	#[must_use]
	pub fn inner_html(&self) -> Option<&'a str> {
		self.fingerprint.inner_html.as_deref()
	}

	#[must_use]
	pub fn text_content(&self) -> Option<&'a str> {
		self.fingerprint.text_content.as_deref()
	}
}

/// Content for one selector-mode patch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MorphContent {
	Html(String),
	/// A partial, rendered through [`Renderer::render_fragment`](`super::Renderer::render_fragment`) at broadcast time.
	Fragment(String),
}

/// What the broadcaster should send back. The last morph call of a handler wins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Morph {
	Page,
	Nothing,
	Selectors(Vec<(String, MorphContent)>),
}

impl Morph {
	#[must_use]
	pub fn mode(&self) -> MorphMode {
		match self {
			Self::Page => MorphMode::Page,
			Self::Nothing => MorphMode::Nothing,
			Self::Selectors(_) => MorphMode::Selector,
		}
	}
}

/// Per-invocation state handed to every handler method and callback.
pub struct ReflexContext<'a> {
	invocation: &'a Invocation,
	session: &'a mut Session,
	morph: Morph,
	halted: bool,
	assigns: Map<String, Value>,
	piggyback: Vec<Operation>,
}

impl<'a> ReflexContext<'a> {
	fn new(invocation: &'a Invocation, session: &'a mut Session) -> Self {
		Self {
			invocation,
			session,
			morph: Morph::Page,
			halted: false,
			assigns: Map::new(),
			piggyback: Vec::new(),
		}
	}

	#[must_use]
	pub fn invocation(&self) -> &'a Invocation {
		self.invocation
	}

	#[must_use]
	pub fn element(&self) -> Element<'a> {
		Element { fingerprint: &self.invocation.attrs }
	}

	#[must_use]
	pub fn url(&self) -> &'a str {
		&self.invocation.url
	}

	#[must_use]
	pub fn params(&self) -> &'a BTreeMap<String, Value> {
		&self.invocation.params
	}

	#[must_use]
	pub fn session(&self) -> &Session {
		self.session
	}

	pub fn session_mut(&mut self) -> &mut Session {
		self.session
	}

	/// Replaces the children of `selector` with `html`. Accumulates with other selector morphs.
	pub fn morph(&mut self, selector: impl Into<String>, html: impl Into<String>) {
		self.push_selector(selector.into(), MorphContent::Html(html.into()));
	}

	/// Like [`ReflexContext::morph`], with the named partial rendered after the handler returns.
	pub fn morph_fragment(&mut self, selector: impl Into<String>, fragment: impl Into<String>) {
		self.push_selector(selector.into(), MorphContent::Fragment(fragment.into()));
	}

	/// Skip re-rendering entirely.
	pub fn morph_nothing(&mut self) {
		self.morph = Morph::Nothing;
	}

	/// Re-render the full page (the default).
	pub fn morph_page(&mut self) {
		self.morph = Morph::Page;
	}

	/// Abort without re-rendering. The client sees a `halted` outcome.
	pub fn halt(&mut self) {
		self.halted = true;
	}

	#[must_use]
	pub fn is_halted(&self) -> bool {
		self.halted
	}

	/// Exposes `value` to the renderer as `name`.
	pub fn assign(&mut self, name: impl Into<String>, value: impl Into<Value>) {
		self.assigns.insert(name.into(), value.into());
	}

	/// Queues an untagged event dispatch, applied alongside the reply without a lifecycle of its own.
	pub fn dispatch_event(&mut self, selector: Option<&str>, name: impl Into<String>, detail: Value) {
		let mut operation = Operation::new(OperationKind::DispatchEvent, MorphMode::Nothing);
		operation.selector = selector.map(str::to_owned);
		operation.name = Some(name.into());
		operation.detail = detail;
		self.piggyback.push(operation);
	}

	fn push_selector(&mut self, selector: String, content: MorphContent) {
		match &mut self.morph {
			Morph::Selectors(morphs) => morphs.push((selector, content)),
			other => *other = Morph::Selectors(vec![(selector, content)]),
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
	Success,
	Halted,
	Error,
}

/// Everything the broadcaster needs from one dispatch.
#[derive(Debug)]
pub struct DispatchOutcome {
	pub status: Status,
	pub error: Option<DispatchError>,
	pub morph: Morph,
	pub assigns: Map<String, Value>,
	/// Untagged operations queued by the handler.
	pub piggyback: Vec<Operation>,
}

impl DispatchOutcome {
	pub(crate) fn failed(error: DispatchError) -> Self {
		Self {
			status: Status::Error,
			error: Some(error),
			morph: Morph::Nothing,
			assigns: Map::new(),
			piggyback: Vec::new(),
		}
	}

	#[must_use]
	pub fn mode(&self) -> MorphMode {
		match self.status {
			Status::Success => self.morph.mode(),
			Status::Halted | Status::Error => MorphMode::Nothing,
		}
	}
}

/// Splits `Handler#method`, substituting `default_method` for a missing or empty method.
///
/// # Errors
///
/// Iff the handler part is empty.
pub fn parse_target<'a>(target: &'a str, default_method: &'a str) -> Result<(&'a str, &'a str), DispatchError> {
	let (handler, method) = target.split_once('#').unwrap_or((target, ""));
	let handler = handler.trim();
	if handler.is_empty() {
		return Err(DispatchError::MalformedTarget(target.to_owned()));
	}
	let method = method.trim();
	Ok((handler, if method.is_empty() { default_method } else { method }))
}

#[derive(Debug)]
pub struct Dispatcher {
	registry: HandlerRegistry,
	default_method: String,
}

impl Dispatcher {
	#[must_use]
	pub fn new(registry: HandlerRegistry, default_method: impl Into<String>) -> Self {
		Self {
			registry,
			default_method: default_method.into(),
		}
	}

	/// Resolves and runs `invocation.target`. Never fails: failures are reported through [`DispatchOutcome::status`].
	///
	/// Resolution, method and arity failures are detected before any handler code runs.
	#[instrument(skip_all, fields(target = %invocation.target, correlation_id = %invocation.correlation_id))]
	pub fn dispatch(&self, invocation: &Invocation, session: &mut Session) -> DispatchOutcome {
		let (handler_name, method_name) = match parse_target(&invocation.target, &self.default_method) {
			Ok(parts) => parts,
			Err(error) => return DispatchOutcome::failed(error),
		};

		let factory = match self.registry.resolve(handler_name) {
			Some(factory) => factory,
			None => return DispatchOutcome::failed(DispatchError::Resolution(handler_name.to_owned())),
		};
		let mut handler = factory(invocation);

		let method = match handler.methods().iter().find(|method| method.name == method_name) {
			Some(method) => *method,
			None => {
				return DispatchOutcome::failed(DispatchError::UnknownMethod {
					handler: handler_name.to_owned(),
					method: method_name.to_owned(),
				})
			}
		};
		if !method.arity.accepts(invocation.args.len()) {
			return DispatchOutcome::failed(DispatchError::Arity {
				handler: handler_name.to_owned(),
				method: method_name.to_owned(),
				expected: method.arity.to_string(),
				given: invocation.args.len(),
			});
		}

		let mut cx = ReflexContext::new(invocation, session);
		let result = guarded(|| handler.before_reflex(&mut cx)).and_then(|()| {
			if cx.halted {
				debug!("Halted in before_reflex.");
				return Ok(());
			}
			guarded(|| handler.call(method.name, &invocation.args, &mut cx))?;
			if cx.halted {
				return Ok(());
			}
			guarded(|| handler.after_reflex(&mut cx))
		});

		let (status, error) = match result {
			Ok(()) if cx.halted => (Status::Halted, None),
			Ok(()) => (Status::Success, None),
			Err(error) => {
				let error = DispatchError::Handler(error);
				warn!("Reflex failed: {}", error);
				guarded(|| {
					handler.rescue(&error, &mut cx);
					Ok(())
				})
				.unwrap_or_else(|rescue_error| warn!("Rescue callback failed: {}", rescue_error));
				(Status::Error, Some(error))
			}
		};

		DispatchOutcome {
			status,
			error,
			morph: cx.morph,
			assigns: cx.assigns,
			piggyback: cx.piggyback,
		}
	}
}

/// Runs handler code, turning panics into [`HandlerError`]s.
fn guarded(f: impl FnOnce() -> Result<(), HandlerError>) -> Result<(), HandlerError> {
	catch_panic(f).unwrap_or_else(|message| Err(HandlerError::unlocated(message)))
}

/// Runs `f`, returning the panic message instead if it panics.
pub(super) fn catch_panic<T>(f: impl FnOnce() -> T) -> Result<T, String> {
	panic::catch_unwind(AssertUnwindSafe(f)).map_err(|payload| {
		payload
			.downcast_ref::<&str>()
			.map(|message| (*message).to_owned())
			.or_else(|| payload.downcast_ref::<String>().cloned())
			.unwrap_or_else(|| "panicked".to_owned())
	})
}
