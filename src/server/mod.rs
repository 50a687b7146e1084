//! Server half: dispatching invocations to [`Reflex`] handlers and broadcasting the resulting patches.
//!
//! [`Channel`] ties the pieces together. The view layer ([`Renderer`]), session persistence ([`SessionStore`])
//! and the transport ([`Publisher`]) are supplied by the host application.

mod broadcaster;
mod channel;
mod dispatcher;
mod log;
mod render;
mod session;

pub use broadcaster::Broadcaster;
pub use channel::{Channel, Publisher};
pub use dispatcher::{parse_target, Arity, DispatchOutcome, Dispatcher, Element, Factory, HandlerRegistry, Method, Morph, MorphContent, Reflex, ReflexContext, Status};
pub use log::{OperationRecord, ReflexLogger, TracingLogger};
pub use render::{RenderRequest, Renderer};
pub use session::{MemorySessionStore, RequestContext, ResponseContext, Session, SessionStore};
