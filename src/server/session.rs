use crate::{envelope::CorrelationId, error::SessionError};
use hashbrown::HashMap;
use parking_lot::Mutex;

/// Server-side session state, a JSON object.
pub type Session = serde_json::Map<String, serde_json::Value>;

/// What the session store may need to know about the request that produced a commit.
#[derive(Debug, Clone)]
pub struct RequestContext {
	pub session_id: String,
	pub correlation_id: CorrelationId,
	pub url: String,
}

#[derive(Debug, Clone)]
pub struct ResponseContext {
	pub session: Session,
}

/// Persists sessions between invocations.
pub trait SessionStore: Send + Sync {
	/// Loads the session for `session_id`. Unknown sessions are empty, not errors.
	///
	/// # Errors
	///
	/// Iff the backing store failed.
	fn load(&self, session_id: &str) -> Result<Session, SessionError>;

	/// # Errors
	///
	/// Iff the backing store failed. The caller only logs this.
	fn commit(&self, request: &RequestContext, response: &ResponseContext) -> Result<(), SessionError>;
}

#[derive(Debug, Default)]
pub struct MemorySessionStore {
	sessions: Mutex<HashMap<String, Session>>,
}

impl MemorySessionStore {
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	/// A copy of the committed state of `session_id`.
	#[must_use]
	pub fn snapshot(&self, session_id: &str) -> Option<Session> {
		self.sessions.lock().get(session_id).cloned()
	}
}

impl SessionStore for MemorySessionStore {
	fn load(&self, session_id: &str) -> Result<Session, SessionError> {
		Ok(self.sessions.lock().get(session_id).cloned().unwrap_or_default())
	}

	fn commit(&self, request: &RequestContext, response: &ResponseContext) -> Result<(), SessionError> {
		self.sessions.lock().insert(request.session_id.clone(), response.session.clone());
		Ok(())
	}
}
