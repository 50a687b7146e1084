//! Per-invocation client state, keyed by correlation id.

use super::counter::Countdown;
use crate::{
	envelope::{CorrelationId, Invocation},
	protocol::Echo,
	resolver::{Fingerprint, Locator},
};
use core::{
	future::Future,
	pin::Pin,
	task::{Context, Poll},
};
use futures::channel::oneshot;
use hashbrown::{HashMap, HashSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
	Created,
	/// Waiting for the transport to (re)connect.
	Queued,
	Sent,
	/// The first reply for this id arrived, operations are being applied.
	Received,
	Done,
	Error,
	Halted,
	/// The connection layer refused the subscription. Terminal, no notifications.
	Forbidden,
}

/// The stage whose notification retires the record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinalStage {
	Finalize,
	Halted,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
	Success,
	/// The server deliberately rendered nothing.
	Nothing,
	Halted,
	/// The server reported a failure, with its message.
	Error(String),
	Forbidden,
}

/// What a [`PendingReflex`] resolves to.
#[derive(Debug, Clone, PartialEq)]
pub struct ReflexResult {
	pub correlation_id: CorrelationId,
	pub outcome: Outcome,
	/// The server message body that decided the outcome, if any.
	pub payload: serde_json::Value,
}

#[derive(Debug)]
pub struct Record {
	pub correlation_id: CorrelationId,
	pub target: String,
	pub stage: Stage,
	pub element: Locator,
	pub controller: Locator,
	/// Only known for invocations sent from this client.
	pub fingerprint: Option<Fingerprint>,
	pub resolve_late: bool,
	pub final_stage: FinalStage,
	pub outcome: Option<Outcome>,
	pub created_at: f64,
	/// Whether the invocation originated here rather than in another tab of the same session.
	pub local: bool,
	pub(super) countdown: Option<Countdown<u32>>,
	pub(super) payload: serde_json::Value,
	pub(super) resolver: Option<oneshot::Sender<ReflexResult>>,
}

impl Record {
	pub(super) fn local(invocation: &Invocation, created_at: f64, resolver: oneshot::Sender<ReflexResult>) -> Self {
		Self {
			correlation_id: invocation.correlation_id.clone(),
			target: invocation.target.clone(),
			stage: Stage::Created,
			element: invocation.element.clone(),
			controller: invocation.controller.clone(),
			fingerprint: Some(invocation.attrs.clone()),
			resolve_late: invocation.options.resolve_late,
			final_stage: FinalStage::Finalize,
			outcome: None,
			created_at,
			local: true,
			countdown: None,
			payload: serde_json::Value::Null,
			resolver: Some(resolver),
		}
	}

	/// A record for a reply to an invocation made elsewhere, reconstructed from its echo.
	pub(super) fn foreign(correlation_id: CorrelationId, echo: &Echo, created_at: f64) -> Self {
		Self {
			correlation_id,
			target: echo.target.clone(),
			stage: Stage::Received,
			element: echo.element.clone(),
			controller: echo.controller.clone(),
			fingerprint: None,
			resolve_late: false,
			final_stage: FinalStage::Finalize,
			outcome: None,
			created_at,
			local: false,
			countdown: None,
			payload: serde_json::Value::Null,
			resolver: None,
		}
	}

	/// Fulfils the pending result. Later calls do nothing.
	pub(super) fn resolve(&mut self, outcome: Outcome) {
		if let Some(resolver) = self.resolver.take() {
			// The receiver may have been dropped, which is fine.
			let _ = resolver.send(ReflexResult {
				correlation_id: self.correlation_id.clone(),
				outcome,
				payload: self.payload.clone(),
			});
		}
	}

	#[must_use]
	pub fn is_resolved(&self) -> bool {
		self.resolver.is_none()
	}
}

/// Live records, plus the ids of retired ones so late messages for them are recognized.
#[derive(Debug, Default)]
pub struct Registry {
	records: HashMap<CorrelationId, Record>,
	retired: HashSet<CorrelationId>,
}

impl Registry {
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	pub fn insert(&mut self, record: Record) {
		self.records.insert(record.correlation_id.clone(), record);
	}

	#[must_use]
	pub fn get(&self, id: &CorrelationId) -> Option<&Record> {
		self.records.get(id)
	}

	pub fn get_mut(&mut self, id: &CorrelationId) -> Option<&mut Record> {
		self.records.get_mut(id)
	}

	/// Removes the record for good.
	pub fn retire(&mut self, id: &CorrelationId) -> Option<Record> {
		self.retired.insert(id.clone());
		self.records.remove(id)
	}

	#[must_use]
	pub fn is_retired(&self, id: &CorrelationId) -> bool {
		self.retired.contains(id)
	}

	pub fn in_stage(&self, stage: Stage) -> impl Iterator<Item = &Record> + '_ {
		self.records.values().filter(move |record| record.stage == stage)
	}

	#[must_use]
	pub fn len(&self) -> usize {
		self.records.len()
	}

	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.records.is_empty()
	}
}

/// The eventual result of one [`Client::invoke`](`super::Client::invoke`).
#[derive(Debug)]
#[must_use = "the result is only observable through this handle"]
pub struct PendingReflex {
	correlation_id: CorrelationId,
	receiver: oneshot::Receiver<ReflexResult>,
}

impl PendingReflex {
	pub(super) fn new(correlation_id: CorrelationId, receiver: oneshot::Receiver<ReflexResult>) -> Self {
		Self { correlation_id, receiver }
	}

	pub fn correlation_id(&self) -> &CorrelationId {
		&self.correlation_id
	}

	/// The result, if it is already available.
	pub fn try_result(&mut self) -> Option<ReflexResult> {
		self.receiver.try_recv().ok().flatten()
	}
}

impl Future for PendingReflex {
	type Output = Result<ReflexResult, oneshot::Canceled>;

	fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
		Pin::new(&mut self.receiver).poll(cx)
	}
}
