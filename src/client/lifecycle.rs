//! The per-invocation state machine.
//!
//! ```text
//! created ─► sent ─► received ─┬─► done ──┐
//!    │                         ├─► error ─┼─► after ─► finalize
//!    └─► queued ─► sent        └─► halted ┘(stops here)
//! ```
//!
//! Each tagged operation passes through [`Record::before_apply`] and [`Record::after_apply`].
//! The outcome notification fires before the batch's last operation is applied, `after` and `finalize` once all of
//! them were.

use super::{
	counter::Countdown,
	registry::{FinalStage, Outcome, Record, Stage},
};
use crate::{
	envelope::CorrelationId,
	protocol::{Operation, Subject},
	resolver::{Fingerprint, Locator},
};
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleStage {
	Before,
	Success,
	Error,
	Nothing,
	Halted,
	After,
	Finalize,
}

impl LifecycleStage {
	#[must_use]
	pub fn as_str(self) -> &'static str {
		match self {
			Self::Before => "before",
			Self::Success => "success",
			Self::Error => "error",
			Self::Nothing => "nothing",
			Self::Halted => "halted",
			Self::After => "after",
			Self::Finalize => "finalize",
		}
	}

	/// The name of the DOM event dispatched at the element for this stage.
	#[must_use]
	pub fn event_name(self) -> String {
		format!("reflex:{}", self.as_str())
	}
}

/// One lifecycle notification.
///
/// Carries its own copy of the element's locators, so it stays deliverable after the record is gone.
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
	pub correlation_id: CorrelationId,
	pub stage: LifecycleStage,
	pub target: String,
	pub element: Locator,
	pub controller: Locator,
	pub fingerprint: Option<Fingerprint>,
	pub payload: serde_json::Value,
	/// [`Dom::now_ms`](`crate::dom::Dom::now_ms`) when the record was created.
	pub created_at: f64,
	/// Whether the record is retired once this has fired.
	pub is_final: bool,
}

impl Record {
	pub(super) fn notification(&self, stage: LifecycleStage) -> Notification {
		let is_final = match self.final_stage {
			FinalStage::Finalize => stage == LifecycleStage::Finalize,
			FinalStage::Halted => stage == LifecycleStage::Halted,
		};
		Notification {
			correlation_id: self.correlation_id.clone(),
			stage,
			target: self.target.clone(),
			element: self.element.clone(),
			controller: self.controller.clone(),
			fingerprint: self.fingerprint.clone(),
			payload: self.payload.clone(),
			created_at: self.created_at,
			is_final,
		}
	}

	/// Fixes the batch size and outcome from the first message carrying this id. Returns `false` if that already
	/// happened, in which case `operations` are stragglers of a completed batch.
	pub(super) fn prepare(&mut self, operations: &[&Operation]) -> bool {
		if self.countdown.is_some() {
			return false;
		}
		#[allow(clippy::cast_possible_truncation)]
		let total = operations.len() as u32;
		self.countdown = Some(Countdown::new(total));

		let deciding = [Subject::Error, Subject::Halted, Subject::Nothing]
			.iter()
			.find_map(|&subject| operations.iter().find(|operation| operation.subject() == Some(subject)).map(|operation| (subject, *operation)));
		let outcome = match deciding {
			Some((subject, operation)) => {
				let body = operation.server_message.as_ref().map(|message| message.body.clone()).unwrap_or_default();
				let outcome = match subject {
					Subject::Error => Outcome::Error(body.as_str().map_or_else(|| body.to_string(), str::to_owned)),
					Subject::Halted => Outcome::Halted,
					_ => Outcome::Nothing,
				};
				self.payload = body;
				outcome
			}
			None => Outcome::Success,
		};
		if outcome == Outcome::Halted {
			self.final_stage = FinalStage::Halted;
		}
		self.outcome = Some(outcome);
		self.stage = Stage::Received;
		true
	}

	/// Step one for a tagged operation, before it is applied.
	pub(super) fn before_apply(&mut self) -> Vec<Notification> {
		let last = match self.countdown.as_mut().map(Countdown::begin) {
			Some(Ok(last)) => last,
			Some(Err(_)) => {
				warn!(correlation_id = %self.correlation_id, "More operations than announced, ignoring.");
				return Vec::new();
			}
			None => return Vec::new(),
		};
		if !last {
			return Vec::new();
		}

		let outcome = self.outcome.clone().unwrap_or(Outcome::Success);
		let (stage, notification) = match &outcome {
			Outcome::Success => (Stage::Done, LifecycleStage::Success),
			Outcome::Nothing => (Stage::Done, LifecycleStage::Nothing),
			Outcome::Error(_) => (Stage::Error, LifecycleStage::Error),
			Outcome::Halted | Outcome::Forbidden => (Stage::Halted, LifecycleStage::Halted),
		};
		self.stage = stage;
		if !self.resolve_late {
			self.resolve(outcome);
		}
		vec![self.notification(notification)]
	}

	/// Step two for a tagged operation, after it was applied.
	pub(super) fn after_apply(&mut self) -> Vec<Notification> {
		let complete = match self.countdown.as_mut().map(Countdown::finish) {
			Some(Ok(complete)) => complete,
			Some(Err(_)) | None => return Vec::new(),
		};
		if !complete {
			return Vec::new();
		}

		if self.resolve_late {
			let outcome = self.outcome.clone().unwrap_or(Outcome::Success);
			self.resolve(outcome);
		}
		match self.final_stage {
			FinalStage::Finalize => vec![self.notification(LifecycleStage::After), self.notification(LifecycleStage::Finalize)],
			FinalStage::Halted => Vec::new(),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::{
		envelope::Invocation,
		protocol::{MorphMode, OperationKind},
	};
	use futures::channel::oneshot;

	fn invocation(resolve_late: bool) -> Invocation {
		let mut invocation: Invocation = serde_json::from_value(serde_json::json!({
			"correlationId": "c-1",
			"target": "Counter#increment",
			"attrs": { "tagName": "button", "attributes": {} },
			"element": "//*[@id='b']",
			"controller": "//*[@id='b']",
			"selectors": ["#a", "#b"],
			"url": "http://localhost/",
			"tabId": "t",
			"version": "0",
		}))
		.unwrap();
		invocation.options.resolve_late = resolve_late;
		invocation
	}

	fn replace() -> Operation {
		Operation::new(OperationKind::ReplaceChildren, MorphMode::Page)
	}

	#[test]
	fn early_resolution_precedes_the_last_application() {
		let (sender, mut receiver) = oneshot::channel();
		let mut record = Record::local(&invocation(false), 0.0, sender);
		let operations = [replace(), replace()];
		assert!(record.prepare(&operations.iter().collect::<Vec<_>>()));

		assert!(record.before_apply().is_empty());
		assert!(record.after_apply().is_empty());
		let outcome = record.before_apply();
		assert_eq!(outcome.iter().map(|notification| notification.stage).collect::<Vec<_>>(), [LifecycleStage::Success]);
		assert!(receiver.try_recv().unwrap().is_some());

		let rest = record.after_apply();
		assert_eq!(rest.iter().map(|notification| notification.stage).collect::<Vec<_>>(), [LifecycleStage::After, LifecycleStage::Finalize]);
		assert!(rest[1].is_final);
		assert!(!rest[0].is_final);
	}

	#[test]
	fn late_resolution_waits_for_the_last_application() {
		let (sender, mut receiver) = oneshot::channel();
		let mut record = Record::local(&invocation(true), 0.0, sender);
		let operations = [replace()];
		record.prepare(&operations.iter().collect::<Vec<_>>());

		assert_eq!(record.before_apply().len(), 1);
		assert_eq!(receiver.try_recv().unwrap(), None);
		assert_eq!(record.after_apply().len(), 2);
		assert_eq!(receiver.try_recv().unwrap().unwrap().outcome, Outcome::Success);
	}

	#[test]
	fn halted_batches_end_at_halted() {
		let (sender, mut receiver) = oneshot::channel();
		let mut record = Record::local(&invocation(false), 0.0, sender);
		let operations = [Operation::new(OperationKind::None, MorphMode::Nothing).with_server_message(Subject::Halted, serde_json::Value::Null)];
		record.prepare(&operations.iter().collect::<Vec<_>>());

		let halted = record.before_apply();
		assert_eq!(halted.len(), 1);
		assert_eq!(halted[0].stage, LifecycleStage::Halted);
		assert!(halted[0].is_final);
		assert!(record.after_apply().is_empty());
		assert_eq!(record.stage, Stage::Halted);
		assert_eq!(receiver.try_recv().unwrap().unwrap().outcome, Outcome::Halted);
	}

	#[test]
	fn stragglers_are_ignored() {
		let (sender, _receiver) = oneshot::channel();
		let mut record = Record::local(&invocation(false), 0.0, sender);
		let operations = [replace()];
		assert!(record.prepare(&operations.iter().collect::<Vec<_>>()));
		assert!(!record.prepare(&operations.iter().collect::<Vec<_>>()));
		assert_eq!(record.before_apply().len(), 1);
		assert_eq!(record.after_apply().len(), 2);
		assert!(record.before_apply().is_empty());
		assert!(record.after_apply().is_empty());
	}

	/// Walks a three-operation batch, noting after which step the result first became available.
	fn resolution_step(resolve_late: bool) -> &'static str {
		let (sender, mut receiver) = oneshot::channel();
		let mut record = Record::local(&invocation(resolve_late), 0.0, sender);
		let operations = [
			replace(),
			Operation::new(OperationKind::DispatchEvent, MorphMode::Page),
			replace(),
		];
		record.prepare(&operations.iter().collect::<Vec<_>>());

		let steps = ["before 1", "after 1", "before 2", "after 2", "before 3", "after 3"];
		for (i, step) in steps.iter().enumerate() {
			if i % 2 == 0 {
				record.before_apply();
			} else {
				record.after_apply();
			}
			if receiver.try_recv().unwrap().is_some() {
				return step;
			}
		}
		"never"
	}

	#[test]
	fn three_operation_batches_resolve_once_at_the_right_step() {
		assert_eq!(resolution_step(false), "before 3");
		assert_eq!(resolution_step(true), "after 3");
	}
}

