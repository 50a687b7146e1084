use crate::{envelope::CorrelationId, protocol::MorphMode};
use tracing::info;

/// One emitted operation, as seen by the operation logger.
#[derive(Debug, Clone, PartialEq)]
pub struct OperationRecord {
	pub session_id: String,
	pub correlation_id: CorrelationId,
	pub target: String,
	pub selector: Option<String>,
	pub operation_index: usize,
	pub total_operations: usize,
	/// Time from receiving the invocation until its reply was built, shared by all operations of the batch.
	pub duration_ms: f64,
	pub mode: MorphMode,
}

pub trait ReflexLogger: Send + Sync {
	fn log(&self, record: &OperationRecord);
}

/// Emits each record as a structured `tracing` event.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingLogger;

impl ReflexLogger for TracingLogger {
	fn log(&self, record: &OperationRecord) {
		info!(
			session_id = %record.session_id,
			correlation_id = %record.correlation_id,
			target = %record.target,
			selector = record.selector.as_deref().unwrap_or(""),
			operation = record.operation_index + 1,
			total = record.total_operations,
			duration_ms = record.duration_ms,
			mode = record.mode.as_str(),
			"reflex operation"
		);
	}
}
