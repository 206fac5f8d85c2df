use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::state::WorkerState;

/// Snapshot of one registered worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerRecord {
	pub name: String,
	pub state: WorkerState,
	pub generation: u64,
	pub restarts: usize,
	pub last_exit: Option<String>,
}

/// Host-wide worker table used for status snapshots and duplicate detection.
#[derive(Debug, Default, Clone)]
pub struct WorkerRegistry {
	inner: Arc<RwLock<BTreeMap<String, WorkerRecord>>>,
}

impl WorkerRegistry {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn upsert(&self, record: WorkerRecord) {
		self.inner.write().insert(record.name.clone(), record);
	}

	pub fn contains(&self, name: &str) -> bool {
		self.inner.read().contains_key(name)
	}

	pub fn get(&self, name: &str) -> Option<WorkerRecord> {
		self.inner.read().get(name).cloned()
	}

	/// Current state of `name`; [`WorkerState::Unregistered`] if it was never registered.
	pub fn state(&self, name: &str) -> WorkerState {
		self.inner.read().get(name).map_or(WorkerState::Unregistered, |record| record.state)
	}

	/// Returns snapshots sorted by name.
	pub fn snapshots(&self) -> Vec<WorkerRecord> {
		self.inner.read().values().cloned().collect()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn unknown_names_are_unregistered() {
		let registry = WorkerRegistry::new();
		assert_eq!(registry.state("ghost"), WorkerState::Unregistered);

		registry.upsert(WorkerRecord {
			name: "ghost".into(),
			state: WorkerState::Registered,
			generation: 0,
			restarts: 0,
			last_exit: None,
		});
		assert_eq!(registry.state("ghost"), WorkerState::Registered);
		assert_eq!(registry.snapshots().len(), 1);
	}
}
