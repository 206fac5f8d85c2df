//! The single-slot target mailbox shared by handlers and the poll worker.
//!
//! Every access takes the slot lock for a handful of field copies only. The
//! worker copies the target out and releases the lock before it touches the
//! catalog, so handlers never wait behind a lookup.

use std::fmt;

use parking_lot::Mutex;
use tablewatch_host::TrancheId;

use crate::name::BoundedName;

/// Name of the shared memory region and lock tranche holding the mailbox.
pub const MAILBOX_REGION: &str = "tablewatch";

/// A (schema, table) pair to resolve.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Target {
	pub schema: BoundedName,
	pub table: BoundedName,
}

impl Target {
	pub fn new(schema: BoundedName, table: BoundedName) -> Self {
		Self { schema, table }
	}

	/// An empty target means nothing has been published yet.
	pub fn is_empty(&self) -> bool {
		self.table.is_empty()
	}
}

impl fmt::Display for Target {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}.{}", self.schema, self.table)
	}
}

/// Result of [`Mailbox::publish`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishOutcome {
	Stored,
	/// The previous target was overwritten before the worker read it.
	Replaced(Target),
}

#[derive(Default)]
struct Slot {
	target: Target,
	published: u64,
	observed: u64,
}

/// Process-wide mailbox with capacity one. Last writer wins.
pub struct Mailbox {
	tranche: TrancheId,
	slot: Mutex<Slot>,
}

impl Mailbox {
	/// Creates an empty mailbox bound to its named lock tranche.
	pub fn new(tranche: TrancheId) -> Self {
		Self {
			tranche,
			slot: Mutex::new(Slot::default()),
		}
	}

	pub fn tranche(&self) -> &TrancheId {
		&self.tranche
	}

	/// Stores `target`, replacing whatever was there.
	pub fn publish(&self, target: Target) -> PublishOutcome {
		let mut slot = self.slot.lock();
		let previous = std::mem::replace(&mut slot.target, target);
		let unobserved = slot.published > slot.observed;
		slot.published += 1;
		drop(slot);

		if unobserved && !previous.is_empty() {
			tracing::debug!(dropped = %previous, stored = %target, "mailbox.replaced");
			PublishOutcome::Replaced(previous)
		} else {
			PublishOutcome::Stored
		}
	}

	/// Copies the current target out for the worker and marks it observed.
	///
	/// Returns `None` while nothing has been published.
	pub fn snapshot(&self) -> Option<Target> {
		let mut slot = self.slot.lock();
		slot.observed = slot.published;
		let target = slot.target;
		drop(slot);
		(!target.is_empty()).then_some(target)
	}

	/// Reads the current target without marking it observed.
	pub fn peek(&self) -> Target {
		self.slot.lock().target
	}

	/// Number of publishes since the mailbox was created.
	pub fn sequence(&self) -> u64 {
		self.slot.lock().published
	}
}

impl fmt::Debug for Mailbox {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let slot = self.slot.lock();
		f.debug_struct("Mailbox")
			.field("tranche", &self.tranche.name())
			.field("target", &slot.target)
			.field("published", &slot.published)
			.field("observed", &slot.observed)
			.finish()
	}
}
