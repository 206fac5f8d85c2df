use std::fmt;

use crate::error::HostResult;

/// Host transaction identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TransactionId(pub u64);

impl fmt::Display for TransactionId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.0)
	}
}

/// Transaction boundary calls provided by the host.
pub trait TransactionManager: Send + Sync {
	fn begin(&self) -> HostResult<TransactionId>;

	fn commit(&self, id: TransactionId) -> HostResult<()>;

	/// Rolls back `id`. Aborting an unknown transaction is a no-op.
	fn abort(&self, id: TransactionId);
}

/// A unit of work that is closed on every exit path.
///
/// [`commit`](Self::commit) closes it explicitly; dropping an unfinished
/// transaction aborts it, so early returns and `?` never leak an open unit of
/// work.
#[must_use = "dropping a transaction aborts it"]
pub struct Transaction<'a> {
	manager: &'a dyn TransactionManager,
	id: TransactionId,
	finished: bool,
}

impl<'a> Transaction<'a> {
	pub fn begin(manager: &'a dyn TransactionManager) -> HostResult<Self> {
		let id = manager.begin()?;
		tracing::trace!(xid = %id, "txn.begin");
		Ok(Self {
			manager,
			id,
			finished: false,
		})
	}

	pub fn id(&self) -> TransactionId {
		self.id
	}

	pub fn commit(mut self) -> HostResult<()> {
		self.finished = true;
		tracing::trace!(xid = %self.id, "txn.commit");
		self.manager.commit(self.id)
	}

	pub fn abort(mut self) {
		self.finished = true;
		tracing::trace!(xid = %self.id, "txn.abort");
		self.manager.abort(self.id);
	}
}

impl Drop for Transaction<'_> {
	fn drop(&mut self) {
		if !self.finished {
			tracing::debug!(xid = %self.id, "txn.abort_on_drop");
			self.manager.abort(self.id);
		}
	}
}

impl fmt::Debug for Transaction<'_> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Transaction").field("id", &self.id).field("finished", &self.finished).finish()
	}
}
