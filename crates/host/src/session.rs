use std::sync::Arc;

use crate::catalog::Catalog;
use crate::error::HostResult;
use crate::executor::StatementExecutor;
use crate::txn::{Transaction, TransactionManager};

/// A logical database session: the execution context for catalog access.
pub trait Session: Send + Sync {
	fn database(&self) -> &str;

	fn catalog(&self) -> &dyn Catalog;

	fn transactions(&self) -> &dyn TransactionManager;

	fn executor(&self) -> &dyn StatementExecutor;

	/// Opens a scoped unit of work on this session.
	fn begin(&self) -> HostResult<Transaction<'_>> {
		Transaction::begin(self.transactions())
	}
}

/// Entry point for opening sessions against the host's databases.
pub trait Host: Send + Sync {
	/// Connects to `database`. Blocks until the session is established.
	fn connect(&self, database: &str) -> HostResult<Arc<dyn Session>>;
}
