use std::fmt;

use crate::error::HostResult;
use crate::txn::Transaction;

/// Statement class reported by the executor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecStatus {
	/// DDL and other utility statements.
	Utility,
	Select,
	Insert,
	Update,
	Delete,
}

impl ExecStatus {
	pub const fn description(self) -> &'static str {
		match self {
			Self::Utility => "OK_UTILITY",
			Self::Select => "OK_SELECT",
			Self::Insert => "OK_INSERT",
			Self::Update => "OK_UPDATE",
			Self::Delete => "OK_DELETE",
		}
	}
}

impl fmt::Display for ExecStatus {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.description())
	}
}

/// Result of one executed statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecOutcome {
	pub status: ExecStatus,
	pub processed: u64,
}

/// The host's statement execution engine.
pub trait StatementExecutor: Send + Sync {
	/// Executes `sql` inside `txn`. Effects become visible to other units of
	/// work only once `txn` commits.
	fn execute(&self, txn: &Transaction<'_>, sql: &str) -> HostResult<ExecOutcome>;
}
