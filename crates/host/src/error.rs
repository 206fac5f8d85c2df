use thiserror::Error;

use crate::txn::TransactionId;

/// Errors raised by host services.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HostError {
	#[error("database \"{0}\" does not exist")]
	UnknownDatabase(String),

	#[error("transaction {0} is not in progress")]
	TransactionNotOpen(TransactionId),

	#[error("syntax error: {0}")]
	Syntax(String),

	#[error("unsupported statement: {0}")]
	Unsupported(String),

	#[error("schema \"{0}\" does not exist")]
	UndefinedSchema(String),

	#[error("schema \"{0}\" already exists")]
	DuplicateSchema(String),

	#[error("relation \"{0}\" already exists")]
	DuplicateRelation(String),

	#[error("catalog unavailable: {0}")]
	Unavailable(String),
}

pub type HostResult<T> = std::result::Result<T, HostError>;
