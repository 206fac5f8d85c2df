//! The handler-facing create operation.

use tablewatch_host::{ExecStatus, HostError, Session};

use crate::error::HandlerError;
use crate::mailbox::Target;
use crate::name::BoundedName;
use crate::publisher::MailboxPublisher;

/// Creates `schema.table (a int)` and publishes it to the mailbox.
///
/// Arguments are validated before anything touches the host. The statement
/// runs in its own unit of work, and the target is published only after that
/// commits; any failure leaves both the catalog and the mailbox untouched.
pub fn create_table(session: &dyn Session, publisher: &MailboxPublisher, table: Option<&str>, schema: Option<&str>) -> Result<Target, HandlerError> {
	let target = publisher.target(schema, table)?;
	let sql = create_table_statement(&target);

	let txn = session.begin()?;
	let outcome = session.executor().execute(&txn, &sql).map_err(execution_failed)?;
	if outcome.status != ExecStatus::Utility {
		txn.abort();
		return Err(HandlerError::Execution {
			status: outcome.status.description().to_string(),
		});
	}
	// A concurrent creator of the same relation only shows up at commit.
	txn.commit().map_err(execution_failed)?;
	tracing::info!(%target, processed = outcome.processed, "handler.create_table");

	publisher.publish(target);
	Ok(target)
}

fn execution_failed(err: HostError) -> HandlerError {
	HandlerError::Execution { status: err.to_string() }
}

pub(crate) fn create_table_statement(target: &Target) -> String {
	format!("CREATE TABLE {}.{} (a int)", quote_ident(&target.schema), quote_ident(&target.table))
}

fn quote_ident(name: &BoundedName) -> String {
	format!("\"{}\"", name.as_str().replace('"', "\"\""))
}
