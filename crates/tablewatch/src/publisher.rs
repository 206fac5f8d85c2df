//! Handler-side access to the mailbox.

use std::sync::Arc;

use crate::config::MailboxConfig;
use crate::error::HandlerError;
use crate::mailbox::{Mailbox, PublishOutcome, Target};
use crate::name::{BoundedName, NameError, Overlength};

/// Validates handler arguments into targets and publishes them.
#[derive(Debug, Clone)]
pub struct MailboxPublisher {
	mailbox: Arc<Mailbox>,
	default_schema: BoundedName,
	overlength: Overlength,
}

impl MailboxPublisher {
	pub fn new(mailbox: Arc<Mailbox>, config: &MailboxConfig) -> Result<Self, NameError> {
		Ok(Self {
			mailbox,
			default_schema: config.bounded(&config.default_schema)?,
			overlength: config.overlength,
		})
	}

	pub fn mailbox(&self) -> &Arc<Mailbox> {
		&self.mailbox
	}

	pub fn default_schema(&self) -> BoundedName {
		self.default_schema
	}

	/// Builds a target from raw arguments.
	///
	/// `table` is required; an absent or empty schema falls back to the
	/// default schema.
	pub fn target(&self, schema: Option<&str>, table: Option<&str>) -> Result<Target, HandlerError> {
		let table = table.filter(|t| !t.is_empty()).ok_or(HandlerError::MissingArgument("table name"))?;
		let table = BoundedName::new(table, self.overlength)?;
		let schema = match schema.filter(|s| !s.is_empty()) {
			Some(schema) => BoundedName::new(schema, self.overlength)?,
			None => self.default_schema,
		};
		Ok(Target::new(schema, table))
	}

	/// Publishes `target`. The worker picks it up on its next cycle.
	pub fn publish(&self, target: Target) -> PublishOutcome {
		let outcome = self.mailbox.publish(target);
		tracing::debug!(%target, ?outcome, "mailbox.published");
		outcome
	}
}
