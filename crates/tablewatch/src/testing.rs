use std::sync::Arc;

use tablewatch_host::memory::MemoryHost;
use tablewatch_host::{HostProcess, ShmemError};

use crate::mailbox::{Mailbox, Target};
use crate::name::{BoundedName, Overlength};
use crate::shmem::{attach, install_hooks};

pub(crate) fn target(schema: &str, table: &str) -> Target {
	Target::new(
		BoundedName::new(schema, Overlength::Reject).unwrap(),
		BoundedName::new(table, Overlength::Reject).unwrap(),
	)
}

/// A started host process with only the mailbox hooks installed.
pub(crate) fn started_mailbox() -> (HostProcess, Arc<Mailbox>) {
	started_with(&MemoryHost::new())
}

pub(crate) fn started_with(host: &MemoryHost) -> (HostProcess, Arc<Mailbox>) {
	let mut process = HostProcess::new(Arc::new(host.clone()));
	process
		.preload("tablewatch", |ctx| {
			install_hooks(ctx.hooks_mut());
			Ok::<_, ShmemError>(())
		})
		.unwrap();
	process.start().unwrap();
	let mailbox = attach(process.segment()).unwrap();
	(process, mailbox)
}
