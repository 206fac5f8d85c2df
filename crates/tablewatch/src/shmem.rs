//! Reservation and startup hooks that place the mailbox in shared memory.

use std::sync::Arc;

use tablewatch_host::{ShmemError, ShmemHooks, ShmemSegment};

use crate::mailbox::{MAILBOX_REGION, Mailbox};

/// Chains the mailbox's reservation and startup hooks after any installed ones.
pub fn install_hooks(hooks: &mut ShmemHooks) {
	hooks.chain_request(|request| {
		request.request_space(size_of::<Mailbox>());
		request.request_named_lock_tranche(MAILBOX_REGION, 1);
	});
	hooks.chain_startup(|segment| init_mailbox(segment).map(|_| ()));
}

/// Creates the mailbox region, or attaches to it if it already exists.
///
/// Returns the mailbox and whether it was found. A found mailbox keeps its
/// content.
pub fn init_mailbox(segment: &ShmemSegment) -> Result<(Arc<Mailbox>, bool), ShmemError> {
	let tranche = segment.named_lock_tranche(MAILBOX_REGION)?;
	let (mailbox, found) = segment.init_struct(MAILBOX_REGION, || Mailbox::new(tranche))?;
	if found {
		tracing::debug!(region = MAILBOX_REGION, "mailbox.attached");
	} else {
		tracing::debug!(region = MAILBOX_REGION, bytes = size_of::<Mailbox>(), "mailbox.initialized");
	}
	Ok((mailbox, found))
}

/// Attaches to a mailbox created by the startup hook.
pub fn attach(segment: &ShmemSegment) -> Result<Arc<Mailbox>, ShmemError> {
	segment.lookup::<Mailbox>(MAILBOX_REGION)
}
