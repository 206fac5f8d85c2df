//! Catalog polling worker fed through a shared-memory mailbox.
//!
//! Request handlers publish a (schema, table) [`Target`] into a single-slot
//! [`Mailbox`] in host shared memory. A supervised background worker polls
//! the mailbox on a fixed interval and resolves the target against the
//! host catalog, reporting each cycle as a [`PollEvent`].
//!
//! The host side (catalog, transactions, shared memory, worker runtime) is
//! provided by `tablewatch-host` and `tablewatch-worker`; [`Extension::load`]
//! wires this crate into it during shared library preloading.

mod config;
mod error;
mod extension;
mod handler;
mod mailbox;
mod name;
mod poll;
mod publisher;
mod shmem;
#[cfg(test)]
mod testing;

pub use config::{Config, ConfigError, MailboxConfig, WorkerConfig};
pub use error::{ExtensionError, HandlerError};
pub use extension::{Extension, LIBRARY_NAME};
pub use handler::create_table;
pub use mailbox::{MAILBOX_REGION, Mailbox, PublishOutcome, Target};
pub use name::{BoundedName, MAX_NAME_BYTES, NameError, Overlength};
pub use poll::{PollEvent, PollWorker, Resolution, run_cycle};
pub use publisher::MailboxPublisher;
pub use shmem::{attach, init_mailbox, install_hooks};
