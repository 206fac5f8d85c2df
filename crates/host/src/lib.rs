//! Host-side contracts consumed by extensions, plus an in-memory host.
//!
//! An extension sees the host through a handful of seams: named objects in a
//! [`Catalog`], [`Transaction`] boundaries around every catalog access, a
//! [`StatementExecutor`], named shared memory ([`ShmemSegment`]) sized by
//! chained reservation hooks, and the background worker runtime from
//! `tablewatch-worker`. [`HostProcess`] drives these through the host's
//! startup sequence; [`memory::MemoryHost`] backs them with an in-memory
//! catalog.

mod catalog;
mod error;
mod executor;
pub mod memory;
mod process;
mod session;
mod shmem;
mod txn;

pub use catalog::{Catalog, IDENTIFIER_MAX_BYTES, Oid, truncate_identifier};
pub use error::{HostError, HostResult};
pub use executor::{ExecOutcome, ExecStatus, StatementExecutor};
pub use process::{HostProcess, LoadContext, PreloadError};
pub use session::{Host, Session};
pub use shmem::{ShmemError, ShmemHooks, ShmemRequest, ShmemSegment, TrancheId};
pub use txn::{Transaction, TransactionId, TransactionManager};
