//! The background poll worker.
//!
//! Each cycle copies the mailbox target out under its lock, then resolves it
//! inside one scoped unit of work: namespace first, then the relation within
//! it. The unit of work is closed on every exit path; misses commit like
//! hits, and a failed lookup aborts it on drop.

use std::sync::Arc;

use async_trait::async_trait;
use tablewatch_host::{Catalog, Host, HostResult, Oid, Session, ShmemSegment, Transaction};
use tablewatch_worker::{BackgroundWorker, RestartPolicy, WorkerContext, WorkerFlags, WorkerFlow, WorkerSpec};

use crate::config::{ConfigError, WorkerConfig};
use crate::mailbox::{Mailbox, Target};
use crate::shmem;

/// Outcome of one poll cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
	/// Nothing published yet; no unit of work was opened.
	Idle,
	NamespaceMissing,
	RelationMissing { namespace: Oid },
	Resolved { namespace: Oid, relation: Oid },
}

impl Resolution {
	pub fn relation(&self) -> Option<Oid> {
		match self {
			Self::Resolved { relation, .. } => Some(*relation),
			_ => None,
		}
	}
}

/// Emitted on the worker's event channel after every cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollEvent {
	pub generation: u64,
	pub target: Option<Target>,
	pub resolution: Resolution,
}

/// Runs one poll cycle against `session`.
pub fn run_cycle(generation: u64, mailbox: &Mailbox, session: &dyn Session) -> HostResult<PollEvent> {
	let Some(target) = mailbox.snapshot() else {
		return Ok(PollEvent {
			generation,
			target: None,
			resolution: Resolution::Idle,
		});
	};
	tracing::debug!(schema = %target.schema, table = %target.table, "poll.target");

	let txn = session.begin()?;
	let resolution = resolve(session.catalog(), &txn, &target)?;
	txn.commit()?;

	match resolution {
		Resolution::Resolved { relation, .. } => tracing::info!(%target, oid = %relation, "poll.resolved"),
		Resolution::NamespaceMissing => tracing::debug!(schema = %target.schema, "poll.namespace_missing"),
		Resolution::RelationMissing { namespace } => tracing::debug!(%target, %namespace, "poll.relation_missing"),
		Resolution::Idle => {}
	}
	Ok(PollEvent {
		generation,
		target: Some(target),
		resolution,
	})
}

fn resolve(catalog: &dyn Catalog, txn: &Transaction<'_>, target: &Target) -> HostResult<Resolution> {
	let Some(namespace) = catalog.namespace_oid(txn, target.schema.as_str())? else {
		return Ok(Resolution::NamespaceMissing);
	};
	Ok(match catalog.find_relation(txn, namespace, target.table.as_str())? {
		Some(relation) => Resolution::Resolved { namespace, relation },
		None => Resolution::RelationMissing { namespace },
	})
}

/// Worker body: connects on start, then runs one cycle per tick.
pub struct PollWorker {
	host: Arc<dyn Host>,
	segment: Arc<ShmemSegment>,
	database: String,
	attached: Option<(Arc<Mailbox>, Arc<dyn Session>)>,
}

impl PollWorker {
	pub fn new(host: Arc<dyn Host>, segment: Arc<ShmemSegment>, database: impl Into<String>) -> Self {
		Self {
			host,
			segment,
			database: database.into(),
			attached: None,
		}
	}

	/// Registration descriptor for a poll worker named `name`.
	///
	/// `config` is validated first, so a zero poll interval is an error here
	/// rather than a panic in the worker runtime.
	pub fn spec(name: &str, config: &WorkerConfig, host: Arc<dyn Host>, segment: Arc<ShmemSegment>) -> Result<WorkerSpec<Self>, ConfigError> {
		config.validate()?;
		let database = config.database.clone();
		Ok(WorkerSpec::new(name, move || Self::new(Arc::clone(&host), Arc::clone(&segment), database.clone()))
			.flags(WorkerFlags::SHMEM_ACCESS | WorkerFlags::DATABASE_CONNECTION)
			.start_phase(config.start_phase)
			.restart(RestartPolicy::after(config.restart_delay()))
			.interval(config.poll_interval()))
	}
}

#[async_trait]
impl BackgroundWorker for PollWorker {
	type Evt = PollEvent;

	async fn on_start(&mut self, ctx: &mut WorkerContext<Self::Evt>) -> Result<(), String> {
		if !ctx.flags().contains(WorkerFlags::DATABASE_CONNECTION) {
			return Err(format!("worker \"{}\" has no database connection access", ctx.name()));
		}
		let mailbox = shmem::attach(&self.segment).map_err(|err| err.to_string())?;
		let session = self.host.connect(&self.database).map_err(|err| err.to_string())?;
		tracing::info!(worker = ctx.name(), database = %self.database, generation = ctx.generation(), "poll.connected");
		self.attached = Some((mailbox, session));
		Ok(())
	}

	async fn on_stop(&mut self, ctx: &mut WorkerContext<Self::Evt>) {
		self.attached = None;
		tracing::debug!(worker = ctx.name(), generation = ctx.generation(), "poll.stopped");
	}

	async fn tick(&mut self, ctx: &mut WorkerContext<Self::Evt>) -> Result<WorkerFlow, String> {
		let Some((mailbox, session)) = &self.attached else {
			return Err("poll worker is not attached".to_string());
		};
		let event = run_cycle(ctx.generation(), mailbox, &**session).map_err(|err| err.to_string())?;
		ctx.emit(event);
		Ok(WorkerFlow::Continue)
	}
}
