//! Extension load routine and the handle it leaves behind.

use std::sync::Arc;

use tablewatch_host::{Host, LoadContext, Session, ShmemSegment};
use tablewatch_worker::{WorkerHandle, WorkerRuntime};
use tokio::sync::broadcast;

use crate::config::Config;
use crate::error::{ExtensionError, HandlerError};
use crate::handler;
use crate::mailbox::Target;
use crate::poll::{PollEvent, PollWorker};
use crate::publisher::MailboxPublisher;
use crate::shmem;

/// Library name the extension is preloaded under.
pub const LIBRARY_NAME: &str = "tablewatch";

/// A loaded extension.
///
/// Created by [`Extension::load`] while the host preloads libraries. The
/// mailbox it hands out through [`publisher`](Self::publisher) exists once
/// the host has started.
pub struct Extension {
	config: Config,
	host: Arc<dyn Host>,
	segment: Arc<ShmemSegment>,
	workers: WorkerRuntime,
	events: broadcast::Sender<PollEvent>,
}

impl Extension {
	/// Installs the mailbox hooks and registers the poll worker.
	///
	/// Fails unless the host is preloading shared libraries: the mailbox
	/// has to be reserved before shared memory is sized.
	pub fn load(ctx: &mut LoadContext<'_>, config: Config) -> Result<Self, ExtensionError> {
		if !ctx.preload_in_progress() {
			tracing::error!(library = LIBRARY_NAME, "extension.not_preloaded");
			return Err(ExtensionError::NotPreloaded);
		}
		config.validate()?;

		shmem::install_hooks(ctx.hooks_mut());

		let spec = PollWorker::spec(&config.worker.name, &config.worker, Arc::clone(ctx.host()), Arc::clone(ctx.segment()))?;
		let events = spec.event_sender();
		ctx.workers().register(spec)?;
		tracing::info!(
			worker = %config.worker.name,
			database = %config.worker.database,
			poll_interval_ms = config.worker.poll_interval_ms,
			"extension.loaded"
		);

		Ok(Self {
			host: Arc::clone(ctx.host()),
			segment: Arc::clone(ctx.segment()),
			workers: ctx.workers().clone(),
			events,
			config,
		})
	}

	pub fn config(&self) -> &Config {
		&self.config
	}

	/// Subscribes to the static worker's poll events, across restarts.
	pub fn subscribe(&self) -> broadcast::Receiver<PollEvent> {
		self.events.subscribe()
	}

	/// Publisher bound to the shared mailbox. Needs a started host.
	pub fn publisher(&self) -> Result<MailboxPublisher, ExtensionError> {
		let mailbox = shmem::attach(&self.segment)?;
		Ok(MailboxPublisher::new(mailbox, &self.config.mailbox)?)
	}

	/// Handler entry point: creates `schema.table` and publishes it.
	pub fn create_table(&self, session: &dyn Session, table: Option<&str>, schema: Option<&str>) -> Result<Target, HandlerError> {
		let mailbox = shmem::attach(&self.segment)?;
		let publisher = MailboxPublisher::new(mailbox, &self.config.mailbox)?;
		handler::create_table(session, &publisher, table, schema)
	}

	/// Launches an additional poll worker on the running host.
	pub fn launch_dynamic(&self, name: &str) -> Result<Arc<WorkerHandle<PollEvent>>, ExtensionError> {
		let spec = PollWorker::spec(name, &self.config.worker, Arc::clone(&self.host), Arc::clone(&self.segment))?;
		Ok(self.workers.register_dynamic(spec)?)
	}
}

#[cfg(test)]
mod tests;
