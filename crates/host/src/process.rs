//! The host's startup sequence: preload, shared memory, worker launch.

use std::error::Error as StdError;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tablewatch_worker::{ShutdownMode, ShutdownReport, StartPhase, WorkerRuntime};
use thiserror::Error;

use crate::error::HostResult;
use crate::session::{Host, Session};
use crate::shmem::{ShmemError, ShmemHooks, ShmemSegment};

/// Errors raised while loading libraries or starting the host.
#[derive(Debug, Error)]
pub enum PreloadError {
	#[error("library \"{library}\" failed to load: {source}")]
	Library {
		library: String,
		#[source]
		source: Box<dyn StdError + Send + Sync>,
	},

	#[error(transparent)]
	Shmem(#[from] ShmemError),

	#[error("host has already started; shared memory reservations are closed")]
	AlreadyStarted,
}

/// What a library sees while its load routine runs.
pub struct LoadContext<'a> {
	preload: bool,
	workers: &'a WorkerRuntime,
	hooks: &'a mut ShmemHooks,
	segment: &'a Arc<ShmemSegment>,
	host: &'a Arc<dyn Host>,
}

impl LoadContext<'_> {
	/// True only while the host is preloading shared libraries.
	pub fn preload_in_progress(&self) -> bool {
		self.preload
	}

	pub fn workers(&self) -> &WorkerRuntime {
		self.workers
	}

	pub fn hooks_mut(&mut self) -> &mut ShmemHooks {
		self.hooks
	}

	pub fn segment(&self) -> &Arc<ShmemSegment> {
		self.segment
	}

	pub fn host(&self) -> &Arc<dyn Host> {
		self.host
	}
}

/// A host process: library loading, shared memory and background workers.
///
/// [`preload`](Self::preload) runs library load routines inside the preload
/// window. [`start`](Self::start) then sizes and initializes shared memory
/// and walks the start phases, launching registered workers.
pub struct HostProcess {
	host: Arc<dyn Host>,
	workers: WorkerRuntime,
	hooks: ShmemHooks,
	segment: Arc<ShmemSegment>,
	started: AtomicBool,
}

impl HostProcess {
	pub fn new(host: Arc<dyn Host>) -> Self {
		Self {
			host,
			workers: WorkerRuntime::new(),
			hooks: ShmemHooks::default(),
			segment: Arc::new(ShmemSegment::new()),
			started: AtomicBool::new(false),
		}
	}

	/// Runs `load` for `library` as part of shared library preloading.
	pub fn preload<T, E>(&mut self, library: &str, load: impl FnOnce(&mut LoadContext<'_>) -> Result<T, E>) -> Result<T, PreloadError>
	where
		E: Into<Box<dyn StdError + Send + Sync>>,
	{
		if self.is_started() {
			return Err(PreloadError::AlreadyStarted);
		}
		tracing::info!(library, "library.preload");
		self.workers.begin_preload();
		let result = self.run_load(library, true, load);
		self.workers.end_preload();
		result
	}

	/// Loads `library` outside the preload window, as a session would on demand.
	pub fn load<T, E>(&mut self, library: &str, load: impl FnOnce(&mut LoadContext<'_>) -> Result<T, E>) -> Result<T, PreloadError>
	where
		E: Into<Box<dyn StdError + Send + Sync>>,
	{
		tracing::info!(library, "library.load");
		self.run_load(library, false, load)
	}

	fn run_load<T, E>(&mut self, library: &str, preload: bool, load: impl FnOnce(&mut LoadContext<'_>) -> Result<T, E>) -> Result<T, PreloadError>
	where
		E: Into<Box<dyn StdError + Send + Sync>>,
	{
		let mut ctx = LoadContext {
			preload,
			workers: &self.workers,
			hooks: &mut self.hooks,
			segment: &self.segment,
			host: &self.host,
		};
		load(&mut ctx).map_err(|err| PreloadError::Library {
			library: library.to_string(),
			source: err.into(),
		})
	}

	pub fn is_started(&self) -> bool {
		self.started.load(Ordering::Acquire)
	}

	/// Sizes shared memory, runs startup hooks and launches workers.
	///
	/// Returns the number of workers launched across all start phases.
	pub fn start(&self) -> Result<usize, PreloadError> {
		if self.started.swap(true, Ordering::AcqRel) {
			return Err(PreloadError::AlreadyStarted);
		}
		let request = self.hooks.run_request();
		self.segment.finalize(request)?;
		self.hooks.run_startup(&self.segment)?;

		let mut launched = 0;
		for phase in [StartPhase::PostmasterStart, StartPhase::ConsistentState, StartPhase::RecoveryFinished] {
			let count = self.workers.enter_phase(phase);
			tracing::debug!(phase = phase.as_str(), launched = count, "host.phase");
			launched += count;
		}
		tracing::info!(launched, "host.started");
		Ok(launched)
	}

	/// Reinitializes shared memory state and relaunches static workers.
	///
	/// Startup hooks run again against the surviving segment, so regions
	/// created with `init_struct` are attached rather than recreated.
	pub async fn restart_in_place(&self) -> Result<usize, PreloadError> {
		if !self.is_started() {
			return self.start();
		}
		tracing::warn!("host.restart_in_place");
		self.hooks.run_startup(&self.segment)?;
		Ok(self.workers.restart_static(ShutdownMode::Immediate).await)
	}

	pub fn connect(&self, database: &str) -> HostResult<Arc<dyn Session>> {
		self.host.connect(database)
	}

	pub fn host(&self) -> &Arc<dyn Host> {
		&self.host
	}

	pub fn workers(&self) -> &WorkerRuntime {
		&self.workers
	}

	pub fn segment(&self) -> &Arc<ShmemSegment> {
		&self.segment
	}

	pub async fn shutdown(&self, mode: ShutdownMode) -> Vec<ShutdownReport> {
		tracing::info!("host.shutdown");
		self.workers.shutdown(mode).await
	}
}
