use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use thiserror::Error;

use crate::registry::{WorkerRecord, WorkerRegistry};
use crate::spec::{StartPhase, WorkerSpec};
use crate::state::WorkerState;
use crate::supervisor::{BackgroundWorker, ShutdownMode, ShutdownReport, SupervisedWorker, WorkerHandle, spawn_supervised};

/// Errors returned when registering a background worker.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegisterError {
	#[error("background worker name must not be empty")]
	EmptyName,

	#[error("background worker \"{name}\" can only be registered while shared libraries are being preloaded")]
	NotInPreload { name: String },

	#[error("background worker \"{name}\" requests a database connection without shared memory access")]
	MissingShmemAccess { name: String },

	#[error("background worker \"{name}\" is already registered")]
	Duplicate { name: String },

	#[error("dynamic background worker \"{name}\" cannot start before the host is running")]
	HostNotRunning { name: String },

	#[error("worker runtime is shutting down")]
	ShuttingDown,
}

type Launcher = Arc<dyn Fn(&WorkerRegistry) -> Arc<dyn SupervisedWorker> + Send + Sync>;

struct StaticWorker {
	name: String,
	start_phase: StartPhase,
	launch: Launcher,
	running: Option<Arc<dyn SupervisedWorker>>,
}

#[derive(Default)]
struct RuntimeState {
	phase: Option<StartPhase>,
	statics: Vec<StaticWorker>,
	dynamics: Vec<Arc<dyn SupervisedWorker>>,
	shutting_down: bool,
}

impl RuntimeState {
	fn is_taken(&self, name: &str) -> bool {
		self.statics.iter().any(|w| w.name == name) || self.dynamics.iter().any(|w| w.name() == name && w.state() != WorkerState::Terminated)
	}

	fn launch_ready(&mut self, registry: &WorkerRegistry) -> usize {
		let Some(phase) = self.phase else {
			return 0;
		};
		let mut launched = 0;
		for worker in self.statics.iter_mut().filter(|w| w.running.is_none() && w.start_phase <= phase) {
			tracing::info!(worker = %worker.name, phase = phase.as_str(), "worker.launch");
			worker.running = Some((worker.launch)(registry));
			launched += 1;
		}
		launched
	}
}

/// The host's background worker facility.
///
/// Static workers are registered during the preload window and launched as
/// the host advances through its [`StartPhase`]s; dynamic workers are
/// launched on registration once the host is running.
#[derive(Clone, Default)]
pub struct WorkerRuntime {
	registry: WorkerRegistry,
	preload: Arc<AtomicBool>,
	state: Arc<Mutex<RuntimeState>>,
}

impl WorkerRuntime {
	pub fn new() -> Self {
		Self::default()
	}

	/// Opens the preload window. Static registration is only accepted inside it.
	pub fn begin_preload(&self) {
		self.preload.store(true, Ordering::Release);
	}

	pub fn end_preload(&self) {
		self.preload.store(false, Ordering::Release);
	}

	pub fn preload_in_progress(&self) -> bool {
		self.preload.load(Ordering::Acquire)
	}

	/// Highest start phase the host has reached, if it is running at all.
	pub fn phase(&self) -> Option<StartPhase> {
		self.state.lock().phase
	}

	pub fn registry(&self) -> &WorkerRegistry {
		&self.registry
	}

	/// Registers a static worker, launched once its start phase is reached.
	pub fn register<W>(&self, spec: WorkerSpec<W>) -> Result<(), RegisterError>
	where
		W: BackgroundWorker,
	{
		spec.validate()?;
		if !self.preload_in_progress() {
			return Err(RegisterError::NotInPreload { name: spec.name });
		}

		let mut state = self.state.lock();
		if state.shutting_down {
			return Err(RegisterError::ShuttingDown);
		}
		if state.is_taken(&spec.name) {
			return Err(RegisterError::Duplicate { name: spec.name });
		}

		self.registry.upsert(WorkerRecord {
			name: spec.name.clone(),
			state: WorkerState::Registered,
			generation: 0,
			restarts: 0,
			last_exit: None,
		});
		tracing::debug!(worker = %spec.name, phase = spec.start_phase.as_str(), flags = ?spec.flags, "worker.register");

		let name = spec.name.clone();
		let start_phase = spec.start_phase;
		let launch: Launcher = Arc::new(move |registry: &WorkerRegistry| {
			let handle: Arc<dyn SupervisedWorker> = Arc::new(spawn_supervised(spec.clone(), registry));
			handle
		});
		state.statics.push(StaticWorker {
			name,
			start_phase,
			launch,
			running: None,
		});
		Ok(())
	}

	/// Registers and immediately launches a worker on a running host.
	pub fn register_dynamic<W>(&self, spec: WorkerSpec<W>) -> Result<Arc<WorkerHandle<W::Evt>>, RegisterError>
	where
		W: BackgroundWorker,
	{
		spec.validate()?;
		let mut state = self.state.lock();
		if state.shutting_down {
			return Err(RegisterError::ShuttingDown);
		}
		if state.phase.is_none() {
			return Err(RegisterError::HostNotRunning { name: spec.name });
		}
		if state.is_taken(&spec.name) {
			return Err(RegisterError::Duplicate { name: spec.name });
		}

		tracing::debug!(worker = %spec.name, flags = ?spec.flags, "worker.register_dynamic");
		let handle = Arc::new(spawn_supervised(spec, &self.registry));
		state.dynamics.retain(|w| w.state() != WorkerState::Terminated);
		state.dynamics.push(Arc::clone(&handle) as Arc<dyn SupervisedWorker>);
		Ok(handle)
	}

	/// Advances the host to `phase` and launches every static worker it unblocks.
	///
	/// Phases never move backwards. Returns the number of workers launched.
	pub fn enter_phase(&self, phase: StartPhase) -> usize {
		let mut state = self.state.lock();
		if state.shutting_down {
			return 0;
		}
		state.phase = Some(state.phase.map_or(phase, |current| current.max(phase)));
		state.launch_ready(&self.registry)
	}

	/// Returns the running instance of a static or dynamic worker.
	pub fn worker(&self, name: &str) -> Option<Arc<dyn SupervisedWorker>> {
		let state = self.state.lock();
		state
			.statics
			.iter()
			.filter(|w| w.name == name)
			.find_map(|w| w.running.clone())
			.or_else(|| state.dynamics.iter().rev().find(|w| w.name() == name).cloned())
	}

	/// Stops every static worker and launches fresh instances.
	///
	/// Models a restart within the host lifetime: registrations survive.
	pub async fn restart_static(&self, mode: ShutdownMode) -> usize {
		let running: Vec<_> = {
			let mut state = self.state.lock();
			state.statics.iter_mut().filter_map(|w| w.running.take()).collect()
		};
		for worker in &running {
			worker.shutdown(mode).await;
		}
		let mut state = self.state.lock();
		if state.shutting_down {
			return 0;
		}
		state.launch_ready(&self.registry)
	}

	/// Stops every worker. No worker is launched or restarted afterwards.
	pub async fn shutdown(&self, mode: ShutdownMode) -> Vec<ShutdownReport> {
		let running: Vec<_> = {
			let mut state = self.state.lock();
			state.shutting_down = true;
			let mut running: Vec<_> = state.statics.iter_mut().filter_map(|w| w.running.take()).collect();
			running.append(&mut state.dynamics);
			running
		};
		for worker in &running {
			worker.terminate();
		}
		let mut reports = Vec::with_capacity(running.len());
		for worker in &running {
			reports.push(worker.shutdown(mode).await);
		}
		reports
	}
}
