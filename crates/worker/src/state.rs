use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::AbortHandle;

use crate::registry::{WorkerRecord, WorkerRegistry};

/// Lifecycle state of one registered worker.
///
/// `Unregistered → Registered → Running → (Crashed → Restarting → Running) | Terminated`
///
/// No worker record ever holds `Unregistered`; it is what
/// [`WorkerRegistry::state`] reports for names that were never registered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WorkerState {
	Unregistered,
	Registered,
	Running,
	Crashed,
	Restarting,
	Terminated,
}

impl WorkerState {
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::Unregistered => "unregistered",
			Self::Registered => "registered",
			Self::Running => "running",
			Self::Crashed => "crashed",
			Self::Restarting => "restarting",
			Self::Terminated => "terminated",
		}
	}
}

/// Opaque exit classification for public consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum WorkerExitKind {
	Stopped,
	Cancelled,
	StartupFailed,
	TickFailed,
	Panicked,
	JoinFailed,
}

/// Exit summary of the most recent worker generation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerExit {
	kind: WorkerExitKind,
	message: Option<String>,
}

impl WorkerExit {
	pub fn kind(&self) -> WorkerExitKind {
		self.kind
	}

	pub fn message(&self) -> Option<&str> {
		self.message.as_deref()
	}

	pub fn is_failure(&self) -> bool {
		!matches!(self.kind, WorkerExitKind::Stopped | WorkerExitKind::Cancelled)
	}
}

impl From<&ExitReason> for WorkerExit {
	fn from(reason: &ExitReason) -> Self {
		let (kind, message) = match reason {
			ExitReason::Stopped => (WorkerExitKind::Stopped, None),
			ExitReason::Cancelled => (WorkerExitKind::Cancelled, None),
			ExitReason::StartupFailed(msg) => (WorkerExitKind::StartupFailed, Some(msg.clone())),
			ExitReason::TickFailed(msg) => (WorkerExitKind::TickFailed, Some(msg.clone())),
			ExitReason::Panicked(msg) => (WorkerExitKind::Panicked, Some(msg.clone())),
			ExitReason::JoinFailed(msg) => (WorkerExitKind::JoinFailed, Some(msg.clone())),
		};
		Self { kind, message }
	}
}

/// Exit reason for one worker generation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ExitReason {
	Stopped,
	Cancelled,
	StartupFailed(String),
	TickFailed(String),
	Panicked(String),
	JoinFailed(String),
}

impl ExitReason {
	pub fn is_failure(&self) -> bool {
		!matches!(self, Self::Stopped | Self::Cancelled)
	}
}

/// Shared status of one supervised worker, mirrored into the registry.
pub(crate) struct WorkerStatus {
	name: String,
	state: watch::Sender<WorkerState>,
	generation: AtomicU64,
	restarts: AtomicUsize,
	last_exit: Mutex<Option<ExitReason>>,
	current: Mutex<Option<AbortHandle>>,
	registry: WorkerRegistry,
}

impl WorkerStatus {
	pub fn new(name: String, registry: WorkerRegistry) -> Self {
		Self {
			name,
			state: watch::channel(WorkerState::Registered).0,
			generation: AtomicU64::new(0),
			restarts: AtomicUsize::new(0),
			last_exit: Mutex::new(None),
			current: Mutex::new(None),
			registry,
		}
	}

	pub fn state(&self) -> WorkerState {
		*self.state.borrow()
	}

	pub fn subscribe_state(&self) -> watch::Receiver<WorkerState> {
		self.state.subscribe()
	}

	pub fn set_state(&self, state: WorkerState) {
		self.state.send_replace(state);
		self.publish();
	}

	pub fn generation(&self) -> u64 {
		self.generation.load(Ordering::Acquire)
	}

	pub fn set_generation(&self, generation: u64) {
		self.generation.store(generation, Ordering::Release);
	}

	pub fn restarts(&self) -> usize {
		self.restarts.load(Ordering::Acquire)
	}

	pub fn set_restarts(&self, restarts: usize) {
		self.restarts.store(restarts, Ordering::Release);
	}

	pub fn last_exit(&self) -> Option<WorkerExit> {
		self.last_exit.lock().as_ref().map(WorkerExit::from)
	}

	pub fn record_exit(&self, reason: ExitReason) {
		*self.last_exit.lock() = Some(reason);
		*self.current.lock() = None;
	}

	pub fn set_current(&self, handle: AbortHandle) {
		*self.current.lock() = Some(handle);
	}

	/// Aborts the running generation at its next suspension point.
	pub fn abort_current(&self) {
		if let Some(handle) = self.current.lock().as_ref() {
			handle.abort();
		}
	}

	fn publish(&self) {
		let last_exit = self.last_exit.lock().as_ref().map(|reason| format!("{reason:?}"));
		self.registry.upsert(WorkerRecord {
			name: self.name.clone(),
			state: self.state(),
			generation: self.generation(),
			restarts: self.restarts(),
			last_exit,
		});
	}
}
