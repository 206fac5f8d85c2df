//! Registration descriptors for background workers.

use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use tokio::sync::broadcast;

use crate::runtime::RegisterError;
use crate::state::ExitReason;
use crate::supervisor::BackgroundWorker;

bitflags::bitflags! {
	/// Host capabilities a worker asks for at registration time.
	#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
	pub struct WorkerFlags: u8 {
		/// Attach to named shared memory regions.
		const SHMEM_ACCESS = 0b0000_0001;
		/// Open a database session. Only valid together with `SHMEM_ACCESS`.
		const DATABASE_CONNECTION = 0b0000_0010;
	}
}

/// Host startup milestone that gates launching a statically registered worker.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StartPhase {
	/// As soon as the host process is up, before recovery.
	PostmasterStart,
	/// Once the host reached a consistent (read-only recoverable) state.
	#[default]
	ConsistentState,
	/// Once recovery finished and the host accepts writes.
	RecoveryFinished,
}

impl StartPhase {
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::PostmasterStart => "postmaster_start",
			Self::ConsistentState => "consistent_state",
			Self::RecoveryFinished => "recovery_finished",
		}
	}
}

/// What the supervisor does when a worker generation exits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RestartPolicy {
	/// The worker is terminated after its first exit.
	Never,
	/// Failed generations (startup failure, tick failure, panic) restart after
	/// `delay`. Clean stops and terminations never restart.
	OnFailure { delay: Duration, max_restarts: Option<usize> },
}

impl RestartPolicy {
	/// Fixed delay restart without a restart cap.
	pub const fn after(delay: Duration) -> Self {
		Self::OnFailure { delay, max_restarts: None }
	}

	pub(crate) fn restart_delay(&self, reason: &ExitReason, restart_count: usize) -> Option<Duration> {
		match self {
			Self::Never => None,
			Self::OnFailure { delay, max_restarts } => {
				let under_cap = max_restarts.is_none_or(|max| restart_count < max);
				(reason.is_failure() && under_cap).then_some(*delay)
			}
		}
	}
}

impl Default for RestartPolicy {
	fn default() -> Self {
		Self::after(Duration::from_secs(5))
	}
}

/// Registration descriptor for one background worker.
pub struct WorkerSpec<W>
where
	W: BackgroundWorker,
{
	pub(crate) name: String,
	pub(crate) flags: WorkerFlags,
	pub(crate) start_phase: StartPhase,
	pub(crate) restart: RestartPolicy,
	pub(crate) interval: Duration,
	pub(crate) events: broadcast::Sender<W::Evt>,
	pub(crate) factory: Arc<dyn Fn() -> W + Send + Sync>,
}

impl<W> Clone for WorkerSpec<W>
where
	W: BackgroundWorker,
{
	fn clone(&self) -> Self {
		Self {
			name: self.name.clone(),
			flags: self.flags,
			start_phase: self.start_phase,
			restart: self.restart.clone(),
			interval: self.interval,
			events: self.events.clone(),
			factory: Arc::clone(&self.factory),
		}
	}
}

impl<W> WorkerSpec<W>
where
	W: BackgroundWorker,
{
	/// Creates a spec whose entry point is the given factory.
	///
	/// Every generation gets a fresh worker from `factory`.
	pub fn new(name: impl Into<String>, factory: impl Fn() -> W + Send + Sync + 'static) -> Self {
		let (events, _) = broadcast::channel(128);
		Self {
			name: name.into(),
			flags: WorkerFlags::empty(),
			start_phase: StartPhase::default(),
			restart: RestartPolicy::default(),
			interval: Duration::from_secs(1),
			events,
			factory: Arc::new(factory),
		}
	}

	#[must_use]
	pub fn flags(mut self, flags: WorkerFlags) -> Self {
		self.flags = flags;
		self
	}

	#[must_use]
	pub fn start_phase(mut self, phase: StartPhase) -> Self {
		self.start_phase = phase;
		self
	}

	#[must_use]
	pub fn restart(mut self, restart: RestartPolicy) -> Self {
		self.restart = restart;
		self
	}

	/// Sets the wait between two ticks of one generation.
	///
	/// # Panics
	///
	/// Panics if `interval` is zero.
	#[must_use]
	pub fn interval(mut self, interval: Duration) -> Self {
		assert!(!interval.is_zero(), "worker tick interval must be > 0");
		self.interval = interval;
		self
	}

	/// Replaces the event channel with one of the given capacity.
	///
	/// Existing subscribers keep the old channel and stop receiving events.
	///
	/// # Panics
	///
	/// Panics if `size` is zero.
	#[must_use]
	pub fn event_buffer(mut self, size: usize) -> Self {
		assert!(size > 0, "event buffer size must be > 0");
		self.events = broadcast::channel(size).0;
		self
	}

	pub fn name(&self) -> &str {
		&self.name
	}

	/// Returns a sender for the worker's events, usable before the worker runs.
	pub fn event_sender(&self) -> broadcast::Sender<W::Evt> {
		self.events.clone()
	}

	pub(crate) fn validate(&self) -> Result<(), RegisterError> {
		if self.name.trim().is_empty() {
			return Err(RegisterError::EmptyName);
		}
		if self.flags.contains(WorkerFlags::DATABASE_CONNECTION) && !self.flags.contains(WorkerFlags::SHMEM_ACCESS) {
			return Err(RegisterError::MissingShmemAccess { name: self.name.clone() });
		}
		Ok(())
	}
}
