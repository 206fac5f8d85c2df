use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{broadcast, watch};
use tokio_util::sync::CancellationToken;

use crate::registry::WorkerRegistry;
use crate::spec::{WorkerFlags, WorkerSpec};
use crate::state::{ExitReason, WorkerExit, WorkerState, WorkerStatus};
use crate::token::{GenerationClock, GenerationToken};

/// Continuation directive returned by one worker tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerFlow {
	/// Wait for the tick interval, then tick again.
	Continue,
	/// Exit cleanly. The supervisor does not restart a stopped worker.
	Stop,
}

/// Background worker body driven by the supervisor.
///
/// `tick` runs to completion once started: termination is only observed
/// between ticks, so a tick never has to cope with being cut in half.
#[async_trait]
pub trait BackgroundWorker: Send + 'static {
	type Evt: Clone + Send + 'static;

	/// Establishes the worker's execution context. A failure counts as a crash.
	async fn on_start(&mut self, _ctx: &mut WorkerContext<Self::Evt>) -> Result<(), String> {
		Ok(())
	}

	async fn on_stop(&mut self, _ctx: &mut WorkerContext<Self::Evt>) {}

	async fn tick(&mut self, ctx: &mut WorkerContext<Self::Evt>) -> Result<WorkerFlow, String>;
}

/// Per-generation execution context handed to a worker.
pub struct WorkerContext<Evt> {
	name: Arc<str>,
	flags: WorkerFlags,
	events: broadcast::Sender<Evt>,
	token: GenerationToken,
}

impl<Evt> WorkerContext<Evt>
where
	Evt: Clone + Send + 'static,
{
	pub fn name(&self) -> &str {
		&self.name
	}

	/// Capabilities granted at registration.
	pub fn flags(&self) -> WorkerFlags {
		self.flags
	}

	/// Emits one event to subscribers. Events without subscribers are dropped.
	pub fn emit(&self, evt: Evt) {
		let _ = self.events.send(evt);
	}

	pub fn generation(&self) -> u64 {
		self.token.generation()
	}
}

/// How [`WorkerHandle::shutdown`] stops a worker.
#[derive(Debug, Clone, Copy)]
pub enum ShutdownMode {
	/// Abort the running generation at its next suspension point.
	Immediate,
	/// Request termination and let the current tick finish, up to `timeout`.
	Graceful { timeout: Duration },
}

/// Outcome of one shutdown request.
#[derive(Debug, Clone)]
pub struct ShutdownReport {
	completed: bool,
	timed_out: bool,
	last_exit: Option<WorkerExit>,
}

impl ShutdownReport {
	pub fn completed(&self) -> bool {
		self.completed
	}

	pub fn timed_out(&self) -> bool {
		self.timed_out
	}

	pub fn last_exit(&self) -> Option<&WorkerExit> {
		self.last_exit.as_ref()
	}
}

/// Type-erased control surface over a supervised worker.
#[async_trait]
pub trait SupervisedWorker: Send + Sync {
	fn name(&self) -> &str;

	fn state(&self) -> WorkerState;

	/// Requests termination; the worker exits at its next iteration boundary.
	fn terminate(&self);

	async fn shutdown(&self, mode: ShutdownMode) -> ShutdownReport;
}

/// Handle to one supervised worker.
///
/// Dropping the handle terminates the worker.
pub struct WorkerHandle<Evt>
where
	Evt: Clone + Send + 'static,
{
	name: String,
	events: broadcast::Sender<Evt>,
	cancel: CancellationToken,
	status: Arc<WorkerStatus>,
	finished: watch::Receiver<bool>,
}

impl<Evt> Drop for WorkerHandle<Evt>
where
	Evt: Clone + Send + 'static,
{
	fn drop(&mut self) {
		self.cancel.cancel();
	}
}

impl<Evt> WorkerHandle<Evt>
where
	Evt: Clone + Send + 'static,
{
	pub fn name(&self) -> &str {
		&self.name
	}

	pub fn state(&self) -> WorkerState {
		self.status.state()
	}

	/// Watches lifecycle state transitions.
	pub fn state_changes(&self) -> watch::Receiver<WorkerState> {
		self.status.subscribe_state()
	}

	/// Current generation, 0 before the first start.
	pub fn generation(&self) -> u64 {
		self.status.generation()
	}

	pub fn restart_count(&self) -> usize {
		self.status.restarts()
	}

	pub fn subscribe(&self) -> broadcast::Receiver<Evt> {
		self.events.subscribe()
	}

	pub fn last_exit(&self) -> Option<WorkerExit> {
		self.status.last_exit()
	}

	/// Requests termination. No restart follows.
	pub fn terminate(&self) {
		self.cancel.cancel();
	}

	/// Waits until the supervisor loop has exited.
	pub async fn join(&self) {
		let mut finished = self.finished.clone();
		let _ = finished.wait_for(|done| *done).await;
	}

	pub async fn shutdown(&self, mode: ShutdownMode) -> ShutdownReport {
		self.cancel.cancel();
		match mode {
			ShutdownMode::Immediate => {
				self.status.abort_current();
				self.join().await;
				ShutdownReport {
					completed: true,
					timed_out: false,
					last_exit: self.last_exit(),
				}
			}
			ShutdownMode::Graceful { timeout } => {
				let completed = tokio::time::timeout(timeout, self.join()).await.is_ok();
				ShutdownReport {
					completed,
					timed_out: !completed,
					last_exit: self.last_exit(),
				}
			}
		}
	}

	/// Two-phase shutdown: tries graceful first, forces immediate on timeout.
	pub async fn shutdown_graceful_or_force(&self, timeout: Duration) -> ShutdownReport {
		let report = self.shutdown(ShutdownMode::Graceful { timeout }).await;
		if report.timed_out() {
			tracing::warn!(worker = %self.name, "graceful shutdown timed out; forcing immediate");
			return self.shutdown(ShutdownMode::Immediate).await;
		}
		report
	}
}

#[async_trait]
impl<Evt> SupervisedWorker for WorkerHandle<Evt>
where
	Evt: Clone + Send + 'static,
{
	fn name(&self) -> &str {
		WorkerHandle::name(self)
	}

	fn state(&self) -> WorkerState {
		WorkerHandle::state(self)
	}

	fn terminate(&self) {
		WorkerHandle::terminate(self);
	}

	async fn shutdown(&self, mode: ShutdownMode) -> ShutdownReport {
		WorkerHandle::shutdown(self, mode).await
	}
}

/// Marks the supervisor as finished even if its task is torn down early.
struct FinishedOnDrop(watch::Sender<bool>);

impl Drop for FinishedOnDrop {
	fn drop(&mut self) {
		self.0.send_replace(true);
	}
}

/// Launches a worker under supervision and returns its handle.
pub fn spawn_supervised<W>(spec: WorkerSpec<W>, registry: &WorkerRegistry) -> WorkerHandle<W::Evt>
where
	W: BackgroundWorker,
{
	let cancel = CancellationToken::new();
	let status = Arc::new(WorkerStatus::new(spec.name.clone(), registry.clone()));
	let (finished_tx, finished) = watch::channel(false);

	let task_cancel = cancel.clone();
	let task_status = Arc::clone(&status);
	let task_name: Arc<str> = Arc::from(spec.name.as_str());
	let WorkerSpec {
		flags,
		restart,
		interval,
		events,
		factory,
		..
	} = spec.clone();
	let clock = GenerationClock::default();

	crate::spawn(&spec.name, async move {
		let _finished = FinishedOnDrop(finished_tx);
		let mut restart_count = 0usize;
		// Cancelled before each restart so nothing from the previous
		// generation outlives it.
		let mut gen_cancel = CancellationToken::new();
		loop {
			gen_cancel.cancel();
			if task_cancel.is_cancelled() {
				task_status.record_exit(ExitReason::Cancelled);
				break;
			}
			gen_cancel = task_cancel.child_token();

			let gen_id = clock.next();
			task_status.set_generation(gen_id);
			task_status.set_state(WorkerState::Running);

			let ctx = WorkerContext {
				name: Arc::clone(&task_name),
				flags,
				events: events.clone(),
				token: GenerationToken::new(gen_id, gen_cancel.child_token()),
			};
			let child = crate::spawn(&task_name, run_generation((factory)(), ctx, interval));
			task_status.set_current(child.abort_handle());

			let reason = match child.await {
				Ok(reason) => reason,
				Err(err) if err.is_cancelled() => ExitReason::Cancelled,
				Err(err) if err.is_panic() => ExitReason::Panicked(crate::join_error_panic_message(err).unwrap_or_default()),
				Err(err) => ExitReason::JoinFailed(err.to_string()),
			};

			tracing::debug!(
				worker = %task_name,
				generation = gen_id,
				restarts = restart_count,
				reason = ?reason,
				"worker.exit"
			);

			let delay = if task_cancel.is_cancelled() {
				None
			} else {
				restart.restart_delay(&reason, restart_count)
			};
			let failed = reason.is_failure();
			task_status.record_exit(reason);

			let Some(delay) = delay else {
				break;
			};

			task_status.set_state(WorkerState::Crashed);
			restart_count = restart_count.wrapping_add(1);
			task_status.set_restarts(restart_count);
			task_status.set_state(WorkerState::Restarting);
			tracing::warn!(worker = %task_name, failed, delay_ms = delay.as_millis() as u64, restarts = restart_count, "worker.restart");

			tokio::select! {
				_ = task_cancel.cancelled() => break,
				_ = tokio::time::sleep(delay) => {}
			}
		}
		task_status.set_state(WorkerState::Terminated);
	});

	WorkerHandle {
		name: spec.name,
		events: spec.events,
		cancel,
		status,
		finished,
	}
}

async fn run_generation<W>(mut worker: W, mut ctx: WorkerContext<W::Evt>, interval: Duration) -> ExitReason
where
	W: BackgroundWorker,
{
	let token = ctx.token.clone();
	let name = Arc::clone(&ctx.name);

	let started = tokio::select! {
		biased;
		_ = token.cancelled() => false,
		res = worker.on_start(&mut ctx) => match res {
			Ok(()) => true,
			Err(err) => {
				tracing::warn!(worker = %name, generation = token.generation(), error = %err, "worker.start_failed");
				return ExitReason::StartupFailed(err);
			}
		},
	};
	if !started {
		return ExitReason::Cancelled;
	}

	let reason = loop {
		if token.is_cancelled() {
			break ExitReason::Cancelled;
		}

		match worker.tick(&mut ctx).await {
			Ok(WorkerFlow::Continue) => {}
			Ok(WorkerFlow::Stop) => break ExitReason::Stopped,
			Err(err) => break ExitReason::TickFailed(err),
		}

		tokio::select! {
			biased;
			_ = token.cancelled() => break ExitReason::Cancelled,
			_ = tokio::time::sleep(interval) => {}
		}
	};

	worker.on_stop(&mut ctx).await;
	reason
}

#[cfg(test)]
mod tests;
