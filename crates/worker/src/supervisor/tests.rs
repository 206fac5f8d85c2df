use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use super::*;
use crate::spec::RestartPolicy;
use crate::state::WorkerExitKind;

const FAST: Duration = Duration::from_millis(1);

fn spawn<W: BackgroundWorker>(spec: WorkerSpec<W>) -> WorkerHandle<W::Evt> {
	spawn_supervised(spec, &WorkerRegistry::new())
}

async fn wait_for_state<Evt: Clone + Send + 'static>(handle: &WorkerHandle<Evt>, want: WorkerState) {
	let mut states = handle.state_changes();
	tokio::time::timeout(Duration::from_secs(2), states.wait_for(|s| *s == want))
		.await
		.expect("state not reached in time")
		.expect("state channel closed");
}

struct Countdown {
	left: usize,
}

#[async_trait]
impl BackgroundWorker for Countdown {
	type Evt = usize;

	async fn tick(&mut self, ctx: &mut WorkerContext<Self::Evt>) -> Result<WorkerFlow, String> {
		ctx.emit(self.left);
		if self.left == 0 {
			return Ok(WorkerFlow::Stop);
		}
		self.left -= 1;
		Ok(WorkerFlow::Continue)
	}
}

#[tokio::test]
async fn clean_stop_terminates_without_restart() {
	let handle = spawn(WorkerSpec::new("countdown", || Countdown { left: 2 }).interval(FAST));
	let mut events = handle.subscribe();

	assert_eq!(events.recv().await.ok(), Some(2));
	assert_eq!(events.recv().await.ok(), Some(1));
	assert_eq!(events.recv().await.ok(), Some(0));

	handle.join().await;
	assert_eq!(handle.state(), WorkerState::Terminated);
	assert_eq!(handle.restart_count(), 0);
	assert_eq!(handle.last_exit().map(|e| e.kind()), Some(WorkerExitKind::Stopped));
}

struct FailingTick {
	starts: Arc<AtomicUsize>,
}

#[async_trait]
impl BackgroundWorker for FailingTick {
	type Evt = u64;

	async fn on_start(&mut self, ctx: &mut WorkerContext<Self::Evt>) -> Result<(), String> {
		self.starts.fetch_add(1, Ordering::SeqCst);
		ctx.emit(ctx.generation());
		Ok(())
	}

	async fn tick(&mut self, _ctx: &mut WorkerContext<Self::Evt>) -> Result<WorkerFlow, String> {
		Err("catalog unavailable".to_string())
	}
}

#[tokio::test]
async fn failed_generation_restarts_with_new_generation() {
	let starts = Arc::new(AtomicUsize::new(0));
	let counter = Arc::clone(&starts);
	let spec = WorkerSpec::new("failing", move || FailingTick {
		starts: Arc::clone(&counter),
	})
	.restart(RestartPolicy::OnFailure {
		delay: FAST,
		max_restarts: Some(2),
	});
	let handle = spawn(spec);
	let mut events = handle.subscribe();

	assert_eq!(events.recv().await.ok(), Some(1));
	assert_eq!(events.recv().await.ok(), Some(2));
	assert_eq!(events.recv().await.ok(), Some(3));

	handle.join().await;
	assert_eq!(starts.load(Ordering::SeqCst), 3);
	assert_eq!(handle.restart_count(), 2);
	assert_eq!(handle.state(), WorkerState::Terminated);
	let exit = handle.last_exit().expect("exit recorded");
	assert_eq!(exit.kind(), WorkerExitKind::TickFailed);
	assert_eq!(exit.message(), Some("catalog unavailable"));
	assert!(exit.is_failure());
}

struct NoSession;

#[async_trait]
impl BackgroundWorker for NoSession {
	type Evt = ();

	async fn on_start(&mut self, _ctx: &mut WorkerContext<Self::Evt>) -> Result<(), String> {
		Err("database \"missing\" does not exist".to_string())
	}

	async fn tick(&mut self, _ctx: &mut WorkerContext<Self::Evt>) -> Result<WorkerFlow, String> {
		unreachable!("tick must not run after a failed start")
	}
}

#[tokio::test]
async fn never_policy_terminates_after_startup_failure() {
	let handle = spawn(WorkerSpec::new("no-session", || NoSession).restart(RestartPolicy::Never));
	handle.join().await;

	assert_eq!(handle.state(), WorkerState::Terminated);
	assert_eq!(handle.restart_count(), 0);
	assert_eq!(handle.last_exit().map(|e| e.kind()), Some(WorkerExitKind::StartupFailed));
}

struct PanicOnce {
	starts: Arc<AtomicUsize>,
}

#[async_trait]
impl BackgroundWorker for PanicOnce {
	type Evt = &'static str;

	async fn on_start(&mut self, _ctx: &mut WorkerContext<Self::Evt>) -> Result<(), String> {
		if self.starts.fetch_add(1, Ordering::SeqCst) == 0 {
			panic!("first generation crashed");
		}
		Ok(())
	}

	async fn tick(&mut self, ctx: &mut WorkerContext<Self::Evt>) -> Result<WorkerFlow, String> {
		ctx.emit("ticked");
		Ok(WorkerFlow::Stop)
	}
}

#[tokio::test]
async fn panicking_generation_is_restarted() {
	let starts = Arc::new(AtomicUsize::new(0));
	let counter = Arc::clone(&starts);
	let handle = spawn(
		WorkerSpec::new("panic-once", move || PanicOnce {
			starts: Arc::clone(&counter),
		})
		.restart(RestartPolicy::after(FAST)),
	);
	let mut events = handle.subscribe();

	let got = tokio::time::timeout(Duration::from_secs(2), events.recv()).await;
	assert_eq!(got.ok().and_then(|r| r.ok()), Some("ticked"));
	handle.join().await;
	assert_eq!(handle.restart_count(), 1);
	assert_eq!(starts.load(Ordering::SeqCst), 2);
}

struct Idle;

#[async_trait]
impl BackgroundWorker for Idle {
	type Evt = ();

	async fn tick(&mut self, _ctx: &mut WorkerContext<Self::Evt>) -> Result<WorkerFlow, String> {
		Ok(WorkerFlow::Continue)
	}
}

#[tokio::test]
async fn terminate_interrupts_the_wait_between_ticks() {
	let handle = spawn(WorkerSpec::new("idle", || Idle).interval(Duration::from_secs(3600)));
	wait_for_state(&handle, WorkerState::Running).await;

	handle.terminate();
	tokio::time::timeout(Duration::from_millis(500), handle.join())
		.await
		.expect("terminate must not wait for the tick interval");
	assert_eq!(handle.state(), WorkerState::Terminated);
	assert_eq!(handle.last_exit().map(|e| e.kind()), Some(WorkerExitKind::Cancelled));
}

struct SlowTick;

#[async_trait]
impl BackgroundWorker for SlowTick {
	type Evt = &'static str;

	async fn tick(&mut self, ctx: &mut WorkerContext<Self::Evt>) -> Result<WorkerFlow, String> {
		ctx.emit("entered");
		tokio::time::sleep(Duration::from_secs(60)).await;
		Ok(WorkerFlow::Continue)
	}
}

#[tokio::test]
async fn graceful_shutdown_times_out_on_slow_tick_then_force_succeeds() {
	let handle = spawn(WorkerSpec::new("slow", || SlowTick).restart(RestartPolicy::Never));
	let mut events = handle.subscribe();
	let got = tokio::time::timeout(Duration::from_secs(2), events.recv()).await;
	assert_eq!(got.ok().and_then(|r| r.ok()), Some("entered"));

	let report = handle.shutdown(ShutdownMode::Graceful { timeout: Duration::from_millis(20) }).await;
	assert!(report.timed_out());

	let report = tokio::time::timeout(Duration::from_millis(500), handle.shutdown_graceful_or_force(Duration::from_millis(20)))
		.await
		.expect("forced shutdown should not hang");
	assert!(report.completed());
	assert_eq!(report.last_exit().map(|e| e.kind()), Some(WorkerExitKind::Cancelled));
}

#[tokio::test]
async fn dropping_handle_terminates_worker() {
	let registry = WorkerRegistry::new();
	let handle = spawn_supervised(WorkerSpec::new("dropped", || Idle).interval(Duration::from_secs(3600)), &registry);
	wait_for_state(&handle, WorkerState::Running).await;
	let mut states = handle.state_changes();
	drop(handle);

	tokio::time::timeout(Duration::from_secs(2), states.wait_for(|s| *s == WorkerState::Terminated))
		.await
		.expect("worker should terminate once its handle is dropped")
		.expect("state channel closed");
	assert_eq!(registry.get("dropped").map(|r| r.state), Some(WorkerState::Terminated));
}

#[tokio::test]
async fn event_buffer_replaces_the_channel() {
	let spec = WorkerSpec::new("buffered", || Idle);
	let mut stale = spec.event_sender().subscribe();
	let spec = spec.event_buffer(1);
	let sender = spec.event_sender();
	let mut fresh = sender.subscribe();

	sender.send(()).unwrap();
	sender.send(()).unwrap();
	assert!(matches!(fresh.try_recv(), Err(broadcast::error::TryRecvError::Lagged(1))));
	assert_eq!(fresh.try_recv(), Ok(()));
	assert!(matches!(stale.try_recv(), Err(broadcast::error::TryRecvError::Closed)));
}
