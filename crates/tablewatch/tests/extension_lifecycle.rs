//! End-to-end behaviour of the extension inside a host process.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use pretty_assertions::assert_eq;
use tablewatch::{Config, Extension, HandlerError, LIBRARY_NAME, PollEvent, Resolution, Target};
use tablewatch_host::HostProcess;
use tablewatch_host::memory::MemoryHost;
use tablewatch_worker::ShutdownMode;
use tokio::sync::broadcast;

fn init_tracing() {
	let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn boot(host: &MemoryHost, poll_interval_ms: u64) -> (HostProcess, Extension) {
	init_tracing();
	let mut config = Config::default();
	config.worker.poll_interval_ms = poll_interval_ms;
	let mut process = HostProcess::new(Arc::new(host.clone()));
	let extension = process.preload(LIBRARY_NAME, |ctx| Extension::load(ctx, config)).unwrap();
	process.start().unwrap();
	(process, extension)
}

async fn wait_for(events: &mut broadcast::Receiver<PollEvent>, pred: impl Fn(&PollEvent) -> bool) -> PollEvent {
	tokio::time::timeout(Duration::from_secs(5), async {
		loop {
			match events.recv().await {
				Ok(event) if pred(&event) => return event,
				Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
				Err(broadcast::error::RecvError::Closed) => panic!("event channel closed"),
			}
		}
	})
	.await
	.unwrap()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn concurrent_handlers_leave_one_whole_target() {
	let host = MemoryHost::new();
	let (process, extension) = boot(&host, 5);
	let extension = Arc::new(extension);
	let process = Arc::new(process);
	let mut events = extension.subscribe();

	let handlers: Vec<_> = (0..6)
		.map(|i| {
			let extension = Arc::clone(&extension);
			let process = Arc::clone(&process);
			thread::spawn(move || {
				let session = process.connect("postgres").unwrap();
				extension.create_table(&*session, Some(&format!("t{i}")), None).unwrap()
			})
		})
		.collect();
	let created: Vec<Target> = handlers.into_iter().map(|h| h.join().unwrap()).collect();

	let last = extension.publisher().unwrap().mailbox().peek();
	assert!(created.contains(&last));

	let event = wait_for(&mut events, |e| e.target == Some(last) && e.resolution.relation().is_some()).await;
	let expected = host.database("postgres").unwrap().relation_oid("public", last.table.as_str());
	assert_eq!(event.resolution.relation(), expected);

	process.shutdown(ShutdownMode::Immediate).await;
}

#[tokio::test]
async fn missing_namespace_is_survived() {
	let host = MemoryHost::new();
	let (process, extension) = boot(&host, 5);
	let mut events = extension.subscribe();
	let publisher = extension.publisher().unwrap();
	publisher.publish(publisher.target(Some("doesnotexist"), Some("x")).unwrap());

	let event = wait_for(&mut events, |e| e.resolution == Resolution::NamespaceMissing).await;
	let later = wait_for(&mut events, |e| e.generation == event.generation && e.resolution == Resolution::NamespaceMissing).await;
	assert_eq!(later.generation, 1);

	process.shutdown(ShutdownMode::Immediate).await;
	assert_eq!(host.database("postgres").unwrap().stats().open, 0);
}

#[tokio::test]
async fn required_argument_is_enforced_before_side_effects() {
	let host = MemoryHost::new();
	let (process, extension) = boot(&host, 5);
	let session = process.connect("postgres").unwrap();

	let err = extension.create_table(&*session, None, Some("public")).unwrap_err();
	assert_eq!(err, HandlerError::MissingArgument("table name"));
	assert_eq!(host.database("postgres").unwrap().relation_count(), 0);
	assert_eq!(extension.publisher().unwrap().mailbox().sequence(), 0);

	process.shutdown(ShutdownMode::Immediate).await;
}

#[tokio::test]
async fn graceful_shutdown_is_prompt() {
	let host = MemoryHost::new();
	let (process, extension) = boot(&host, 60_000);
	let mut events = extension.subscribe();
	wait_for(&mut events, |e| e.resolution == Resolution::Idle).await;

	let reports = tokio::time::timeout(Duration::from_secs(1), process.shutdown(ShutdownMode::Graceful { timeout: Duration::from_secs(30) }))
		.await
		.unwrap();
	assert_eq!(reports.len(), 1);
	assert!(reports[0].completed());
}
