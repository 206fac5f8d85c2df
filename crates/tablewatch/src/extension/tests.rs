use std::time::Duration;

use pretty_assertions::assert_eq;
use tablewatch_host::HostProcess;
use tablewatch_host::memory::MemoryHost;
use tablewatch_worker::{ShutdownMode, StartPhase, WorkerState};

use super::*;
use crate::config::WorkerConfig;
use crate::poll::Resolution;
use crate::testing::target;

fn fast_config() -> Config {
	Config {
		worker: WorkerConfig {
			poll_interval_ms: 5,
			..WorkerConfig::default()
		},
		..Config::default()
	}
}

fn preloaded(host: &MemoryHost, config: Config) -> (HostProcess, Extension) {
	let mut process = HostProcess::new(Arc::new(host.clone()));
	let extension = process.preload(LIBRARY_NAME, |ctx| Extension::load(ctx, config)).unwrap();
	(process, extension)
}

async fn next_resolved(events: &mut broadcast::Receiver<PollEvent>) -> PollEvent {
	tokio::time::timeout(Duration::from_secs(5), async {
		loop {
			let event = events.recv().await.unwrap();
			if event.resolution.relation().is_some() {
				return event;
			}
		}
	})
	.await
	.unwrap()
}

#[test]
fn loading_outside_preload_is_fatal() {
	let mut process = HostProcess::new(Arc::new(MemoryHost::new()));
	let err = process.load(LIBRARY_NAME, |ctx| Extension::load(ctx, Config::default())).map(|_| ()).unwrap_err();
	assert_eq!(err.to_string(), "library \"tablewatch\" failed to load: tablewatch must be loaded through shared library preloading");
	assert!(process.workers().registry().snapshots().is_empty());
}

#[test]
fn load_registers_the_worker_and_reserves_the_mailbox() {
	let host = MemoryHost::new();
	let (process, extension) = preloaded(&host, Config::default());
	let record = process.workers().registry().get("tablewatch worker").unwrap();
	assert_eq!(record.state, WorkerState::Registered);
	assert!(matches!(extension.publisher(), Err(ExtensionError::Shmem(_))));
}

#[test]
fn worker_waits_for_its_start_phase() {
	let host = MemoryHost::new();
	let mut process = HostProcess::new(Arc::new(host.clone()));
	process.preload(LIBRARY_NAME, |ctx| Extension::load(ctx, Config::default())).unwrap();
	assert_eq!(process.workers().enter_phase(StartPhase::PostmasterStart), 0);
	assert_eq!(process.workers().phase(), Some(StartPhase::PostmasterStart));
}

#[tokio::test]
async fn created_tables_are_resolved_by_the_worker() {
	let host = MemoryHost::new();
	let (process, extension) = preloaded(&host, fast_config());
	let mut events = extension.subscribe();
	assert_eq!(process.start().unwrap(), 1);

	let session = process.connect("postgres").unwrap();
	let created = extension.create_table(&*session, Some("orders"), None).unwrap();
	assert_eq!(created, target("public", "orders"));

	let event = next_resolved(&mut events).await;
	assert_eq!(event.target, Some(created));
	assert_eq!(event.resolution.relation(), host.database("postgres").unwrap().relation_oid("public", "orders"));

	process.shutdown(ShutdownMode::Immediate).await;
	assert_eq!(host.database("postgres").unwrap().stats().open, 0);
}

#[tokio::test]
async fn restart_in_place_keeps_the_mailbox() {
	let host = MemoryHost::new();
	let (process, extension) = preloaded(&host, fast_config());
	let mut events = extension.subscribe();
	process.start().unwrap();
	let session = process.connect("postgres").unwrap();
	extension.create_table(&*session, Some("kept"), None).unwrap();
	let before = next_resolved(&mut events).await;

	process.restart_in_place().await.unwrap();
	let after = tokio::time::timeout(Duration::from_secs(5), async {
		loop {
			let event = events.recv().await.unwrap();
			if event.generation != before.generation || event.resolution != before.resolution {
				return event;
			}
		}
	})
	.await
	.unwrap();
	assert_eq!(after.target, before.target);
	assert_eq!(after.resolution, before.resolution);

	process.shutdown(ShutdownMode::Immediate).await;
}

#[tokio::test]
async fn full_restart_starts_with_an_empty_mailbox() {
	let host = MemoryHost::new();
	{
		let (process, extension) = preloaded(&host, fast_config());
		process.start().unwrap();
		let session = process.connect("postgres").unwrap();
		extension.create_table(&*session, Some("gone"), None).unwrap();
		process.shutdown(ShutdownMode::Immediate).await;
	}

	let (process, extension) = preloaded(&host, fast_config());
	let mut events = extension.subscribe();
	process.start().unwrap();
	let event = events.recv().await.unwrap();
	assert_eq!(event.resolution, Resolution::Idle);
	assert_eq!(extension.publisher().unwrap().mailbox().sequence(), 0);
	process.shutdown(ShutdownMode::Immediate).await;
}

#[tokio::test]
async fn dynamic_workers_share_the_mailbox() {
	let host = MemoryHost::new();
	let (process, extension) = preloaded(&host, fast_config());
	process.start().unwrap();
	let session = process.connect("postgres").unwrap();
	extension.create_table(&*session, Some("shared"), Some("public")).unwrap();

	let handle = extension.launch_dynamic("tablewatch dynamic").unwrap();
	let mut events = handle.subscribe();
	let event = next_resolved(&mut events).await;
	assert_eq!(event.target, Some(target("public", "shared")));
	assert!(extension.launch_dynamic("tablewatch worker").is_err());

	process.shutdown(ShutdownMode::Immediate).await;
	assert_eq!(handle.state(), WorkerState::Terminated);
}
