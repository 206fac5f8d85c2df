//! Tablewatch binary.
//!
//! Boots an in-memory host with the extension preloaded, creates the
//! requested tables through the extension's handler and prints each change
//! in what the poll worker resolves until interrupted.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tablewatch::{Config, Extension, LIBRARY_NAME, PollEvent, Resolution};
use tablewatch_host::HostProcess;
use tablewatch_host::memory::MemoryHost;
use tablewatch_worker::ShutdownMode;
use tokio::sync::broadcast::error::RecvError;
use tracing::{error, info, warn};

/// Command line arguments.
#[derive(Parser, Debug)]
#[command(name = "tablewatch")]
#[command(about = "Create tables and watch a background worker resolve them")]
struct Args {
	/// Configuration file (TOML)
	#[arg(short, long, value_name = "PATH")]
	config: Option<PathBuf>,

	/// Verbose logging
	#[arg(short, long)]
	verbose: bool,

	/// Schema to create before the host starts. Repeatable.
	#[arg(long = "schema", value_name = "NAME")]
	schemas: Vec<String>,

	/// Table to create once the host runs, as TABLE or SCHEMA.TABLE. Repeatable.
	#[arg(long = "create", value_name = "[SCHEMA.]TABLE")]
	creates: Vec<String>,

	/// Exit after this many resolved identifiers instead of waiting for ctrl-c
	#[arg(long, value_name = "N")]
	exit_after: Option<usize>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
	let args = Args::parse();

	let subscriber = tracing_subscriber::fmt()
		.with_max_level(if args.verbose {
			tracing::Level::DEBUG
		} else {
			tracing::Level::INFO
		})
		.finish();
	tracing::subscriber::set_global_default(subscriber)?;

	let config = match &args.config {
		Some(path) => Config::load(path)?,
		None => Config::default(),
	};

	let host = MemoryHost::new();
	let database = host.add_database(&config.worker.database);
	for schema in &args.schemas {
		let oid = database.create_namespace(schema)?;
		info!(schema = schema.as_str(), %oid, "schema created");
	}

	let mut process = HostProcess::new(Arc::new(host));
	let extension = process.preload(LIBRARY_NAME, |ctx| Extension::load(ctx, config))?;
	let mut events = extension.subscribe();
	let launched = process.start()?;
	info!(launched, "host running");

	let session = process.connect(&extension.config().worker.database)?;
	for spec in &args.creates {
		let (schema, table) = split_target(spec);
		match extension.create_table(&*session, Some(table), schema) {
			Ok(target) => info!(%target, "table created"),
			Err(err) => error!(spec = spec.as_str(), %err, "create failed"),
		}
	}

	let ctrl_c = tokio::signal::ctrl_c();
	tokio::pin!(ctrl_c);
	let mut last: Option<PollEvent> = None;
	let mut resolved = 0usize;
	loop {
		tokio::select! {
			_ = &mut ctrl_c => {
				info!("interrupted");
				break;
			}
			event = events.recv() => match event {
				Ok(event) => {
					if last.as_ref().is_some_and(|prev| prev.target == event.target && prev.resolution == event.resolution) {
						continue;
					}
					if let Some(line) = describe(&event) {
						println!("{line}");
					}
					if event.resolution.relation().is_some() {
						resolved += 1;
					}
					last = Some(event);
					if args.exit_after.is_some_and(|limit| resolved >= limit) {
						break;
					}
				}
				Err(RecvError::Lagged(skipped)) => warn!(skipped, "event stream lagged"),
				Err(RecvError::Closed) => break,
			}
		}
	}

	for report in process.shutdown(ShutdownMode::Graceful { timeout: Duration::from_secs(5) }).await {
		if report.timed_out() {
			warn!("worker did not stop in time and was aborted");
		}
	}
	Ok(())
}

/// Splits `SCHEMA.TABLE` at the first dot. A bare name has no schema.
fn split_target(spec: &str) -> (Option<&str>, &str) {
	match spec.split_once('.') {
		Some((schema, table)) => (Some(schema), table),
		None => (None, spec),
	}
}

fn describe(event: &PollEvent) -> Option<String> {
	let target = event.target?;
	let outcome = match event.resolution {
		Resolution::Idle => return None,
		Resolution::NamespaceMissing => "schema not found".to_string(),
		Resolution::RelationMissing { .. } => "table not found".to_string(),
		Resolution::Resolved { relation, .. } => format!("oid {relation}"),
	};
	Some(format!("{target}: {outcome} (generation {})", event.generation))
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn targets_split_at_the_first_dot() {
		assert_eq!(split_target("orders"), (None, "orders"));
		assert_eq!(split_target("sales.q1"), (Some("sales"), "q1"));
		assert_eq!(split_target("a.b.c"), (Some("a"), "b.c"));
	}

	#[test]
	fn idle_cycles_are_not_printed() {
		let idle = PollEvent {
			generation: 1,
			target: None,
			resolution: Resolution::Idle,
		};
		assert_eq!(describe(&idle), None);
	}

	#[test]
	fn args_accept_repeated_creates() {
		let args = Args::try_parse_from(["tablewatch", "--create", "a", "--create", "s.b", "--schema", "s", "-v"]).unwrap();
		assert_eq!(args.creates, vec!["a", "s.b"]);
		assert_eq!(args.schemas, vec!["s"]);
		assert!(args.verbose);
	}
}
