//! Background worker facility for the host process.
//!
//! Workers are described by a [`WorkerSpec`], registered with a
//! [`WorkerRuntime`] either statically (during preload, launched when the host
//! reaches the worker's [`StartPhase`]) or dynamically (launched immediately),
//! and then supervised: each (re)start runs under a fresh generation token, and
//! failed generations are restarted after their [`RestartPolicy`] delay.

mod registry;
mod runtime;
mod spawn;
mod spec;
mod state;
mod supervisor;
mod token;

pub use registry::{WorkerRecord, WorkerRegistry};
pub use runtime::{RegisterError, WorkerRuntime};
pub use spawn::{runtime_handle, spawn};
pub use spec::{RestartPolicy, StartPhase, WorkerFlags, WorkerSpec};
pub use state::{WorkerExit, WorkerExitKind, WorkerState};
pub use supervisor::{
	BackgroundWorker, ShutdownMode, ShutdownReport, SupervisedWorker, WorkerContext, WorkerFlow, WorkerHandle, spawn_supervised,
};

/// Extracts the panic payload message from a failed join, if it was a panic.
pub(crate) fn join_error_panic_message(err: tokio::task::JoinError) -> Option<String> {
	if !err.is_panic() {
		return None;
	}
	let payload = err.into_panic();
	if let Some(msg) = payload.downcast_ref::<&'static str>() {
		return Some((*msg).to_string());
	}
	if let Some(msg) = payload.downcast_ref::<String>() {
		return Some(msg.clone());
	}
	Some("non-string panic payload".to_string())
}

#[cfg(test)]
mod panic_tests;
