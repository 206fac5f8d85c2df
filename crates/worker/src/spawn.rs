use std::future::Future;
use std::sync::OnceLock;

use tokio::task::JoinHandle;

/// Returns the ambient Tokio handle, or a process-wide fallback runtime.
///
/// Request handlers run synchronously and may register dynamic workers from
/// threads that are not inside a runtime; those spawns land on the fallback.
pub fn runtime_handle() -> tokio::runtime::Handle {
	if let Ok(handle) = tokio::runtime::Handle::try_current() {
		return handle;
	}

	static FALLBACK_RT: OnceLock<tokio::runtime::Runtime> = OnceLock::new();
	let runtime = FALLBACK_RT.get_or_init(|| {
		tokio::runtime::Builder::new_multi_thread()
			.enable_all()
			.worker_threads(2)
			.thread_name("tablewatch-worker")
			.build()
			.expect("failed to build tablewatch-worker fallback runtime")
	});
	runtime.handle().clone()
}

/// Spawns one supervised task, tagged with the owning worker name.
pub fn spawn<F>(worker: &str, fut: F) -> JoinHandle<F::Output>
where
	F: Future + Send + 'static,
	F::Output: Send + 'static,
{
	tracing::trace!(worker, "worker.spawn");
	runtime_handle().spawn(fut)
}
