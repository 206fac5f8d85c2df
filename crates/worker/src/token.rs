use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio_util::sync::CancellationToken;

/// Monotonic generation counter shared by every start of one worker.
#[derive(Debug, Default, Clone)]
pub(crate) struct GenerationClock {
	last: Arc<AtomicU64>,
}

impl GenerationClock {
	/// Returns the next generation ID, starting at 1.
	pub fn next(&self) -> u64 {
		self.last.fetch_add(1, Ordering::AcqRel).wrapping_add(1)
	}
}

/// Cancellation scoped to one worker generation.
///
/// Cancelled when the worker is terminated or when the generation is replaced
/// by a restart, whichever comes first.
#[derive(Debug, Clone)]
pub(crate) struct GenerationToken {
	generation: u64,
	cancel: CancellationToken,
}

impl GenerationToken {
	pub fn new(generation: u64, cancel: CancellationToken) -> Self {
		Self { generation, cancel }
	}

	pub const fn generation(&self) -> u64 {
		self.generation
	}

	pub fn is_cancelled(&self) -> bool {
		self.cancel.is_cancelled()
	}

	pub async fn cancelled(&self) {
		self.cancel.cancelled().await;
	}
}
