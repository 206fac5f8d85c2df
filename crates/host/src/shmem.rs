//! Named shared memory, sized up front by reservation hooks.
//!
//! The host collects reservations from every loaded library before the
//! segment is finalized; afterwards regions are created or attached by name
//! and the reservation total is a hard cap.

use std::any::Any;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use parking_lot::Mutex;
use thiserror::Error;

/// Errors raised by the shared memory segment.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ShmemError {
	#[error("shared memory reservations are closed")]
	ReservationsClosed,

	#[error("shared memory segment is not attached")]
	NotAttached,

	#[error("out of shared memory: region \"{name}\" needs {needed} bytes, {available} available")]
	OutOfMemory { name: String, needed: usize, available: usize },

	#[error("shared memory region \"{0}\" holds a different type")]
	TypeMismatch(String),

	#[error("shared memory region \"{0}\" does not exist")]
	MissingRegion(String),

	#[error("lock tranche \"{0}\" was not requested")]
	UnknownTranche(String),
}

/// Reservations collected during the request phase.
#[derive(Debug, Default, Clone)]
pub struct ShmemRequest {
	bytes: usize,
	tranches: BTreeMap<String, usize>,
}

impl ShmemRequest {
	pub fn request_space(&mut self, bytes: usize) {
		self.bytes = self.bytes.saturating_add(bytes);
	}

	/// Reserves `locks` locks under a named tranche. Repeated requests add up.
	pub fn request_named_lock_tranche(&mut self, name: &str, locks: usize) {
		*self.tranches.entry(name.to_string()).or_default() += locks;
	}

	pub fn total_bytes(&self) -> usize {
		self.bytes
	}
}

/// Handle to a reserved named lock tranche.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TrancheId {
	name: Arc<str>,
	locks: usize,
}

impl TrancheId {
	pub fn name(&self) -> &str {
		&self.name
	}

	pub fn locks(&self) -> usize {
		self.locks
	}
}

struct Region {
	value: Arc<dyn Any + Send + Sync>,
}

#[derive(Default)]
struct SegmentState {
	reserved: Option<ShmemRequest>,
	used: usize,
	regions: HashMap<String, Region>,
}

/// The host's named shared memory segment.
///
/// Region creation is serialized by the segment lock, so concurrent
/// `init_struct` calls for one name agree on a single instance.
#[derive(Default)]
pub struct ShmemSegment {
	state: Mutex<SegmentState>,
}

impl ShmemSegment {
	pub fn new() -> Self {
		Self::default()
	}

	/// Fixes the segment size. Only the first finalization is accepted.
	pub(crate) fn finalize(&self, request: ShmemRequest) -> Result<(), ShmemError> {
		let mut state = self.state.lock();
		if state.reserved.is_some() {
			return Err(ShmemError::ReservationsClosed);
		}
		tracing::debug!(bytes = request.bytes, tranches = request.tranches.len(), "shmem.finalize");
		state.reserved = Some(request);
		Ok(())
	}

	/// Bytes reserved in total and bytes handed out so far.
	pub fn usage(&self) -> (usize, usize) {
		let state = self.state.lock();
		(state.reserved.as_ref().map_or(0, ShmemRequest::total_bytes), state.used)
	}

	/// Creates the region `name` with `init`, or attaches to it if it exists.
	///
	/// Returns the region and whether it was found already initialized. `init`
	/// runs under the segment lock and must not call back into the segment.
	pub fn init_struct<T>(&self, name: &str, init: impl FnOnce() -> T) -> Result<(Arc<T>, bool), ShmemError>
	where
		T: Send + Sync + 'static,
	{
		let mut state = self.state.lock();
		let Some(reserved) = state.reserved.as_ref() else {
			return Err(ShmemError::NotAttached);
		};

		if let Some(region) = state.regions.get(name) {
			let value = Arc::clone(&region.value).downcast::<T>().map_err(|_| ShmemError::TypeMismatch(name.to_string()))?;
			return Ok((value, true));
		}

		let needed = size_of::<T>();
		let available = reserved.bytes.saturating_sub(state.used);
		if needed > available {
			return Err(ShmemError::OutOfMemory {
				name: name.to_string(),
				needed,
				available,
			});
		}

		let value = Arc::new(init());
		state.used += needed;
		state.regions.insert(
			name.to_string(),
			Region {
				value: Arc::clone(&value) as Arc<dyn Any + Send + Sync>,
			},
		);
		tracing::debug!(region = name, bytes = needed, "shmem.region_created");
		Ok((value, false))
	}

	/// Attaches to an existing region.
	pub fn lookup<T>(&self, name: &str) -> Result<Arc<T>, ShmemError>
	where
		T: Send + Sync + 'static,
	{
		let state = self.state.lock();
		if state.reserved.is_none() {
			return Err(ShmemError::NotAttached);
		}
		let region = state.regions.get(name).ok_or_else(|| ShmemError::MissingRegion(name.to_string()))?;
		Arc::clone(&region.value).downcast::<T>().map_err(|_| ShmemError::TypeMismatch(name.to_string()))
	}

	/// Returns a lock tranche reserved during the request phase.
	pub fn named_lock_tranche(&self, name: &str) -> Result<TrancheId, ShmemError> {
		let state = self.state.lock();
		let reserved = state.reserved.as_ref().ok_or(ShmemError::NotAttached)?;
		match reserved.tranches.get(name) {
			Some(&locks) if locks > 0 => Ok(TrancheId { name: Arc::from(name), locks }),
			_ => Err(ShmemError::UnknownTranche(name.to_string())),
		}
	}
}

type RequestHook = Box<dyn Fn(&mut ShmemRequest) + Send + Sync>;
type StartupHook = Box<dyn Fn(&ShmemSegment) -> Result<(), ShmemError> + Send + Sync>;

/// Reservation and startup hook chains.
///
/// Installing a hook wraps whatever was installed before and runs it first,
/// so independent libraries compose instead of replacing each other.
#[derive(Default)]
pub struct ShmemHooks {
	request: Option<RequestHook>,
	startup: Option<StartupHook>,
}

impl ShmemHooks {
	pub fn chain_request(&mut self, hook: impl Fn(&mut ShmemRequest) + Send + Sync + 'static) {
		let prev = self.request.take();
		self.request = Some(Box::new(move |req| {
			if let Some(prev) = &prev {
				prev(req);
			}
			hook(req);
		}));
	}

	pub fn chain_startup(&mut self, hook: impl Fn(&ShmemSegment) -> Result<(), ShmemError> + Send + Sync + 'static) {
		let prev = self.startup.take();
		self.startup = Some(Box::new(move |segment| {
			if let Some(prev) = &prev {
				prev(segment)?;
			}
			hook(segment)
		}));
	}

	pub(crate) fn run_request(&self) -> ShmemRequest {
		let mut request = ShmemRequest::default();
		if let Some(hook) = &self.request {
			hook(&mut request);
		}
		request
	}

	pub(crate) fn run_startup(&self, segment: &ShmemSegment) -> Result<(), ShmemError> {
		match &self.startup {
			Some(hook) => hook(segment),
			None => Ok(()),
		}
	}
}
