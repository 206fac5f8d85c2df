use tablewatch_host::{HostError, ShmemError};
use tablewatch_worker::RegisterError;
use thiserror::Error;

use crate::config::ConfigError;
use crate::name::NameError;

/// Errors that abort loading the extension, and with it host startup.
#[derive(Debug, Error)]
pub enum ExtensionError {
	#[error("tablewatch must be loaded through shared library preloading")]
	NotPreloaded,

	#[error(transparent)]
	Config(#[from] ConfigError),

	#[error(transparent)]
	Register(#[from] RegisterError),

	#[error(transparent)]
	Shmem(#[from] ShmemError),

	#[error(transparent)]
	Name(#[from] NameError),
}

/// Errors surfaced to the caller of a handler-facing operation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HandlerError {
	#[error("{0} argument required")]
	MissingArgument(&'static str),

	#[error(transparent)]
	Name(#[from] NameError),

	#[error("create table failed: {status}")]
	Execution { status: String },

	#[error(transparent)]
	Host(#[from] HostError),

	#[error(transparent)]
	Shmem(#[from] ShmemError),
}
