//! TOML configuration for the extension.
//!
//! ```toml
//! [worker]
//! name = "tablewatch worker"
//! database = "postgres"
//! restart_delay_secs = 5
//! poll_interval_ms = 1000
//! start_phase = "consistent_state"
//!
//! [mailbox]
//! default_schema = "public"
//! overlength = "reject"
//! ```
//!
//! Every key is optional; unknown keys are rejected.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use tablewatch_worker::StartPhase;
use thiserror::Error;

use crate::name::{BoundedName, NameError, Overlength};

#[derive(Debug, Error)]
pub enum ConfigError {
	#[error("I/O error reading {path}: {error}")]
	Io { path: PathBuf, error: std::io::Error },

	#[error("TOML parse error: {0}")]
	Parse(#[from] toml::de::Error),

	#[error("invalid value for {key}: {reason}")]
	Invalid { key: &'static str, reason: String },
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
	#[serde(default)]
	pub worker: WorkerConfig,
	#[serde(default)]
	pub mailbox: MailboxConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WorkerConfig {
	/// Name the worker registers under.
	#[serde(default = "default_worker_name")]
	pub name: String,
	/// Database the worker connects to before polling.
	#[serde(default = "default_database")]
	pub database: String,
	/// Delay before a crashed worker is restarted.
	#[serde(default = "default_restart_delay_secs")]
	pub restart_delay_secs: u64,
	/// Wait between two poll cycles. Must be positive.
	#[serde(default = "default_poll_interval_ms")]
	pub poll_interval_ms: u64,
	#[serde(default)]
	pub start_phase: StartPhase,
}

fn default_worker_name() -> String {
	"tablewatch worker".to_string()
}

fn default_database() -> String {
	"postgres".to_string()
}

fn default_restart_delay_secs() -> u64 {
	5
}

fn default_poll_interval_ms() -> u64 {
	1000
}

impl Default for WorkerConfig {
	fn default() -> Self {
		Self {
			name: default_worker_name(),
			database: default_database(),
			restart_delay_secs: default_restart_delay_secs(),
			poll_interval_ms: default_poll_interval_ms(),
			start_phase: StartPhase::default(),
		}
	}
}

impl WorkerConfig {
	pub fn restart_delay(&self) -> Duration {
		Duration::from_secs(self.restart_delay_secs)
	}

	pub fn poll_interval(&self) -> Duration {
		Duration::from_millis(self.poll_interval_ms)
	}

	pub fn validate(&self) -> Result<(), ConfigError> {
		if self.name.trim().is_empty() {
			return Err(invalid("worker.name", "must not be empty"));
		}
		if self.database.is_empty() {
			return Err(invalid("worker.database", "must not be empty"));
		}
		if self.poll_interval_ms == 0 {
			return Err(invalid("worker.poll_interval_ms", "must be greater than zero"));
		}
		Ok(())
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MailboxConfig {
	/// Schema used when a handler is not given one.
	#[serde(default = "default_schema")]
	pub default_schema: String,
	#[serde(default)]
	pub overlength: Overlength,
}

fn default_schema() -> String {
	"public".to_string()
}

impl Default for MailboxConfig {
	fn default() -> Self {
		Self {
			default_schema: default_schema(),
			overlength: Overlength::default(),
		}
	}
}

impl MailboxConfig {
	/// Validates `name` under the configured overlength policy.
	pub fn bounded(&self, name: &str) -> Result<BoundedName, NameError> {
		BoundedName::new(name, self.overlength)
	}
}

impl Config {
	pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
		let config: Self = toml::from_str(input)?;
		config.validate()?;
		Ok(config)
	}

	pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
		let path = path.as_ref();
		let input = std::fs::read_to_string(path).map_err(|error| ConfigError::Io {
			path: path.to_path_buf(),
			error,
		})?;
		let config = Self::from_toml_str(&input)?;
		tracing::debug!(path = %path.display(), "config.loaded");
		Ok(config)
	}

	pub fn validate(&self) -> Result<(), ConfigError> {
		self.worker.validate()?;
		if self.mailbox.default_schema.is_empty() {
			return Err(invalid("mailbox.default_schema", "must not be empty"));
		}
		self.mailbox
			.bounded(&self.mailbox.default_schema)
			.map_err(|err| invalid("mailbox.default_schema", err.to_string()))?;
		Ok(())
	}
}

fn invalid(key: &'static str, reason: impl Into<String>) -> ConfigError {
	ConfigError::Invalid { key, reason: reason.into() }
}

#[cfg(test)]
mod tests {
	use std::io::Write;

	use pretty_assertions::assert_eq;

	use super::*;

	#[test]
	fn empty_input_gives_defaults() {
		let config = Config::from_toml_str("").unwrap();
		assert_eq!(config, Config::default());
		assert_eq!(config.worker.restart_delay(), Duration::from_secs(5));
		assert_eq!(config.worker.poll_interval(), Duration::from_secs(1));
		assert_eq!(config.worker.start_phase, StartPhase::ConsistentState);
		assert_eq!(config.mailbox.default_schema, "public");
		assert_eq!(config.mailbox.overlength, Overlength::Reject);
	}

	#[test]
	fn sections_override_defaults() {
		let config = Config::from_toml_str(
			r#"
			[worker]
			database = "analytics"
			poll_interval_ms = 250
			start_phase = "recovery_finished"

			[mailbox]
			overlength = "truncate"
			"#,
		)
		.unwrap();
		assert_eq!(config.worker.database, "analytics");
		assert_eq!(config.worker.poll_interval(), Duration::from_millis(250));
		assert_eq!(config.worker.start_phase, StartPhase::RecoveryFinished);
		assert_eq!(config.worker.name, "tablewatch worker");
		assert_eq!(config.mailbox.overlength, Overlength::Truncate);
	}

	#[test]
	fn zero_poll_interval_is_rejected() {
		let err = Config::from_toml_str("[worker]\npoll_interval_ms = 0").unwrap_err();
		assert!(matches!(err, ConfigError::Invalid { key: "worker.poll_interval_ms", .. }));
	}

	#[test]
	fn unknown_keys_are_rejected() {
		assert!(matches!(Config::from_toml_str("[worker]\nbusy_spin = true"), Err(ConfigError::Parse(_))));
		assert!(matches!(Config::from_toml_str("[queue]\ncapacity = 4"), Err(ConfigError::Parse(_))));
	}

	#[test]
	fn overlong_default_schema_follows_policy() {
		let long = "s".repeat(80);
		let rejected = Config::from_toml_str(&format!("[mailbox]\ndefault_schema = \"{long}\"")).unwrap_err();
		assert!(matches!(rejected, ConfigError::Invalid { key: "mailbox.default_schema", .. }));

		let truncating = format!("[mailbox]\ndefault_schema = \"{long}\"\noverlength = \"truncate\"");
		assert!(Config::from_toml_str(&truncating).is_ok());
	}

	#[test]
	fn load_reads_files() {
		let mut file = tempfile::NamedTempFile::new().unwrap();
		writeln!(file, "[worker]\nname = \"watcher\"").unwrap();
		let config = Config::load(file.path()).unwrap();
		assert_eq!(config.worker.name, "watcher");

		let dir = tempfile::tempdir().unwrap();
		let missing = dir.path().join("absent.toml");
		assert!(matches!(Config::load(&missing), Err(ConfigError::Io { path, .. }) if path == missing));
	}
}
