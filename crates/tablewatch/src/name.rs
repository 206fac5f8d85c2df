//! Fixed-capacity identifiers stored in shared memory.

use std::fmt;

use serde::Deserialize;
use tablewatch_host::{IDENTIFIER_MAX_BYTES, truncate_identifier};
use thiserror::Error;

/// Longest name a [`BoundedName`] holds, in bytes.
pub const MAX_NAME_BYTES: usize = IDENTIFIER_MAX_BYTES;

/// What to do with input longer than [`MAX_NAME_BYTES`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Overlength {
	#[default]
	Reject,
	/// Cut at the last character boundary that fits, as the host's parser does.
	Truncate,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NameError {
	#[error("name \"{name}\" is {len} bytes long, the limit is {MAX_NAME_BYTES}")]
	TooLong { name: String, len: usize },

	#[error("name {0:?} contains a NUL byte")]
	Nul(String),
}

/// An identifier of at most [`MAX_NAME_BYTES`] bytes, stored inline.
///
/// The buffer always holds valid UTF-8; the empty name is the default.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct BoundedName {
	len: u8,
	bytes: [u8; MAX_NAME_BYTES],
}

impl Default for BoundedName {
	fn default() -> Self {
		Self::EMPTY
	}
}

impl BoundedName {
	pub const EMPTY: Self = Self {
		len: 0,
		bytes: [0; MAX_NAME_BYTES],
	};

	pub fn new(name: &str, policy: Overlength) -> Result<Self, NameError> {
		if name.contains('\0') {
			return Err(NameError::Nul(name.to_string()));
		}
		let fitted = match policy {
			Overlength::Reject if name.len() > MAX_NAME_BYTES => {
				return Err(NameError::TooLong {
					name: name.to_string(),
					len: name.len(),
				});
			}
			Overlength::Reject => name,
			Overlength::Truncate => truncate_identifier(name),
		};
		if fitted.len() < name.len() {
			tracing::debug!(name, kept = fitted.len(), "name.truncated");
		}
		let mut bytes = [0; MAX_NAME_BYTES];
		bytes[..fitted.len()].copy_from_slice(fitted.as_bytes());
		Ok(Self {
			len: fitted.len() as u8,
			bytes,
		})
	}

	pub fn as_str(&self) -> &str {
		std::str::from_utf8(&self.bytes[..usize::from(self.len)]).unwrap_or_default()
	}

	pub fn is_empty(&self) -> bool {
		self.len == 0
	}

	pub fn len(&self) -> usize {
		usize::from(self.len)
	}
}

impl fmt::Debug for BoundedName {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		fmt::Debug::fmt(self.as_str(), f)
	}
}

impl fmt::Display for BoundedName {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

impl PartialEq<str> for BoundedName {
	fn eq(&self, other: &str) -> bool {
		self.as_str() == other
	}
}

impl PartialEq<&str> for BoundedName {
	fn eq(&self, other: &&str) -> bool {
		self.as_str() == *other
	}
}
