use std::fmt;

use crate::error::HostResult;
use crate::txn::Transaction;

/// Catalog object identifier. Zero is reserved as the invalid identifier and
/// never handed out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Oid(u32);

impl Oid {
	pub const fn new(raw: u32) -> Option<Self> {
		if raw == 0 { None } else { Some(Self(raw)) }
	}

	pub const fn get(self) -> u32 {
		self.0
	}
}

impl fmt::Display for Oid {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.0)
	}
}

/// Read access to the host's catalog of namespaced objects.
///
/// Both lookups run inside a unit of work; the borrow of `txn` keeps them
/// from outliving it.
pub trait Catalog: Send + Sync {
	/// Resolves a namespace (schema) name. `Ok(None)` when it does not exist.
	fn namespace_oid(&self, txn: &Transaction<'_>, name: &str) -> HostResult<Option<Oid>>;

	/// Scans for the relation named `name` in `namespace`, returning the first
	/// match.
	fn find_relation(&self, txn: &Transaction<'_>, namespace: Oid, name: &str) -> HostResult<Option<Oid>>;
}

/// Longest identifier the host stores, in bytes. Longer names are truncated
/// by the host's parser.
pub const IDENTIFIER_MAX_BYTES: usize = 63;

/// Cuts `name` to [`IDENTIFIER_MAX_BYTES`] without splitting a character.
pub fn truncate_identifier(name: &str) -> &str {
	if name.len() <= IDENTIFIER_MAX_BYTES {
		return name;
	}
	let mut end = IDENTIFIER_MAX_BYTES;
	while !name.is_char_boundary(end) {
		end -= 1;
	}
	&name[..end]
}
