//! In-memory host: one catalog per database, transactional DDL staging.
//!
//! Statements stage their catalog changes in the executing transaction; the
//! changes become visible to other transactions on commit and vanish on
//! abort. Lookups see committed objects plus the caller's own staged ones.

mod sql;

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use self::sql::Ddl;
use crate::catalog::{Catalog, Oid, truncate_identifier};
use crate::error::{HostError, HostResult};
use crate::executor::{ExecOutcome, ExecStatus, StatementExecutor};
use crate::session::{Host, Session};
use crate::txn::{Transaction, TransactionId, TransactionManager};

/// Namespace every unqualified `CREATE TABLE` lands in.
pub const DEFAULT_NAMESPACE: &str = "public";

const PG_CATALOG_OID: u32 = 11;
const PUBLIC_OID: u32 = 2200;
const FIRST_NORMAL_OID: u32 = 16384;

/// Transaction counters for one database.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransactionStats {
	pub open: usize,
	pub committed: u64,
	pub aborted: u64,
}

#[derive(Debug, Clone)]
struct Relation {
	oid: Oid,
	namespace: Oid,
	name: String,
}

#[derive(Debug, Clone)]
enum Change {
	Namespace { name: String, oid: Oid },
	Relation(Relation),
}

struct DbState {
	namespaces: BTreeMap<String, Oid>,
	relations: Vec<Relation>,
	next_oid: u32,
	open: HashMap<TransactionId, Vec<Change>>,
	next_xid: u64,
	committed: u64,
	aborted: u64,
	lookup_failure: Option<String>,
}

impl DbState {
	fn bootstrap() -> Self {
		let mut namespaces = BTreeMap::new();
		namespaces.extend(Oid::new(PG_CATALOG_OID).map(|oid| ("pg_catalog".to_string(), oid)));
		namespaces.extend(Oid::new(PUBLIC_OID).map(|oid| (DEFAULT_NAMESPACE.to_string(), oid)));
		Self {
			namespaces,
			relations: Vec::new(),
			next_oid: FIRST_NORMAL_OID,
			open: HashMap::new(),
			next_xid: 0,
			committed: 0,
			aborted: 0,
			lookup_failure: None,
		}
	}

	fn alloc_oid(&mut self) -> Oid {
		loop {
			let raw = self.next_oid;
			self.next_oid = self.next_oid.wrapping_add(1).max(FIRST_NORMAL_OID);
			if let Some(oid) = Oid::new(raw) {
				return oid;
			}
		}
	}

	fn staged(&self, xid: Option<TransactionId>) -> &[Change] {
		xid.and_then(|xid| self.open.get(&xid)).map_or(&[] as &[Change], Vec::as_slice)
	}

	fn namespace(&self, xid: Option<TransactionId>, name: &str) -> Option<Oid> {
		self.namespaces.get(name).copied().or_else(|| {
			self.staged(xid).iter().find_map(|change| match change {
				Change::Namespace { name: staged, oid } if staged == name => Some(*oid),
				_ => None,
			})
		})
	}

	fn relation(&self, xid: Option<TransactionId>, namespace: Oid, name: &str) -> Option<Oid> {
		let staged = self.staged(xid).iter().filter_map(|change| match change {
			Change::Relation(rel) => Some(rel),
			Change::Namespace { .. } => None,
		});
		self.relations
			.iter()
			.chain(staged)
			.find(|rel| rel.namespace == namespace && rel.name == name)
			.map(|rel| rel.oid)
	}

	fn ensure_open(&self, xid: TransactionId) -> HostResult<()> {
		if self.open.contains_key(&xid) {
			Ok(())
		} else {
			Err(HostError::TransactionNotOpen(xid))
		}
	}

	fn apply(&mut self, changes: Vec<Change>) -> HostResult<()> {
		for change in &changes {
			match change {
				Change::Namespace { name, .. } if self.namespaces.contains_key(name) => {
					return Err(HostError::DuplicateSchema(name.clone()));
				}
				Change::Relation(rel) if self.relation(None, rel.namespace, &rel.name).is_some() => {
					return Err(HostError::DuplicateRelation(rel.name.clone()));
				}
				_ => {}
			}
		}
		for change in changes {
			match change {
				Change::Namespace { name, oid } => {
					self.namespaces.insert(name, oid);
				}
				Change::Relation(rel) => self.relations.push(rel),
			}
		}
		Ok(())
	}
}

/// One in-memory database: catalog, transaction manager and executor.
pub struct MemoryDatabase {
	name: String,
	state: Mutex<DbState>,
}

impl MemoryDatabase {
	fn new(name: &str) -> Self {
		Self {
			name: name.to_string(),
			state: Mutex::new(DbState::bootstrap()),
		}
	}

	pub fn name(&self) -> &str {
		&self.name
	}

	/// Creates a namespace outside any transaction.
	pub fn create_namespace(&self, name: &str) -> HostResult<Oid> {
		let mut state = self.state.lock();
		if state.namespaces.contains_key(name) {
			return Err(HostError::DuplicateSchema(name.to_string()));
		}
		let oid = state.alloc_oid();
		state.namespaces.insert(name.to_string(), oid);
		Ok(oid)
	}

	/// Creates a relation outside any transaction.
	pub fn create_relation(&self, namespace: &str, name: &str) -> HostResult<Oid> {
		let mut state = self.state.lock();
		let ns = state.namespace(None, namespace).ok_or_else(|| HostError::UndefinedSchema(namespace.to_string()))?;
		if state.relation(None, ns, name).is_some() {
			return Err(HostError::DuplicateRelation(name.to_string()));
		}
		let oid = state.alloc_oid();
		state.relations.push(Relation {
			oid,
			namespace: ns,
			name: name.to_string(),
		});
		Ok(oid)
	}

	/// Committed identifier of `namespace.name`, if any.
	pub fn relation_oid(&self, namespace: &str, name: &str) -> Option<Oid> {
		let state = self.state.lock();
		let ns = state.namespace(None, namespace)?;
		state.relation(None, ns, name)
	}

	pub fn relation_count(&self) -> usize {
		self.state.lock().relations.len()
	}

	pub fn stats(&self) -> TransactionStats {
		let state = self.state.lock();
		TransactionStats {
			open: state.open.len(),
			committed: state.committed,
			aborted: state.aborted,
		}
	}

	/// Makes every catalog lookup fail with `reason` until cleared with `None`.
	pub fn fail_lookups(&self, reason: Option<&str>) {
		self.state.lock().lookup_failure = reason.map(str::to_string);
	}

	fn check_lookup(&self, state: &DbState, xid: TransactionId) -> HostResult<()> {
		state.ensure_open(xid)?;
		match &state.lookup_failure {
			Some(reason) => Err(HostError::Unavailable(reason.clone())),
			None => Ok(()),
		}
	}
}

impl TransactionManager for MemoryDatabase {
	fn begin(&self) -> HostResult<TransactionId> {
		let mut state = self.state.lock();
		state.next_xid += 1;
		let xid = TransactionId(state.next_xid);
		state.open.insert(xid, Vec::new());
		Ok(xid)
	}

	fn commit(&self, id: TransactionId) -> HostResult<()> {
		let mut state = self.state.lock();
		let changes = state.open.remove(&id).ok_or(HostError::TransactionNotOpen(id))?;
		match state.apply(changes) {
			Ok(()) => {
				state.committed += 1;
				Ok(())
			}
			Err(err) => {
				state.aborted += 1;
				Err(err)
			}
		}
	}

	fn abort(&self, id: TransactionId) {
		let mut state = self.state.lock();
		if state.open.remove(&id).is_some() {
			state.aborted += 1;
		}
	}
}

impl Catalog for MemoryDatabase {
	fn namespace_oid(&self, txn: &Transaction<'_>, name: &str) -> HostResult<Option<Oid>> {
		let state = self.state.lock();
		self.check_lookup(&state, txn.id())?;
		Ok(state.namespace(Some(txn.id()), name))
	}

	fn find_relation(&self, txn: &Transaction<'_>, namespace: Oid, name: &str) -> HostResult<Option<Oid>> {
		let state = self.state.lock();
		self.check_lookup(&state, txn.id())?;
		Ok(state.relation(Some(txn.id()), namespace, name))
	}
}

impl StatementExecutor for MemoryDatabase {
	fn execute(&self, txn: &Transaction<'_>, sql: &str) -> HostResult<ExecOutcome> {
		let ddl = sql::parse(sql)?;
		let xid = txn.id();
		let mut state = self.state.lock();
		state.ensure_open(xid)?;

		let change = match ddl {
			Ddl::CreateSchema { name, if_not_exists } => {
				let name = truncate_identifier(&name).to_string();
				if state.namespace(Some(xid), &name).is_some() {
					if !if_not_exists {
						return Err(HostError::DuplicateSchema(name));
					}
					tracing::debug!(schema = %name, "schema already exists, skipping");
					None
				} else {
					let oid = state.alloc_oid();
					Some(Change::Namespace { name, oid })
				}
			}
			Ddl::CreateTable { schema, name, if_not_exists } => {
				let schema = schema.unwrap_or_else(|| DEFAULT_NAMESPACE.to_string());
				let schema = truncate_identifier(&schema);
				let name = truncate_identifier(&name).to_string();
				let namespace = state.namespace(Some(xid), schema).ok_or_else(|| HostError::UndefinedSchema(schema.to_string()))?;
				if state.relation(Some(xid), namespace, &name).is_some() {
					if !if_not_exists {
						return Err(HostError::DuplicateRelation(name));
					}
					tracing::debug!(relation = %name, "relation already exists, skipping");
					None
				} else {
					let oid = state.alloc_oid();
					Some(Change::Relation(Relation { oid, namespace, name }))
				}
			}
		};

		if let Some(change) = change {
			state.open.entry(xid).or_default().push(change);
		}
		Ok(ExecOutcome {
			status: ExecStatus::Utility,
			processed: 0,
		})
	}
}

/// Session bound to one [`MemoryDatabase`].
pub struct MemorySession {
	database: Arc<MemoryDatabase>,
}

impl Session for MemorySession {
	fn database(&self) -> &str {
		&self.database.name
	}

	fn catalog(&self) -> &dyn Catalog {
		&*self.database
	}

	fn transactions(&self) -> &dyn TransactionManager {
		&*self.database
	}

	fn executor(&self) -> &dyn StatementExecutor {
		&*self.database
	}
}

/// In-memory [`Host`] with a `postgres` database preinstalled.
#[derive(Clone)]
pub struct MemoryHost {
	databases: Arc<RwLock<BTreeMap<String, Arc<MemoryDatabase>>>>,
}

impl Default for MemoryHost {
	fn default() -> Self {
		Self::new()
	}
}

impl MemoryHost {
	pub fn new() -> Self {
		let host = Self {
			databases: Arc::default(),
		};
		host.add_database("postgres");
		host
	}

	/// Returns the database `name`, creating it if needed.
	pub fn add_database(&self, name: &str) -> Arc<MemoryDatabase> {
		let mut databases = self.databases.write();
		Arc::clone(databases.entry(name.to_string()).or_insert_with(|| Arc::new(MemoryDatabase::new(name))))
	}

	pub fn database(&self, name: &str) -> Option<Arc<MemoryDatabase>> {
		self.databases.read().get(name).cloned()
	}
}

impl Host for MemoryHost {
	fn connect(&self, database: &str) -> HostResult<Arc<dyn Session>> {
		let database = self.database(database).ok_or_else(|| HostError::UnknownDatabase(database.to_string()))?;
		tracing::debug!(database = %database.name, "session.connect");
		Ok(Arc::new(MemorySession { database }))
	}
}
