//! Statement parsing for the in-memory executor.

use sqlparser::ast::{Ident, ObjectName, ObjectNamePart, SchemaName, Statement};
use sqlparser::dialect::PostgreSqlDialect;
use sqlparser::parser::Parser;

use crate::error::{HostError, HostResult};

/// The statements the in-memory host can execute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Ddl {
	CreateSchema { name: String, if_not_exists: bool },
	CreateTable { schema: Option<String>, name: String, if_not_exists: bool },
}

pub(crate) fn parse(sql: &str) -> HostResult<Ddl> {
	let mut statements = Parser::parse_sql(&PostgreSqlDialect {}, sql).map_err(|err| HostError::Syntax(err.to_string()))?;
	if statements.len() != 1 {
		return Err(HostError::Syntax(format!("expected exactly one statement, found {}", statements.len())));
	}
	match statements.remove(0) {
		Statement::CreateTable(create) => {
			let (schema, name) = qualified_name(&create.name)?;
			Ok(Ddl::CreateTable {
				schema,
				name,
				if_not_exists: create.if_not_exists,
			})
		}
		Statement::CreateSchema {
			schema_name, if_not_exists, ..
		} => {
			let name = match schema_name {
				SchemaName::Simple(name) => match qualified_name(&name)? {
					(None, name) => name,
					(Some(_), _) => return Err(HostError::Syntax(format!("schema name {name} must not be qualified"))),
				},
				SchemaName::UnnamedAuthorization(owner) => fold(&owner),
				SchemaName::NamedAuthorization(name, _) => qualified_name(&name)?.1,
			};
			Ok(Ddl::CreateSchema { name, if_not_exists })
		}
		other => Err(HostError::Unsupported(other.to_string())),
	}
}

/// Splits `[schema.]name`, folding unquoted identifiers to lower case.
fn qualified_name(name: &ObjectName) -> HostResult<(Option<String>, String)> {
	let mut parts = Vec::with_capacity(name.0.len());
	for part in &name.0 {
		match part {
			ObjectNamePart::Identifier(ident) => parts.push(fold(ident)),
			#[allow(unreachable_patterns)]
			_ => return Err(HostError::Unsupported(format!("object name {name}"))),
		}
	}
	match parts.len() {
		1 => Ok((None, parts.remove(0))),
		2 => {
			let name = parts.remove(1);
			Ok((Some(parts.remove(0)), name))
		}
		_ => Err(HostError::Unsupported(format!("cross-database reference {name}"))),
	}
}

fn fold(ident: &Ident) -> String {
	if ident.quote_style.is_some() {
		ident.value.clone()
	} else {
		ident.value.to_lowercase()
	}
}
