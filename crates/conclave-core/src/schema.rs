//! Relation and column metadata. Pure values; no graph knowledge here.
//!
//! Every derivation produces a new value (`renamed`, `with_stored_with`,
//! `cleared`, ...) instead of mutating a shared copy, so the collusion-set
//! reset performed by the builder layer is an explicit step.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::id::PartyId;

/// Ordered set of parties; ordered so that relations hash and print stably.
pub type PartySet = BTreeSet<PartyId>;

/// Build a `PartySet` from raw party numbers.
pub fn parties<I>(ids: I) -> PartySet
where
    I: IntoIterator<Item = u64>,
{
    ids.into_iter().map(PartyId::new).collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScalarType {
    Integer,
    Float,
    String,
    Boolean,
}

impl FromStr for ScalarType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "INTEGER" | "INT" | "I64" => Ok(ScalarType::Integer),
            "FLOAT" | "F64" => Ok(ScalarType::Float),
            "STRING" | "UTF8" => Ok(ScalarType::String),
            "BOOLEAN" | "BOOL" => Ok(ScalarType::Boolean),
            other => Err(Error::InvalidArgument(format!("unknown scalar type '{other}'"))),
        }
    }
}

impl fmt::Display for ScalarType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ScalarType::Integer => "INTEGER",
            ScalarType::Float => "FLOAT",
            ScalarType::String => "STRING",
            ScalarType::Boolean => "BOOLEAN",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    /// Name of the relation this column belongs to.
    pub rel_name: String,
    pub name: String,
    /// Position inside the owning relation.
    pub idx: usize,
    pub type_tag: ScalarType,
    /// Parties who together could reconstruct this column's plaintext.
    /// Advisory only.
    pub coll_set: PartySet,
}

impl Column {
    pub fn new(
        rel_name: impl Into<String>,
        name: impl Into<String>,
        idx: usize,
        type_tag: ScalarType,
        coll_set: PartySet,
    ) -> Self {
        Self {
            rel_name: rel_name.into(),
            name: name.into(),
            idx,
            type_tag,
            coll_set,
        }
    }

    /// Copy of this column with an empty collusion set.
    pub fn cleared(&self) -> Self {
        Self {
            coll_set: PartySet::new(),
            ..self.clone()
        }
    }

    pub fn with_name(&self, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..self.clone()
        }
    }
}

impl fmt::Display for Column {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.rel_name, self.name)
    }
}

/// A named, ordered set of columns plus the parties that hold it.
///
/// `INV`: `columns[i].idx == i` and `columns[i].rel_name == name`. The
/// constructor re-stamps both, so any column list is accepted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relation {
    name: String,
    columns: Vec<Column>,
    stored_with: PartySet,
}

impl Relation {
    pub fn new(name: impl Into<String>, columns: Vec<Column>, stored_with: PartySet) -> Self {
        let name = name.into();
        let columns = columns
            .into_iter()
            .enumerate()
            .map(|(idx, col)| Column {
                rel_name: name.clone(),
                idx,
                ..col
            })
            .collect();
        Self {
            name,
            columns,
            stored_with,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn stored_with(&self) -> &PartySet {
        &self.stored_with
    }

    pub fn column(&self, idx: usize) -> Option<&Column> {
        self.columns.get(idx)
    }

    /// Look a column up by name; a missing column is a hard error.
    pub fn find(&self, col_name: &str) -> Result<&Column> {
        self.columns
            .iter()
            .find(|c| c.name == col_name)
            .ok_or_else(|| Error::ColumnNotFound {
                relation: self.name.clone(),
                column: col_name.to_string(),
            })
    }

    pub fn find_all<S: AsRef<str>>(&self, col_names: &[S]) -> Result<Vec<Column>> {
        col_names
            .iter()
            .map(|n| self.find(n.as_ref()).cloned())
            .collect()
    }

    /// Column at `idx` in this relation, used when refreshing stale
    /// references after a reparent.
    pub fn resolve(&self, stale: &Column) -> Result<Column> {
        self.columns.get(stale.idx).cloned().ok_or_else(|| {
            Error::Schema(format!(
                "column {} (idx {}) has no counterpart in relation '{}' with {} columns",
                stale,
                stale.idx,
                self.name,
                self.columns.len()
            ))
        })
    }

    /// Shared relations are held by more than one party.
    pub fn is_shared(&self) -> bool {
        self.stored_with.len() > 1
    }

    pub fn renamed(&self, name: impl Into<String>) -> Self {
        Self::new(name, self.columns.clone(), self.stored_with.clone())
    }

    pub fn with_stored_with(&self, stored_with: PartySet) -> Self {
        Self {
            stored_with,
            ..self.clone()
        }
    }
}

impl fmt::Display for Relation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.name)?;
        for (i, c) in self.columns.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{} {}", c.name, c.type_tag)?;
        }
        f.write_str(") @ {")?;
        for (i, p) in self.stored_with.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}", p.get())?;
        }
        f.write_str("}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn col(name: &str, idx: usize) -> Column {
        Column::new("x", name, idx, ScalarType::Integer, parties([1]))
    }

    #[test]
    fn constructor_restamps_positions_and_owner() {
        let rel = Relation::new("r", vec![col("b", 7), col("a", 3)], parties([1]));
        let idxs: Vec<usize> = rel.columns().iter().map(|c| c.idx).collect();
        assert_eq!(idxs, vec![0, 1]);
        assert!(rel.columns().iter().all(|c| c.rel_name == "r"));
    }

    #[test]
    fn missing_column_is_an_error() {
        let rel = Relation::new("r", vec![col("a", 0)], parties([1]));
        match rel.find("zzz") {
            Err(Error::ColumnNotFound { relation, column }) => {
                assert_eq!(relation, "r");
                assert_eq!(column, "zzz");
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn shared_means_more_than_one_party() {
        let rel = Relation::new("r", vec![col("a", 0)], parties([1]));
        assert!(!rel.is_shared());
        assert!(rel.with_stored_with(parties([1, 2])).is_shared());
    }

    #[test]
    fn display_lists_columns_and_parties() {
        let rel = Relation::new("r", vec![col("a", 0), col("b", 1)], parties([2, 1]));
        assert_eq!(rel.to_string(), "r(a INTEGER, b INTEGER) @ {1, 2}");
    }

    #[test]
    fn scalar_type_parses_case_insensitively() {
        assert_eq!("integer".parse::<ScalarType>().unwrap(), ScalarType::Integer);
        assert!("blob".parse::<ScalarType>().is_err());
    }
}
