//! In-memory store of everything produced during a run.
//!
//! Entries are written once under a fresh identifier and never updated;
//! only their metadata may be patched afterwards.

use std::collections::{BTreeMap, HashMap};

use tracing::debug;

use super::identifier::Identifier;
use super::table::Table;
use crate::error::RepositoryError;
use crate::models::PeriodSummary;
use crate::vis::Figure;

/// Free-form metadata attached to an entry.
pub type Metadata = BTreeMap<String, serde_json::Value>;

/// Payload stored under an identifier.
#[derive(Debug, Clone, PartialEq)]
pub enum Data {
    Table(Table),
    Integer(i64),
    Float(f64),
    Summary(PeriodSummary),
    Figure(Figure),
    Empty,
}

impl Data {
    pub fn type_name(&self) -> &'static str {
        match self {
            Data::Table(_) => "a table",
            Data::Integer(_) => "an integer",
            Data::Float(_) => "a float",
            Data::Summary(_) => "a summary",
            Data::Figure(_) => "a figure",
            Data::Empty => "empty",
        }
    }

    pub fn as_table(&self) -> Option<&Table> {
        match self {
            Data::Table(t) => Some(t),
            _ => None,
        }
    }

    /// Scalar value of numeric payloads.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Data::Integer(i) => Some(*i as f64),
            Data::Float(f) => Some(*f),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Entry {
    pub data: Data,
    pub metadata: Metadata,
}

#[derive(Debug, Default)]
pub struct DataRepository {
    entries: HashMap<Identifier, Entry>,
    order: Vec<Identifier>,
}

impl DataRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an entry. Fails if the identifier is already present.
    pub fn add(
        &mut self,
        id: Identifier,
        data: Data,
        metadata: Option<Metadata>,
    ) -> Result<(), RepositoryError> {
        if self.entries.contains_key(&id) {
            return Err(RepositoryError::Duplicate(id.to_string()));
        }
        debug!("Adding {} ({})", id, data.type_name());
        self.order.push(id.clone());
        self.entries.insert(
            id,
            Entry {
                data,
                metadata: metadata.unwrap_or_default(),
            },
        );
        Ok(())
    }

    pub fn get(&self, id: &Identifier) -> Result<&Entry, RepositoryError> {
        self.entries
            .get(id)
            .ok_or_else(|| RepositoryError::NotFound(id.to_string()))
    }

    pub fn get_data(&self, id: &Identifier) -> Result<&Data, RepositoryError> {
        self.get(id).map(|entry| &entry.data)
    }

    /// Metadata of an entry; empty when none was given at `add`.
    pub fn get_metadata(&self, id: &Identifier) -> Result<&Metadata, RepositoryError> {
        self.get(id).map(|entry| &entry.metadata)
    }

    /// Replace the metadata of an entry wholesale.
    pub fn update_metadata(
        &mut self,
        id: &Identifier,
        metadata: Metadata,
    ) -> Result<(), RepositoryError> {
        let entry = self
            .entries
            .get_mut(id)
            .ok_or_else(|| RepositoryError::NotFound(id.to_string()))?;
        entry.metadata = metadata;
        Ok(())
    }

    pub fn remove(&mut self, id: &Identifier) -> Result<Entry, RepositoryError> {
        let entry = self
            .entries
            .remove(id)
            .ok_or_else(|| RepositoryError::NotFound(id.to_string()))?;
        self.order.retain(|existing| existing != id);
        Ok(entry)
    }

    pub fn contains(&self, id: &Identifier) -> bool {
        self.entries.contains_key(id)
    }

    pub fn count(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Identifiers in insertion order.
    pub fn ids(&self) -> &[Identifier] {
        &self.order
    }

    /// Every identifier satisfying `predicate`, in insertion order.
    pub fn filter_ids(&self, predicate: impl Fn(&Identifier) -> bool) -> Vec<Identifier> {
        self.order.iter().filter(|id| predicate(id)).cloned().collect()
    }

    /// Entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&Identifier, &Entry)> {
        self.order
            .iter()
            .filter_map(move |id| self.entries.get(id).map(|entry| (id, entry)))
    }

    /// Move every entry of `other` into this repository.
    ///
    /// All or nothing: if any identifier already exists here, nothing is
    /// moved and the error lists every colliding identifier.
    pub fn join(&mut self, other: DataRepository) -> Result<(), RepositoryError> {
        let collisions: Vec<String> = other
            .order
            .iter()
            .filter(|id| self.entries.contains_key(id))
            .map(|id| id.to_string())
            .collect();
        if !collisions.is_empty() {
            return Err(RepositoryError::JoinCollision(collisions));
        }

        let DataRepository {
            mut entries,
            order,
        } = other;
        for id in order {
            if let Some(entry) = entries.remove(&id) {
                self.order.push(id.clone());
                self.entries.insert(id, entry);
            }
        }
        Ok(())
    }
}
