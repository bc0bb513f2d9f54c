use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::SolveError;
use crate::input::ConstraintSpec;

/// An opaque name that uniquely identifies one entity within a single solve.
///
/// Identifiers also name "virtual" constraint subjects that do not
/// correspond to any entity; those obtain SAT literals but carry no
/// properties.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identifier(String);

impl Identifier {
    pub fn new(s: impl Into<String>) -> Self {
        Identifier(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Identifier {
    fn from(s: &str) -> Self {
        Identifier(s.to_string())
    }
}

impl From<String> for Identifier {
    fn from(s: String) -> Self {
        Identifier(s)
    }
}

impl AsRef<str> for Identifier {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// A candidate artifact in the universe.
///
/// Properties are opaque to the solver; only expressions interpret them.
/// Each property maps to an ordered sequence of string values. Entities are
/// immutable for the duration of a solve.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub id: Identifier,
    #[serde(default)]
    pub properties: IndexMap<String, Vec<String>>,
}

impl Entity {
    pub fn new(id: impl Into<Identifier>) -> Self {
        Self {
            id: id.into(),
            properties: IndexMap::new(),
        }
    }

    /// Append values under a property name, preserving insertion order.
    pub fn with_property(
        mut self,
        name: impl Into<String>,
        values: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        self.properties
            .entry(name.into())
            .or_default()
            .extend(values.into_iter().map(Into::into));
        self
    }

    /// The values of a property, or an empty slice when absent.
    pub fn property(&self, name: &str) -> &[String] {
        self.properties.get(name).map(Vec::as_slice).unwrap_or(&[])
    }
}

/// A predicate over entities, used by [`EntityUniverse::search`].
pub type Predicate<'a> = Box<dyn Fn(&Entity) -> bool + 'a>;

/// A predicate satisfied when every given predicate is.
pub fn all_of<'a>(predicates: Vec<Predicate<'a>>) -> Predicate<'a> {
    Box::new(move |entity| predicates.iter().all(|p| p(entity)))
}

/// A predicate satisfied when at least one given predicate is.
pub fn any_of<'a>(predicates: Vec<Predicate<'a>>) -> Predicate<'a> {
    Box::new(move |entity| predicates.iter().any(|p| p(entity)))
}

/// The negation of a predicate.
pub fn not(predicate: Predicate<'_>) -> Predicate<'_> {
    Box::new(move |entity| !predicate(entity))
}

/// The ordered set of entities and top-level constraints presented to one
/// solve.
///
/// Insertion order of entities is preserved; anchor enumeration and every
/// builder expansion iterate in that order, which makes resolution
/// deterministic for a given input.
#[derive(Debug, Clone, Default)]
pub struct EntityUniverse {
    entities: Vec<Entity>,
    by_id: IndexMap<Identifier, usize>,
    constraints: Vec<ConstraintSpec>,
}

impl EntityUniverse {
    /// Build a universe from entities and top-level constraints.
    ///
    /// Fails with [`SolveError::DuplicateIdentifier`] when two entities
    /// share an identifier.
    pub fn new(
        entities: Vec<Entity>,
        constraints: Vec<ConstraintSpec>,
    ) -> Result<Self, SolveError> {
        let mut by_id = IndexMap::with_capacity(entities.len());
        for (position, entity) in entities.iter().enumerate() {
            if by_id.insert(entity.id.clone(), position).is_some() {
                return Err(SolveError::DuplicateIdentifier(entity.id.clone()));
            }
        }
        Ok(Self {
            entities,
            by_id,
            constraints,
        })
    }

    /// Look up an entity by identifier.
    pub fn get(&self, id: &Identifier) -> Option<&Entity> {
        self.by_id.get(id).map(|&position| &self.entities[position])
    }

    /// All entities in insertion order.
    pub fn entities(&self) -> &[Entity] {
        &self.entities
    }

    /// All top-level constraints, including builders, in input order.
    pub fn constraints(&self) -> &[ConstraintSpec] {
        &self.constraints
    }

    /// The entities matching a predicate, in insertion order.
    pub fn search(&self, predicate: impl Fn(&Entity) -> bool) -> SearchResult<'_> {
        SearchResult(self.entities.iter().filter(|e| predicate(e)).collect())
    }

    /// All entities as a search result.
    pub fn all_entities(&self) -> SearchResult<'_> {
        SearchResult(self.entities.iter().collect())
    }
}

/// An ordered slice of the universe produced by [`EntityUniverse::search`].
#[derive(Debug, Clone)]
pub struct SearchResult<'a>(Vec<&'a Entity>);

impl<'a> SearchResult<'a> {
    /// Stable-sort the result with an entity comparator.
    pub fn sorted_by(
        mut self,
        compare: impl Fn(&Entity, &Entity) -> std::cmp::Ordering,
    ) -> Self {
        self.0.sort_by(|a, b| compare(a, b));
        self
    }

    /// The identifiers of the matched entities, in result order.
    pub fn collect_ids(&self) -> Vec<Identifier> {
        self.0.iter().map(|e| e.id.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &'a Entity> + '_ {
        self.0.iter().copied()
    }
}
