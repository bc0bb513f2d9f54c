//! The catalog adapter: one entity per packaged artifact, plus one filter
//! builder per declared requirement.

use serde::{Deserialize, Serialize};

use crate::entity::Entity;
use crate::error::SolveError;
use crate::expr::{SelectorExpression, SortExpression};
use crate::input::ConstraintSpec;

use super::EntitySource;

/// A Group/Version/Kind identifier provided or required by an item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Gvk {
    pub group: String,
    pub version: String,
    pub kind: String,
}

impl Gvk {
    pub fn new(
        group: impl Into<String>,
        version: impl Into<String>,
        kind: impl Into<String>,
    ) -> Self {
        Self {
            group: group.into(),
            version: version.into(),
            kind: kind.into(),
        }
    }
}

/// A declared dependency on another package.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageRequirement {
    pub package: String,
    pub version_range: String,
}

/// One resolvable artifact of a catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogItem {
    pub package: String,
    pub version: String,
    pub channel: String,
    pub default_channel: String,
    #[serde(default)]
    pub provided_gvks: Vec<Gvk>,
    #[serde(default)]
    pub required_gvks: Vec<Gvk>,
    #[serde(default)]
    pub required_packages: Vec<PackageRequirement>,
    /// Upgrade-path metadata, collected but consumed by no core constraint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replaces: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub skips: Vec<String>,
}

impl CatalogItem {
    /// The entity identifier of this item: `channel:package:version`.
    pub fn entity_id(&self) -> String {
        format!("{}:{}:{}", self.channel, self.package, self.version)
    }
}

/// Emits catalog items as entities with their declared dependencies
/// wrapped in filter builders.
#[derive(Debug, Clone, Default)]
pub struct CatalogSource {
    items: Vec<CatalogItem>,
}

impl CatalogSource {
    pub fn new(items: Vec<CatalogItem>) -> Self {
        Self { items }
    }
}

impl EntitySource for CatalogSource {
    fn entities(&self) -> Result<Vec<Entity>, SolveError> {
        self.items.iter().map(item_to_entity).collect()
    }

    fn constraints(&self) -> Result<Vec<ConstraintSpec>, SolveError> {
        let mut constraints = Vec::new();
        for item in &self.items {
            let subject = item.entity_id();
            for requirement in &item.required_packages {
                constraints.push(dependency_builder(
                    &subject,
                    package_selector(&requirement.package, &requirement.version_range),
                ));
            }
            for gvk in &item.required_gvks {
                constraints.push(dependency_builder(&subject, gvk_selector(gvk)));
            }
        }
        Ok(constraints)
    }
}

fn item_to_entity(item: &CatalogItem) -> Result<Entity, SolveError> {
    let mut entity = Entity::new(item.entity_id())
        .with_property("package", [item.package.clone()])
        .with_property("version", [item.version.clone()])
        .with_property("channel", [item.channel.clone()])
        .with_property("defaultChannel", [item.default_channel.clone()]);
    for gvk in &item.provided_gvks {
        entity = entity.with_property("gvk", [to_json(gvk)?]);
    }
    for gvk in &item.required_gvks {
        entity = entity.with_property("gvk.required", [to_json(gvk)?]);
    }
    for requirement in &item.required_packages {
        entity = entity.with_property("package.required", [to_json(requirement)?]);
    }
    if let Some(replaces) = &item.replaces {
        entity = entity.with_property("replaces", [replaces.clone()]);
    }
    if !item.skips.is_empty() {
        entity = entity.with_property("skips", item.skips.clone());
    }
    Ok(entity)
}

fn to_json<T: Serialize>(value: &T) -> Result<String, SolveError> {
    serde_json::to_string(value)
        .map_err(|e| SolveError::Internal(format!("failed to encode a catalog property: {e}")))
}

fn dependency_builder(subject: &str, filter: SelectorExpression) -> ConstraintSpec {
    ConstraintSpec::Filter {
        filter,
        sort: Some(preference_comparator()),
        constraint: Box::new(ConstraintSpec::Dependency {
            subject: Some(subject.into()),
            ids: Vec::new(),
        }),
    }
}

/// Selects every entity of a package whose version lies in a range.
pub(crate) fn package_selector(package: &str, version_range: &str) -> SelectorExpression {
    SelectorExpression::new(format!(
        r#"any(Entity.Properties["package"], # == "{package}") && any(Entity.Properties["version"], InSemverRange(#, "{version_range}"))"#
    ))
}

/// Selects every entity of a package in one channel whose version lies in
/// a range. An empty channel matches any channel.
pub(crate) fn package_channel_selector(
    package: &str,
    version_range: &str,
    channel: &str,
) -> SelectorExpression {
    if channel.is_empty() {
        return package_selector(package, version_range);
    }
    SelectorExpression::new(format!(
        r#"any(Entity.Properties["package"], # == "{package}") && any(Entity.Properties["channel"], # == "{channel}") && any(Entity.Properties["version"], InSemverRange(#, "{version_range}"))"#
    ))
}

/// Selects every entity providing a Group/Version/Kind.
pub(crate) fn gvk_selector(gvk: &Gvk) -> SelectorExpression {
    SelectorExpression::new(format!(
        r#"any(Entity.Properties["gvk"], JSONPath(#, "group") == "{}" && JSONPath(#, "version") == "{}" && JSONPath(#, "kind") == "{}")"#,
        gvk.group, gvk.version, gvk.kind
    ))
}

/// Orders dependency candidates by preference: package name first, then
/// the package's default channel before other channels, then version
/// descending within a channel.
pub(crate) fn preference_comparator() -> SortExpression {
    SortExpression::new(
        r#"EntityOne.Properties["package"][0] != EntityTwo.Properties["package"][0] ? (EntityOne.Properties["package"][0] < EntityTwo.Properties["package"][0] ? -1 : 1) : EntityOne.Properties["channel"][0] == EntityTwo.Properties["channel"][0] ? -1 * SemverCompare(EntityOne.Properties["version"][0], EntityTwo.Properties["version"][0]) : EntityOne.Properties["channel"][0] == EntityOne.Properties["defaultChannel"][0] ? -1 : EntityTwo.Properties["channel"][0] == EntityTwo.Properties["defaultChannel"][0] ? 1 : (EntityOne.Properties["channel"][0] < EntityTwo.Properties["channel"][0] ? -1 : 1)"#,
    )
}
