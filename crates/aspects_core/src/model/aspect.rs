//! Aspect and aspect-property domain model.
//!
//! # Responsibility
//! - Define persisted read models (`AspectNode`, `AspectPropertyNode`).
//! - Define write DTOs (`AspectData`, `AspectPropertyData`).
//! - Define the immutable nested read projection (`AspectTree`).
//!
//! # Invariants
//! - `out_edges`/`in_edges` on a node reflect only non-deleted properties.
//! - A property's `in_edge` is a member of its owner's `out_edges`; its
//!   `out_edge` is a member of its target's `in_edges`.
//! - Tree values are transient: built per read request, never persisted.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Stable identifier for one aspect.
pub type AspectId = Uuid;

/// Stable identifier for one aspect property.
pub type PropertyId = Uuid;

/// Stable identifier for one subject scope.
pub type SubjectId = Uuid;

/// Opaque stable token identifying one property-to-aspect link.
///
/// Used both to verify structural linkage during tree reconstruction and as
/// the subtree cache key for shared aspects.
pub type EdgeId = Uuid;

/// Scalar type an aspect value is stored as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BaseType {
    /// 32-bit integer.
    Integer,
    /// 64-bit integer.
    Long,
    /// Arbitrary-precision decimal. All measured values use this.
    Decimal,
    /// Boolean flag.
    Boolean,
    /// Free text.
    Text,
    /// Opaque binary payload.
    Binary,
}

impl BaseType {
    /// Parses the persisted string form. Returns `None` for unknown names.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "Integer" => Some(Self::Integer),
            "Long" => Some(Self::Long),
            "Decimal" => Some(Self::Decimal),
            "Boolean" => Some(Self::Boolean),
            "Text" => Some(Self::Text),
            "Binary" => Some(Self::Binary),
            _ => None,
        }
    }

    /// Persisted string form.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Integer => "Integer",
            Self::Long => "Long",
            Self::Decimal => "Decimal",
            Self::Boolean => "Boolean",
            Self::Text => "Text",
            Self::Binary => "Binary",
        }
    }
}

/// How many value instances one property may hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PropertyCardinality {
    /// Grouping property without own values.
    Zero,
    /// At most one value.
    One,
    /// Unbounded values.
    Infinity,
}

impl PropertyCardinality {
    /// Parses the persisted string form. Returns `None` for unknown names.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "ZERO" => Some(Self::Zero),
            "ONE" => Some(Self::One),
            "INFINITY" => Some(Self::Infinity),
            _ => None,
        }
    }

    /// Persisted string form.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Zero => "ZERO",
            Self::One => "ONE",
            Self::Infinity => "INFINITY",
        }
    }

    /// User-facing label.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Zero => "Group",
            Self::One => "0..1",
            Self::Infinity => "0..∞",
        }
    }
}

/// Persisted read model of one aspect vertex.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AspectNode {
    /// Stable aspect id.
    pub id: AspectId,
    /// Business-key name, unique within one subject scope.
    pub name: String,
    /// Measurement unit name, resolved against the measure registry.
    pub measure: Option<String>,
    /// Base scalar type. `None` only for pure grouping aspects.
    pub base_type: Option<BaseType>,
    /// Subject scope. `None` means the global scope.
    pub subject_id: Option<SubjectId>,
    /// Denormalized subject name for display.
    pub subject_name: Option<String>,
    /// Reference book root, when one is attached.
    pub ref_book_id: Option<Uuid>,
    /// Optional free-form description.
    pub description: Option<String>,
    /// Optimistic concurrency counter, bumped on every write.
    pub version: i64,
    /// Soft-delete tombstone.
    pub deleted: bool,
    /// Edge identities to this aspect's non-deleted properties, in
    /// property order. The recorded out-degree drives tree reduction.
    pub out_edges: Vec<EdgeId>,
    /// Edge identities of non-deleted properties elsewhere that target
    /// this aspect.
    pub in_edges: Vec<EdgeId>,
}

/// Persisted read model of one aspect-property vertex.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AspectPropertyNode {
    /// Stable property id.
    pub id: PropertyId,
    /// Property name. Unique together with `target_id` inside one owner.
    pub name: Option<String>,
    /// Owning aspect.
    pub aspect_id: AspectId,
    /// Target (child) aspect.
    pub target_id: AspectId,
    /// Value multiplicity constraint.
    pub cardinality: PropertyCardinality,
    /// Optimistic concurrency counter.
    pub version: i64,
    /// Soft-delete tombstone.
    pub deleted: bool,
    /// Edge identity of the owner-to-property link.
    pub in_edge: EdgeId,
    /// Edge identity of the property-to-target link.
    pub out_edge: EdgeId,
}

/// Write DTO for creating or updating one aspect.
///
/// `id = None` requests creation; otherwise an update of the identified
/// aspect, with `version` carrying the caller's last-seen version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AspectData {
    /// Target aspect; `None` creates a new one.
    pub id: Option<AspectId>,
    /// Business-key name.
    pub name: String,
    /// Measurement unit name.
    pub measure: Option<String>,
    /// Base scalar type name, persisted form (`BaseType::as_str`).
    pub base_type: Option<String>,
    /// Full intended property list. Properties flagged `deleted` are
    /// soft-deleted by the write path.
    pub properties: Vec<AspectPropertyData>,
    /// Caller's last-seen aspect version. Ignored on create.
    pub version: i64,
    /// Subject scope id.
    pub subject_id: Option<SubjectId>,
    /// Subject scope display name.
    pub subject_name: Option<String>,
    /// Optional free-form description.
    pub description: Option<String>,
}

impl AspectData {
    /// Starts a creation request with only the business-key name set.
    pub fn initial(name: impl Into<String>) -> Self {
        Self {
            id: None,
            name: name.into(),
            measure: None,
            base_type: None,
            properties: Vec::new(),
            version: 0,
            subject_id: None,
            subject_name: None,
            description: None,
        }
    }

    /// Non-deleted properties, the set all uniqueness checks run against.
    pub fn live_properties(&self) -> impl Iterator<Item = &AspectPropertyData> {
        self.properties.iter().filter(|property| !property.deleted)
    }
}

/// Write DTO for one property inside an [`AspectData`] request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AspectPropertyData {
    /// Target property; `None` creates a new one.
    pub id: Option<PropertyId>,
    /// Property name.
    pub name: Option<String>,
    /// Target (child) aspect id.
    pub target_id: AspectId,
    /// Value multiplicity constraint.
    pub cardinality: PropertyCardinality,
    /// Caller's last-seen property version. Ignored on create.
    pub version: i64,
    /// Requests soft deletion of an existing property.
    pub deleted: bool,
}

impl AspectPropertyData {
    /// Starts a creation request for a new property.
    pub fn initial(
        name: impl Into<String>,
        target_id: AspectId,
        cardinality: PropertyCardinality,
    ) -> Self {
        Self {
            id: None,
            name: Some(name.into()),
            target_id,
            cardinality,
            version: 0,
            deleted: false,
        }
    }
}

/// Immutable fully-nested read projection of one aspect.
///
/// Built per read request by the tree reconstructor and discarded after
/// use. A shared child aspect appears deep-equal at every referencing
/// site.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AspectTree {
    /// Stable aspect id.
    pub id: AspectId,
    /// Business-key name.
    pub name: String,
    /// Subject scope id.
    pub subject_id: Option<SubjectId>,
    /// Subject scope display name.
    pub subject_name: Option<String>,
    /// Measurement unit name.
    pub measure: Option<String>,
    /// Base scalar type.
    pub base_type: Option<BaseType>,
    /// Reference book root, when one is attached.
    pub ref_book_id: Option<Uuid>,
    /// Soft-delete tombstone.
    pub deleted: bool,
    /// Fully resolved child properties, in property order.
    pub properties: Vec<AspectPropertyTree>,
}

/// Immutable property projection embedding its resolved child aspect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AspectPropertyTree {
    /// Stable property id.
    pub id: PropertyId,
    /// Property name.
    pub name: Option<String>,
    /// Value multiplicity constraint.
    pub cardinality: PropertyCardinality,
    /// Soft-delete tombstone.
    pub deleted: bool,
    /// Fully resolved target aspect.
    pub aspect: AspectTree,
}

#[cfg(test)]
mod tests {
    use super::{AspectData, AspectPropertyData, BaseType, PropertyCardinality};
    use uuid::Uuid;

    #[test]
    fn base_type_round_trips_persisted_form() {
        for base_type in [
            BaseType::Integer,
            BaseType::Long,
            BaseType::Decimal,
            BaseType::Boolean,
            BaseType::Text,
            BaseType::Binary,
        ] {
            assert_eq!(BaseType::parse(base_type.as_str()), Some(base_type));
        }
        assert_eq!(BaseType::parse("Nothing"), None);
    }

    #[test]
    fn cardinality_round_trips_and_labels() {
        assert_eq!(
            PropertyCardinality::parse("INFINITY"),
            Some(PropertyCardinality::Infinity)
        );
        assert_eq!(PropertyCardinality::parse("many"), None);
        assert_eq!(PropertyCardinality::Zero.label(), "Group");
    }

    #[test]
    fn live_properties_filters_deleted() {
        let target = Uuid::new_v4();
        let mut data = AspectData::initial("Dimensions");
        data.properties.push(AspectPropertyData::initial(
            "width",
            target,
            PropertyCardinality::One,
        ));
        let mut removed =
            AspectPropertyData::initial("height", target, PropertyCardinality::One);
        removed.deleted = true;
        data.properties.push(removed);

        assert_eq!(data.live_properties().count(), 1);
    }
}
