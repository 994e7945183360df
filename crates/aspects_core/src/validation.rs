//! Stateless validators guarding the aspect write path.
//!
//! # Responsibility
//! - Enforce business keys, data consistency, optimistic versioning and
//!   acyclicity before any mutation is persisted.
//!
//! # Invariants
//! - Validators are pure functions of the proposed change and an
//!   explicitly passed storage-read capability; no state is held here.
//! - All checks run inside the caller's transaction scope, before any
//!   write; a rejected mutation leaves the store untouched.

use crate::model::aspect::{
    AspectData, AspectId, AspectNode, AspectPropertyNode, BaseType, PropertyId,
};
use crate::model::measure::find_measure;
use crate::repo::aspect_repo::AspectRepository;
use crate::service::aspect_service::AspectServiceError;
use std::collections::{HashMap, HashSet};

/// Checks internal consistency of one aspect request.
///
/// Recovered rules: properties must target live aspects; a value aspect
/// (one without properties) needs a measure or a base type; base type
/// names must be known; measure and base type must agree.
pub fn check_consistency<R: AspectRepository>(
    repo: &R,
    data: &AspectData,
) -> Result<(), AspectServiceError> {
    for property in data.live_properties() {
        match repo.get_aspect(property.target_id, true)? {
            None => return Err(AspectServiceError::DoesNotExist(property.target_id)),
            Some(target) if target.deleted => {
                return Err(AspectServiceError::DoesNotExist(property.target_id))
            }
            Some(_) => {}
        }
    }

    match (data.measure.as_deref(), data.base_type.as_deref()) {
        (None, None) => {
            if data.live_properties().next().is_none() {
                return Err(AspectServiceError::InconsistentState(
                    "measure and base type cannot both be empty for an aspect without properties"
                        .to_string(),
                ));
            }
        }
        (None, Some(base_type)) => {
            parse_base_type(base_type)?;
        }
        (Some(measure), Some(base_type)) => {
            let known = find_measure(measure).ok_or_else(|| {
                AspectServiceError::InconsistentState(format!("unknown measure `{measure}`"))
            })?;
            let parsed = parse_base_type(base_type)?;
            if known.base_type != parsed {
                return Err(AspectServiceError::InconsistentState(format!(
                    "measure `{measure}` stores {}, not {}",
                    known.base_type.as_str(),
                    parsed.as_str()
                )));
            }
        }
        (Some(_), None) => {}
    }

    Ok(())
}

/// Checks the (name, subject) business key and property-key uniqueness.
///
/// When `data.id` is set the aspect's own row is excluded, so renames to
/// the same name stay legal.
pub fn check_business_key<R: AspectRepository>(
    repo: &R,
    data: &AspectData,
) -> Result<(), AspectServiceError> {
    let duplicates =
        repo.find_by_name_and_subject_excluding(&data.name, data.subject_id, data.id)?;
    if !duplicates.is_empty() {
        return Err(AspectServiceError::AlreadyExists {
            name: data.name.clone(),
            subject_name: data.subject_name.clone(),
        });
    }
    check_property_keys(data)
}

/// Checks that no two live properties share (name, target aspect).
///
/// Property keys only exist inside one aspect, so no storage round trip
/// is needed.
pub fn check_property_keys(data: &AspectData) -> Result<(), AspectServiceError> {
    let mut seen = HashSet::new();
    for property in data.live_properties() {
        if !seen.insert((property.name.clone(), property.target_id)) {
            return Err(AspectServiceError::InconsistentState(
                "aspect properties must have unique pairs of name and target aspect".to_string(),
            ));
        }
    }
    Ok(())
}

/// Rejects property targets that would close a cycle through `aspect_id`.
///
/// The guard intersects proposed targets with the transitive ancestor
/// closure of the mutated aspect (the aspect itself included), so chains
/// of any length are caught.
pub fn check_no_cycle<R: AspectRepository>(
    repo: &R,
    aspect_id: AspectId,
    data: &AspectData,
) -> Result<(), AspectServiceError> {
    let ancestors: HashSet<AspectId> = repo.find_parent_ids(aspect_id)?.into_iter().collect();
    let offending: Vec<AspectId> = data
        .live_properties()
        .map(|property| property.target_id)
        .filter(|target| ancestors.contains(target))
        .collect();
    if !offending.is_empty() {
        return Err(AspectServiceError::CyclicDependency(offending));
    }
    Ok(())
}

/// Compares caller-supplied versions against persisted state.
///
/// Beyond the aspect's own version, the full (property id -> version)
/// map must match: a property added, removed or edited concurrently is a
/// conflict even when the aspect version itself still agrees.
pub fn check_version(
    node: &AspectNode,
    persisted_properties: &[AspectPropertyNode],
    data: &AspectData,
) -> Result<(), AspectServiceError> {
    if node.version != data.version {
        return Err(AspectServiceError::ConcurrentModification {
            id: node.id,
            detail: format!(
                "stale aspect version: expected {}, got {}",
                node.version, data.version
            ),
        });
    }

    let persisted: HashMap<PropertyId, i64> = persisted_properties
        .iter()
        .map(|property| (property.id, property.version))
        .collect();
    let received: HashMap<PropertyId, i64> = data
        .properties
        .iter()
        .filter_map(|property| property.id.map(|id| (id, property.version)))
        .collect();

    if persisted.len() != received.len()
        || persisted
            .iter()
            .any(|(id, version)| received.get(id) != Some(version))
    {
        return Err(AspectServiceError::ConcurrentModification {
            id: node.id,
            detail: "properties changed".to_string(),
        });
    }

    Ok(())
}

/// Full pre-write validation of an update request against persisted state.
pub fn validate_existing<R: AspectRepository>(
    repo: &R,
    node: &AspectNode,
    persisted_properties: &[AspectPropertyNode],
    data: &AspectData,
) -> Result<(), AspectServiceError> {
    if node.deleted {
        return Err(AspectServiceError::ModificationForbidden {
            id: node.id,
            detail: "aspect is removed".to_string(),
        });
    }
    check_version(node, persisted_properties, data)?;
    check_no_cycle(repo, node.id, data)?;

    // A referenced aspect already has values typed against it elsewhere;
    // its storage type is frozen.
    if repo.is_referenced(node.id)? {
        let current_base_type = node.base_type.map(|base_type| base_type.as_str());
        if data.base_type.as_deref() != current_base_type {
            return Err(AspectServiceError::ModificationForbidden {
                id: node.id,
                detail: "cannot change base type of a referenced aspect".to_string(),
            });
        }
        if data.measure != node.measure {
            return Err(AspectServiceError::ModificationForbidden {
                id: node.id,
                detail: "cannot change measure of a referenced aspect".to_string(),
            });
        }
    }

    Ok(())
}

fn parse_base_type(value: &str) -> Result<BaseType, AspectServiceError> {
    BaseType::parse(value).ok_or_else(|| {
        AspectServiceError::InconsistentState(format!("unknown base type `{value}`"))
    })
}
