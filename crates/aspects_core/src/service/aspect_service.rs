//! Aspect use-case service.
//!
//! # Responsibility
//! - Drive the validated write path: business key, consistency, cycle
//!   and version checks before any persistence call.
//! - Drive the read path: stream one depth-first traversal through the
//!   tree reconstructor into a nested [`AspectTree`].
//!
//! # Invariants
//! - Every validator runs before the first write of a request.
//! - A rejected mutation leaves the store untouched.
//! - Service APIs never bypass repository persistence contracts.

use crate::model::aspect::{AspectData, AspectId, AspectNode, AspectTree, PropertyId, SubjectId};
use crate::repo::aspect_repo::{AspectRepository, RepoError};
use crate::tree::{TreeBuildError, TreeBuilder};
use crate::validation;
use log::info;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Business errors from aspect service operations.
#[derive(Debug)]
pub enum AspectServiceError {
    /// Another non-deleted aspect holds the same (name, subject) key.
    AlreadyExists {
        name: String,
        subject_name: Option<String>,
    },
    /// Referenced aspect does not exist or is soft-deleted.
    DoesNotExist(AspectId),
    /// Referenced property does not exist.
    PropertyDoesNotExist(PropertyId),
    /// Proposed property targets would close a cycle; offenders listed.
    CyclicDependency(Vec<AspectId>),
    /// Caller-supplied versions do not match persisted state.
    ConcurrentModification { id: AspectId, detail: String },
    /// The requested change is not allowed in the aspect's current state.
    ModificationForbidden { id: AspectId, detail: String },
    /// The request contradicts itself or the measure registry.
    InconsistentState(String),
    /// Other aspects still reference this one; deletion needs `force`.
    HasLinkedEntities(AspectId),
    /// The traversal stream was structurally malformed.
    Tree(TreeBuildError),
    /// Repository-level failure.
    Repo(RepoError),
}

impl Display for AspectServiceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AlreadyExists { name, subject_name } => write!(
                f,
                "aspect already exists: name `{name}`, subject {}",
                subject_name.as_deref().unwrap_or("GLOBAL")
            ),
            Self::DoesNotExist(id) => write!(f, "aspect does not exist: {id}"),
            Self::PropertyDoesNotExist(id) => write!(f, "aspect property does not exist: {id}"),
            Self::CyclicDependency(ids) => {
                write!(f, "cyclic dependency on aspects: ")?;
                for (index, id) in ids.iter().enumerate() {
                    if index > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{id}")?;
                }
                Ok(())
            }
            Self::ConcurrentModification { id, detail } => {
                write!(f, "concurrent modification of aspect {id}: {detail}")
            }
            Self::ModificationForbidden { id, detail } => {
                write!(f, "modification of aspect {id} forbidden: {detail}")
            }
            Self::InconsistentState(detail) => write!(f, "inconsistent aspect state: {detail}"),
            Self::HasLinkedEntities(id) => {
                write!(f, "some entities refer to aspect {id}")
            }
            Self::Tree(err) => write!(f, "{err}"),
            Self::Repo(err) => write!(f, "{err}"),
        }
    }
}

impl Error for AspectServiceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Tree(err) => Some(err),
            Self::Repo(err) => Some(err),
            _ => None,
        }
    }
}

impl From<RepoError> for AspectServiceError {
    fn from(value: RepoError) -> Self {
        match value {
            RepoError::AspectNotFound(id) => Self::DoesNotExist(id),
            RepoError::PropertyNotFound(id) => Self::PropertyDoesNotExist(id),
            other => Self::Repo(other),
        }
    }
}

impl From<TreeBuildError> for AspectServiceError {
    fn from(value: TreeBuildError) -> Self {
        Self::Tree(value)
    }
}

/// Use-case facade over one aspect repository.
pub struct AspectService<R: AspectRepository> {
    repo: R,
}

impl<R: AspectRepository> AspectService<R> {
    /// Creates a service from a repository implementation.
    pub fn new(repo: R) -> Self {
        Self { repo }
    }

    /// Creates or updates one aspect with its property list.
    ///
    /// Creation is requested by `data.id = None`. All validators run
    /// before the write; the returned id identifies the persisted aspect.
    ///
    /// # Errors
    /// - [`AspectServiceError::AlreadyExists`] on a business-key clash.
    /// - [`AspectServiceError::InconsistentState`] on contradictory data.
    /// - [`AspectServiceError::DoesNotExist`] when a property targets a
    ///   missing or deleted aspect.
    /// - [`AspectServiceError::CyclicDependency`],
    ///   [`AspectServiceError::ConcurrentModification`] and
    ///   [`AspectServiceError::ModificationForbidden`] on updates.
    pub fn save(&self, data: &AspectData) -> Result<AspectId, AspectServiceError> {
        validation::check_consistency(&self.repo, data)?;
        validation::check_business_key(&self.repo, data)?;

        match data.id {
            None => {
                let id = self.repo.create_aspect(data)?;
                info!(
                    "event=aspect_save module=service status=ok op=create id={} properties={}",
                    id,
                    data.live_properties().count()
                );
                Ok(id)
            }
            Some(id) => {
                let node = self
                    .repo
                    .get_aspect(id, true)?
                    .ok_or(AspectServiceError::DoesNotExist(id))?;
                let persisted_properties = self.repo.list_properties(id)?;
                validation::validate_existing(&self.repo, &node, &persisted_properties, data)?;
                self.repo.update_aspect(data)?;
                info!(
                    "event=aspect_save module=service status=ok op=update id={} properties={}",
                    id,
                    data.live_properties().count()
                );
                Ok(id)
            }
        }
    }

    /// Removes one aspect after a version check.
    ///
    /// A referenced aspect is only tombstoned, and only with `force`;
    /// an unreferenced one is deleted outright with its properties.
    pub fn remove(&self, data: &AspectData, force: bool) -> Result<(), AspectServiceError> {
        let id = data.id.ok_or_else(|| {
            AspectServiceError::InconsistentState("remove requires an aspect id".to_string())
        })?;
        let node = self
            .repo
            .get_aspect(id, true)?
            .ok_or(AspectServiceError::DoesNotExist(id))?;
        let persisted_properties = self.repo.list_properties(id)?;
        validation::check_version(&node, &persisted_properties, data)?;

        if self.repo.is_referenced(id)? {
            if !force {
                return Err(AspectServiceError::HasLinkedEntities(id));
            }
            self.repo.soft_delete_aspect(id)?;
            info!("event=aspect_remove module=service status=ok mode=soft id={id}");
        } else {
            self.repo.delete_aspect(id)?;
            info!("event=aspect_remove module=service status=ok mode=hard id={id}");
        }
        Ok(())
    }

    /// Loads one aspect node by id, tombstoned rows included.
    pub fn find_by_id(&self, id: AspectId) -> Result<AspectNode, AspectServiceError> {
        self.repo
            .get_aspect(id, true)?
            .ok_or(AspectServiceError::DoesNotExist(id))
    }

    /// Finds non-deleted aspects by business key.
    pub fn find_by_name(
        &self,
        name: &str,
        subject_id: Option<SubjectId>,
    ) -> Result<Vec<AspectNode>, AspectServiceError> {
        self.repo
            .find_by_name_and_subject_excluding(name, subject_id, None)
            .map_err(Into::into)
    }

    /// Lists all non-deleted aspects.
    pub fn list(&self) -> Result<Vec<AspectNode>, AspectServiceError> {
        self.repo.list_aspects().map_err(Into::into)
    }

    /// Builds the fully-nested tree of one aspect and everything it
    /// transitively references.
    ///
    /// Streams the repository's depth-first traversal through a fresh
    /// [`TreeBuilder`]; shared sub-aspects are materialized once.
    pub fn aspect_tree(&self, id: AspectId) -> Result<AspectTree, AspectServiceError> {
        let records = self.repo.traverse(id)?;
        let mut builder = TreeBuilder::new();
        for record in records {
            builder.append(record)?;
        }
        let tree = builder.build_tree()?;
        info!(
            "event=aspect_tree module=service status=ok id={} built={}",
            id,
            builder.built_count()
        );
        Ok(tree)
    }
}
