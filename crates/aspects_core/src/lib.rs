//! Core domain logic for the aspect taxonomy.
//! This crate is the single source of truth for business invariants.

pub mod db;
pub mod logging;
pub mod model;
pub mod repo;
pub mod service;
pub mod tree;
pub mod validation;

pub use logging::{default_log_level, init_logging, logging_status};
pub use model::aspect::{
    AspectData, AspectId, AspectNode, AspectPropertyData, AspectPropertyNode, AspectPropertyTree,
    AspectTree, BaseType, EdgeId, PropertyCardinality, PropertyId, SubjectId,
};
pub use model::measure::{find_measure, Measure, MEASURES};
pub use repo::aspect_repo::{AspectRepository, RepoError, RepoResult, SqliteAspectRepository};
pub use service::aspect_service::{AspectService, AspectServiceError};
pub use tree::{TraversalRecord, TreeBuildError, TreeBuilder};
