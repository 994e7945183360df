//! Tree reconstruction from flat graph-traversal streams.
//!
//! # Responsibility
//! - Define the traversal record stream contract consumed by the builder.
//! - Fold a depth-first preorder record stream into one nested
//!   [`AspectTree`](crate::model::aspect::AspectTree).
//!
//! # Invariants
//! - Records alternate between aspect and property kinds; structural
//!   violations are fatal for the current request and never retried.
//! - A shared aspect is materialized once and reused through the subtree
//!   cache, keyed by edge identity.
//!
//! # See also
//! - `repo::aspect_repo` for the storage-side traversal producer.

use crate::model::aspect::{AspectId, AspectNode, AspectPropertyNode, PropertyId};
use std::error::Error;
use std::fmt::{Display, Formatter};

mod builder;

pub use builder::TreeBuilder;

/// One record of a depth-first preorder traversal stream.
///
/// The source emits the root aspect first, then for each property of an
/// aspect one property record followed by its target aspect's records.
/// Targets already emitted earlier in the same stream are not repeated;
/// the builder resolves them through its subtree cache instead.
#[derive(Debug, Clone, PartialEq)]
pub enum TraversalRecord {
    /// An aspect vertex.
    Aspect(AspectNode),
    /// An aspect-property vertex.
    Property(AspectPropertyNode),
}

/// Structural errors raised while folding a traversal stream.
///
/// All variants indicate a malformed traversal and are fatal for the
/// current read request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TreeBuildError {
    /// Two aspect records arrived in a row.
    TwoConsecutiveAspects(AspectId),
    /// Two property records arrived in a row.
    TwoConsecutiveProperties(PropertyId),
    /// The stream started with a property record.
    RootMustBeAspect(PropertyId),
    /// A record's edge identity does not match its parent's recorded edges.
    LinkageMismatch {
        /// Property side of the mismatched link.
        property: PropertyId,
        /// Aspect side of the mismatched link.
        aspect: AspectId,
    },
    /// The stream ended before the root aspect was fully resolved.
    TreeIncomplete,
}

impl Display for TreeBuildError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TwoConsecutiveAspects(id) => {
                write!(f, "two successive aspect records in traversal, second: {id}")
            }
            Self::TwoConsecutiveProperties(id) => {
                write!(
                    f,
                    "two successive property records in traversal, second: {id}"
                )
            }
            Self::RootMustBeAspect(id) => {
                write!(f, "traversal starts with property record {id}, root must be an aspect")
            }
            Self::LinkageMismatch { property, aspect } => {
                write!(f, "property {property} is not linked to aspect {aspect}")
            }
            Self::TreeIncomplete => write!(f, "aspect tree is not yet complete"),
        }
    }
}

impl Error for TreeBuildError {}
