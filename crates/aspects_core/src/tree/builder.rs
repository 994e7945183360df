//! Stack machine folding traversal records into nested aspect trees.
//!
//! # Responsibility
//! - Consume one depth-first preorder stream, one record at a time.
//! - Detect completion of an aspect purely from its recorded out-degree.
//! - Reuse already-resolved shared aspects through the subtree cache.
//!
//! # Invariants
//! - The frame stack alternates aspect/property ownership: at most one
//!   unmatched property record is held between two aspect frames.
//! - The subtree cache lives exactly as long as one builder instance.
//! - A cached aspect is never materialized a second time.

use crate::model::aspect::{
    AspectNode, AspectPropertyNode, AspectPropertyTree, AspectTree, EdgeId,
};
use crate::tree::{TraversalRecord, TreeBuildError};
use std::collections::HashMap;

/// One aspect under construction.
///
/// `link` is the property record that led the traversal into this aspect;
/// the root frame has none.
struct Frame {
    link: Option<AspectPropertyNode>,
    node: AspectNode,
    children: Vec<AspectPropertyTree>,
    completed: Option<AspectTree>,
}

impl Frame {
    fn new(link: Option<AspectPropertyNode>, node: AspectNode) -> Self {
        Self {
            link,
            node,
            children: Vec::new(),
            completed: None,
        }
    }
}

/// Single-use reconstructor for one aspect read request.
///
/// Feed records with [`append`](Self::append) (or the typed entry points)
/// in stream order, then call [`build_tree`](Self::build_tree).
pub struct TreeBuilder {
    stack: Vec<Frame>,
    /// Property record waiting for its target aspect record.
    awaiting: Option<AspectPropertyNode>,
    /// Completed subtrees keyed by the incoming edges of their aspect.
    cache: HashMap<EdgeId, AspectTree>,
    /// Out-edge of the latest cache-resolved property; tolerates one
    /// redundant revisit record for that child in the stream.
    skip_edge: Option<EdgeId>,
    built: usize,
}

impl TreeBuilder {
    /// Creates an empty builder.
    pub fn new() -> Self {
        Self {
            stack: Vec::new(),
            awaiting: None,
            cache: HashMap::new(),
            skip_edge: None,
            built: 0,
        }
    }

    /// Appends one record of either kind.
    pub fn append(&mut self, record: TraversalRecord) -> Result<(), TreeBuildError> {
        match record {
            TraversalRecord::Aspect(node) => self.append_aspect(node),
            TraversalRecord::Property(node) => self.append_property(node),
        }
    }

    /// Appends one aspect record.
    ///
    /// The record must either open the stream or resolve the property
    /// record appended immediately before it.
    pub fn append_aspect(&mut self, node: AspectNode) -> Result<(), TreeBuildError> {
        if let Some(edge) = self.skip_edge.take() {
            if node.in_edges.contains(&edge) {
                // Redundant revisit of a child already resolved from cache.
                return Ok(());
            }
        }

        match self.awaiting.take() {
            None => {
                if self.stack.is_empty() {
                    self.stack.push(Frame::new(None, node));
                    self.reduce();
                    Ok(())
                } else {
                    Err(TreeBuildError::TwoConsecutiveAspects(node.id))
                }
            }
            Some(link) => {
                if !node.in_edges.contains(&link.out_edge) {
                    return Err(TreeBuildError::LinkageMismatch {
                        property: link.id,
                        aspect: node.id,
                    });
                }
                self.stack.push(Frame::new(Some(link), node));
                self.reduce();
                Ok(())
            }
        }
    }

    /// Appends one property record.
    ///
    /// When the target aspect was already resolved earlier in the stream,
    /// the property completes immediately from the subtree cache and no
    /// child records are expected for it.
    pub fn append_property(&mut self, node: AspectPropertyNode) -> Result<(), TreeBuildError> {
        self.skip_edge = None;
        if self.awaiting.is_some() {
            return Err(TreeBuildError::TwoConsecutiveProperties(node.id));
        }
        let top = match self.stack.last_mut() {
            Some(frame) => frame,
            None => return Err(TreeBuildError::RootMustBeAspect(node.id)),
        };
        if !top.node.out_edges.contains(&node.in_edge) {
            return Err(TreeBuildError::LinkageMismatch {
                property: node.id,
                aspect: top.node.id,
            });
        }

        match self.cache.get(&node.out_edge) {
            Some(cached) => {
                top.children.push(property_tree(&node, cached.clone()));
                self.skip_edge = Some(node.out_edge);
                self.reduce();
                Ok(())
            }
            None => {
                self.awaiting = Some(node);
                Ok(())
            }
        }
    }

    /// Returns the completed root tree.
    ///
    /// Fails with [`TreeBuildError::TreeIncomplete`] unless exactly the
    /// root frame remains and every recorded property of it is resolved.
    pub fn build_tree(&self) -> Result<AspectTree, TreeBuildError> {
        match self.stack.first() {
            Some(frame) if self.stack.len() == 1 => {
                frame.completed.clone().ok_or(TreeBuildError::TreeIncomplete)
            }
            _ => Err(TreeBuildError::TreeIncomplete),
        }
    }

    /// Number of aspect trees materialized so far, cache reuse excluded.
    pub fn built_count(&self) -> usize {
        self.built
    }

    /// Folds completed frames until no further reduction applies.
    ///
    /// A frame reduces when its resolved children match its node's
    /// recorded out-degree; the resulting tree then completes the parent
    /// property, which may in turn complete the parent aspect.
    fn reduce(&mut self) {
        while let Some(top) = self.stack.last() {
            let ready = top.completed.is_none()
                && self.awaiting.is_none()
                && top.children.len() == top.node.out_edges.len();
            if !ready {
                return;
            }

            let is_root = self.stack.len() == 1;
            let top = match self.stack.last_mut() {
                Some(frame) => frame,
                None => return,
            };
            let tree = aspect_tree(&top.node, std::mem::take(&mut top.children));
            self.built += 1;
            for edge in &top.node.in_edges {
                self.cache.insert(*edge, tree.clone());
            }

            if is_root {
                top.completed = Some(tree);
                return;
            }

            let frame = match self.stack.pop() {
                Some(frame) => frame,
                None => return,
            };
            let link = match frame.link {
                Some(link) => link,
                None => return,
            };
            match self.stack.last_mut() {
                Some(parent) => parent.children.push(property_tree(&link, tree)),
                None => return,
            }
        }
    }
}

impl Default for TreeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn aspect_tree(node: &AspectNode, properties: Vec<AspectPropertyTree>) -> AspectTree {
    AspectTree {
        id: node.id,
        name: node.name.clone(),
        subject_id: node.subject_id,
        subject_name: node.subject_name.clone(),
        measure: node.measure.clone(),
        base_type: node.base_type,
        ref_book_id: node.ref_book_id,
        deleted: node.deleted,
        properties,
    }
}

fn property_tree(node: &AspectPropertyNode, aspect: AspectTree) -> AspectPropertyTree {
    AspectPropertyTree {
        id: node.id,
        name: node.name.clone(),
        cardinality: node.cardinality,
        deleted: node.deleted,
        aspect,
    }
}
