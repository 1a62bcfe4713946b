//! In-memory organization tree manager.
//!
//! # Responsibility
//! - Own the tree state: node creation, reparenting, deletion, traversal.
//! - Keep adjacency symmetry and materialized paths consistent after every
//!   committed mutation.
//!
//! # Invariants
//! - No node is its own ancestor; moves are rejected before any mutation
//!   when they would close a cycle.
//! - `node.parent_id == p` iff `p.children` contains the node id; every
//!   node is either parented or in the root set, never both.
//! - All checks run before the first mutation (check-then-act); a failed
//!   operation leaves the tree exactly as it was.

use crate::model::node::{ConversationId, ItemMetadata, NodeId, NodeKind, TreeNode};
use crate::model::state::OrganizationState;
use crate::model::time::now_epoch_ms;
use crate::service::validate::{validate_name, validate_tag, TreeLimits, ValidationError};
use log::info;
use std::collections::{BTreeSet, HashSet};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Deletion policy for [`TreeManager::delete_node`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeleteMode {
    /// Remove the node and its entire subtree, detaching contained
    /// conversation metadata.
    #[default]
    Cascade,
    /// Re-attach the node's children to the node's own parent, preserving
    /// their relative order, then remove the node.
    ReparentChildren,
}

/// Errors from tree mutation and query operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TreeError {
    /// Caller-supplied name or tag failed static validation.
    Validation(ValidationError),
    /// Target node does not exist.
    NodeNotFound(NodeId),
    /// Referenced parent does not exist.
    ParentNotFound(NodeId),
    /// Referenced parent exists but is not a folder.
    ParentMustBeFolder(NodeId),
    /// Move would make the node its own ancestor.
    CycleDetected { node_id: NodeId, parent_id: NodeId },
    /// Operation would nest deeper than the configured limit.
    DepthExceeded { max_depth: usize },
    /// Parent already holds the configured maximum number of children.
    TooManyChildren {
        parent_id: NodeId,
        max_children: usize,
    },
    /// A leaf for this conversation id already exists in the tree.
    ConversationAlreadyAttached(ConversationId),
    /// No metadata exists for this conversation id.
    MetadataNotFound(ConversationId),
}

impl Display for TreeError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(err) => write!(f, "{err}"),
            Self::NodeNotFound(id) => write!(f, "node not found: {id}"),
            Self::ParentNotFound(id) => write!(f, "parent not found: {id}"),
            Self::ParentMustBeFolder(id) => write!(f, "parent must be a folder: {id}"),
            Self::CycleDetected { node_id, parent_id } => write!(
                f,
                "move would create cycle: node {node_id} under parent {parent_id}"
            ),
            Self::DepthExceeded { max_depth } => {
                write!(f, "maximum tree depth ({max_depth}) exceeded")
            }
            Self::TooManyChildren {
                parent_id,
                max_children,
            } => write!(
                f,
                "folder {parent_id} already holds the maximum of {max_children} children"
            ),
            Self::ConversationAlreadyAttached(id) => {
                write!(f, "conversation already attached to the tree: {id}")
            }
            Self::MetadataNotFound(id) => write!(f, "no metadata for conversation: {id}"),
        }
    }
}

impl Error for TreeError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            _ => None,
        }
    }
}

impl From<ValidationError> for TreeError {
    fn from(value: ValidationError) -> Self {
        Self::Validation(value)
    }
}

/// One row of the deterministic depth-first traversal.
///
/// `depth` is 0 for root-level nodes. Collapsed folders are traversed like
/// expanded ones; consumers use `node.expanded` to decide what to render.
#[derive(Debug, Clone, Copy)]
pub struct TreeRow<'a> {
    pub depth: usize,
    pub node: &'a TreeNode,
}

/// Owns one [`OrganizationState`] and applies all tree mutations to it.
///
/// There is no shared global instance; callers construct one from loaded
/// state and thread it through every call.
pub struct TreeManager {
    state: OrganizationState,
    limits: TreeLimits,
}

impl TreeManager {
    /// Creates a manager over loaded state with the given limits.
    pub fn new(state: OrganizationState, limits: TreeLimits) -> Self {
        Self { state, limits }
    }

    /// Read access to the underlying aggregate.
    pub fn state(&self) -> &OrganizationState {
        &self.state
    }

    /// Consumes the manager and returns the aggregate.
    pub fn into_state(self) -> OrganizationState {
        self.state
    }

    /// Stamps the aggregate's modification timestamp.
    pub fn stamp_modified(&mut self) {
        self.state.modified_at = now_epoch_ms();
    }

    /// Looks up one node by id.
    pub fn node(&self, node_id: &str) -> Option<&TreeNode> {
        self.state.tree_nodes.get(node_id)
    }

    /// Total number of nodes.
    pub fn node_count(&self) -> usize {
        self.state.node_count()
    }

    /// Number of folder nodes.
    pub fn folder_count(&self) -> usize {
        self.state.folder_count()
    }

    /// Number of conversation leaves.
    pub fn conversation_count(&self) -> usize {
        self.state.conversation_count()
    }

    /// Creates a folder under the optional parent and returns its id.
    pub fn create_folder(
        &mut self,
        name: &str,
        parent_id: Option<&str>,
    ) -> Result<NodeId, TreeError> {
        let normalized = validate_name(name)?;
        self.check_attach_target(parent_id, None)?;

        let mut node = TreeNode::new_folder(normalized, parent_id.map(str::to_string));
        node.order = self.next_order(parent_id);
        node.path = self.child_path(parent_id, &node);
        let node_id = node.id.clone();

        self.state.tree_nodes.insert(node_id.clone(), node);
        self.link(&node_id, parent_id);

        info!(
            "event=create_folder module=tree status=ok node_id={} parent={}",
            node_id,
            parent_id.unwrap_or("-")
        );
        Ok(node_id)
    }

    /// Attaches a conversation leaf under the optional parent.
    ///
    /// The leaf's id is the external conversation id; at most one leaf per
    /// conversation can exist in the tree. Default metadata is created for
    /// ids seen for the first time.
    pub fn attach_conversation(
        &mut self,
        conversation_id: &str,
        title: &str,
        parent_id: Option<&str>,
    ) -> Result<NodeId, TreeError> {
        let normalized = validate_name(title)?;
        if self.state.tree_nodes.contains_key(conversation_id) {
            return Err(TreeError::ConversationAlreadyAttached(
                conversation_id.to_string(),
            ));
        }
        self.check_attach_target(parent_id, None)?;

        let mut node =
            TreeNode::new_conversation(conversation_id, normalized, parent_id.map(str::to_string));
        node.order = self.next_order(parent_id);
        node.path = self.child_path(parent_id, &node);
        let node_id = node.id.clone();

        self.state.tree_nodes.insert(node_id.clone(), node);
        self.link(&node_id, parent_id);
        self.state
            .item_metadata
            .entry(conversation_id.to_string())
            .or_default();

        info!(
            "event=attach_conversation module=tree status=ok conversation_id={} parent={}",
            conversation_id,
            parent_id.unwrap_or("-")
        );
        Ok(node_id)
    }

    /// Moves a node under a new optional parent.
    ///
    /// The cycle check walks ancestors of the proposed parent upward over
    /// the flat id map, comparing each visited id against the moved node,
    /// and rejects before anything is mutated.
    pub fn move_node(&mut self, node_id: &str, new_parent_id: Option<&str>) -> Result<(), TreeError> {
        if !self.state.tree_nodes.contains_key(node_id) {
            return Err(TreeError::NodeNotFound(node_id.to_string()));
        }

        if let Some(parent_id) = new_parent_id {
            if parent_id == node_id || self.would_create_cycle(node_id, parent_id) {
                return Err(TreeError::CycleDetected {
                    node_id: node_id.to_string(),
                    parent_id: parent_id.to_string(),
                });
            }
        }
        self.check_attach_target(new_parent_id, Some(node_id))?;

        // The whole subtree must stay within the depth limit, not just the
        // moved node itself.
        let base_depth = match new_parent_id {
            Some(parent_id) => self.nesting_depth(parent_id),
            None => 0,
        };
        if base_depth + self.subtree_height(node_id) > self.limits.max_depth {
            return Err(TreeError::DepthExceeded {
                max_depth: self.limits.max_depth,
            });
        }

        let order = self.next_order(new_parent_id);
        let old_parent = self.unlink(node_id);
        self.link(node_id, new_parent_id);
        if let Some(node) = self.state.tree_nodes.get_mut(node_id) {
            node.order = order;
            node.touch();
        }
        self.rewrite_paths(node_id);

        info!(
            "event=move_node module=tree status=ok node_id={} from={} to={}",
            node_id,
            old_parent.as_deref().unwrap_or("-"),
            new_parent_id.unwrap_or("-")
        );
        Ok(())
    }

    /// Renames a node and rewrites the subtree's materialized paths.
    pub fn rename_node(&mut self, node_id: &str, new_name: &str) -> Result<(), TreeError> {
        let normalized = validate_name(new_name)?;
        let node = self
            .state
            .tree_nodes
            .get_mut(node_id)
            .ok_or_else(|| TreeError::NodeNotFound(node_id.to_string()))?;
        node.name = normalized;
        node.touch();
        self.rewrite_paths(node_id);

        info!("event=rename_node module=tree status=ok node_id={node_id}");
        Ok(())
    }

    /// Deletes a node by policy.
    pub fn delete_node(&mut self, node_id: &str, mode: DeleteMode) -> Result<(), TreeError> {
        if !self.state.tree_nodes.contains_key(node_id) {
            return Err(TreeError::NodeNotFound(node_id.to_string()));
        }

        match mode {
            DeleteMode::Cascade => self.delete_cascade(node_id),
            DeleteMode::ReparentChildren => self.delete_reparent(node_id),
        }
        Ok(())
    }

    /// Toggles the persisted expansion flag. UI state only; traversal is
    /// unaffected.
    pub fn set_expanded(&mut self, node_id: &str, expanded: bool) -> Result<(), TreeError> {
        let node = self
            .state
            .tree_nodes
            .get_mut(node_id)
            .ok_or_else(|| TreeError::NodeNotFound(node_id.to_string()))?;
        node.expanded = expanded;
        Ok(())
    }

    /// Sets the explicit sibling order ordinal for one node.
    ///
    /// Ordinals are stored verbatim; ties order deterministically by id.
    pub fn set_order(&mut self, node_id: &str, order: i64) -> Result<(), TreeError> {
        let node = self
            .state
            .tree_nodes
            .get_mut(node_id)
            .ok_or_else(|| TreeError::NodeNotFound(node_id.to_string()))?;
        node.order = order;
        node.touch();
        Ok(())
    }

    /// Returns the full tree in deterministic depth-first order.
    ///
    /// Roots and siblings sort by `(order, id)`. Collapsed folders are
    /// recursed into like expanded ones; each row carries its depth so a
    /// consumer can decide what to skip.
    pub fn tree_order(&self) -> Vec<TreeRow<'_>> {
        let mut rows = Vec::with_capacity(self.state.tree_nodes.len());
        for root_id in self.sorted_ids(&self.state.root_nodes) {
            self.collect_order(&root_id, 0, &mut rows);
        }
        rows
    }

    /// Returns the root-to-parent ancestor chain of a node.
    pub fn ancestors(&self, node_id: &str) -> Result<Vec<&TreeNode>, TreeError> {
        let mut node = self
            .state
            .tree_nodes
            .get(node_id)
            .ok_or_else(|| TreeError::NodeNotFound(node_id.to_string()))?;
        let mut chain = Vec::new();
        while let Some(parent_id) = node.parent_id.as_deref() {
            match self.state.tree_nodes.get(parent_id) {
                Some(parent) => {
                    chain.push(parent);
                    node = parent;
                }
                None => break,
            }
        }
        chain.reverse();
        Ok(chain)
    }

    /// Looks up metadata for one conversation id.
    pub fn metadata(&self, conversation_id: &str) -> Option<&ItemMetadata> {
        self.state.item_metadata.get(conversation_id)
    }

    /// Sets or clears the custom title override.
    ///
    /// Setting also renames the leaf node so tree displays stay in sync;
    /// clearing leaves the view to fall back to the record's own title.
    pub fn set_custom_title(
        &mut self,
        conversation_id: &str,
        title: Option<&str>,
    ) -> Result<(), TreeError> {
        let normalized = match title {
            Some(value) => Some(validate_name(value)?),
            None => None,
        };
        let metadata = self.metadata_mut(conversation_id)?;
        metadata.custom_title = normalized.clone();
        metadata.touch();
        if let Some(new_name) = normalized {
            if let Some(node) = self.state.tree_nodes.get_mut(conversation_id) {
                node.name = new_name;
                node.touch();
            }
        }
        Ok(())
    }

    /// Replaces the full tag set for one conversation.
    ///
    /// Every tag is validated before any is stored.
    pub fn set_tags(&mut self, conversation_id: &str, tags: &[String]) -> Result<(), TreeError> {
        let mut normalized = BTreeSet::new();
        for tag in tags {
            normalized.insert(validate_tag(tag)?);
        }
        let metadata = self.metadata_mut(conversation_id)?;
        metadata.tags = normalized;
        metadata.touch();
        Ok(())
    }

    /// Adds one tag; duplicates are ignored.
    pub fn add_tag(&mut self, conversation_id: &str, tag: &str) -> Result<(), TreeError> {
        let normalized = validate_tag(tag)?;
        let metadata = self.metadata_mut(conversation_id)?;
        metadata.tags.insert(normalized);
        metadata.touch();
        Ok(())
    }

    /// Removes one tag; absence is not an error.
    pub fn remove_tag(&mut self, conversation_id: &str, tag: &str) -> Result<(), TreeError> {
        let metadata = self.metadata_mut(conversation_id)?;
        metadata.tags.remove(tag.trim());
        metadata.touch();
        Ok(())
    }

    /// Replaces the free-text notes.
    pub fn set_notes(&mut self, conversation_id: &str, notes: &str) -> Result<(), TreeError> {
        let metadata = self.metadata_mut(conversation_id)?;
        metadata.notes = notes.to_string();
        metadata.touch();
        Ok(())
    }

    /// Sets the favorite flag.
    pub fn set_favorite(&mut self, conversation_id: &str, favorite: bool) -> Result<(), TreeError> {
        let metadata = self.metadata_mut(conversation_id)?;
        metadata.favorite = favorite;
        metadata.touch();
        Ok(())
    }

    /// Sets the archived flag.
    pub fn set_archived(&mut self, conversation_id: &str, archived: bool) -> Result<(), TreeError> {
        let metadata = self.metadata_mut(conversation_id)?;
        metadata.archived = archived;
        metadata.touch();
        Ok(())
    }

    /// Sets the priority ordinal.
    pub fn set_priority(&mut self, conversation_id: &str, priority: i64) -> Result<(), TreeError> {
        let metadata = self.metadata_mut(conversation_id)?;
        metadata.priority = priority;
        metadata.touch();
        Ok(())
    }

    fn metadata_mut(&mut self, conversation_id: &str) -> Result<&mut ItemMetadata, TreeError> {
        self.state
            .item_metadata
            .get_mut(conversation_id)
            .ok_or_else(|| TreeError::MetadataNotFound(conversation_id.to_string()))
    }

    /// Validates that `parent_id` can accept one more child.
    ///
    /// `moving` excludes an already-present child from the fan-out count so
    /// same-parent moves of a full folder do not trip the limit.
    fn check_attach_target(
        &self,
        parent_id: Option<&str>,
        moving: Option<&str>,
    ) -> Result<(), TreeError> {
        let Some(parent_id) = parent_id else {
            return Ok(());
        };
        let parent = self
            .state
            .tree_nodes
            .get(parent_id)
            .ok_or_else(|| TreeError::ParentNotFound(parent_id.to_string()))?;
        if !parent.is_folder() {
            return Err(TreeError::ParentMustBeFolder(parent_id.to_string()));
        }

        let already_inside = moving.is_some_and(|id| parent.children.contains(id));
        let occupancy = parent.children.len() - usize::from(already_inside);
        if occupancy >= self.limits.max_children {
            return Err(TreeError::TooManyChildren {
                parent_id: parent_id.to_string(),
                max_children: self.limits.max_children,
            });
        }

        // Creation places a single node one level below the parent; moves
        // re-check against the whole subtree height separately.
        if moving.is_none() && self.nesting_depth(parent_id) + 1 > self.limits.max_depth {
            return Err(TreeError::DepthExceeded {
                max_depth: self.limits.max_depth,
            });
        }
        Ok(())
    }

    /// 1-based nesting depth: root-level nodes are at depth 1.
    fn nesting_depth(&self, node_id: &str) -> usize {
        let mut depth = 1;
        let mut current = self.state.tree_nodes.get(node_id);
        while let Some(node) = current {
            match node.parent_id.as_deref() {
                Some(parent_id) => {
                    depth += 1;
                    current = self.state.tree_nodes.get(parent_id);
                }
                None => break,
            }
        }
        depth
    }

    /// Height of a subtree counting the node itself as 1.
    fn subtree_height(&self, node_id: &str) -> usize {
        let Some(node) = self.state.tree_nodes.get(node_id) else {
            return 0;
        };
        1 + node
            .children
            .iter()
            .map(|child_id| self.subtree_height(child_id))
            .max()
            .unwrap_or(0)
    }

    /// Upward ancestor walk from the candidate parent, bounded by a visited
    /// set, looking for the node being moved.
    fn would_create_cycle(&self, node_id: &str, candidate_parent_id: &str) -> bool {
        let mut visited: HashSet<&str> = HashSet::new();
        let mut cursor = Some(candidate_parent_id);
        while let Some(current) = cursor {
            if current == node_id {
                return true;
            }
            if !visited.insert(current) {
                // Already-corrupt ancestry loops are treated as cycles.
                return true;
            }
            cursor = self
                .state
                .tree_nodes
                .get(current)
                .and_then(|node| node.parent_id.as_deref());
        }
        false
    }

    /// Next append-at-end sibling order under the given parent.
    fn next_order(&self, parent_id: Option<&str>) -> i64 {
        let sibling_ids: Vec<&NodeId> = match parent_id {
            Some(parent_id) => match self.state.tree_nodes.get(parent_id) {
                Some(parent) => parent.children.iter().collect(),
                None => Vec::new(),
            },
            None => self.state.root_nodes.iter().collect(),
        };
        sibling_ids
            .into_iter()
            .filter_map(|id| self.state.tree_nodes.get(id))
            .map(|node| node.order)
            .max()
            .map_or(0, |max| max + 1)
    }

    /// Materialized path for a node placed under `parent_id`.
    fn child_path(&self, parent_id: Option<&str>, node: &TreeNode) -> String {
        let base = parent_id
            .and_then(|id| self.state.tree_nodes.get(id))
            .map(|parent| parent.path.clone())
            .unwrap_or_else(|| "/".to_string());
        match node.kind {
            NodeKind::Folder => format!("{base}{}/", node.name),
            NodeKind::Conversation => base,
        }
    }

    /// Inserts the node id into its parent's child set or the root set and
    /// records the parent pointer.
    fn link(&mut self, node_id: &str, parent_id: Option<&str>) {
        match parent_id {
            Some(parent_id) => {
                if let Some(parent) = self.state.tree_nodes.get_mut(parent_id) {
                    parent.children.insert(node_id.to_string());
                    parent.touch();
                }
            }
            None => {
                self.state.root_nodes.insert(node_id.to_string());
            }
        }
        if let Some(node) = self.state.tree_nodes.get_mut(node_id) {
            node.parent_id = parent_id.map(str::to_string);
        }
    }

    /// Removes the node id from its current parent or the root set.
    ///
    /// Returns the previous parent id.
    fn unlink(&mut self, node_id: &str) -> Option<NodeId> {
        let old_parent = self
            .state
            .tree_nodes
            .get(node_id)
            .and_then(|node| node.parent_id.clone());
        match old_parent.as_deref() {
            Some(parent_id) => {
                if let Some(parent) = self.state.tree_nodes.get_mut(parent_id) {
                    parent.children.remove(node_id);
                    parent.touch();
                }
            }
            None => {
                self.state.root_nodes.remove(node_id);
            }
        }
        old_parent
    }

    /// Recomputes the materialized path of a node and every descendant.
    ///
    /// Paths are denormalized copies of ancestor names, so every structural
    /// or name change must cascade through the subtree.
    fn rewrite_paths(&mut self, node_id: &str) {
        let Some(node) = self.state.tree_nodes.get(node_id) else {
            return;
        };
        let new_path = self.child_path(node.parent_id.as_deref(), node);
        let child_ids: Vec<NodeId> = node.children.iter().cloned().collect();
        if let Some(node) = self.state.tree_nodes.get_mut(node_id) {
            node.path = new_path;
        }
        for child_id in child_ids {
            self.rewrite_paths(&child_id);
        }
    }

    fn delete_cascade(&mut self, node_id: &str) {
        let mut doomed = self.collect_descendants(node_id);
        doomed.push(node_id.to_string());

        self.unlink(node_id);
        let removed = doomed.len();
        for id in doomed {
            if let Some(node) = self.state.tree_nodes.remove(&id) {
                if node.kind == NodeKind::Conversation {
                    self.state.item_metadata.remove(&node.id);
                }
            }
        }

        info!(
            "event=delete_node module=tree status=ok mode=cascade node_id={node_id} removed={removed}"
        );
    }

    fn delete_reparent(&mut self, node_id: &str) {
        let (target_parent, child_ids) = match self.state.tree_nodes.get(node_id) {
            Some(node) => (node.parent_id.clone(), self.sorted_ids(&node.children)),
            None => return,
        };

        self.unlink(node_id);
        let mut order = self.next_order(target_parent.as_deref());
        for child_id in &child_ids {
            self.link(child_id, target_parent.as_deref());
            if let Some(child) = self.state.tree_nodes.get_mut(child_id) {
                child.order = order;
                child.touch();
            }
            order += 1;
            self.rewrite_paths(child_id);
        }

        if let Some(node) = self.state.tree_nodes.remove(node_id) {
            if node.kind == NodeKind::Conversation {
                self.state.item_metadata.remove(&node.id);
            }
        }

        info!(
            "event=delete_node module=tree status=ok mode=reparent node_id={node_id} promoted={}",
            child_ids.len()
        );
    }

    /// All descendant ids of a node, depth-first.
    fn collect_descendants(&self, node_id: &str) -> Vec<NodeId> {
        let mut out = Vec::new();
        if let Some(node) = self.state.tree_nodes.get(node_id) {
            for child_id in &node.children {
                out.push(child_id.clone());
                out.extend(self.collect_descendants(child_id));
            }
        }
        out
    }

    /// Sorts a set of sibling ids by `(order, id)`.
    fn sorted_ids(&self, ids: &HashSet<NodeId>) -> Vec<NodeId> {
        let mut sorted: Vec<NodeId> = ids.iter().cloned().collect();
        sorted.sort_by(|a, b| {
            let order_a = self.state.tree_nodes.get(a).map_or(0, |n| n.order);
            let order_b = self.state.tree_nodes.get(b).map_or(0, |n| n.order);
            order_a.cmp(&order_b).then_with(|| a.cmp(b))
        });
        sorted
    }

    fn collect_order<'a>(&'a self, node_id: &str, depth: usize, rows: &mut Vec<TreeRow<'a>>) {
        let Some(node) = self.state.tree_nodes.get(node_id) else {
            return;
        };
        rows.push(TreeRow { depth, node });
        for child_id in self.sorted_ids(&node.children) {
            self.collect_order(&child_id, depth + 1, rows);
        }
    }
}
