//! Root aggregate for one organized conversation collection.
//!
//! # Responsibility
//! - Hold the complete organization document: nodes, metadata, root set,
//!   schema version and aggregate timestamps.
//! - Provide census helpers used by status displays.
//!
//! # Invariants
//! - `tree_nodes` keys equal the contained node's `id`.
//! - `root_nodes` lists exactly the nodes with `parent_id == None`.
//! - `version` is one of [`RECOGNIZED_SCHEMA_VERSIONS`] after a successful
//!   load.

use crate::model::node::{ConversationId, ItemMetadata, NodeId, NodeKind, TreeNode};
use crate::model::time::now_epoch_ms;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Schema version written by this build.
pub const SCHEMA_VERSION: &str = "1.1";

/// Versions this build can read. Older versions load with field defaults
/// and are restamped to [`SCHEMA_VERSION`]; anything else is rejected.
pub const RECOGNIZED_SCHEMA_VERSIONS: [&str; 2] = ["1.0", "1.1"];

/// Complete organization document for one conversation collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrganizationState {
    /// Document schema version.
    #[serde(default = "default_version")]
    pub version: String,
    /// Flat id-to-node map holding the whole tree.
    #[serde(default)]
    pub tree_nodes: HashMap<NodeId, TreeNode>,
    /// Per-conversation metadata keyed by external conversation id.
    #[serde(default)]
    pub item_metadata: HashMap<ConversationId, ItemMetadata>,
    /// Ids of nodes with no parent.
    #[serde(default)]
    pub root_nodes: HashSet<NodeId>,
    /// Epoch ms creation timestamp of the aggregate.
    #[serde(default)]
    pub created_at: i64,
    /// Epoch ms last-save timestamp of the aggregate.
    #[serde(default)]
    pub modified_at: i64,
}

fn default_version() -> String {
    SCHEMA_VERSION.to_string()
}

impl OrganizationState {
    /// Creates an empty state stamped with the current schema version.
    pub fn new() -> Self {
        let now = now_epoch_ms();
        Self {
            version: SCHEMA_VERSION.to_string(),
            tree_nodes: HashMap::new(),
            item_metadata: HashMap::new(),
            root_nodes: HashSet::new(),
            created_at: now,
            modified_at: now,
        }
    }

    /// Returns whether `version` can be read by this build.
    pub fn is_recognized_version(version: &str) -> bool {
        RECOGNIZED_SCHEMA_VERSIONS.contains(&version)
    }

    /// Total number of nodes in the tree.
    pub fn node_count(&self) -> usize {
        self.tree_nodes.len()
    }

    /// Number of folder nodes.
    pub fn folder_count(&self) -> usize {
        self.tree_nodes
            .values()
            .filter(|node| node.kind == NodeKind::Folder)
            .count()
    }

    /// Number of conversation leaves.
    pub fn conversation_count(&self) -> usize {
        self.tree_nodes
            .values()
            .filter(|node| node.kind == NodeKind::Conversation)
            .count()
    }
}

impl Default for OrganizationState {
    fn default() -> Self {
        Self::new()
    }
}
