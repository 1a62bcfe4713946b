//! Tree node and per-conversation metadata models.
//!
//! # Responsibility
//! - Define the tagged folder/conversation node shape stored in the tree.
//! - Define the metadata record attached to one external conversation id.
//!
//! # Invariants
//! - Folder ids are generated UUIDv4 text; a conversation node's id equals
//!   the external conversation id it represents.
//! - `children` tracks membership only; sibling display order is the
//!   explicit `order` field.
//! - A folder's `path` is its parent's path plus its own name and a `/`;
//!   a conversation node carries its owning folder's path.

use crate::model::time::now_epoch_ms;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use uuid::Uuid;

/// Stable identifier for a tree node.
///
/// Kept as a type alias to make semantic intent explicit in signatures.
pub type NodeId = String;

/// Stable external identifier of one exported conversation.
pub type ConversationId = String;

/// Node variant tag.
///
/// Operations switch on this tag explicitly; there is no behavior hierarchy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    /// Purely organizational node that can contain children.
    Folder,
    /// Leaf node representing exactly one external conversation.
    Conversation,
}

/// One node of the organization tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeNode {
    /// Stable node id. UUIDv4 text for folders, conversation id for leaves.
    pub id: NodeId,
    /// User-facing display name.
    pub name: String,
    /// Serialized as `type` to match the document schema naming.
    #[serde(rename = "type")]
    pub kind: NodeKind,
    /// Owning parent id. `None` means root-level node.
    #[serde(default)]
    pub parent_id: Option<NodeId>,
    /// Child node ids. Membership only; order lives in each child's `order`.
    #[serde(default)]
    pub children: HashSet<NodeId>,
    /// Materialized path of ancestor folder names, e.g. `/Work/Python/`.
    #[serde(default)]
    pub path: String,
    /// Persisted UI expansion state. Affects rendering, never traversal.
    #[serde(default = "default_expanded")]
    pub expanded: bool,
    /// Explicit sibling order. Assigned append-at-end, stable across saves.
    #[serde(default)]
    pub order: i64,
    /// Epoch ms creation timestamp.
    #[serde(default)]
    pub created_at: i64,
    /// Epoch ms last-modification timestamp.
    #[serde(default)]
    pub modified_at: i64,
}

fn default_expanded() -> bool {
    true
}

impl TreeNode {
    /// Creates a folder node with a fresh generated id.
    ///
    /// `path` and `order` start empty; the tree manager assigns both when
    /// the node is linked into the tree.
    pub fn new_folder(name: impl Into<String>, parent_id: Option<NodeId>) -> Self {
        let now = now_epoch_ms();
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            kind: NodeKind::Folder,
            parent_id,
            children: HashSet::new(),
            path: String::new(),
            expanded: true,
            order: 0,
            created_at: now,
            modified_at: now,
        }
    }

    /// Creates a conversation leaf whose id is the external conversation id.
    pub fn new_conversation(
        conversation_id: impl Into<ConversationId>,
        name: impl Into<String>,
        parent_id: Option<NodeId>,
    ) -> Self {
        let now = now_epoch_ms();
        Self {
            id: conversation_id.into(),
            name: name.into(),
            kind: NodeKind::Conversation,
            parent_id,
            children: HashSet::new(),
            path: String::new(),
            expanded: false,
            order: 0,
            created_at: now,
            modified_at: now,
        }
    }

    /// Returns whether this node can own children.
    pub fn is_folder(&self) -> bool {
        self.kind == NodeKind::Folder
    }

    /// Stamps the modification timestamp.
    pub fn touch(&mut self) {
        self.modified_at = now_epoch_ms();
    }
}

/// Metadata attached to one external conversation, keyed by its id in
/// [`OrganizationState::item_metadata`](crate::model::state::OrganizationState).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemMetadata {
    /// Overrides the record's own title when set.
    #[serde(default)]
    pub custom_title: Option<String>,
    /// Deduplicated user tags. BTreeSet keeps serialization deterministic.
    #[serde(default)]
    pub tags: BTreeSet<String>,
    /// Free-text notes.
    #[serde(default)]
    pub notes: String,
    /// Favorite flag.
    #[serde(default)]
    pub favorite: bool,
    /// Archived flag.
    #[serde(default)]
    pub archived: bool,
    /// Caller-defined priority ordinal.
    #[serde(default)]
    pub priority: i64,
    /// Epoch ms creation timestamp.
    #[serde(default)]
    pub created_at: i64,
    /// Epoch ms last-modification timestamp.
    #[serde(default)]
    pub modified_at: i64,
}

impl ItemMetadata {
    /// Creates empty metadata with current timestamps.
    pub fn new() -> Self {
        let now = now_epoch_ms();
        Self {
            custom_title: None,
            tags: BTreeSet::new(),
            notes: String::new(),
            favorite: false,
            archived: false,
            priority: 0,
            created_at: now,
            modified_at: now,
        }
    }

    /// Stamps the modification timestamp.
    pub fn touch(&mut self) {
        self.modified_at = now_epoch_ms();
    }
}

impl Default for ItemMetadata {
    fn default() -> Self {
        Self::new()
    }
}
