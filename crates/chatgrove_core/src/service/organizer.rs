//! Organizer façade binding the tree to external conversation records.
//!
//! # Responsibility
//! - Wire one [`StateStore`] and one [`TreeManager`] into the API consumed
//!   by CLI/TUI collaborators.
//! - Join tree leaves to caller-supplied records by conversation id.
//!
//! # Invariants
//! - Records without a leaf node are unorganized, never auto-attached.
//! - A leaf whose record is missing from the supplied set renders with an
//!   empty record slot; dangling references are tolerated, not fatal.

use crate::model::node::{ItemMetadata, NodeId, NodeKind, TreeNode};
use crate::service::tree_manager::{DeleteMode, TreeError, TreeManager, TreeRow};
use crate::service::validate::TreeLimits;
use crate::store::metadata_store::{StateStore, StoreError};
use std::collections::{HashMap, HashSet};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Minimal contract a content record must satisfy to be organized.
///
/// Loaders own everything else about a conversation; the core only needs
/// a stable id and a display title.
pub trait ConversationRecord {
    /// Stable external id of the conversation.
    fn id(&self) -> &str;
    /// Display title from the export.
    fn title(&self) -> &str;
}

/// Errors surfaced by the organizer façade.
#[derive(Debug)]
pub enum OrganizerError {
    /// Tree mutation or query failure.
    Tree(TreeError),
    /// Persistence failure.
    Store(StoreError),
}

impl Display for OrganizerError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Tree(err) => write!(f, "{err}"),
            Self::Store(err) => write!(f, "{err}"),
        }
    }
}

impl Error for OrganizerError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Tree(err) => Some(err),
            Self::Store(err) => Some(err),
        }
    }
}

impl From<TreeError> for OrganizerError {
    fn from(value: TreeError) -> Self {
        Self::Tree(value)
    }
}

impl From<StoreError> for OrganizerError {
    fn from(value: StoreError) -> Self {
        Self::Store(value)
    }
}

/// One row of the joined tree/record view.
#[derive(Debug, Clone, Copy)]
pub struct OrganizedRow<'a, R> {
    /// Traversal depth, 0 for root-level nodes.
    pub depth: usize,
    /// The tree node for this row.
    pub node: &'a TreeNode,
    /// The joined record; `None` for folders and dangling leaves.
    pub record: Option<&'a R>,
    /// Resolved display title: custom title, else record title, else the
    /// node's own name.
    pub title: &'a str,
}

/// Façade over one organized conversation collection.
///
/// Constructed by [`ConversationOrganizer::open`] and threaded explicitly
/// through every call; there is no process-global instance.
pub struct ConversationOrganizer<S: StateStore> {
    store: S,
    manager: TreeManager,
}

impl<S: StateStore> ConversationOrganizer<S> {
    /// Loads persisted state through the store and indexes it in memory.
    pub fn open(store: S, limits: TreeLimits) -> Result<Self, OrganizerError> {
        let state = store.load()?;
        let manager = TreeManager::new(state, limits);
        Ok(Self { store, manager })
    }

    /// Persists the current state, stamping the aggregate timestamp.
    pub fn save(&mut self) -> Result<(), OrganizerError> {
        self.manager.stamp_modified();
        self.store.save(self.manager.state())?;
        Ok(())
    }

    /// Read access to the tree manager.
    pub fn manager(&self) -> &TreeManager {
        &self.manager
    }

    /// Creates a folder. Delegates to the tree manager.
    pub fn create_folder(
        &mut self,
        name: &str,
        parent_id: Option<&str>,
    ) -> Result<NodeId, OrganizerError> {
        Ok(self.manager.create_folder(name, parent_id)?)
    }

    /// Attaches a conversation leaf. Delegates to the tree manager.
    pub fn attach_conversation(
        &mut self,
        conversation_id: &str,
        title: &str,
        parent_id: Option<&str>,
    ) -> Result<NodeId, OrganizerError> {
        Ok(self
            .manager
            .attach_conversation(conversation_id, title, parent_id)?)
    }

    /// Moves a node. Delegates to the tree manager.
    pub fn move_node(
        &mut self,
        node_id: &str,
        new_parent_id: Option<&str>,
    ) -> Result<(), OrganizerError> {
        Ok(self.manager.move_node(node_id, new_parent_id)?)
    }

    /// Renames a node. Delegates to the tree manager.
    pub fn rename_node(&mut self, node_id: &str, new_name: &str) -> Result<(), OrganizerError> {
        Ok(self.manager.rename_node(node_id, new_name)?)
    }

    /// Deletes a node by policy. Delegates to the tree manager.
    pub fn delete_node(&mut self, node_id: &str, mode: DeleteMode) -> Result<(), OrganizerError> {
        Ok(self.manager.delete_node(node_id, mode)?)
    }

    /// Toggles a node's persisted expansion flag.
    pub fn set_expanded(&mut self, node_id: &str, expanded: bool) -> Result<(), OrganizerError> {
        Ok(self.manager.set_expanded(node_id, expanded)?)
    }

    /// Sets a node's explicit sibling order.
    pub fn set_order(&mut self, node_id: &str, order: i64) -> Result<(), OrganizerError> {
        Ok(self.manager.set_order(node_id, order)?)
    }

    /// Looks up metadata for one conversation id.
    pub fn metadata(&self, conversation_id: &str) -> Option<&ItemMetadata> {
        self.manager.metadata(conversation_id)
    }

    /// Sets or clears a conversation's custom title.
    pub fn set_custom_title(
        &mut self,
        conversation_id: &str,
        title: Option<&str>,
    ) -> Result<(), OrganizerError> {
        Ok(self.manager.set_custom_title(conversation_id, title)?)
    }

    /// Replaces a conversation's tag set.
    pub fn set_tags(&mut self, conversation_id: &str, tags: &[String]) -> Result<(), OrganizerError> {
        Ok(self.manager.set_tags(conversation_id, tags)?)
    }

    /// Adds one tag to a conversation.
    pub fn add_tag(&mut self, conversation_id: &str, tag: &str) -> Result<(), OrganizerError> {
        Ok(self.manager.add_tag(conversation_id, tag)?)
    }

    /// Removes one tag from a conversation.
    pub fn remove_tag(&mut self, conversation_id: &str, tag: &str) -> Result<(), OrganizerError> {
        Ok(self.manager.remove_tag(conversation_id, tag)?)
    }

    /// Replaces a conversation's notes.
    pub fn set_notes(&mut self, conversation_id: &str, notes: &str) -> Result<(), OrganizerError> {
        Ok(self.manager.set_notes(conversation_id, notes)?)
    }

    /// Sets a conversation's favorite flag.
    pub fn set_favorite(
        &mut self,
        conversation_id: &str,
        favorite: bool,
    ) -> Result<(), OrganizerError> {
        Ok(self.manager.set_favorite(conversation_id, favorite)?)
    }

    /// Sets a conversation's archived flag.
    pub fn set_archived(
        &mut self,
        conversation_id: &str,
        archived: bool,
    ) -> Result<(), OrganizerError> {
        Ok(self.manager.set_archived(conversation_id, archived)?)
    }

    /// Sets a conversation's priority ordinal.
    pub fn set_priority(
        &mut self,
        conversation_id: &str,
        priority: i64,
    ) -> Result<(), OrganizerError> {
        Ok(self.manager.set_priority(conversation_id, priority)?)
    }

    /// Full traversal with depth annotations.
    pub fn tree_order(&self) -> Vec<TreeRow<'_>> {
        self.manager.tree_order()
    }

    /// Walks the tree in order, joining each leaf to its record.
    pub fn ordered_view<'a, R: ConversationRecord>(
        &'a self,
        records: &'a [R],
    ) -> Vec<OrganizedRow<'a, R>> {
        let by_id: HashMap<&str, &R> = records.iter().map(|record| (record.id(), record)).collect();

        self.manager
            .tree_order()
            .into_iter()
            .map(|row| self.join_row(row, &by_id))
            .collect()
    }

    /// Records that have no leaf node anywhere in the tree, in input order.
    pub fn unorganized<'a, R: ConversationRecord>(&self, records: &'a [R]) -> Vec<&'a R> {
        records
            .iter()
            .filter(|record| self.manager.node(record.id()).is_none())
            .collect()
    }

    /// Case-insensitive substring match of `term` against leaf titles.
    ///
    /// Plain text matching only; `node_subset` restricts the candidates
    /// when given. Folders never match.
    pub fn find_by_text<'a, R: ConversationRecord>(
        &'a self,
        term: &str,
        records: &'a [R],
        node_subset: Option<&HashSet<NodeId>>,
    ) -> Vec<&'a TreeNode> {
        let needle = term.trim().to_lowercase();
        if needle.is_empty() {
            return Vec::new();
        }
        let by_id: HashMap<&str, &R> = records.iter().map(|record| (record.id(), record)).collect();

        self.manager
            .tree_order()
            .into_iter()
            .filter(|row| row.node.kind == NodeKind::Conversation)
            .filter(|row| {
                node_subset.map_or(true, |subset| subset.contains(row.node.id.as_str()))
            })
            .filter(|row| {
                let joined = self.join_row(*row, &by_id);
                joined.title.to_lowercase().contains(&needle)
            })
            .map(|row| row.node)
            .collect()
    }

    fn join_row<'a, R: ConversationRecord>(
        &'a self,
        row: TreeRow<'a>,
        by_id: &HashMap<&str, &'a R>,
    ) -> OrganizedRow<'a, R> {
        let record = match row.node.kind {
            NodeKind::Folder => None,
            NodeKind::Conversation => by_id.get(row.node.id.as_str()).copied(),
        };
        let custom_title = self
            .manager
            .metadata(&row.node.id)
            .and_then(|metadata| metadata.custom_title.as_deref());
        let title = custom_title
            .or_else(|| record.map(|r| r.title()))
            .unwrap_or(row.node.name.as_str());

        OrganizedRow {
            depth: row.depth,
            node: row.node,
            record,
            title,
        }
    }
}
