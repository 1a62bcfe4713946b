//! Core organization engine for ChatGrove.
//!
//! Imposes a persistent folder hierarchy over a flat collection of exported
//! chat conversations. This crate is the single source of truth for tree
//! invariants; loaders and terminal frontends are external collaborators
//! consuming the [`ConversationOrganizer`] façade.

pub mod logging;
pub mod model;
pub mod service;
pub mod store;

pub use logging::{default_log_level, init_logging};
pub use model::node::{ConversationId, ItemMetadata, NodeId, NodeKind, TreeNode};
pub use model::state::{OrganizationState, RECOGNIZED_SCHEMA_VERSIONS, SCHEMA_VERSION};
pub use service::organizer::{
    ConversationOrganizer, ConversationRecord, OrganizedRow, OrganizerError,
};
pub use service::tree_manager::{DeleteMode, TreeError, TreeManager, TreeRow};
pub use service::validate::{validate_name, validate_tag, TreeLimits, ValidationError};
pub use store::metadata_store::{
    JsonMetadataStore, StateStore, StoreError, StoreResult, ORGANIZATION_FILE_SUFFIX,
};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::core_version;

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }
}
