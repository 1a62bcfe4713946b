//! Core use-case services.
//!
//! # Responsibility
//! - Orchestrate validation, tree mutation and persistence into use-case
//!   level APIs.
//! - Keep CLI/TUI collaborators decoupled from storage details.

pub mod organizer;
pub mod tree_manager;
pub mod validate;
