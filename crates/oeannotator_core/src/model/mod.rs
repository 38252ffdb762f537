//! Domain model for annotation projects.
//!
//! # Responsibility
//! - Define the project tree (project → sentence → token/note).
//! - Define annotation state and sparse annotation edits.
//!
//! # Invariants
//! - A project owns its sentences; a sentence owns its tokens and notes.
//! - Token identity is positional; it does not survive reordering.

pub mod annotation;
pub mod project;
