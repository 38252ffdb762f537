//! Repository layer abstractions and persistence implementations.
//!
//! # Responsibility
//! - Define use-case oriented data access contracts.
//! - Isolate SQLite query details from service/business orchestration.
//!
//! # Invariants
//! - Repositories only accept connections whose schema is fully migrated.
//! - Repository APIs return semantic errors (`NotFound`, `NameTaken`) in
//!   addition to DB transport errors.

pub mod project_repo;

pub use project_repo::{
    list_project_summaries, unique_name, InsertedProject, ProjectRepository, ProjectSummary,
    RepoError, RepoResult, SqliteProjectRepository,
};
