//! Core use-case services.
//!
//! # Responsibility
//! - Orchestrate repository, serializer and backup calls into use-case level
//!   APIs.
//! - Keep presentation and CLI layers decoupled from storage details.

pub mod session;
pub mod transfer;
