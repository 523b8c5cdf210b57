//! Shared domain types for docstate.
//!
//! This crate contains the types exchanged between the bot host, the storage
//! coordinator, and the document database backends: storage contexts, state
//! records, stored documents, configuration, and their error types.
//!
//! Zero infrastructure dependencies -- only serde and thiserror.

pub mod config;
pub mod context;
pub mod data;
pub mod document;
pub mod error;
