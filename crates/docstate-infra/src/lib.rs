//! Infrastructure layer for docstate.
//!
//! Contains implementations of the `DocumentClient` port defined in
//! `docstate-core`: a process-local in-memory database and a filesystem-backed
//! database, plus `config.toml` loading and backend selection.

pub mod backend;
pub mod config;
pub mod fs;
pub mod memory;

mod rules;
