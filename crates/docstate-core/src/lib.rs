//! Storage coordinator and document client port for docstate.
//!
//! This crate defines the "port" (the `DocumentClient` trait) that the
//! infrastructure layer implements, the key deriver, and the coordinator that
//! maps bot state onto documents. It depends only on `docstate-types` --
//! never on `docstate-infra` or any database/IO crate.

pub mod client;
pub mod keys;
pub mod storage;
