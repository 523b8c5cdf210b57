//! Bot state storage.
//!
//! [`BotStorage`] is the contract the bot host consumes. [`DocumentStorage`]
//! implements it on top of any [`DocumentClient`](crate::client::DocumentClient).

pub mod coordinator;
pub mod fan_out;
pub mod init;

use docstate_types::context::StorageContext;
use docstate_types::data::StorageData;
use docstate_types::error::StorageError;

pub use coordinator::DocumentStorage;
pub use init::{InitGate, InitStatus};

/// Load/save of per-user and per-conversation bot state.
///
/// Uses RPITIT (native async fn in traits, Rust 2024 edition).
pub trait BotStorage: Send + Sync {
    /// Load every partition the context addresses.
    ///
    /// Partitions that were never written come back as `{}`; partitions the
    /// context does not address are `None`.
    fn load(
        &self,
        context: &StorageContext,
    ) -> impl std::future::Future<Output = Result<StorageData, StorageError>> + Send;

    /// Write every partition the context addresses. Missing bodies are
    /// written as `{}`.
    fn save(
        &self,
        context: &StorageContext,
        data: &StorageData,
    ) -> impl std::future::Future<Output = Result<(), StorageError>> + Send;
}
