//! CLI command definitions for the `dstate` binary.
//!
//! Uses clap derive macros for argument parsing. Commands that address bot
//! state share the [`ContextArgs`] flags.

pub mod config;
pub mod init;
pub mod keys;
pub mod state;

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use docstate_types::context::StorageContext;

/// Inspect and edit bot state stored in a document database.
#[derive(Parser)]
#[command(name = "dstate", version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Output machine-readable JSON instead of styled text.
    #[arg(long, global = true)]
    pub json: bool,

    /// Only log errors.
    #[arg(long, global = true)]
    pub quiet: bool,

    /// Detailed output (-v for info, -vv for debug, -vvv for trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Data directory holding config.toml and the filesystem backend.
    #[arg(long, global = true, env = "DOCSTATE_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    /// Export spans to stdout through OpenTelemetry.
    #[arg(long, global = true)]
    pub otel: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Provision the database and collection now and report the outcome.
    Init,

    /// Print the document keys a context derives.
    Keys {
        #[command(flatten)]
        context: ContextArgs,
    },

    /// Load and print the state a context addresses.
    Load {
        #[command(flatten)]
        context: ContextArgs,
    },

    /// Write state for a context.
    ///
    /// Partitions not given on the command line keep their stored value.
    Save {
        #[command(flatten)]
        context: ContextArgs,

        /// JSON body for user data.
        #[arg(long)]
        user_data: Option<String>,

        /// JSON body for conversation data.
        #[arg(long)]
        conversation_data: Option<String>,

        /// JSON body for private conversation data.
        #[arg(long)]
        private_data: Option<String>,
    },

    /// Print the effective configuration.
    Config {
        /// Also write it to config.toml in the data directory.
        #[arg(long)]
        write: bool,
    },
}

/// Flags describing whose state a command touches.
#[derive(Args, Debug, Clone, PartialEq, Eq)]
pub struct ContextArgs {
    /// User id.
    #[arg(long)]
    pub user: Option<String>,

    /// Conversation id.
    #[arg(long)]
    pub conversation: Option<String>,

    /// Do not address the user data partition.
    #[arg(long)]
    pub no_user_data: bool,

    /// Do not address the conversation data partition.
    #[arg(long)]
    pub no_conversation_data: bool,
}

impl ContextArgs {
    pub fn to_context(&self) -> StorageContext {
        StorageContext {
            user_id: self.user.clone(),
            conversation_id: self.conversation.clone(),
            persist_user_data: !self.no_user_data,
            persist_conversation_data: !self.no_conversation_data,
        }
    }
}
