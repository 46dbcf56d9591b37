//! Command-line argument parsing.
//!
//! Defines the CLI structure using clap derive macros.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// openFDA device agent.
///
/// Ask questions in English against the FDA's openFDA device datasets
/// and a local GUDID device catalog.
#[derive(Parser, Debug)]
#[command(name = "openfda-agent")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long, env = "AGENT_CONFIG")]
    pub config: Option<PathBuf>,

    /// Path to the agent database file (overrides configuration).
    #[arg(short, long, env = "AGENT_DB_PATH")]
    pub db_path: Option<PathBuf>,

    /// Enable verbose output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output format (text, json).
    #[arg(long, default_value = "text", global = true)]
    pub format: String,

    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Initialize the agent database and documentation corpus.
    Init {
        /// CSV snapshot to import into the device catalog
        /// (brand_name,company_name,description,product_code,gmdn_term,identifier).
        #[arg(long)]
        catalog: Option<PathBuf>,

        /// Force re-initialization (destroys existing data).
        #[arg(short, long)]
        force: bool,
    },

    /// Ask a question.
    Ask {
        /// The question, in English.
        question: String,

        /// Session to continue; a new session is created when omitted.
        #[arg(short, long)]
        session: Option<String>,

        /// Stream progress events instead of waiting for the answer.
        #[arg(long)]
        stream: bool,
    },

    /// Manage stored sessions.
    Sessions {
        /// The session operation.
        #[command(subcommand)]
        command: SessionCommands,
    },

    /// Extend a session's spend limit with the operator passphrase.
    Unlock {
        /// Session id.
        session: String,

        /// Operator passphrase.
        passphrase: String,
    },

    /// Show store statistics.
    Status,
}

/// Session subcommands.
#[derive(Subcommand, Debug)]
pub enum SessionCommands {
    /// List sessions, most recent first.
    #[command(alias = "ls")]
    List,

    /// Show one session's history.
    Show {
        /// Session id.
        id: String,
    },

    /// Delete a session.
    #[command(alias = "rm")]
    Delete {
        /// Session id.
        id: String,
    },

    /// Clear one resolver-context field (devices, manufacturers,
    /// location), leaving the rest of the session intact.
    ResetContext {
        /// Session id.
        id: String,

        /// Field to clear.
        field: String,
    },
}
