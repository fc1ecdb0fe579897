//! CLI module for PMP Chat Workflows
//!
//! Provides subcommands:
//! - `serve`: HTTP API server
//! - `validate`: check a workflow template file offline
//! - `token`: issue a development JWT

pub mod serve;
pub mod token;
pub mod validate;

use clap::{Parser, Subcommand};

/// PMP Chat Workflows - graph workflows for chat assistants
#[derive(Parser)]
#[command(name = "pmp-chat-workflows")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run the HTTP API server
    Serve,

    /// Validate an exported workflow template
    Validate(validate::ValidateArgs),

    /// Issue a JWT for local development
    Token(token::TokenArgs),
}
