use clap::Parser;
use pmp_chat_workflows::cli::{self, Cli, Command};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Serve => cli::serve::run().await,
        Command::Validate(args) => cli::validate::run(args),
        Command::Token(args) => cli::token::run(args),
    }
}
