//! Token command - issues a JWT signed with the configured secret

use clap::Args;

use crate::config::AppConfig;
use crate::domain::UserId;
use crate::infrastructure::auth::{JwtConfig, JwtGenerator, JwtService};

#[derive(Args)]
pub struct TokenArgs {
    /// Subject of the token
    pub user_id: String,

    /// Lifetime in hours; defaults to `auth.token_expiration_hours`
    #[arg(long)]
    pub hours: Option<u64>,
}

pub fn run(args: TokenArgs) -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config = AppConfig::load()?;
    let secret = config.auth.jwt_secret.clone().ok_or_else(|| {
        anyhow::anyhow!("auth.jwt_secret is not set; a server would not accept this token")
    })?;

    let hours = args.hours.unwrap_or(config.auth.token_expiration_hours);
    println!("{}", issue_token(&args.user_id, secret, hours)?);

    Ok(())
}

fn issue_token(user_id: &str, secret: String, hours: u64) -> anyhow::Result<String> {
    let user_id = UserId::new(user_id)?;
    let service = JwtService::new(JwtConfig::new(secret, hours));

    Ok(service.generate(&user_id, user_id.as_str())?)
}
