//! Where the personal access token comes from.
//!
//! The token is never a flag, so it cannot end up in shell history or `ps`.

use anyhow::{bail, Context, Result};
use std::env;
use tracing::info;

pub const TOKEN_ENV: &str = "GITHUB_TOKEN";

/// The token from `GITHUB_TOKEN`, if set and non-blank.
pub fn token_from_env() -> Option<String> {
    env::var(TOKEN_ENV)
        .ok()
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
}

/// Environment first, then a masked prompt on the terminal.
pub fn read_access_token() -> Result<String> {
    if let Some(token) = token_from_env() {
        info!(source = TOKEN_ENV, "Access token read from environment");
        return Ok(token);
    }

    let entered = rpassword::prompt_password("Personal Access Token: ")
        .context("failed to read the access token from the terminal")?;
    let token = entered.trim();
    if token.is_empty() {
        bail!("an access token is required (set {TOKEN_ENV} or enter one at the prompt)");
    }
    info!(source = "prompt", "Access token read from terminal");
    Ok(token.to_string())
}
