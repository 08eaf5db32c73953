//! Interactive prompts with CI/non-interactive fallback

use super::context::UiContext;
use crate::error::{PgstampError, PgstampResult};

/// Ask a yes/no question
///
/// Returns `true` under auto-yes and `default` when nobody can answer.
pub async fn confirm(ctx: &UiContext, message: &str, default: bool) -> PgstampResult<bool> {
    if ctx.auto_yes() {
        return Ok(true);
    }
    if !ctx.is_interactive() {
        return Ok(default);
    }

    // cliclack blocks on stdin
    let message = message.to_string();
    let answer = tokio::task::spawn_blocking(move || {
        cliclack::confirm(&message)
            .initial_value(default)
            .interact()
    })
    .await
    .map_err(|e| PgstampError::Internal(format!("Prompt task failed: {}", e)))?;

    answer.map_err(|e| PgstampError::User(format!("Prompt failed: {}", e)))
}
