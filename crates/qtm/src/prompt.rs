//! Interactive session selection.

use anyhow::Context;
use dialoguer::{theme::ColorfulTheme, Select};
use tracing::warn;

use qtm_core::session::{SessionManager, SessionOptions};

/// Pick a session: prompt over the persisted list, or create a fresh
/// ID when nothing is persisted yet.
pub fn choose_session(sessions: &dyn SessionManager) -> anyhow::Result<String> {
    let ids = sessions.get_sessions().context("error fetching sessions")?;

    if ids.is_empty() {
        warn!("no sessions found, creating a new one");
        return Ok(sessions.create_session_id()?);
    }

    let selection = Select::with_theme(&ColorfulTheme::default())
        .with_prompt("Please select a session to use")
        .items(&ids)
        .default(0)
        .interact()
        .context("session prompt failed")?;

    Ok(ids[selection].clone())
}

/// Resolve the session to use: an explicit `--session` wins, `--new`
/// skips the prompt with a fresh ID, otherwise ask the operator.
pub fn create_or_fetch_session(
    sessions: &dyn SessionManager,
    opts: &SessionOptions,
) -> anyhow::Result<String> {
    if !opts.session.is_empty() {
        return Ok(opts.session.clone());
    }
    if opts.new_session {
        return Ok(sessions.create_session_id()?);
    }
    choose_session(sessions)
}
