use anyhow::{Result, bail};
use serde::Serialize;

use cookoo_core::models::is_local_id;
use cookoo_core::store::{RecipeStore, SyncState};

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SyncReport {
    state: String,
    subscribed: bool,
    recipes: usize,
    local_only: usize,
    pushed: usize,
}

/// Run one drift pass and report where the store stands.
pub(crate) async fn cmd_sync(store: &RecipeStore, remote_url: Option<&str>, json: bool) -> Result<()> {
    let Some(url) = remote_url else {
        bail!("No remote configured. Pass --remote <url> or set COOKOO_REMOTE_URL");
    };

    let pushed = if store.state() == SyncState::Ready {
        store.resync_drift().await?
    } else {
        0
    };
    let recipes = store.get_all();
    let report = SyncReport {
        state: store.state().to_string(),
        subscribed: store.is_subscribed(),
        recipes: recipes.len(),
        local_only: recipes.iter().filter(|r| is_local_id(&r.id)).count(),
        pushed,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }
    println!("Remote:     {url}");
    println!("State:      {}", report.state);
    println!(
        "Subscribed: {}",
        if report.subscribed { "yes" } else { "no" }
    );
    println!("Recipes:    {}", report.recipes);
    if report.pushed > 0 {
        println!("Pushed {} local recipe(s) missing from the remote", report.pushed);
    }
    if report.local_only > 0 {
        println!("{} recipe(s) not yet on the remote", report.local_only);
    }
    Ok(())
}
