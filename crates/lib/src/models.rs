//! Model presence and pull orchestration.

use crate::llm::{OllamaClient, OllamaError};

/// Make sure `name` is available locally, pulling it when absent.
///
/// Pull progress (status, completed, total) is translated into
/// (message, percent): 0-100 when the total is known, otherwise the status
/// string with percent -1. A reported total of zero is passed through as
/// indeterminate; the protocol does not say whether it means "unknown".
pub async fn ensure_model(
    client: &OllamaClient,
    name: &str,
    on_progress: &mut (dyn FnMut(&str, i32) + Send),
) -> Result<(), OllamaError> {
    if client.has_model(name).await {
        log::info!("model {} already available", name);
        return Ok(());
    }

    on_progress(&format!("Downloading model {}...", name), 0);
    let mut forward = |status: &str, completed: u64, total: u64| {
        if total > 0 {
            let pct = ((completed as f64 / total as f64) * 100.0).round() as i32;
            on_progress(&format!("{} {}%", status, pct), pct);
        } else {
            on_progress(status, -1);
        }
    };
    client.pull_model(name, &mut forward).await
}
