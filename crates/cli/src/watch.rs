//! Terminal rendering of a run's progress stream.

use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use console::style;
use eventsource_stream::Eventsource;
use events::{EventStatus, MigrationPhase, ProgressEvent};
use futures::StreamExt;
use indicatif::{ProgressBar, ProgressStyle};
use serde_json::Value;

/// Stream progress for `session_id` until the server sends `close`.
///
/// Fails when the run ends with an error event or the stream ends early.
pub async fn follow(client: &reqwest::Client, base: &str, session_id: &str) -> Result<()> {
    let response = client
        .get(format!("{}/api/v1/nodepools/sequence/progress", base))
        .query(&[("session_id", session_id)])
        .send()
        .await
        .with_context(|| format!("Failed to reach poolshift server at {}", base))?;

    let status = response.status();
    if !status.is_success() {
        let body: Value = response.json().await.unwrap_or_default();
        bail!(crate::api_error(status, &body));
    }

    let bar = ProgressBar::new(100);
    bar.set_style(
        ProgressStyle::with_template(
            "{spinner:.cyan} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos:>3}% {wide_msg}",
        )?
        .progress_chars("=> "),
    );
    bar.enable_steady_tick(Duration::from_millis(120));

    let mut stream = response.bytes_stream().eventsource();
    let mut last_phase = None;
    let mut outcome: Option<ProgressEvent> = None;

    while let Some(event) = stream.next().await {
        let event = event.map_err(|e| anyhow!("Progress stream interrupted: {}", e))?;
        match event.event.as_str() {
            "progress" => {
                let progress: ProgressEvent = match serde_json::from_str(&event.data) {
                    Ok(p) => p,
                    Err(e) => {
                        tracing::debug!(error = %e, data = %event.data, "Skipping unreadable progress event");
                        continue;
                    }
                };
                render(&bar, &progress, &mut last_phase);
                if progress.is_terminal() {
                    outcome = Some(progress);
                }
            }
            "close" => break,
            _ => {}
        }
    }

    match outcome {
        Some(event) if event.status == EventStatus::Completed => {
            bar.finish_with_message(event.message);
            Ok(())
        }
        Some(event) => {
            bar.abandon_with_message(style("failed").red().to_string());
            bail!(
                "{} failed: {}",
                event.phase_name,
                event.error.unwrap_or(event.message)
            )
        }
        None => {
            bar.abandon();
            bail!("Progress stream ended before the run finished")
        }
    }
}

fn render(bar: &ProgressBar, event: &ProgressEvent, last_phase: &mut Option<MigrationPhase>) {
    if *last_phase != Some(event.phase_name) {
        bar.println(format!(
            "{} {}",
            style(format!("[{}/5]", event.phase)).dim(),
            style(event.phase_name).cyan().bold()
        ));
        *last_phase = Some(event.phase_name);
    }

    bar.set_position(event.progress_percent.round() as u64);

    match event.status {
        EventStatus::Running if event.host_name.is_some() => {
            bar.println(format!("  {} {}", style("•").dim(), event.message));
        }
        EventStatus::Running => bar.set_message(event.message.clone()),
        EventStatus::Completed => {
            bar.println(format!("  {} {}", style("✓").green(), event.message));
        }
        EventStatus::Error => {
            let host = event
                .host_name
                .as_deref()
                .map(|h| format!(" [{}]", h))
                .unwrap_or_default();
            bar.println(format!(
                "  {} {}{}",
                style("✗").red(),
                style(&event.message).red(),
                host
            ));
        }
    }
}
