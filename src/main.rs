use std::path::{Path, PathBuf};

use anyhow::Context;
use serde_json::json;
use tokio::io::{AsyncBufReadExt, BufReader};

use dailyplate::diary::dto::iso_date;
use dailyplate::diary::{BootPayload, TotalsAggregator};
use dailyplate::pipeline::{DayEvent, EditPipeline};
use dailyplate::state::AppState;

fn emit<T: serde::Serialize>(value: &T) {
    match serde_json::to_string(value) {
        Ok(line) => println!("{line}"),
        Err(e) => tracing::warn!(error = %e, "event not serializable"),
    }
}

async fn load_boot(path: &Path) -> anyhow::Result<BootPayload> {
    let text = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("read boot payload {}", path.display()))?;
    BootPayload::from_json(&text)
}

/// Handles one stdin line: `<foodId> <quantity>` or `resync <foodId>`.
fn handle_line(pipeline: &mut EditPipeline, line: &str) {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return;
    }
    let (head, rest) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
    let result = if head == "resync" {
        pipeline.resync(rest.trim())
    } else {
        pipeline.apply_text(head, rest)
    };
    if let Err(e) = result {
        tracing::warn!(error = %e, line, "edit ignored");
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let env_filter =
        std::env::var("RUST_LOG").unwrap_or_else(|_| "dailyplate=debug".to_string());
    let json_logs = std::env::var("LOG_FORMAT")
        .map(|v| v == "json")
        .unwrap_or(false);

    if json_logs {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_writer(std::io::stderr)
            .with_target(false)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_writer(std::io::stderr)
            .init();
    }

    let app_state = AppState::init()?;

    let boot_path = app_state
        .config
        .boot_payload
        .clone()
        .or_else(|| std::env::args().nth(1).map(PathBuf::from))
        .context("no boot payload: set BOOT_PAYLOAD or pass a path")?;
    let (boot_date, entries) = load_boot(&boot_path).await?.into_entries();
    let date = app_state.config.date_override.unwrap_or(boot_date);

    let (mut pipeline, mut events) = EditPipeline::new(
        date,
        entries,
        app_state.sync_client(),
        TotalsAggregator::new(app_state.config.budgets.clone()),
    );
    tracing::info!(date = %date, rows = pipeline.entries().len(), "day loaded");

    match app_state.sync_client().fetch_day(date).await {
        Ok(day) => {
            let totals = pipeline.hydrate(&day);
            emit(&json!({ "event": "hydrated", "totals": totals }));
        }
        Err(e) => tracing::warn!(error = %e, "diary not readable; starting from an empty day"),
    }

    let printer = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            if let DayEvent::Sync(report) = &event {
                if report.status.is_failed() {
                    tracing::warn!(food_id = %report.food_id, "row not saved; send `resync {}`", report.food_id);
                }
            }
            emit(&event);
        }
    });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await.context("read stdin")? {
        handle_line(&mut pipeline, &line);
        // Let queued saves make progress between edits.
        tokio::task::yield_now().await;
    }

    pipeline.settle().await;
    let totals = pipeline.totals();
    let date_text = iso_date::format(&date).context("format date")?;
    drop(pipeline);
    printer.await.context("event printer")?;

    emit(&json!({ "event": "day", "date": date_text, "totals": totals }));
    Ok(())
}
