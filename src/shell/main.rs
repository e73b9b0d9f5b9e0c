use anyhow::Context;
use tracing_subscriber::{EnvFilter, fmt};

use work_log::application::errors::ApplicationError;
use work_log::core::work_log::filter::EntryFilter;
use work_log::shell::config::WorkLogConfig;
use work_log::shell::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    fmt().with_env_filter(EnvFilter::from_default_env()).init();

    let recover = std::env::args().skip(1).any(|arg| arg == "--recover");
    let config = WorkLogConfig::from_env().context("reading configuration")?;
    tracing::info!(
        data_file = %config.data_file.display(),
        invoices_dir = %config.invoices_dir.display(),
        recover,
        "opening work log"
    );

    let (state, report) = match AppState::open(&config, recover).await {
        Ok(opened) => opened,
        Err(e @ ApplicationError::Corruption { .. }) => {
            eprintln!("{e}");
            eprintln!("Run with --recover to restore the backup as the primary store file.");
            std::process::exit(2);
        }
        Err(e) => return Err(e).context("opening work log"),
    };

    if !report.is_clean() {
        tracing::warn!(
            excluded = report.excluded.len(),
            corrections = report.corrections.len(),
            "store loaded with exclusions or corrections"
        );
    }

    for week in state.queries.weekly_summary(&EntryFilter::all()).await {
        if week.entry_count == 0 {
            continue;
        }
        tracing::info!(
            week = week.week.index,
            start = %week.week.start,
            end = %week.week.end,
            entries = week.entry_count,
            total = %week.total_hhmm(),
            "weekly total"
        );
    }
    Ok(())
}
