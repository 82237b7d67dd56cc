use anyhow::{Context, Result};
use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use oi_dashboard::engine::{
    chart::render_pcr_chart,
    config::DashboardConfig,
    export::{export_workbook, snapshot_record},
    nse::{MarketSource, NseClient},
    session::DashboardSession,
};
use ratatui::{
    layout::Alignment,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    widgets::{Block, Borders, Cell, Paragraph, Row, Table},
    Frame, Terminal,
};
use std::{
    future::Future,
    io::IsTerminal,
    io::{self, Stdout},
    sync::Mutex,
    time::{Duration, Instant},
};
use tokio::time::MissedTickBehavior;

#[path = "oi_console/ui.rs"]
mod ui;

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    let cfg = DashboardConfig::from_env();
    let interactive = io::stdout().is_terminal();
    init_tracing(&cfg, interactive)?;

    let client = NseClient::new(&cfg.base_url, &cfg.symbol, &cfg.index_name, cfg.http_timeout)?;
    let mut session = DashboardSession::new(client, cfg.coarse_policy);
    tracing::info!(
        symbol = %cfg.symbol,
        policy = %cfg.coarse_policy.label(),
        refresh_secs = ?cfg.refresh_every.map(|d| d.as_secs()),
        "oi console started"
    );

    if interactive {
        ui::run_tui(&mut session, &cfg).await?;
    } else {
        run_plain(&mut session, &cfg).await?;
    }
    Ok(())
}

// The TUI owns stdout, so interactive runs log to a file instead.
fn init_tracing(cfg: &DashboardConfig, interactive: bool) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    if interactive {
        if let Some(parent) = cfg.log_file.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("create log dir {}", parent.display()))?;
        }
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&cfg.log_file)
            .with_context(|| format!("open log file {}", cfg.log_file.display()))?;
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_ansi(false)
            .with_writer(Mutex::new(file))
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_writer(io::stderr)
            .init();
    }
    Ok(())
}

fn export_sheets<S: MarketSource>(session: &mut DashboardSession<S>, cfg: &DashboardConfig) {
    let result = export_workbook(
        &cfg.export_dir,
        &cfg.export_prefix,
        session.journal(),
        session.chain(),
    );
    match result {
        Ok(path) => session.push_status(format!("[export] wrote {}", path.display())),
        Err(e) => {
            tracing::error!(err = %format!("{e:#}"), "export failed");
            session.push_status(format!("[export] failed: {e:#}"));
        }
    }
}

fn export_chart<S: MarketSource>(session: &mut DashboardSession<S>, cfg: &DashboardConfig) {
    let path = cfg.chart_path();
    let title = format!("{} PCR (OI change)", cfg.symbol);
    match render_pcr_chart(&path, &title, session.journal().fine()) {
        Ok(true) => session.push_status(format!("[chart] wrote {}", path.display())),
        Ok(false) => session.push_status("[chart] no PCR values logged yet".to_string()),
        Err(e) => {
            tracing::error!(err = %format!("{e:#}"), "chart failed");
            session.push_status(format!("[chart] failed: {e:#}"));
        }
    }
}

fn print_last_row<S: MarketSource>(session: &DashboardSession<S>) {
    if let Some(s) = session.journal().last() {
        println!("{}", snapshot_record(s).join(" | "));
    }
}

/// Non-interactive mode: one refresh, or a timer loop until Ctrl-C, then export.
async fn run_plain<S: MarketSource>(
    session: &mut DashboardSession<S>,
    cfg: &DashboardConfig,
) -> Result<()> {
    let Some(every) = cfg.refresh_every else {
        if session.refresh().await.is_ok() {
            print_last_row(session);
        }
        export_sheets(session, cfg);
        export_chart(session, cfg);
        for line in session.status() {
            eprintln!("{line}");
        }
        return Ok(());
    };

    refresh_until(session, every, tokio::signal::ctrl_c()).await;

    export_sheets(session, cfg);
    export_chart(session, cfg);
    let skip = session.status().len().saturating_sub(2);
    for line in session.status().iter().skip(skip) {
        eprintln!("{line}");
    }
    Ok(())
}

/// Refreshes every `every` until `shutdown` resolves. `shutdown` is polled for
/// the whole run, so a signal that lands mid-refresh ends the loop right after
/// that refresh. Returns the number of refresh cycles run.
async fn refresh_until<S, F>(
    session: &mut DashboardSession<S>,
    every: Duration,
    shutdown: F,
) -> usize
where
    S: MarketSource,
    F: Future,
{
    let mut ticker = tokio::time::interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    tokio::pin!(shutdown);
    let mut cycles = 0;
    loop {
        tokio::select! {
            biased;
            _ = &mut shutdown => break,
            _ = ticker.tick() => {
                match session.refresh().await {
                    Ok(_) => print_last_row(session),
                    Err(e) => eprintln!("error fetching data: {e:#}"),
                }
                cycles += 1;
            }
        }
    }
    cycles
}

#[cfg(test)]
mod tests {
    use super::*;
    use oi_dashboard::engine::journal::CoarsePolicy;
    use oi_dashboard::engine::types::{FuturesQuote, MarketFrame};
    use tokio::sync::oneshot;

    // Fires the shutdown channel from inside the first fetch.
    struct InterruptedSource {
        stop: Mutex<Option<oneshot::Sender<()>>>,
    }

    impl MarketSource for InterruptedSource {
        async fn fetch_frame(&self) -> Result<MarketFrame> {
            if let Some(tx) = self.stop.lock().unwrap().take() {
                let _ = tx.send(());
            }
            Ok(MarketFrame {
                futures: FuturesQuote {
                    ltp: 100.0,
                    oi: 1000.0,
                    volume: 0.0,
                },
                chain: Vec::new(),
                spot: None,
            })
        }
    }

    #[tokio::test]
    async fn shutdown_during_refresh_ends_the_loop() {
        let (tx, rx) = oneshot::channel();
        let src = InterruptedSource {
            stop: Mutex::new(Some(tx)),
        };
        let mut session = DashboardSession::new(src, CoarsePolicy::default());
        let cycles = refresh_until(&mut session, Duration::from_millis(1), rx).await;
        assert_eq!(cycles, 1);
        assert_eq!(session.journal().fine().len(), 1);
    }
}
