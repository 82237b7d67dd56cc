use super::*;
use oi_dashboard::engine::types::{Signal, Snapshot, StrikeRow};

const CHAIN_ROWS_AROUND_ATM: usize = 11;

/// Drives the dashboard until `q`/`Esc`. Refreshes run inline, so two
/// refreshes can never overlap.
pub(crate) async fn run_tui<S: MarketSource>(
    session: &mut DashboardSession<S>,
    cfg: &DashboardConfig,
) -> Result<()> {
    enable_raw_mode().context("enable raw mode")?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen).context("enter alt screen")?;
    let backend = ratatui::backend::CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend).context("terminal init")?;

    let result = event_loop(&mut terminal, session, cfg).await;
    teardown_tui(terminal)?;
    result
}

async fn event_loop<S: MarketSource>(
    terminal: &mut Terminal<ratatui::backend::CrosstermBackend<Stdout>>,
    session: &mut DashboardSession<S>,
    cfg: &DashboardConfig,
) -> Result<()> {
    let tick_rate = Duration::from_millis(200);
    let mut last_refresh: Option<Instant> = None;

    loop {
        terminal.draw(|f| draw_dashboard(f, session, cfg))?;

        let timer_due = match (cfg.refresh_every, last_refresh) {
            (Some(_), None) => true,
            (Some(every), Some(at)) => at.elapsed() >= every,
            (None, _) => false,
        };
        if timer_due {
            refresh_with_redraw(terminal, session, cfg).await?;
            last_refresh = Some(Instant::now());
            continue;
        }

        if event::poll(tick_rate)? {
            match event::read()? {
                Event::Key(key) if key.kind == KeyEventKind::Press => match key.code {
                    KeyCode::Char('q') | KeyCode::Esc => break,
                    KeyCode::Char('r') => {
                        refresh_with_redraw(terminal, session, cfg).await?;
                        last_refresh = Some(Instant::now());
                    }
                    KeyCode::Char('d') => export_sheets(session, cfg),
                    KeyCode::Char('c') => export_chart(session, cfg),
                    _ => {}
                },
                _ => {}
            }
        }
    }
    Ok(())
}

async fn refresh_with_redraw<S: MarketSource>(
    terminal: &mut Terminal<ratatui::backend::CrosstermBackend<Stdout>>,
    session: &mut DashboardSession<S>,
    cfg: &DashboardConfig,
) -> Result<()> {
    session.push_status(format!("[refresh] fetching {} ...", cfg.symbol));
    terminal.draw(|f| draw_dashboard(f, session, cfg))?;
    // Errors are already in the status pane.
    let _ = session.refresh().await;
    Ok(())
}

fn teardown_tui(mut terminal: Terminal<ratatui::backend::CrosstermBackend<Stdout>>) -> Result<()> {
    disable_raw_mode().context("disable raw mode")?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen).context("leave alt screen")?;
    terminal.show_cursor().context("show cursor")?;
    Ok(())
}

fn draw_dashboard<S: MarketSource>(
    f: &mut Frame,
    session: &DashboardSession<S>,
    cfg: &DashboardConfig,
) {
    let area = f.area();
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(2), Constraint::Min(10)].as_ref())
        .split(area);

    let header_p = Paragraph::new(build_header(session, cfg))
        .alignment(Alignment::Left)
        .block(Block::default().borders(Borders::BOTTOM));
    f.render_widget(header_p, chunks[0]);

    let body = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Min(8),
            Constraint::Length(9),
            Constraint::Length(CHAIN_ROWS_AROUND_ATM as u16 + 3),
        ])
        .split(chunks[1]);

    let journal = session.journal();
    draw_snapshot_table(f, "5-Minute Log", journal.fine(), body[0]);
    draw_snapshot_table(
        f,
        &format!("15-Minute Log ({})", journal.policy().label()),
        journal.coarse(),
        body[1],
    );

    let bottom = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
        .split(body[2]);
    draw_chain(f, session.chain(), journal.last().map(Snapshot::ltp), bottom[0]);
    draw_status(f, session.status(), bottom[1]);
}

fn build_header<S: MarketSource>(session: &DashboardSession<S>, cfg: &DashboardConfig) -> String {
    let spot = session
        .spot()
        .map(|v| format!("{v:.2}"))
        .unwrap_or_else(|| "-".to_string());
    let timer = cfg
        .refresh_every
        .map(|d| format!("auto {}s", d.as_secs()))
        .unwrap_or_else(|| "manual".to_string());
    let journal = session.journal();
    format!(
        "{} OI Analysis | {} {spot} | {timer} | rows {}/{} | r=refresh d=export c=chart q=quit",
        cfg.symbol,
        cfg.index_name,
        journal.fine().len(),
        journal.coarse().len(),
    )
}

fn signal_style(signal: Signal) -> Style {
    match signal {
        Signal::Buy => Style::default().fg(Color::Green),
        Signal::Sell => Style::default().fg(Color::Red),
        Signal::Hold => Style::default().fg(Color::Gray),
    }
}

// Newest first; the table clips whatever does not fit.
fn draw_snapshot_table(f: &mut Frame, title: &str, rows: &[Snapshot], area: Rect) {
    let header_style = Style::default()
        .fg(Color::Cyan)
        .add_modifier(Modifier::BOLD);
    let header = Row::new(vec![
        Cell::from("Time"),
        Cell::from("LTP"),
        Cell::from("OI"),
        Cell::from("Vol"),
        Cell::from("CE dOI"),
        Cell::from("PE dOI"),
        Cell::from("Interpretation"),
        Cell::from("Signal"),
        Cell::from("PCR"),
    ])
    .style(header_style);

    let visible = area.height.saturating_sub(3) as usize;
    let table_rows: Vec<Row> = rows
        .iter()
        .rev()
        .take(visible)
        .map(|s| {
            let t = s.totals();
            Row::new(vec![
                Cell::from(
                    s.ts()
                        .with_timezone(&chrono::Local)
                        .format("%H:%M:%S")
                        .to_string(),
                ),
                Cell::from(format!("{:.2}", s.ltp())),
                Cell::from(format!("{:.0}", s.oi())),
                Cell::from(format!("{:.0}", s.volume())),
                Cell::from(format!("{:.0}", t.ce_oi_change)),
                Cell::from(format!("{:.0}", t.pe_oi_change)),
                Cell::from(s.regime().label()),
                Cell::from(s.signal().label()).style(signal_style(s.signal())),
                Cell::from(
                    s.pcr()
                        .map(|v| format!("{v:.2}"))
                        .unwrap_or_else(|| "-".to_string()),
                ),
            ])
        })
        .collect();

    let table = Table::new(
        table_rows,
        [
            Constraint::Length(9),
            Constraint::Length(10),
            Constraint::Length(10),
            Constraint::Length(9),
            Constraint::Length(9),
            Constraint::Length(9),
            Constraint::Length(15),
            Constraint::Length(7),
            Constraint::Length(6),
        ],
    )
    .header(header)
    .block(
        Block::default()
            .borders(Borders::ALL)
            .title(format!("{title} [{}]", rows.len())),
    );
    f.render_widget(table, area);
}

/// Strikes nearest to `ltp`, in strike order.
fn rows_near_atm(chain: &[StrikeRow], ltp: Option<f64>, n: usize) -> Vec<&StrikeRow> {
    let by_strike = |a: &&StrikeRow, b: &&StrikeRow| {
        a.strike
            .partial_cmp(&b.strike)
            .unwrap_or(std::cmp::Ordering::Equal)
    };
    let mut picked: Vec<&StrikeRow> = chain.iter().collect();
    match ltp {
        Some(ltp) => picked.sort_by(|a, b| {
            (a.strike - ltp)
                .abs()
                .partial_cmp(&(b.strike - ltp).abs())
                .unwrap_or(std::cmp::Ordering::Equal)
        }),
        None => picked.sort_by(by_strike),
    }
    picked.truncate(n);
    picked.sort_by(by_strike);
    picked
}

fn draw_chain(f: &mut Frame, chain: &[StrikeRow], ltp: Option<f64>, area: Rect) {
    let header = Row::new(vec![
        Cell::from("Strike"),
        Cell::from("Call OI"),
        Cell::from("Put OI"),
        Cell::from("Call dOI"),
        Cell::from("Put dOI"),
    ])
    .style(Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD));

    let rows: Vec<Row> = rows_near_atm(chain, ltp, CHAIN_ROWS_AROUND_ATM)
        .into_iter()
        .map(|r| {
            let ce = r.ce.unwrap_or_default();
            let pe = r.pe.unwrap_or_default();
            Row::new(vec![
                Cell::from(format!("{}", r.strike)),
                Cell::from(format!("{:.0}", ce.open_interest)),
                Cell::from(format!("{:.0}", pe.open_interest)),
                Cell::from(format!("{:.0}", ce.change_in_open_interest)),
                Cell::from(format!("{:.0}", pe.change_in_open_interest)),
            ])
        })
        .collect();

    let table = Table::new(
        rows,
        [
            Constraint::Length(9),
            Constraint::Length(10),
            Constraint::Length(10),
            Constraint::Length(10),
            Constraint::Length(10),
        ],
    )
    .header(header)
    .block(
        Block::default()
            .borders(Borders::ALL)
            .title(format!("Option Chain [{} strikes]", chain.len())),
    );
    f.render_widget(table, area);
}

fn draw_status(f: &mut Frame, status: &std::collections::VecDeque<String>, area: Rect) {
    let visible = area.height.saturating_sub(2) as usize;
    let skip = status.len().saturating_sub(visible);
    let text = status
        .iter()
        .skip(skip)
        .cloned()
        .collect::<Vec<_>>()
        .join("\n");
    let p = Paragraph::new(text).block(Block::default().borders(Borders::ALL).title("Status"));
    f.render_widget(p, area);
}
