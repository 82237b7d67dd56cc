use crate::engine::interpret::annotate;
use crate::engine::journal::{CoarsePolicy, OiJournal, RecordOutcome};
use crate::engine::nse::MarketSource;
use crate::engine::types::{ChainTotals, Snapshot, StrikeRow};
use anyhow::Result;
use chrono::{DateTime, Utc};
use std::collections::VecDeque;

const MAX_STATUS_LINES: usize = 200;

#[derive(Debug, Clone)]
pub struct RefreshReport {
    pub snapshot: Snapshot,
    pub outcome: RecordOutcome,
}

/// One operator's dashboard state: the journal, the last option chain and a
/// short status log. Created empty and dropped with the process.
pub struct DashboardSession<S> {
    source: S,
    journal: OiJournal,
    chain: Vec<StrikeRow>,
    spot: Option<f64>,
    status: VecDeque<String>,
}

impl<S: MarketSource> DashboardSession<S> {
    pub fn new(source: S, policy: CoarsePolicy) -> Self {
        Self {
            source,
            journal: OiJournal::new(policy),
            chain: Vec::new(),
            spot: None,
            status: VecDeque::new(),
        }
    }

    pub fn journal(&self) -> &OiJournal {
        &self.journal
    }

    pub fn chain(&self) -> &[StrikeRow] {
        &self.chain
    }

    pub fn spot(&self) -> Option<f64> {
        self.spot
    }

    pub fn status(&self) -> &VecDeque<String> {
        &self.status
    }

    pub async fn refresh(&mut self) -> Result<RefreshReport> {
        self.refresh_at(Utc::now()).await
    }

    /// Fetches one frame and logs it stamped with `now`. On any failure the
    /// journal is left untouched and the error lands in the status log.
    pub async fn refresh_at(&mut self, now: DateTime<Utc>) -> Result<RefreshReport> {
        match self.try_refresh(now).await {
            Ok(report) => {
                let s = &report.snapshot;
                let coarse = if report.outcome.coarse_appended {
                    " (+coarse)"
                } else {
                    ""
                };
                self.push_status(format!(
                    "[refresh] ltp {:.2} oi {:.0} -> {} / {}{coarse}",
                    s.ltp(),
                    s.oi(),
                    s.regime(),
                    s.signal()
                ));
                tracing::info!(
                    ltp = s.ltp(),
                    oi = s.oi(),
                    regime = s.regime().label(),
                    signal = s.signal().label(),
                    pcr = ?s.pcr(),
                    fine_len = report.outcome.fine_len,
                    coarse = report.outcome.coarse_appended,
                    "snapshot logged"
                );
                Ok(report)
            }
            Err(e) => {
                tracing::warn!(err = %format!("{e:#}"), "refresh skipped");
                self.push_status(format!("[refresh] error fetching data: {e:#}"));
                Err(e)
            }
        }
    }

    async fn try_refresh(&mut self, now: DateTime<Utc>) -> Result<RefreshReport> {
        let frame = self.source.fetch_frame().await?;
        let totals = ChainTotals::from_rows(&frame.chain);
        let snapshot = annotate(now, frame.futures, totals, self.journal.last());
        let outcome = self.journal.record(snapshot.clone())?;

        self.chain = frame.chain;
        if frame.spot.is_some() {
            self.spot = frame.spot;
        }
        Ok(RefreshReport { snapshot, outcome })
    }

    pub fn push_status(&mut self, line: String) {
        if self.status.len() >= MAX_STATUS_LINES {
            self.status.pop_front();
        }
        self.status.push_back(line);
    }
}
