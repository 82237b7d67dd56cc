use crate::engine::types::Snapshot;
use anyhow::{bail, Context, Result};
use chrono::{DateTime, Duration, Utc};
use std::str::FromStr;

/// When a fine-log record is also copied into the coarse log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoarsePolicy {
    /// Copy when the fine log length is a multiple of `n`.
    EveryNth(usize),
    /// Copy when at least this much time has passed since the last coarse entry.
    /// The very first record always lands in the coarse log.
    Elapsed(Duration),
}

impl Default for CoarsePolicy {
    fn default() -> Self {
        CoarsePolicy::Elapsed(Duration::minutes(15))
    }
}

impl CoarsePolicy {
    pub fn label(&self) -> String {
        match self {
            CoarsePolicy::EveryNth(n) => format!("every {n}"),
            CoarsePolicy::Elapsed(d) => {
                let secs = d.num_seconds();
                let mins = d.num_minutes();
                if secs % 60 != 0 || mins == 0 {
                    format!("{secs}s")
                } else if mins % 60 == 0 {
                    format!("{}h", mins / 60)
                } else {
                    format!("{mins}m")
                }
            }
        }
    }
}

impl FromStr for CoarsePolicy {
    type Err = anyhow::Error;

    // Accepts "every:3", "15m", "1h", "90s".
    fn from_str(s: &str) -> Result<Self> {
        let raw = s.trim().trim_matches(|c| c == '"' || c == '\'').to_lowercase();
        if let Some(n) = raw.strip_prefix("every:") {
            let n: usize = n
                .trim()
                .parse()
                .with_context(|| format!("invalid coarse count in '{s}'"))?;
            if n == 0 {
                bail!("coarse count must be positive: '{s}'");
            }
            return Ok(CoarsePolicy::EveryNth(n));
        }

        let digits = raw.trim_end_matches(|c: char| c.is_ascii_alphabetic()).len();
        let (num, unit) = raw.split_at(digits);
        let num: i64 = num.trim().parse().with_context(|| {
            format!("invalid coarse interval '{s}', expected e.g. 15m or every:3")
        })?;
        if num <= 0 {
            bail!("coarse interval must be positive: '{s}'");
        }
        let d = match unit {
            "s" | "sec" | "secs" => Duration::seconds(num),
            "m" | "min" | "mins" => Duration::minutes(num),
            "h" | "hr" | "hour" | "hours" => Duration::hours(num),
            other => bail!("invalid coarse interval unit '{other}' in '{s}'"),
        };
        Ok(CoarsePolicy::Elapsed(d))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordOutcome {
    pub fine_len: usize,
    pub coarse_appended: bool,
}

/// Fine and coarse snapshot logs for one dashboard session.
///
/// Both logs are append-only and never reordered; the coarse log holds copies
/// of fine entries chosen by the [`CoarsePolicy`].
#[derive(Debug, Clone, Default)]
pub struct OiJournal {
    policy: CoarsePolicy,
    fine: Vec<Snapshot>,
    coarse: Vec<Snapshot>,
    last_coarse_ts: Option<DateTime<Utc>>,
}

impl OiJournal {
    pub fn new(policy: CoarsePolicy) -> Self {
        Self {
            policy,
            fine: Vec::new(),
            coarse: Vec::new(),
            last_coarse_ts: None,
        }
    }

    pub fn policy(&self) -> CoarsePolicy {
        self.policy
    }

    pub fn fine(&self) -> &[Snapshot] {
        &self.fine
    }

    pub fn coarse(&self) -> &[Snapshot] {
        &self.coarse
    }

    pub fn last(&self) -> Option<&Snapshot> {
        self.fine.last()
    }

    pub fn record(&mut self, snapshot: Snapshot) -> Result<RecordOutcome> {
        if let Some(last) = self.fine.last() {
            if snapshot.ts() < last.ts() {
                bail!(
                    "snapshot at {} precedes last logged sample at {}",
                    snapshot.ts(),
                    last.ts()
                );
            }
        }

        let fine_len = self.fine.len() + 1;
        let coarse_appended = match self.policy {
            CoarsePolicy::EveryNth(n) => fine_len % n.max(1) == 0,
            CoarsePolicy::Elapsed(min_gap) => match self.last_coarse_ts {
                None => true,
                Some(prev) => snapshot.ts() - prev >= min_gap,
            },
        };

        if coarse_appended {
            self.last_coarse_ts = Some(snapshot.ts());
            self.coarse.push(snapshot.clone());
        }
        self.fine.push(snapshot);

        tracing::debug!(
            target: "journal",
            fine_len,
            coarse_len = self.coarse.len(),
            coarse_appended,
            "recorded snapshot"
        );

        Ok(RecordOutcome {
            fine_len,
            coarse_appended,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::types::{ChainTotals, FuturesQuote, Regime, Signal};
    use chrono::TimeZone;

    fn snap_at(ts: DateTime<Utc>, ltp: f64) -> Snapshot {
        Snapshot::new(
            ts,
            FuturesQuote {
                ltp,
                oi: 1000.0,
                volume: 0.0,
            },
            ChainTotals::default(),
            Regime::Neutral,
            Signal::Hold,
            None,
        )
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 6, 3, 45, 0).unwrap()
    }

    #[test]
    fn every_third_record_goes_coarse() {
        let mut j = OiJournal::new(CoarsePolicy::EveryNth(3));
        let mut hits = Vec::new();
        for i in 0..7 {
            let out = j
                .record(snap_at(t0() + Duration::minutes(5 * i), 100.0 + i as f64))
                .unwrap();
            if out.coarse_appended {
                hits.push(out.fine_len);
            }
        }
        assert_eq!(j.fine().len(), 7);
        assert_eq!(j.coarse().len(), 2);
        assert_eq!(hits, vec![3, 6]);
        assert_eq!(j.coarse()[0], j.fine()[2]);
        assert_eq!(j.coarse()[1], j.fine()[5]);
    }

    #[test]
    fn count_policy_length_is_floor_of_fine_over_n() {
        for total in 0..20usize {
            let mut j = OiJournal::new(CoarsePolicy::EveryNth(3));
            for i in 0..total {
                j.record(snap_at(t0() + Duration::minutes(i as i64), 1.0))
                    .unwrap();
            }
            assert_eq!(j.coarse().len(), total / 3);
        }
    }

    #[test]
    fn elapsed_policy_keeps_fifteen_minute_gaps() {
        let mut j = OiJournal::new(CoarsePolicy::default());
        // Irregular manual refreshes.
        let offsets = [0, 4, 9, 14, 15, 16, 29, 31, 33, 47, 60, 61];
        for m in offsets {
            j.record(snap_at(t0() + Duration::minutes(m), 1.0)).unwrap();
        }
        let coarse_ts: Vec<_> = j.coarse().iter().map(|s| s.ts()).collect();
        assert_eq!(
            coarse_ts,
            vec![
                t0(),
                t0() + Duration::minutes(15),
                t0() + Duration::minutes(31),
                t0() + Duration::minutes(47),
            ]
        );
        for w in coarse_ts.windows(2) {
            assert!(w[1] - w[0] >= Duration::minutes(15));
        }
    }

    #[test]
    fn rejects_out_of_order_timestamps() {
        let mut j = OiJournal::new(CoarsePolicy::EveryNth(1));
        j.record(snap_at(t0() + Duration::minutes(10), 1.0)).unwrap();
        assert!(j.record(snap_at(t0(), 2.0)).is_err());
        assert_eq!(j.fine().len(), 1);
        assert_eq!(j.coarse().len(), 1);

        // Equal timestamps are allowed.
        j.record(snap_at(t0() + Duration::minutes(10), 3.0)).unwrap();
        assert_eq!(j.fine().len(), 2);
    }

    #[test]
    fn logs_stay_sorted() {
        let mut j = OiJournal::new(CoarsePolicy::Elapsed(Duration::minutes(2)));
        for m in [0, 1, 1, 3, 4, 8, 8, 9] {
            j.record(snap_at(t0() + Duration::minutes(m), 1.0)).unwrap();
        }
        assert!(j.fine().windows(2).all(|w| w[0].ts() <= w[1].ts()));
        assert!(j.coarse().windows(2).all(|w| w[0].ts() <= w[1].ts()));
        assert!(j.coarse().iter().all(|c| j.fine().contains(c)));
    }

    #[test]
    fn parses_policy_strings() {
        assert_eq!("15m".parse::<CoarsePolicy>().unwrap(), CoarsePolicy::default());
        assert_eq!(
            "every:3".parse::<CoarsePolicy>().unwrap(),
            CoarsePolicy::EveryNth(3)
        );
        assert_eq!(
            "1h".parse::<CoarsePolicy>().unwrap(),
            CoarsePolicy::Elapsed(Duration::hours(1))
        );
        assert_eq!(
            " '90s' ".parse::<CoarsePolicy>().unwrap(),
            CoarsePolicy::Elapsed(Duration::seconds(90))
        );
        assert!("every:0".parse::<CoarsePolicy>().is_err());
        assert!("15".parse::<CoarsePolicy>().is_err());
        assert!("5d".parse::<CoarsePolicy>().is_err());
        assert!("-5m".parse::<CoarsePolicy>().is_err());
    }

    #[test]
    fn policy_labels() {
        assert_eq!(CoarsePolicy::default().label(), "15m");
        assert_eq!(CoarsePolicy::Elapsed(Duration::hours(2)).label(), "2h");
        assert_eq!(CoarsePolicy::EveryNth(3).label(), "every 3");
        assert_eq!(CoarsePolicy::Elapsed(Duration::seconds(90)).label(), "90s");
        assert_eq!(CoarsePolicy::Elapsed(Duration::seconds(45)).label(), "45s");
        assert_eq!(CoarsePolicy::Elapsed(Duration::seconds(120)).label(), "2m");
    }
}
