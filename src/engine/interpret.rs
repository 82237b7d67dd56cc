//! Price x open-interest interpretation.
//!
//! Canonical table (futures LTP change vs futures OI change):
//!
//! | price | OI   | regime          | signal |
//! |-------|------|-----------------|--------|
//! | up    | up   | Long Buildup    | Buy    |
//! | down  | up   | Short Buildup   | Sell   |
//! | down  | down | Long Unwinding  | Sell   |
//! | up    | down | Short Covering  | Buy    |
//! | flat on either axis | | Neutral | Hold   |
//!
//! Without a previous sample the result is `N/A` / `Hold`.

use crate::engine::types::{ChainTotals, FuturesQuote, Reading, Regime, Signal, Snapshot};
use chrono::{DateTime, Utc};
use std::cmp::Ordering;

pub fn interpret(current: &Reading, previous: Option<&Reading>) -> (Regime, Signal) {
    let Some(previous) = previous else {
        return (Regime::NotApplicable, Signal::Hold);
    };

    let price = direction(current.ltp - previous.ltp);
    let oi = direction(current.oi - previous.oi);

    match (price, oi) {
        (Ordering::Greater, Ordering::Greater) => (Regime::LongBuildup, Signal::Buy),
        (Ordering::Less, Ordering::Greater) => (Regime::ShortBuildup, Signal::Sell),
        (Ordering::Less, Ordering::Less) => (Regime::LongUnwinding, Signal::Sell),
        (Ordering::Greater, Ordering::Less) => (Regime::ShortCovering, Signal::Buy),
        _ => (Regime::Neutral, Signal::Hold),
    }
}

// NaN deltas (bad upstream numbers) count as flat.
fn direction(delta: f64) -> Ordering {
    delta.partial_cmp(&0.0).unwrap_or(Ordering::Equal)
}

/// `put / call`, or `None` when the call side is zero or the result is not finite.
pub fn put_call_ratio(put: f64, call: f64) -> Option<f64> {
    if call == 0.0 {
        return None;
    }
    let ratio = put / call;
    ratio.is_finite().then_some(ratio)
}

/// Interprets `futures` against the previous sample and builds the annotated snapshot.
/// PCR is taken over the chain-wide OI changes.
pub fn annotate(
    ts: DateTime<Utc>,
    futures: FuturesQuote,
    totals: ChainTotals,
    previous: Option<&Snapshot>,
) -> Snapshot {
    let current = Reading {
        ltp: futures.ltp,
        oi: futures.oi,
    };
    let prev_reading = previous.map(Snapshot::reading);
    let (regime, signal) = interpret(&current, prev_reading.as_ref());
    let pcr = put_call_ratio(totals.pe_oi_change, totals.ce_oi_change);

    tracing::debug!(
        target: "interpret",
        ltp = current.ltp,
        oi = current.oi,
        regime = regime.label(),
        signal = signal.label(),
        pcr = ?pcr,
        "annotated"
    );

    Snapshot::new(ts, futures, totals, regime, signal, pcr)
}
