use chrono::{DateTime, Utc};
use std::fmt;

/// Buildup/unwinding label derived from price change x OI change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Regime {
    NotApplicable,
    LongBuildup,
    ShortBuildup,
    LongUnwinding,
    ShortCovering,
    Neutral,
}

impl Regime {
    pub fn label(self) -> &'static str {
        match self {
            Regime::NotApplicable => "N/A",
            Regime::LongBuildup => "Long Buildup",
            Regime::ShortBuildup => "Short Buildup",
            Regime::LongUnwinding => "Long Unwinding",
            Regime::ShortCovering => "Short Covering",
            Regime::Neutral => "Neutral",
        }
    }
}

impl fmt::Display for Regime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Signal {
    Buy,
    Sell,
    Hold,
}

impl Signal {
    pub fn label(self) -> &'static str {
        match self {
            Signal::Buy => "Buy",
            Signal::Sell => "Sell",
            Signal::Hold => "Hold",
        }
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// The two numbers the interpreter compares between consecutive samples.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Reading {
    pub ltp: f64,
    pub oi: f64,
}

/// Futures leg of one refresh.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FuturesQuote {
    pub ltp: f64,
    pub oi: f64,
    pub volume: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct OptionLeg {
    pub open_interest: f64,
    pub change_in_open_interest: f64,
}

/// One strike of the option chain. A side the upstream omitted is `None`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StrikeRow {
    pub strike: f64,
    pub ce: Option<OptionLeg>,
    pub pe: Option<OptionLeg>,
}

/// Chain-wide OI totals summed over every strike.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ChainTotals {
    pub ce_oi: f64,
    pub pe_oi: f64,
    pub ce_oi_change: f64,
    pub pe_oi_change: f64,
}

impl ChainTotals {
    pub fn from_rows(rows: &[StrikeRow]) -> Self {
        let mut out = Self::default();
        for row in rows {
            if let Some(ce) = row.ce {
                out.ce_oi += ce.open_interest;
                out.ce_oi_change += ce.change_in_open_interest;
            }
            if let Some(pe) = row.pe {
                out.pe_oi += pe.open_interest;
                out.pe_oi_change += pe.change_in_open_interest;
            }
        }
        out
    }
}

/// Everything one refresh pulls from upstream, before interpretation.
#[derive(Debug, Clone, Default)]
pub struct MarketFrame {
    pub futures: FuturesQuote,
    pub chain: Vec<StrikeRow>,
    pub spot: Option<f64>,
}

/// An annotated sample. Built once by [`Snapshot::new`], read-only afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    ts: DateTime<Utc>,
    futures: FuturesQuote,
    totals: ChainTotals,
    regime: Regime,
    signal: Signal,
    pcr: Option<f64>,
}

impl Snapshot {
    pub fn new(
        ts: DateTime<Utc>,
        futures: FuturesQuote,
        totals: ChainTotals,
        regime: Regime,
        signal: Signal,
        pcr: Option<f64>,
    ) -> Self {
        Self {
            ts,
            futures,
            totals,
            regime,
            signal,
            pcr,
        }
    }

    pub fn ts(&self) -> DateTime<Utc> {
        self.ts
    }

    pub fn ltp(&self) -> f64 {
        self.futures.ltp
    }

    pub fn oi(&self) -> f64 {
        self.futures.oi
    }

    pub fn volume(&self) -> f64 {
        self.futures.volume
    }

    pub fn totals(&self) -> &ChainTotals {
        &self.totals
    }

    pub fn regime(&self) -> Regime {
        self.regime
    }

    pub fn signal(&self) -> Signal {
        self.signal
    }

    pub fn pcr(&self) -> Option<f64> {
        self.pcr
    }

    pub fn reading(&self) -> Reading {
        Reading {
            ltp: self.futures.ltp,
            oi: self.futures.oi,
        }
    }
}
