//! Workbook export: one `<prefix>.xlsx` with the fine log, the coarse log and
//! the last option chain as named sheets.

use crate::engine::journal::OiJournal;
use crate::engine::types::{Snapshot, StrikeRow};
use anyhow::{Context, Result};
use chrono::Local;
use rust_xlsxwriter::{Workbook, Worksheet};
use std::path::{Path, PathBuf};

pub const FINE_SHEET: &str = "FiveMin";
pub const COARSE_SHEET: &str = "FifteenMin";
pub const CHAIN_SHEET: &str = "OptionChain";

const SNAPSHOT_COLUMNS: [&str; 11] = [
    "Timestamp",
    "LTP",
    "OI",
    "Volume",
    "CE OI",
    "PE OI",
    "CE OI Change",
    "PE OI Change",
    "Interpretation",
    "Signal",
    "PCR",
];

const CHAIN_COLUMNS: [&str; 5] = [
    "Strike Price",
    "Call OI",
    "Put OI",
    "Call OI Change",
    "Put OI Change",
];

pub fn workbook_path(dir: &Path, prefix: &str) -> PathBuf {
    dir.join(format!("{prefix}.xlsx"))
}

/// Writes the fine log, the coarse log and the last option chain into one
/// workbook and returns its path.
pub fn export_workbook(
    dir: &Path,
    prefix: &str,
    journal: &OiJournal,
    chain: &[StrikeRow],
) -> Result<PathBuf> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("create export dir {}", dir.display()))?;

    let mut workbook = Workbook::new();
    write_snapshot_sheet(workbook.add_worksheet(), FINE_SHEET, journal.fine())?;
    write_snapshot_sheet(workbook.add_worksheet(), COARSE_SHEET, journal.coarse())?;
    write_chain_sheet(workbook.add_worksheet(), chain)?;

    let path = workbook_path(dir, prefix);
    workbook
        .save(&path)
        .with_context(|| format!("save workbook {}", path.display()))?;

    tracing::info!(
        path = %path.display(),
        fine_rows = journal.fine().len(),
        coarse_rows = journal.coarse().len(),
        chain_rows = chain.len(),
        "exported workbook"
    );
    Ok(path)
}

/// One snapshot as display strings, in sheet column order.
pub fn snapshot_record(s: &Snapshot) -> [String; 11] {
    let t = s.totals();
    [
        local_time(s),
        format!("{:.2}", s.ltp()),
        format!("{:.0}", s.oi()),
        format!("{:.0}", s.volume()),
        format!("{:.0}", t.ce_oi),
        format!("{:.0}", t.pe_oi),
        format!("{:.0}", t.ce_oi_change),
        format!("{:.0}", t.pe_oi_change),
        s.regime().label().to_string(),
        s.signal().label().to_string(),
        s.pcr().map(|v| format!("{v:.4}")).unwrap_or_default(),
    ]
}

fn local_time(s: &Snapshot) -> String {
    s.ts()
        .with_timezone(&Local)
        .format("%Y-%m-%d %H:%M:%S")
        .to_string()
}

fn write_header(sheet: &mut Worksheet, columns: &[&str]) -> Result<()> {
    for (col, name) in columns.iter().enumerate() {
        sheet.write_string(0, col as u16, *name)?;
    }
    Ok(())
}

fn write_snapshot_sheet(sheet: &mut Worksheet, name: &str, rows: &[Snapshot]) -> Result<()> {
    sheet
        .set_name(name)
        .with_context(|| format!("name sheet {name}"))?;
    write_header(sheet, &SNAPSHOT_COLUMNS)?;
    for (i, s) in rows.iter().enumerate() {
        let row = i as u32 + 1;
        let t = s.totals();
        sheet.write_string(row, 0, local_time(s))?;
        let numbers = [
            s.ltp(),
            s.oi(),
            s.volume(),
            t.ce_oi,
            t.pe_oi,
            t.ce_oi_change,
            t.pe_oi_change,
        ];
        for (col, v) in numbers.into_iter().enumerate() {
            sheet.write_number(row, col as u16 + 1, v)?;
        }
        sheet.write_string(row, 8, s.regime().label())?;
        sheet.write_string(row, 9, s.signal().label())?;
        // Undefined PCR stays a blank cell.
        if let Some(pcr) = s.pcr() {
            sheet.write_number(row, 10, pcr)?;
        }
    }
    Ok(())
}

fn write_chain_sheet(sheet: &mut Worksheet, rows: &[StrikeRow]) -> Result<()> {
    sheet
        .set_name(CHAIN_SHEET)
        .with_context(|| format!("name sheet {CHAIN_SHEET}"))?;
    write_header(sheet, &CHAIN_COLUMNS)?;
    for (i, r) in rows.iter().enumerate() {
        let row = i as u32 + 1;
        let ce = r.ce.unwrap_or_default();
        let pe = r.pe.unwrap_or_default();
        let values = [
            r.strike,
            ce.open_interest,
            pe.open_interest,
            ce.change_in_open_interest,
            pe.change_in_open_interest,
        ];
        for (col, v) in values.into_iter().enumerate() {
            sheet.write_number(row, col as u16, v)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::journal::CoarsePolicy;
    use crate::engine::types::{ChainTotals, FuturesQuote, OptionLeg, Regime, Signal};
    use calamine::{open_workbook, Data, Range, Reader, Xlsx};
    use chrono::{Duration, TimeZone, Utc};

    fn snap(min: i64, pcr: Option<f64>) -> Snapshot {
        Snapshot::new(
            Utc.with_ymd_and_hms(2025, 1, 6, 4, 0, 0).unwrap() + Duration::minutes(min),
            FuturesQuote {
                ltp: 23651.5,
                oi: 123450.0,
                volume: 84213.0,
            },
            ChainTotals {
                ce_oi: 1.0,
                pe_oi: 2.0,
                ce_oi_change: 3.0,
                pe_oi_change: 4.0,
            },
            Regime::ShortCovering,
            Signal::Buy,
            pcr,
        )
    }

    fn open(path: &Path) -> Xlsx<std::io::BufReader<std::fs::File>> {
        open_workbook(path).unwrap()
    }

    fn header(range: &Range<Data>) -> Vec<Data> {
        range.rows().next().unwrap().to_vec()
    }

    fn text(s: &str) -> Data {
        Data::String(s.to_string())
    }

    #[test]
    fn writes_one_workbook_with_named_sheets() {
        let dir = tempfile::tempdir().unwrap();
        let mut journal = OiJournal::new(CoarsePolicy::EveryNth(2));
        journal.record(snap(0, Some(1.25))).unwrap();
        journal.record(snap(5, None)).unwrap();
        journal.record(snap(10, Some(0.5))).unwrap();
        let chain = vec![StrikeRow {
            strike: 23500.0,
            ce: Some(OptionLeg {
                open_interest: 10.0,
                change_in_open_interest: -2.0,
            }),
            pe: None,
        }];

        let path = export_workbook(dir.path(), "OIAnalysisDashboard", &journal, &chain).unwrap();
        assert_eq!(path, dir.path().join("OIAnalysisDashboard.xlsx"));

        let mut wb = open(&path);
        assert_eq!(
            wb.sheet_names(),
            vec![FINE_SHEET, COARSE_SHEET, CHAIN_SHEET]
        );

        let fine = wb.worksheet_range(FINE_SHEET).unwrap();
        assert_eq!(fine.height(), 4);
        assert_eq!(header(&fine), SNAPSHOT_COLUMNS.map(text).to_vec());
        assert_eq!(fine.get_value((1, 1)), Some(&Data::Float(23651.5)));
        assert_eq!(fine.get_value((1, 8)), Some(&text("Short Covering")));
        assert_eq!(fine.get_value((1, 9)), Some(&text("Buy")));
        assert_eq!(fine.get_value((1, 10)), Some(&Data::Float(1.25)));
        assert_eq!(fine.get_value((2, 10)), Some(&Data::Empty));

        let coarse = wb.worksheet_range(COARSE_SHEET).unwrap();
        assert_eq!(coarse.height(), 2);
        assert_eq!(coarse.get_value((1, 10)), Some(&Data::Empty));

        let chain_sheet = wb.worksheet_range(CHAIN_SHEET).unwrap();
        assert_eq!(header(&chain_sheet), CHAIN_COLUMNS.map(text).to_vec());
        let row: Vec<Data> = chain_sheet.rows().nth(1).unwrap().to_vec();
        assert_eq!(
            row,
            [23500.0, 10.0, 0.0, -2.0, 0.0].map(Data::Float).to_vec()
        );
    }

    #[test]
    fn empty_logs_still_get_headers() {
        let dir = tempfile::tempdir().unwrap();
        let journal = OiJournal::new(CoarsePolicy::default());
        let path = export_workbook(&dir.path().join("nested"), "x", &journal, &[]).unwrap();
        let mut wb = open(&path);
        for name in [FINE_SHEET, COARSE_SHEET, CHAIN_SHEET] {
            assert_eq!(wb.worksheet_range(name).unwrap().height(), 1);
        }
    }

    #[test]
    fn record_formats_pcr_and_blank() {
        let r = snapshot_record(&snap(0, Some(1.33333)));
        assert_eq!(r[1], "23651.50");
        assert_eq!(r[10], "1.3333");
        assert_eq!(snapshot_record(&snap(0, None))[10], "");
    }
}
