use crate::engine::types::Snapshot;
use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Duration, Local, Utc};
use plotters::prelude::*;
use std::path::Path;

/// (timestamp, pcr) pairs for every snapshot that has a defined PCR.
pub fn pcr_points(rows: &[Snapshot]) -> Vec<(DateTime<Utc>, f64)> {
    rows.iter()
        .filter_map(|s| s.pcr().map(|p| (s.ts(), p)))
        .collect()
}

fn y_bounds(points: &[(DateTime<Utc>, f64)]) -> (f64, f64) {
    let lo = points.iter().map(|(_, p)| *p).fold(f64::INFINITY, f64::min);
    let hi = points.iter().map(|(_, p)| *p).fold(f64::NEG_INFINITY, f64::max);
    let pad = ((hi - lo) * 0.1).max(0.05);
    (lo - pad, hi + pad)
}

/// Renders PCR over time as an SVG line chart. Returns `Ok(false)` without
/// touching `path` when no snapshot has a defined PCR.
pub fn render_pcr_chart(path: &Path, title: &str, rows: &[Snapshot]) -> Result<bool> {
    let points = pcr_points(rows);
    let Some(&(start, _)) = points.first() else {
        return Ok(false);
    };
    let end = points.last().map(|(t, _)| *t).unwrap_or(start);

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create chart dir {}", parent.display()))?;
    }

    // x is minutes since the first point; labels map back to wall-clock time.
    let span = ((end - start).num_seconds() as f64 / 60.0).max(1.0);
    let (y_lo, y_hi) = y_bounds(&points);
    let series: Vec<(f64, f64)> = points
        .iter()
        .map(|(t, p)| ((*t - start).num_seconds() as f64 / 60.0, *p))
        .collect();

    let root = SVGBackend::new(path, (960, 480)).into_drawing_area();
    root.fill(&WHITE).map_err(|e| anyhow!("chart fill: {e}"))?;

    let mut chart = ChartBuilder::on(&root)
        .caption(title, ("sans-serif", 22))
        .margin(12)
        .x_label_area_size(36)
        .y_label_area_size(52)
        .build_cartesian_2d(0f64..span, y_lo..y_hi)
        .map_err(|e| anyhow!("chart layout: {e}"))?;

    chart
        .configure_mesh()
        .x_desc("time")
        .y_desc("PCR")
        .x_label_formatter(&|m| {
            let t = start + Duration::seconds((*m * 60.0) as i64);
            t.with_timezone(&Local).format("%H:%M").to_string()
        })
        .draw()
        .map_err(|e| anyhow!("chart mesh: {e}"))?;

    chart
        .draw_series(LineSeries::new(series.iter().copied(), &BLUE))
        .map_err(|e| anyhow!("chart line: {e}"))?;
    chart
        .draw_series(series.iter().map(|&(x, y)| Circle::new((x, y), 3, BLUE.filled())))
        .map_err(|e| anyhow!("chart markers: {e}"))?;

    root.present().map_err(|e| anyhow!("chart write: {e}"))?;
    tracing::info!(path = %path.display(), points = series.len(), "rendered pcr chart");
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::types::{ChainTotals, FuturesQuote, Regime, Signal};
    use chrono::TimeZone;

    fn snap(min: i64, pcr: Option<f64>) -> Snapshot {
        Snapshot::new(
            Utc.with_ymd_and_hms(2025, 1, 6, 4, 0, 0).unwrap() + Duration::minutes(min),
            FuturesQuote::default(),
            ChainTotals::default(),
            Regime::Neutral,
            Signal::Hold,
            pcr,
        )
    }

    #[test]
    fn skips_undefined_pcr() {
        let rows = vec![snap(0, Some(0.9)), snap(5, None), snap(10, Some(1.2))];
        let pts = pcr_points(&rows);
        assert_eq!(pts.len(), 2);
        assert_eq!(pts[1].1, 1.2);
        assert_eq!(pts[1].0 - pts[0].0, Duration::minutes(10));
    }

    #[test]
    fn bounds_are_padded() {
        let rows = vec![snap(0, Some(1.0)), snap(5, Some(1.0))];
        let (lo, hi) = y_bounds(&pcr_points(&rows));
        assert!(lo < 1.0 && hi > 1.0);
    }

    #[test]
    fn no_points_no_chart() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pcr.svg");
        let rows = vec![snap(0, None)];
        assert!(!render_pcr_chart(&path, "PCR", &rows).unwrap());
        assert!(!path.exists());
    }

    #[test]
    fn renders_line_for_defined_pcr() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("charts").join("pcr.svg");
        let rows = vec![
            snap(0, Some(0.8)),
            snap(5, Some(0.9)),
            snap(10, None),
            snap(15, Some(1.0)),
            snap(20, Some(1.1)),
        ];
        assert!(render_pcr_chart(&path, "NIFTY PCR", &rows).unwrap());
        let svg = std::fs::read_to_string(&path).unwrap();
        assert!(svg.contains("<svg"));
        assert!(svg.contains("polyline"));
    }
}
