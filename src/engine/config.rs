use crate::engine::journal::CoarsePolicy;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
pub struct DashboardConfig {
    pub symbol: String,
    pub index_name: String,
    pub base_url: String,
    pub coarse_policy: CoarsePolicy,
    pub refresh_every: Option<Duration>,
    pub http_timeout: Duration,
    pub export_dir: PathBuf,
    pub export_prefix: String,
    pub log_file: PathBuf,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            symbol: "NIFTY".to_string(),
            index_name: "NIFTY 50".to_string(),
            base_url: "https://www.nseindia.com/".to_string(),
            coarse_policy: CoarsePolicy::default(),
            refresh_every: None,
            http_timeout: Duration::from_secs(10),
            export_dir: PathBuf::from("."),
            export_prefix: "OIAnalysisDashboard".to_string(),
            log_file: PathBuf::from("logs/oi_console.log"),
        }
    }
}

impl DashboardConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|k| std::env::var(k).ok())
    }

    /// Builds the config from any key lookup. Unparseable values keep their default.
    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Self {
        let d = Self::default();
        let non_empty = |k: &str| get(k).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let coarse_policy = match non_empty("OI_COARSE_POLICY") {
            Some(raw) => raw.parse().unwrap_or_else(|e| {
                tracing::warn!(value = %raw, err = %e, "bad OI_COARSE_POLICY, using default");
                d.coarse_policy
            }),
            None => d.coarse_policy,
        };

        let refresh_every = non_empty("OI_REFRESH_SECS")
            .and_then(|v| v.parse::<u64>().ok())
            .filter(|s| *s > 0)
            .map(Duration::from_secs);

        let http_timeout = non_empty("OI_HTTP_TIMEOUT_SECS")
            .and_then(|v| v.parse::<u64>().ok())
            .filter(|s| *s > 0)
            .map(Duration::from_secs)
            .unwrap_or(d.http_timeout);

        Self {
            symbol: non_empty("OI_SYMBOL")
                .map(|s| s.to_uppercase())
                .unwrap_or(d.symbol),
            index_name: non_empty("OI_INDEX_NAME").unwrap_or(d.index_name),
            base_url: non_empty("OI_BASE_URL").unwrap_or(d.base_url),
            coarse_policy,
            refresh_every,
            http_timeout,
            export_dir: non_empty("OI_EXPORT_DIR")
                .map(PathBuf::from)
                .unwrap_or(d.export_dir),
            export_prefix: non_empty("OI_EXPORT_PREFIX").unwrap_or(d.export_prefix),
            log_file: non_empty("OI_LOG_FILE")
                .map(PathBuf::from)
                .unwrap_or(d.log_file),
        }
    }

    pub fn chart_path(&self) -> PathBuf {
        self.export_dir.join(format!("{}_pcr.svg", self.export_prefix))
    }
}
