use crate::engine::types::{FuturesQuote, MarketFrame, OptionLeg, StrikeRow};
use anyhow::{anyhow, Context, Result};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, REFERER, USER_AGENT};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::future::Future;
use std::time::Duration;
use url::Url;

/// Anything that can produce one [`MarketFrame`] per refresh.
pub trait MarketSource {
    fn fetch_frame(&self) -> impl Future<Output = Result<MarketFrame>> + Send;
}

/// NSE JSON API client. The API rejects requests without the cookies the
/// site root hands out, so every fetch primes the cookie jar first.
#[derive(Clone)]
pub struct NseClient {
    http: reqwest::Client,
    base_url: Url,
    symbol: String,
    index_name: String,
}

impl NseClient {
    pub fn new(base_url: &str, symbol: &str, index_name: &str, timeout: Duration) -> Result<Self> {
        let base_url = Url::parse(base_url).context("invalid nse base url")?;

        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static("Mozilla/5.0"));
        headers.insert(ACCEPT, HeaderValue::from_static("*/*"));
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.9"));
        let referer = HeaderValue::from_str(base_url.as_str()).context("nse referer header")?;
        headers.insert(REFERER, referer);

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .cookie_store(true)
            .timeout(timeout)
            .build()
            .context("build nse http client")?;

        Ok(Self {
            http,
            base_url,
            symbol: symbol.to_string(),
            index_name: index_name.to_string(),
        })
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub async fn prime_session(&self) -> Result<()> {
        self.http
            .get(self.base_url.clone())
            .send()
            .await
            .context("nse session request failed")?
            .error_for_status()
            .context("nse session non-200")?;
        Ok(())
    }

    pub async fn get_futures_quote(&self) -> Result<FuturesQuote> {
        let url = self.api_url("api/quote-derivative", Some(&self.symbol))?;
        let raw: QuoteDerivative = self.get_json(url, "quote-derivative").await?;
        raw.into_futures_quote()
    }

    pub async fn get_option_chain(&self) -> Result<Vec<StrikeRow>> {
        let url = self.api_url("api/option-chain-indices", Some(&self.symbol))?;
        let raw: OptionChain = self.get_json(url, "option-chain").await?;
        Ok(raw.into_rows())
    }

    pub async fn get_index_last(&self) -> Result<f64> {
        let url = self.api_url("api/marketStatus", None)?;
        let raw: MarketStatus = self.get_json(url, "marketStatus").await?;
        raw.index_last(&self.index_name)
            .ok_or_else(|| anyhow!("index '{}' not in marketStatus", self.index_name))
    }

    fn api_url(&self, path: &str, symbol: Option<&str>) -> Result<Url> {
        let mut url = self
            .base_url
            .join(path)
            .with_context(|| format!("build nse url {path}"))?;
        if let Some(symbol) = symbol {
            url.query_pairs_mut().append_pair("symbol", symbol);
        }
        Ok(url)
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url, label: &'static str) -> Result<T> {
        self.http
            .get(url)
            .send()
            .await
            .with_context(|| format!("nse {label} request failed"))?
            .error_for_status()
            .with_context(|| format!("nse {label} non-200"))?
            .json()
            .await
            .with_context(|| format!("nse {label} json decode failed"))
    }
}

impl MarketSource for NseClient {
    async fn fetch_frame(&self) -> Result<MarketFrame> {
        self.prime_session().await?;
        let futures = self.get_futures_quote().await?;
        let chain = self.get_option_chain().await?;
        let spot = match self.get_index_last().await {
            Ok(v) => Some(v),
            Err(e) => {
                tracing::warn!(index = %self.index_name, err = %e, "spot level unavailable");
                None
            }
        };
        Ok(MarketFrame {
            futures,
            chain,
            spot,
        })
    }
}

// NSE serves numbers either as JSON numbers or as strings; anything else is 0.
fn lenient_f64<'de, D>(de: D) -> std::result::Result<f64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let v = Option::<serde_json::Value>::deserialize(de)?;
    Ok(match v {
        Some(serde_json::Value::Number(n)) => n.as_f64().unwrap_or(0.0),
        Some(serde_json::Value::String(s)) => s.trim().replace(',', "").parse().unwrap_or(0.0),
        _ => 0.0,
    })
}

#[derive(Debug, Deserialize)]
struct QuoteDerivative {
    #[serde(default)]
    stocks: Vec<QuoteStock>,
}

#[derive(Debug, Deserialize)]
struct QuoteStock {
    #[serde(default)]
    metadata: Option<QuoteMetadata>,
}

#[derive(Debug, Deserialize)]
struct QuoteMetadata {
    #[serde(default, rename = "lastPrice", alias = "last", deserialize_with = "lenient_f64")]
    last_price: f64,
    #[serde(default, rename = "openInterest", deserialize_with = "lenient_f64")]
    open_interest: f64,
    #[serde(
        default,
        rename = "numberOfContractsTraded",
        deserialize_with = "lenient_f64"
    )]
    contracts_traded: f64,
}

impl QuoteDerivative {
    // The first listed contract is the near-month future.
    fn into_futures_quote(self) -> Result<FuturesQuote> {
        let meta = self
            .stocks
            .into_iter()
            .find_map(|s| s.metadata)
            .context("quote-derivative has no contract metadata")?;
        Ok(FuturesQuote {
            ltp: meta.last_price,
            oi: meta.open_interest,
            volume: meta.contracts_traded,
        })
    }
}

#[derive(Debug, Deserialize)]
struct OptionChain {
    records: OptionRecords,
}

#[derive(Debug, Deserialize)]
struct OptionRecords {
    #[serde(default)]
    data: Vec<OptionRecord>,
}

#[derive(Debug, Deserialize)]
struct OptionRecord {
    #[serde(default, rename = "strikePrice", deserialize_with = "lenient_f64")]
    strike_price: f64,
    #[serde(default, rename = "CE")]
    ce: Option<RawLeg>,
    #[serde(default, rename = "PE")]
    pe: Option<RawLeg>,
}

#[derive(Debug, Deserialize)]
struct RawLeg {
    #[serde(default, rename = "openInterest", deserialize_with = "lenient_f64")]
    open_interest: f64,
    #[serde(default, rename = "changeinOpenInterest", deserialize_with = "lenient_f64")]
    change_in_open_interest: f64,
}

impl From<RawLeg> for OptionLeg {
    fn from(raw: RawLeg) -> Self {
        OptionLeg {
            open_interest: raw.open_interest,
            change_in_open_interest: raw.change_in_open_interest,
        }
    }
}

impl OptionChain {
    fn into_rows(self) -> Vec<StrikeRow> {
        self.records
            .data
            .into_iter()
            .map(|r| StrikeRow {
                strike: r.strike_price,
                ce: r.ce.map(OptionLeg::from),
                pe: r.pe.map(OptionLeg::from),
            })
            .collect()
    }
}

#[derive(Debug, Deserialize)]
struct MarketStatus {
    #[serde(default, rename = "marketState")]
    market_state: Vec<MarketState>,
}

#[derive(Debug, Deserialize)]
struct MarketState {
    #[serde(default)]
    index: Option<String>,
    #[serde(default, deserialize_with = "lenient_f64")]
    last: f64,
}

impl MarketStatus {
    fn index_last(&self, index_name: &str) -> Option<f64> {
        self.market_state
            .iter()
            .find(|m| m.index.as_deref() == Some(index_name))
            .map(|m| m.last)
    }
}
