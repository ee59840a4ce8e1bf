// src/market.rs
use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use reqwest::Client;
use serde::Deserialize;

use crate::models::{ChartPoint, StockDetail, StockQuote};

type FetchResult<T> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

const CHART_URL: &str = "https://query1.finance.yahoo.com/v8/finance/chart";

/// Popular tickers the stock list endpoint samples from.
pub const STOCK_SYMBOLS: [&str; 27] = [
    "AAPL", "MSFT", "GOOGL", "AMZN", "TSLA", "META", "NVDA", "NFLX", "DIS", "V", "JPM", "WMT",
    "MA", "PG", "JNJ", "HD", "BAC", "ADBE", "PYPL", "NKE", "CMCSA", "XOM", "CSCO", "PFE", "VZ",
    "COST", "MRK",
];

/// Company names for the best-known tickers; anything else renders as
/// "<SYMBOL> Inc.".
pub fn stock_name(symbol: &str) -> String {
    match symbol {
        "AAPL" => "Apple Inc.",
        "MSFT" => "Microsoft Corporation",
        "GOOGL" => "Alphabet Inc.",
        "AMZN" => "Amazon.com Inc.",
        "TSLA" => "Tesla, Inc.",
        "META" => "Meta Platforms, Inc.",
        "NVDA" => "NVIDIA Corporation",
        "NFLX" => "Netflix, Inc.",
        "DIS" => "The Walt Disney Company",
        "V" => "Visa Inc.",
        _ => return format!("{} Inc.", symbol),
    }
    .to_string()
}

/// Chart range parameter to number of mock days.
pub fn range_to_days(range: &str) -> i64 {
    match range {
        "1d" => 1,
        "5d" => 5,
        "1mo" => 30,
        "3mo" => 90,
        "6mo" => 180,
        "1y" => 365,
        _ => 30,
    }
}

#[derive(Deserialize)]
struct ChartResponse {
    chart: ChartEnvelope,
}

#[derive(Deserialize)]
struct ChartEnvelope {
    result: Option<Vec<ChartResult>>,
}

#[derive(Deserialize)]
struct ChartResult {
    meta: Option<ChartMeta>,
    timestamp: Option<Vec<i64>>,
    indicators: Option<Indicators>,
}

#[derive(Deserialize)]
struct ChartMeta {
    symbol: Option<String>,
    #[serde(rename = "longName")]
    long_name: Option<String>,
    #[serde(rename = "shortName")]
    short_name: Option<String>,
    #[serde(rename = "regularMarketPrice")]
    regular_market_price: Option<f64>,
    #[serde(rename = "previousClose")]
    previous_close: Option<f64>,
    #[serde(rename = "regularMarketDayHigh")]
    regular_market_day_high: Option<f64>,
    #[serde(rename = "regularMarketDayLow")]
    regular_market_day_low: Option<f64>,
    #[serde(rename = "regularMarketOpen")]
    regular_market_open: Option<f64>,
    #[serde(rename = "regularMarketVolume")]
    regular_market_volume: Option<u64>,
    #[serde(rename = "marketCap")]
    market_cap: Option<u64>,
}

#[derive(Deserialize)]
struct Indicators {
    quote: Option<Vec<QuoteBlock>>,
}

#[derive(Deserialize, Default)]
struct QuoteBlock {
    close: Option<Vec<Option<f64>>>,
    volume: Option<Vec<Option<u64>>>,
}

async fn fetch_chart(client: &Client, path: &str, query: &str) -> FetchResult<ChartResponse> {
    let url = format!("{}/{}?{}", CHART_URL, path, query);
    let response = client
        .get(&url)
        .header("User-Agent", "Mozilla/5.0")
        .send()
        .await?;
    if !response.status().is_success() {
        return Err(format!("chart request failed: HTTP {}", response.status()).into());
    }
    Ok(response.json::<ChartResponse>().await?)
}

/// Fetch current quotes for a batch of symbols. Symbols the provider has no
/// usable meta for are skipped; callers fall back to mock data when nothing
/// comes back.
pub async fn fetch_quotes(client: &Client, symbols: &[&str]) -> FetchResult<Vec<StockQuote>> {
    let parsed = fetch_chart(client, &symbols.join(","), "interval=1d&range=1d").await?;

    let mut quotes = Vec::new();
    for (index, result) in parsed
        .chart
        .result
        .unwrap_or_default()
        .into_iter()
        .enumerate()
    {
        let meta = match result.meta {
            Some(meta) => meta,
            None => continue,
        };
        let (price, previous_close) = match (meta.regular_market_price, meta.previous_close) {
            (Some(price), Some(previous_close)) => (price, previous_close),
            _ => continue,
        };
        let symbol = meta
            .symbol
            .or_else(|| symbols.get(index).map(|s| s.to_string()))
            .unwrap_or_default();
        let change = price - previous_close;
        let change_percent = change / previous_close * 100.0;
        quotes.push(StockQuote {
            name: meta.long_name.unwrap_or_else(|| symbol.clone()),
            symbol,
            price: round2(price),
            change: round2(change),
            change_percent: round2(change_percent),
        });
    }
    Ok(quotes)
}

/// Fetch the detail view for one symbol. `Ok(None)` means the provider
/// answered but had nothing for the symbol.
pub async fn fetch_detail(client: &Client, symbol: &str) -> FetchResult<Option<StockDetail>> {
    let parsed = fetch_chart(client, symbol, "interval=1d&range=1d").await?;

    let result = match parsed.chart.result.and_then(|mut r| {
        if r.is_empty() {
            None
        } else {
            Some(r.remove(0))
        }
    }) {
        Some(result) => result,
        None => return Ok(None),
    };
    let meta = match result.meta {
        Some(meta) => meta,
        None => return Ok(None),
    };

    let price = meta
        .regular_market_price
        .or(meta.previous_close)
        .unwrap_or(0.0);
    let previous_close = meta.previous_close.unwrap_or(price);
    let change = price - previous_close;
    let change_percent = if previous_close > 0.0 {
        change / previous_close * 100.0
    } else {
        0.0
    };

    Ok(Some(StockDetail {
        symbol: meta.symbol.unwrap_or_else(|| symbol.to_string()),
        name: meta
            .long_name
            .or(meta.short_name)
            .unwrap_or_else(|| symbol.to_string()),
        price: round2(price),
        change: round2(change),
        change_percent: round2(change_percent),
        high: round2(meta.regular_market_day_high.or(meta.previous_close).unwrap_or(0.0)),
        low: round2(meta.regular_market_day_low.or(meta.previous_close).unwrap_or(0.0)),
        open: round2(meta.regular_market_open.or(meta.previous_close).unwrap_or(0.0)),
        volume: meta.regular_market_volume.unwrap_or(0),
        market_cap: meta.market_cap,
        previous_close: round2(previous_close),
    }))
}

/// Fetch the daily close series for a symbol over a provider range
/// (`1d`, `5d`, `1mo`, `3mo`, `6mo`, `1y`). Zero-price points are dropped.
pub async fn fetch_history(
    client: &Client,
    symbol: &str,
    range: &str,
) -> FetchResult<Vec<ChartPoint>> {
    let parsed = fetch_chart(client, symbol, &format!("interval=1d&range={}", range)).await?;

    let mut points = Vec::new();
    let result = match parsed.chart.result.and_then(|mut r| {
        if r.is_empty() {
            None
        } else {
            Some(r.remove(0))
        }
    }) {
        Some(result) => result,
        None => return Ok(points),
    };

    let timestamps = result.timestamp.unwrap_or_default();
    let quote = result
        .indicators
        .and_then(|indicators| indicators.quote)
        .and_then(|mut blocks| {
            if blocks.is_empty() {
                None
            } else {
                Some(blocks.remove(0))
            }
        })
        .unwrap_or_default();
    let closes = quote.close.unwrap_or_default();
    let volumes = quote.volume.unwrap_or_default();

    for (index, timestamp) in timestamps.iter().enumerate() {
        let price = closes.get(index).copied().flatten().unwrap_or(0.0);
        if price <= 0.0 {
            continue;
        }
        let date = match DateTime::<Utc>::from_timestamp(*timestamp, 0) {
            Some(date) => date.format("%Y-%m-%d").to_string(),
            None => continue,
        };
        points.push(ChartPoint {
            date,
            price,
            volume: volumes.get(index).copied().flatten().unwrap_or(0),
        });
    }
    Ok(points)
}

/// Mock quotes for when the provider is down. Prices land in 50..550 with a
/// day change inside +/-10.
pub fn mock_quotes(symbols: &[&str]) -> Vec<StockQuote> {
    let mut rng = rand::thread_rng();
    symbols
        .iter()
        .take(10)
        .map(|symbol| {
            let price: f64 = rng.gen_range(50.0..550.0);
            let change: f64 = rng.gen_range(-10.0..10.0);
            let change_percent = change / price * 100.0;
            StockQuote {
                symbol: symbol.to_string(),
                name: stock_name(symbol),
                price: round2(price),
                change: round2(change),
                change_percent: round2(change_percent),
            }
        })
        .collect()
}

/// Mock detail view with internally consistent open/high/low/close numbers.
pub fn mock_detail(symbol: &str) -> StockDetail {
    let mut rng = rand::thread_rng();
    let price: f64 = rng.gen_range(50.0..550.0);
    let previous_close = price * rng.gen_range(0.98..1.02);
    let change = price - previous_close;
    let change_percent = change / previous_close * 100.0;

    StockDetail {
        symbol: symbol.to_string(),
        name: stock_name(symbol),
        price: round2(price),
        change: round2(change),
        change_percent: round2(change_percent),
        high: round2(price * rng.gen_range(1.0..1.02)),
        low: round2(price * rng.gen_range(0.96..0.98)),
        open: round2(previous_close * rng.gen_range(0.99..1.01)),
        volume: rng.gen_range(10_000_000..110_000_000),
        market_cap: Some((price * 1_000_000_000.0) as u64),
        previous_close: round2(previous_close),
    }
}

/// Mock close series: a random walk around one base price with +/-2.5% daily
/// variation, smoothed once so it does not read as pure noise.
pub fn mock_history(days: i64) -> Vec<ChartPoint> {
    let mut rng = rand::thread_rng();
    let base_price: f64 = rng.gen_range(50.0..550.0);
    let today = Utc::now();

    let mut points: Vec<ChartPoint> = (0..=days)
        .rev()
        .map(|offset| {
            let date = today - Duration::days(offset);
            let variation: f64 = rng.gen_range(-0.025..0.025);
            ChartPoint {
                date: date.format("%Y-%m-%d").to_string(),
                price: round2(base_price * (1.0 + variation)),
                volume: rng.gen_range(10_000_000..60_000_000),
            }
        })
        .collect();

    let raw: Vec<f64> = points.iter().map(|point| point.price).collect();
    for index in 1..points.len().saturating_sub(1) {
        let neighbor_avg = (raw[index - 1] + raw[index + 1]) / 2.0;
        points[index].price = round2((raw[index] + neighbor_avg) / 2.0);
    }
    points
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
