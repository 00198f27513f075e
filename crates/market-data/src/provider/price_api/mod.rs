//! HTTP price source for the scrap-metal price API.
//!
//! Endpoints (all `GET`, JSON arrays in the response body):
//! - `/prices/latest?codes=CU,AL`
//! - `/prices/{code}/history?days=365`
//! - `/prices/{code}/stats?period=weekly&limit=12`
//!
//! Dates on the wire are `YYYY-MM-DD`; prices are JSON numbers.

use std::collections::BTreeSet;
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use log::{debug, warn};
use reqwest::Client;
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::errors::{FetchError, ValidationError};
use crate::models::{ChangeType, ChartBucket, InstrumentCode, Period, PricePoint};
use crate::provider::RemoteDataSource;

const PROVIDER_ID: &str = "SCRAP_PRICE_API";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);
const API_KEY_HEADER: &str = "X-Api-Key";

// ============================================================================
// API Response Structures
// ============================================================================

/// One element of the latest and history responses.
#[derive(Debug, Deserialize)]
struct PricePointDto {
    code: String,
    date: String,
    price: Decimal,
    #[serde(default)]
    change_percent: Option<Decimal>,
    #[serde(default)]
    change_type: Option<String>,
}

/// One element of the stats response.
#[derive(Debug, Deserialize)]
struct BucketDto {
    period_start: String,
    #[serde(default)]
    label: Option<String>,
    avg_price: Decimal,
    min_price: Decimal,
    max_price: Decimal,
    #[serde(default)]
    change_percent: Option<Decimal>,
    #[serde(default)]
    change_type: Option<String>,
    sample_count: u32,
}

// ============================================================================
// HttpPriceSource
// ============================================================================

/// Remote price source backed by the scrap-metal price API.
///
/// The HTTP client is passed in by the caller so tests and hosts control
/// timeouts, proxies and TLS.
pub struct HttpPriceSource {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl HttpPriceSource {
    pub fn new(client: Client, base_url: impl Into<String>, api_key: Option<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            client,
            base_url,
            api_key,
        }
    }

    /// Build a source with its own client and the given request timeout.
    pub fn with_timeout(
        base_url: impl Into<String>,
        api_key: Option<String>,
        timeout: Option<Duration>,
    ) -> Self {
        let client = Client::builder()
            .timeout(timeout.unwrap_or(DEFAULT_TIMEOUT))
            .build()
            .unwrap_or_else(|_| Client::new());
        Self::new(client, base_url, api_key)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// GET `path` and decode the JSON body.
    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &[(&str, String)],
    ) -> Result<T, FetchError> {
        let url = format!("{}{}", self.base_url, path);
        let mut request = self.client.get(&url).query(params);
        if let Some(key) = &self.api_key {
            request = request.header(API_KEY_HEADER, key);
        }

        debug!("{} request: {} with {} params", PROVIDER_ID, path, params.len());

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!("{} {} returned HTTP {}", PROVIDER_ID, path, status.as_u16());
            return Err(FetchError::status(status.as_u16(), body));
        }

        let text = response.text().await?;
        Ok(serde_json::from_str(&text)?)
    }
}

#[async_trait]
impl RemoteDataSource for HttpPriceSource {
    fn id(&self) -> &'static str {
        PROVIDER_ID
    }

    async fn fetch_latest(
        &self,
        codes: &BTreeSet<InstrumentCode>,
    ) -> Result<Vec<PricePoint>, FetchError> {
        if codes.is_empty() {
            return Ok(Vec::new());
        }
        let joined = codes
            .iter()
            .map(InstrumentCode::as_str)
            .collect::<Vec<_>>()
            .join(",");
        let dtos: Vec<PricePointDto> = self
            .get_json("/prices/latest", &[("codes", joined)])
            .await?;
        Ok(to_price_points(dtos)?)
    }

    async fn fetch_history(
        &self,
        code: &InstrumentCode,
        days: u32,
    ) -> Result<Vec<PricePoint>, FetchError> {
        if days == 0 {
            return Ok(Vec::new());
        }
        let path = format!("/prices/{}/history", code);
        let dtos: Vec<PricePointDto> = self.get_json(&path, &[("days", days.to_string())]).await?;
        let mut points = to_price_points(dtos)?;
        points.sort_by_key(|p| p.observed_date);
        Ok(points)
    }

    async fn fetch_bucket_stats(
        &self,
        code: &InstrumentCode,
        period: Period,
        limit: u32,
    ) -> Result<Vec<ChartBucket>, FetchError> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let path = format!("/prices/{}/stats", code);
        let params = [
            ("period", period.as_str().to_string()),
            ("limit", limit.to_string()),
        ];
        let dtos: Vec<BucketDto> = self.get_json(&path, &params).await?;
        let mut buckets = dtos
            .into_iter()
            .map(|dto| to_bucket(dto, period))
            .collect::<Result<Vec<_>, _>>()?;
        buckets.sort_by_key(|b| b.period_start);
        let excess = buckets.len().saturating_sub(limit as usize);
        Ok(buckets.split_off(excess))
    }
}

// ============================================================================
// Transforms
// ============================================================================

fn parse_date(raw: &str) -> Result<NaiveDate, ValidationError> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|_| ValidationError::InvalidDate(raw.to_string()))
}

fn to_price_point(dto: PricePointDto) -> Result<PricePoint, ValidationError> {
    let code = InstrumentCode::parse(&dto.code)?;
    let date = parse_date(&dto.date)?;
    let change_type = dto.change_type.as_deref().map(ChangeType::parse_label);
    PricePoint::new(code, date, dto.price, dto.change_percent, change_type)
}

/// Transform every element; the first invalid one rejects the whole response.
fn to_price_points(dtos: Vec<PricePointDto>) -> Result<Vec<PricePoint>, ValidationError> {
    dtos.into_iter().map(to_price_point).collect()
}

fn to_bucket(dto: BucketDto, period: Period) -> Result<ChartBucket, ValidationError> {
    let period_start = period.bucket_start(parse_date(&dto.period_start)?);
    let change_percent = dto.change_percent.unwrap_or(Decimal::ZERO);
    let change_type = dto
        .change_type
        .as_deref()
        .map(ChangeType::parse_label)
        .filter(|t| *t != ChangeType::Unknown)
        .unwrap_or_else(|| ChangeType::from_percent(Some(change_percent)));
    let bucket = ChartBucket {
        period,
        period_start,
        label: dto
            .label
            .filter(|l| !l.trim().is_empty())
            .unwrap_or_else(|| period.format_label(period_start)),
        avg_price: dto.avg_price,
        min_price: dto.min_price,
        max_price: dto.max_price,
        change_percent,
        change_type,
        sample_count: dto.sample_count,
    };
    bucket.validate()?;
    Ok(bucket)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_provider_id() {
        let source = HttpPriceSource::with_timeout("https://prices.example", None, None);
        assert_eq!(source.id(), "SCRAP_PRICE_API");
    }

    #[test]
    fn test_base_url_trailing_slash_is_trimmed() {
        let source = HttpPriceSource::new(Client::new(), "https://prices.example/api/", None);
        assert_eq!(source.base_url(), "https://prices.example/api");
    }

    #[test]
    fn test_parse_price_points() {
        let json = r#"[
            {"code": "cu", "date": "2024-01-05", "price": 9850.5, "change_percent": 1.25},
            {"code": "AL", "date": "2024-01-05", "price": 2210, "change_type": "down"}
        ]"#;
        let dtos: Vec<PricePointDto> = serde_json::from_str(json).unwrap();
        let points = to_price_points(dtos).unwrap();

        assert_eq!(points.len(), 2);
        assert_eq!(points[0].instrument_code.as_str(), "CU");
        assert_eq!(points[0].price, dec!(9850.5));
        assert_eq!(points[0].change_type, ChangeType::Positive);
        assert_eq!(points[1].change_percent, None);
        assert_eq!(points[1].change_type, ChangeType::Negative);
    }

    #[test]
    fn test_missing_change_fields_yield_unknown() {
        let json = r#"[{"code": "PB", "date": "2024-02-01", "price": 2100}]"#;
        let dtos: Vec<PricePointDto> = serde_json::from_str(json).unwrap();
        let points = to_price_points(dtos).unwrap();
        assert_eq!(points[0].change_type, ChangeType::Unknown);
    }

    #[test]
    fn test_one_invalid_point_rejects_response() {
        let json = r#"[
            {"code": "CU", "date": "2024-01-05", "price": 9850},
            {"code": "CU", "date": "2024-01-06", "price": 0}
        ]"#;
        let dtos: Vec<PricePointDto> = serde_json::from_str(json).unwrap();
        assert!(matches!(
            to_price_points(dtos),
            Err(ValidationError::NonPositivePrice { .. })
        ));
    }

    #[test]
    fn test_bad_date_is_rejected() {
        let json = r#"[{"code": "CU", "date": "05/01/2024", "price": 9850}]"#;
        let dtos: Vec<PricePointDto> = serde_json::from_str(json).unwrap();
        assert_eq!(
            to_price_points(dtos),
            Err(ValidationError::InvalidDate("05/01/2024".to_string()))
        );
    }

    #[test]
    fn test_parse_bucket_fills_label_and_aligns_start() {
        let json = r#"{
            "period_start": "2024-01-03",
            "avg_price": 105.5,
            "min_price": 100,
            "max_price": 110,
            "change_percent": -2.5,
            "sample_count": 4
        }"#;
        let dto: BucketDto = serde_json::from_str(json).unwrap();
        let bucket = to_bucket(dto, Period::Weekly).unwrap();

        assert_eq!(
            bucket.period_start,
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()
        );
        assert_eq!(bucket.label, "2024/01/01");
        assert_eq!(bucket.change_type, ChangeType::Negative);
        assert_eq!(bucket.sample_count, 4);
    }

    #[test]
    fn test_bucket_with_inverted_range_is_rejected() {
        let json = r#"{
            "period_start": "2024-01-01",
            "avg_price": 90,
            "min_price": 100,
            "max_price": 110,
            "sample_count": 2
        }"#;
        let dto: BucketDto = serde_json::from_str(json).unwrap();
        assert!(matches!(
            to_bucket(dto, Period::Monthly),
            Err(ValidationError::InvalidBucketRange { .. })
        ));
    }

    #[tokio::test]
    async fn test_empty_requests_skip_network() {
        // Port 9 is discard; any real request would fail with a connect error.
        let source = HttpPriceSource::with_timeout(
            "http://127.0.0.1:9",
            None,
            Some(Duration::from_millis(50)),
        );
        let code = InstrumentCode::parse("CU").unwrap();

        assert!(source.fetch_latest(&BTreeSet::new()).await.unwrap().is_empty());
        assert!(source.fetch_history(&code, 0).await.unwrap().is_empty());
        assert!(source
            .fetch_bucket_stats(&code, Period::Daily, 0)
            .await
            .unwrap()
            .is_empty());
    }
}
