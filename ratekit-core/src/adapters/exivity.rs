//! Exivity API client
//!
//! Talks to the billing platform's JSON:API endpoints for services and rate
//! revisions. Authentication is a bearer token, either configured directly
//! or obtained from `/v1/auth/token` with username and password.

use std::collections::HashMap;
use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::blocking::{Client, Response};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::{json, Value as JsonValue};

use crate::config::ConnectionSettings;
use crate::domain::result::{Error as DomainError, Result as DomainResult};
use crate::domain::{AccountItem, ApiError, NewRate, RateRecord, ServiceItem};
use crate::ports::{Page, PageRequest, RateApi};

const JSON_API: &str = "application/vnd.api+json";

// =============================================================================
// API Response Models (JSON:API documents)
// =============================================================================

#[derive(Debug, Clone, Deserialize)]
struct Document<T> {
    #[serde(default = "Vec::new")]
    data: Vec<T>,
    #[serde(default)]
    included: Vec<IncludedResource>,
}

#[derive(Debug, Clone, Deserialize)]
struct ServiceResource {
    #[serde(deserialize_with = "deserialize_id")]
    id: u64,
    #[serde(default)]
    attributes: ServiceAttributes,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct ServiceAttributes {
    #[serde(default)]
    key: Option<String>,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct AccountResource {
    #[serde(deserialize_with = "deserialize_id")]
    id: u64,
    #[serde(default)]
    attributes: AccountAttributes,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct AccountAttributes {
    #[serde(default)]
    name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct RateResource {
    #[serde(deserialize_with = "deserialize_string_id")]
    id: String,
    #[serde(default)]
    attributes: RateAttributes,
    #[serde(default)]
    relationships: RateRelationships,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct RateAttributes {
    #[serde(default, deserialize_with = "deserialize_optional_amount")]
    rate: Option<Decimal>,
    #[serde(default, deserialize_with = "deserialize_optional_amount")]
    cogs_rate: Option<Decimal>,
    #[serde(default)]
    effective_date: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct RateRelationships {
    #[serde(default)]
    service: Option<Relationship>,
    #[serde(default)]
    account: Option<Relationship>,
}

#[derive(Debug, Clone, Deserialize)]
struct Relationship {
    #[serde(default)]
    data: Option<ResourceIdentifier>,
}

#[derive(Debug, Clone, Deserialize)]
struct ResourceIdentifier {
    #[serde(deserialize_with = "deserialize_id")]
    id: u64,
}

#[derive(Debug, Clone, Deserialize)]
struct IncludedResource {
    #[serde(rename = "type")]
    kind: String,
    #[serde(deserialize_with = "deserialize_id")]
    id: u64,
    #[serde(default)]
    attributes: JsonValue,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct ErrorDocument {
    #[serde(default)]
    errors: Vec<ErrorObject>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct ErrorObject {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    detail: Option<String>,
}

/// Deserialize ID that can be number or string
fn deserialize_id<'de, D>(deserializer: D) -> std::result::Result<u64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::de::Error;
    let value: JsonValue = Deserialize::deserialize(deserializer)?;
    match value {
        JsonValue::Number(n) => n
            .as_u64()
            .ok_or_else(|| D::Error::custom("expected unsigned integer id")),
        JsonValue::String(s) => s
            .trim()
            .parse::<u64>()
            .map_err(|e| D::Error::custom(format!("invalid id '{}': {}", s, e))),
        _ => Err(D::Error::custom("expected number or string for id")),
    }
}

/// Deserialize an opaque resource ID, number or string
fn deserialize_string_id<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::de::Error;
    let value: JsonValue = Deserialize::deserialize(deserializer)?;
    match value {
        JsonValue::Number(n) => Ok(n.to_string()),
        JsonValue::String(s) => Ok(s),
        _ => Err(D::Error::custom("expected number or string for id")),
    }
}

/// Deserialize an optional amount that can be number, string or null
fn deserialize_optional_amount<'de, D>(
    deserializer: D,
) -> std::result::Result<Option<Decimal>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::de::Error;
    let value: Option<JsonValue> = Option::deserialize(deserializer)?;
    match value {
        Some(JsonValue::Number(n)) => n
            .to_string()
            .parse::<Decimal>()
            .or_else(|_| Decimal::from_scientific(&n.to_string()))
            .map(Some)
            .map_err(|e| D::Error::custom(format!("invalid decimal: {}", e))),
        Some(JsonValue::String(s)) if s.trim().is_empty() => Ok(None),
        Some(JsonValue::String(s)) => s
            .trim()
            .parse::<Decimal>()
            .map(Some)
            .map_err(|e| D::Error::custom(format!("invalid decimal: {}", e))),
        Some(JsonValue::Null) | None => Ok(None),
        _ => Err(D::Error::custom("expected number or string for amount")),
    }
}

/// Render a decimal as a JSON number, keeping the written precision
fn decimal_to_json(value: Decimal) -> JsonValue {
    value
        .normalize()
        .to_string()
        .parse::<serde_json::Number>()
        .map(JsonValue::Number)
        .unwrap_or_else(|_| JsonValue::String(value.to_string()))
}

/// Build the JSON:API document for a rate revision create
pub fn rate_document(rate: &NewRate) -> JsonValue {
    let account = match rate.account_id {
        Some(id) => json!({ "data": { "type": "account", "id": id.to_string() } }),
        None => json!({ "data": null }),
    };

    json!({
        "data": {
            "type": "rate",
            "attributes": {
                "rate": decimal_to_json(rate.rate),
                "rate_col": null,
                "min_commit": null,
                "effective_date": rate.effective_date.hyphenated(),
                "end_date": null,
                "fixed": null,
                "fixed_col": null,
                "cogs_rate": decimal_to_json(rate.cogs),
                "cogs_rate_col": null,
                "cogs_fixed": null,
                "cogs_fixed_col": null,
                "tier_aggregation_level": null
            },
            "relationships": {
                "service": { "data": { "type": "service", "id": rate.service_id.to_string() } },
                "account": account
            }
        }
    })
}

/// Turn a non-success create response body into an [`ApiError`]
fn parse_error_body(status: u16, body: &str) -> ApiError {
    let document: ErrorDocument = serde_json::from_str(body).unwrap_or_default();

    let message = document
        .errors
        .iter()
        .filter_map(|e| e.detail.clone().or_else(|| e.title.clone()))
        .collect::<Vec<_>>()
        .join("; ");

    let message = if !message.is_empty() {
        message
    } else if !body.trim().is_empty() {
        body.trim().to_string()
    } else {
        format!("request failed with HTTP {}", status)
    };

    let mut error = ApiError::new(message).with_status(status);
    if let Some(code) = document.errors.iter().find_map(|e| e.code.clone()) {
        error = error.with_code(code);
    }
    error
}

// =============================================================================
// Exivity HTTP Client
// =============================================================================

/// Exivity API client
#[derive(Debug)]
pub struct ExivityClient {
    client: Client,
    base_url: String,
    token: String,
    timeout_secs: u64,
}

impl ExivityClient {
    /// Build a client from connection settings, logging in if no token is configured
    pub fn from_settings(settings: &ConnectionSettings) -> Result<Self> {
        let base_url = settings
            .base_url
            .as_deref()
            .filter(|u| !u.trim().is_empty())
            .context("No base URL configured. Set connection.baseUrl or RATEKIT_BASE_URL")?;

        if let Some(token) = settings.token.as_deref().filter(|t| !t.is_empty()) {
            return Self::with_token(base_url, token, settings.verify_ssl, settings.timeout_secs);
        }

        match (settings.username.as_deref(), settings.password.as_deref()) {
            (Some(username), Some(password)) if !username.is_empty() => Self::login(
                base_url,
                username,
                password,
                settings.verify_ssl,
                settings.timeout_secs,
            ),
            _ => anyhow::bail!(
                "No credentials configured. Set connection.token, or connection.username and connection.password"
            ),
        }
    }

    /// Create a client with a pre-issued bearer token
    pub fn with_token(base_url: &str, token: &str, verify_ssl: bool, timeout_secs: u64) -> Result<Self> {
        if token.is_empty() {
            anyhow::bail!("API token cannot be empty");
        }
        let base_url = normalize_base_url(base_url)?;
        let client = build_http_client(verify_ssl, timeout_secs)?;

        Ok(Self {
            client,
            base_url,
            token: token.to_string(),
            timeout_secs,
        })
    }

    /// Obtain a token with username and password
    pub fn login(
        base_url: &str,
        username: &str,
        password: &str,
        verify_ssl: bool,
        timeout_secs: u64,
    ) -> Result<Self> {
        let base_url = normalize_base_url(base_url)?;
        let client = build_http_client(verify_ssl, timeout_secs)?;
        let url = format!("{}/v1/auth/token", base_url);

        let response = client
            .post(&url)
            .header("Accept", "application/json")
            .form(&[("username", username), ("password", password)])
            .send()
            .map_err(|e| map_request_error(e, timeout_secs))?;

        check_response_status(&response)?;

        let body: JsonValue = response.json().context("Failed to parse token response")?;
        let token = body
            .get("token")
            .or_else(|| body.pointer("/data/attributes/token"))
            .and_then(|t| t.as_str())
            .filter(|t| !t.is_empty())
            .context("No token returned from /v1/auth/token")?
            .to_string();

        Ok(Self {
            client,
            base_url,
            token,
            timeout_secs,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Fetch one page of services
    pub fn get_services(&self, page: PageRequest) -> Result<Page<ServiceItem>> {
        let url = format!("{}/v1/services", self.base_url);
        let response = self.get_page(&url, page, None)?;

        let document: Document<ServiceResource> = response
            .json()
            .context("Failed to parse services response")?;

        let items = document
            .data
            .into_iter()
            .map(|s| ServiceItem {
                id: s.id,
                key: s.attributes.key.filter(|k| !k.trim().is_empty()),
                description: s.attributes.description,
            })
            .collect();

        Ok(Page::from_items(items, page))
    }

    /// Fetch one page of accounts
    pub fn get_accounts(&self, page: PageRequest) -> Result<Page<AccountItem>> {
        let url = format!("{}/v1/accounts", self.base_url);
        let response = self.get_page(&url, page, None)?;

        let document: Document<AccountResource> = response
            .json()
            .context("Failed to parse accounts response")?;

        let items = document
            .data
            .into_iter()
            .map(|a| AccountItem {
                id: a.id,
                name: a.attributes.name.unwrap_or_default(),
            })
            .collect();

        Ok(Page::from_items(items, page))
    }

    /// Fetch one page of rate revisions with service and account linkage
    pub fn get_rates(&self, page: PageRequest) -> Result<Page<RateRecord>> {
        let url = format!("{}/v1/rates", self.base_url);
        let response = self.get_page(&url, page, Some("service,account"))?;

        let document: Document<RateResource> = response
            .json()
            .context("Failed to parse rates response")?;

        let account_names: HashMap<u64, String> = document
            .included
            .iter()
            .filter(|r| r.kind == "account")
            .filter_map(|r| {
                r.attributes
                    .get("name")
                    .and_then(|n| n.as_str())
                    .map(|n| (r.id, n.trim_matches('"').to_string()))
            })
            .collect();

        let fetched = document.data.len();
        let mut items = Vec::with_capacity(fetched);
        for rate in document.data {
            let Some(service_id) = rate
                .relationships
                .service
                .as_ref()
                .and_then(|s| s.data.as_ref())
                .map(|d| d.id)
            else {
                continue;
            };
            let Some(effective_date) = rate.attributes.effective_date.filter(|d| !d.is_empty())
            else {
                continue;
            };
            let account_id = rate
                .relationships
                .account
                .as_ref()
                .and_then(|a| a.data.as_ref())
                .map(|d| d.id);

            items.push(RateRecord {
                id: rate.id,
                account_id,
                account_name: account_id.and_then(|id| account_names.get(&id).cloned()),
                service_id,
                rate: rate.attributes.rate,
                cogs: rate.attributes.cogs_rate,
                effective_date,
            });
        }

        Ok(Page::from_filtered(items, fetched, page))
    }

    /// Create one rate revision
    pub fn post_rate(&self, rate: &NewRate) -> std::result::Result<(), ApiError> {
        let url = format!("{}/v1/rates", self.base_url);

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.token)
            .header("Content-Type", JSON_API)
            .header("Accept", JSON_API)
            .body(rate_document(rate).to_string())
            .send()
            .map_err(|e| ApiError::transport(map_request_error(e, self.timeout_secs).to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let body = response.text().unwrap_or_default();
        if status.as_u16() == 401 {
            return Err(ApiError::new("Unauthorized. Token may have expired").with_status(401));
        }
        Err(parse_error_body(status.as_u16(), &body))
    }

    fn get_page(&self, url: &str, page: PageRequest, include: Option<&str>) -> Result<Response> {
        let mut query = vec![
            ("page[limit]", page.limit.to_string()),
            ("page[offset]", page.offset.to_string()),
        ];
        if let Some(include) = include {
            query.push(("include", include.to_string()));
        }

        let response = self
            .client
            .get(url)
            .bearer_auth(&self.token)
            .header("Accept", "application/json")
            .query(&query)
            .send()
            .map_err(|e| map_request_error(e, self.timeout_secs))?;

        check_response_status(&response)?;
        Ok(response)
    }
}

fn normalize_base_url(base_url: &str) -> Result<String> {
    let trimmed = base_url.trim().trim_end_matches('/');
    url::Url::parse(trimmed).with_context(|| format!("Invalid base URL '{}'", base_url))?;
    Ok(trimmed.to_string())
}

fn build_http_client(verify_ssl: bool, timeout_secs: u64) -> Result<Client> {
    Client::builder()
        .timeout(Duration::from_secs(timeout_secs.max(1)))
        .danger_accept_invalid_certs(!verify_ssl)
        .build()
        .context("Failed to create HTTP client")
}

/// Map request errors to user-friendly messages
fn map_request_error(error: reqwest::Error, timeout_secs: u64) -> anyhow::Error {
    if error.is_timeout() {
        anyhow::anyhow!("Connection timed out after {} seconds", timeout_secs)
    } else if error.is_connect() {
        anyhow::anyhow!("Unable to connect to the billing API")
    } else {
        anyhow::anyhow!("Billing API request failed: {}", error)
    }
}

/// Check response status and return appropriate errors
fn check_response_status(response: &Response) -> Result<()> {
    match response.status().as_u16() {
        200..=299 => Ok(()),
        401 => anyhow::bail!("Unauthorized. Token may have expired or credentials are invalid"),
        403 => anyhow::bail!("Access denied. Check the API user's permissions"),
        404 => anyhow::bail!("Billing API resource not found"),
        429 => anyhow::bail!("Billing API rate limit exceeded. Please wait and try again"),
        status => anyhow::bail!("Billing API error: HTTP {}", status),
    }
}

fn to_domain_error(error: anyhow::Error) -> DomainError {
    let message = error.to_string();
    if message.starts_with("Unauthorized") {
        DomainError::Auth(message)
    } else {
        DomainError::Api(message)
    }
}

impl RateApi for ExivityClient {
    fn name(&self) -> &str {
        "exivity"
    }

    fn list_services(&self, page: PageRequest) -> DomainResult<Page<ServiceItem>> {
        self.get_services(page).map_err(to_domain_error)
    }

    fn list_accounts(&self, page: PageRequest) -> DomainResult<Page<AccountItem>> {
        self.get_accounts(page).map_err(to_domain_error)
    }

    fn list_rates(&self, page: PageRequest) -> DomainResult<Page<RateRecord>> {
        self.get_rates(page).map_err(to_domain_error)
    }

    fn create_rate(&self, rate: &NewRate) -> std::result::Result<(), ApiError> {
        self.post_rate(rate)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::EffectiveDate;

    fn sample_rate(account_id: Option<u64>) -> NewRate {
        NewRate {
            account_id,
            service_id: 56,
            rate: Decimal::new(1050, 2),
            cogs: Decimal::new(825, 2),
            effective_date: EffectiveDate::parse("20241201").unwrap(),
        }
    }

    #[test]
    fn test_reject_empty_token() {
        let result = ExivityClient::with_token("http://localhost", "", true, 30);
        assert!(result.unwrap_err().to_string().contains("cannot be empty"));
    }

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let client = ExivityClient::with_token("http://localhost/api/", "t", true, 30).unwrap();
        assert_eq!(client.base_url(), "http://localhost/api");
    }

    #[test]
    fn test_invalid_base_url() {
        assert!(ExivityClient::with_token("not a url", "t", true, 30).is_err());
    }

    #[test]
    fn test_from_settings_requires_credentials() {
        let settings = ConnectionSettings {
            base_url: Some("http://localhost".to_string()),
            ..Default::default()
        };
        let err = ExivityClient::from_settings(&settings).unwrap_err();
        assert!(err.to_string().contains("No credentials"));

        let err = ExivityClient::from_settings(&ConnectionSettings::default()).unwrap_err();
        assert!(err.to_string().contains("No base URL"));
    }

    #[test]
    fn test_rate_document_account() {
        let doc = rate_document(&sample_rate(Some(1234)));
        assert_eq!(doc["data"]["type"], "rate");
        assert_eq!(doc["data"]["attributes"]["effective_date"], "2024-12-01");
        assert_eq!(doc["data"]["attributes"]["rate"], json!(10.5));
        assert_eq!(doc["data"]["attributes"]["cogs_rate"], json!(8.25));
        assert!(doc["data"]["attributes"]["rate_col"].is_null());
        assert_eq!(doc["data"]["relationships"]["service"]["data"]["id"], "56");
        assert_eq!(doc["data"]["relationships"]["account"]["data"]["id"], "1234");
        assert_eq!(doc["data"]["relationships"]["account"]["data"]["type"], "account");
    }

    #[test]
    fn test_rate_document_global_rate_has_null_account() {
        let doc = rate_document(&sample_rate(None));
        let account = &doc["data"]["relationships"]["account"];
        assert!(account.get("data").is_some());
        assert!(account["data"].is_null());
    }

    #[test]
    fn test_parse_error_body_with_code() {
        let body = r#"{"errors":[{"status":"422","code":"overlapping_date","detail":"The rate has an overlapping date"}]}"#;
        let err = parse_error_body(422, body);
        assert_eq!(err.status, Some(422));
        assert_eq!(err.code.as_deref(), Some("overlapping_date"));
        assert!(err.message.contains("overlapping date"));
    }

    #[test]
    fn test_parse_error_body_plain_text() {
        let err = parse_error_body(500, "Internal failure");
        assert_eq!(err.code, None);
        assert_eq!(err.message, "Internal failure");

        let err = parse_error_body(502, "");
        assert!(err.message.contains("HTTP 502"));
    }

    #[test]
    fn test_rate_resource_parsing() {
        let body = r#"{
            "data": [
                {"id": "1", "type": "rate",
                 "attributes": {"rate": "1.25", "cogs_rate": null, "effective_date": "2024-01-01"},
                 "relationships": {"service": {"data": {"type": "service", "id": "12"}},
                                   "account": {"data": {"type": "account", "id": 7}}}},
                {"id": 2, "type": "rate",
                 "attributes": {"rate": 3, "cogs_rate": 1.5, "effective_date": "2024-02"},
                 "relationships": {"service": {"data": {"type": "service", "id": 12}},
                                   "account": {"data": null}}}
            ],
            "included": [{"type": "account", "id": "7", "attributes": {"name": "\"Acme\""}}]
        }"#;
        let doc: Document<RateResource> = serde_json::from_str(body).unwrap();
        assert_eq!(doc.data.len(), 2);
        assert_eq!(doc.data[0].attributes.rate, Some(Decimal::new(125, 2)));
        assert_eq!(doc.data[0].attributes.cogs_rate, None);
        assert_eq!(doc.data[1].id, "2");
        assert!(doc.data[1]
            .relationships
            .account
            .as_ref()
            .unwrap()
            .data
            .is_none());
        assert_eq!(doc.included[0].id, 7);
    }

    #[test]
    fn test_decimal_to_json() {
        assert_eq!(decimal_to_json(Decimal::new(500, 2)), json!(5));
        assert_eq!(decimal_to_json(Decimal::new(-125, 3)), json!(-0.125));
    }
}
