//! Mock Exivity API server for testing
//!
//! A small std-only HTTP server that speaks enough of the billing API for
//! the client tests:
//! - POST /v1/auth/token (form username/password) returns { token }
//! - GET /v1/services returns a JSON:API page of services
//! - GET /v1/rates returns a JSON:API page of rates with included accounts
//! - POST /v1/rates creates a rate, rejecting overlaps and unknown ids

use std::collections::BTreeMap;
use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;

use serde_json::{json, Value as JsonValue};

pub const MOCK_TOKEN: &str = "mock_token";
pub const MOCK_USERNAME: &str = "admin";
pub const MOCK_PASSWORD: &str = "secret";

#[derive(Debug, Clone)]
pub struct MockConfig {
    /// Services with ids 1..=num_services and keys `svc.<id>`
    pub num_services: usize,
    /// Accounts with ids 1..=num_accounts
    pub num_accounts: usize,
    pub fail_auth: bool,
    pub rate_limit: bool,
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            num_services: 3,
            num_accounts: 2,
            fail_auth: false,
            rate_limit: false,
        }
    }
}

#[derive(Debug, Clone)]
struct MockRate {
    id: usize,
    account_id: Option<u64>,
    service_id: u64,
    rate: JsonValue,
    cogs: JsonValue,
    effective_date: String,
}

#[derive(Debug, Default)]
struct MockState {
    services: Vec<(u64, String)>,
    accounts: BTreeMap<u64, String>,
    rates: Vec<MockRate>,
    create_requests: Vec<JsonValue>,
}

/// Mock Exivity server on a random local port
pub struct MockExivityServer {
    port: u16,
    running: Arc<AtomicBool>,
    state: Arc<Mutex<MockState>>,
    thread_handle: Option<thread::JoinHandle<()>>,
}

impl MockExivityServer {
    pub fn start(config: MockConfig) -> std::io::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0")?;
        let port = listener.local_addr()?.port();
        listener.set_nonblocking(true)?;

        let state = Arc::new(Mutex::new(MockState {
            services: (1..=config.num_services as u64)
                .map(|id| (id, format!("svc.{}", id)))
                .collect(),
            accounts: (1..=config.num_accounts as u64)
                .map(|id| (id, format!("Account {}", id)))
                .collect(),
            ..Default::default()
        }));

        let running = Arc::new(AtomicBool::new(true));
        let running_clone = running.clone();
        let state_clone = state.clone();

        let thread_handle = thread::spawn(move || {
            while running_clone.load(Ordering::SeqCst) {
                match listener.accept() {
                    Ok((stream, _)) => {
                        let cfg = config.clone();
                        let state = state_clone.clone();
                        thread::spawn(move || handle_connection(stream, &cfg, &state));
                    }
                    Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                        thread::sleep(std::time::Duration::from_millis(10));
                    }
                    Err(_) => break,
                }
            }
        });

        Ok(Self {
            port,
            running,
            state,
            thread_handle: Some(thread_handle),
        })
    }

    pub fn base_url(&self) -> String {
        format!("http://127.0.0.1:{}", self.port)
    }

    /// Seed an existing rate
    pub fn add_rate(&self, account_id: Option<u64>, service_id: u64, effective_date: &str) {
        if let Ok(mut state) = self.state.lock() {
            let id = state.rates.len() + 1;
            state.rates.push(MockRate {
                id,
                account_id,
                service_id,
                rate: json!(1.0),
                cogs: json!(0.5),
                effective_date: effective_date.to_string(),
            });
        }
    }

    /// Bodies of every POST /v1/rates received
    pub fn create_requests(&self) -> Vec<JsonValue> {
        self.state
            .lock()
            .map(|s| s.create_requests.clone())
            .unwrap_or_default()
    }

    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.thread_handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for MockExivityServer {
    fn drop(&mut self) {
        self.stop();
    }
}

struct Request {
    method: String,
    path: String,
    query: BTreeMap<String, String>,
    headers: String,
    body: String,
}

fn read_request(stream: &mut TcpStream) -> Option<Request> {
    let mut data = Vec::new();
    let mut buffer = [0u8; 4096];

    let header_end = loop {
        let n = stream.read(&mut buffer).ok()?;
        if n == 0 {
            return None;
        }
        data.extend_from_slice(&buffer[..n]);
        if let Some(pos) = data.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
    };

    let head = String::from_utf8_lossy(&data[..header_end]).to_string();
    let content_length = head
        .lines()
        .find_map(|l| {
            let lower = l.to_ascii_lowercase();
            lower
                .strip_prefix("content-length:")
                .and_then(|v| v.trim().parse::<usize>().ok())
        })
        .unwrap_or(0);

    while data.len() < header_end + content_length {
        let n = stream.read(&mut buffer).ok()?;
        if n == 0 {
            break;
        }
        data.extend_from_slice(&buffer[..n]);
    }

    let mut parts = head.lines().next()?.split_whitespace();
    let method = parts.next()?.to_string();
    let target = parts.next()?;
    let (path, query) = target.split_once('?').unwrap_or((target, ""));

    Some(Request {
        method,
        path: path.to_string(),
        query: parse_query(query),
        headers: head.to_ascii_lowercase(),
        body: String::from_utf8_lossy(&data[header_end..]).to_string(),
    })
}

fn decode_component(raw: &str) -> String {
    raw.replace("%5B", "[")
        .replace("%5D", "]")
        .replace("%2C", ",")
        .replace("%40", "@")
        .replace('+', " ")
}

fn parse_query(query: &str) -> BTreeMap<String, String> {
    query
        .split('&')
        .filter(|p| !p.is_empty())
        .map(|pair| {
            let (k, v) = pair.split_once('=').unwrap_or((pair, ""));
            (decode_component(k), decode_component(v))
        })
        .collect()
}

fn paging(request: &Request) -> (usize, usize) {
    let get = |k: &str, default: usize| {
        request
            .query
            .get(k)
            .and_then(|v| v.parse().ok())
            .unwrap_or(default)
    };
    (get("page[offset]", 0), get("page[limit]", 500))
}

fn handle_connection(mut stream: TcpStream, config: &MockConfig, state: &Mutex<MockState>) {
    let Some(request) = read_request(&mut stream) else {
        return;
    };

    if request.method == "POST" && request.path == "/v1/auth/token" {
        let form = parse_query(&request.body);
        let valid = form.get("username").map(String::as_str) == Some(MOCK_USERNAME)
            && form.get("password").map(String::as_str) == Some(MOCK_PASSWORD);
        if valid && !config.fail_auth {
            send_json(&mut stream, 200, &json!({ "token": MOCK_TOKEN }));
        } else {
            send_json(&mut stream, 401, &json!({ "errors": [{ "detail": "Invalid credentials" }] }));
        }
        return;
    }

    let authorized = request
        .headers
        .contains(&format!("authorization: bearer {}", MOCK_TOKEN));
    if config.fail_auth || !authorized {
        send_json(&mut stream, 401, &json!({ "errors": [{ "detail": "Unauthenticated" }] }));
        return;
    }
    if config.rate_limit {
        send_json(&mut stream, 429, &json!({ "errors": [{ "detail": "Too many requests" }] }));
        return;
    }

    let Ok(mut state) = state.lock() else {
        send_json(&mut stream, 500, &json!({}));
        return;
    };

    match (request.method.as_str(), request.path.as_str()) {
        ("GET", "/v1/services") => {
            let (offset, limit) = paging(&request);
            let data: Vec<JsonValue> = state
                .services
                .iter()
                .skip(offset)
                .take(limit)
                .map(|(id, key)| {
                    json!({
                        "type": "service",
                        "id": id.to_string(),
                        "attributes": { "key": key, "description": format!("Service {}", id) }
                    })
                })
                .collect();
            send_json(&mut stream, 200, &json!({ "data": data }));
        }
        ("GET", "/v1/accounts") => {
            let (offset, limit) = paging(&request);
            let data: Vec<JsonValue> = state
                .accounts
                .iter()
                .skip(offset)
                .take(limit)
                .map(|(id, name)| {
                    json!({ "type": "account", "id": id.to_string(), "attributes": { "name": name } })
                })
                .collect();
            send_json(&mut stream, 200, &json!({ "data": data }));
        }
        ("GET", "/v1/rates") => {
            let (offset, limit) = paging(&request);
            let page: Vec<&MockRate> = state.rates.iter().skip(offset).take(limit).collect();
            let data: Vec<JsonValue> = page.iter().map(|r| rate_json(r)).collect();
            let included: Vec<JsonValue> = state
                .accounts
                .iter()
                .filter(|(id, _)| page.iter().any(|r| r.account_id == Some(**id)))
                .map(|(id, name)| {
                    json!({ "type": "account", "id": id.to_string(), "attributes": { "name": name } })
                })
                .collect();
            send_json(&mut stream, 200, &json!({ "data": data, "included": included }));
        }
        ("POST", "/v1/rates") => {
            let body: JsonValue = serde_json::from_str(&request.body).unwrap_or(JsonValue::Null);
            state.create_requests.push(body.clone());
            let (status, response) = create_rate(&mut state, &body);
            send_json(&mut stream, status, &response);
        }
        _ => send_json(&mut stream, 404, &json!({ "errors": [{ "detail": "Not found" }] })),
    }
}

fn rate_json(rate: &MockRate) -> JsonValue {
    let account = match rate.account_id {
        Some(id) => json!({ "data": { "type": "account", "id": id.to_string() } }),
        None => json!({ "data": null }),
    };
    json!({
        "type": "rate",
        "id": rate.id.to_string(),
        "attributes": {
            "rate": rate.rate,
            "cogs_rate": rate.cogs,
            "effective_date": rate.effective_date
        },
        "relationships": {
            "service": { "data": { "type": "service", "id": rate.service_id.to_string() } },
            "account": account
        }
    })
}

fn error_body(detail: &str, code: Option<&str>) -> JsonValue {
    let mut error = json!({ "status": "422", "title": "Unprocessable Entity", "detail": detail });
    if let Some(code) = code {
        error["code"] = json!(code);
    }
    json!({ "errors": [error] })
}

fn create_rate(state: &mut MockState, body: &JsonValue) -> (u16, JsonValue) {
    let id_at = |pointer: &str| {
        body.pointer(pointer)
            .and_then(|v| v.as_str())
            .and_then(|v| v.parse::<u64>().ok())
    };

    let Some(service_id) = id_at("/data/relationships/service/data/id") else {
        return (422, error_body("The service field is required (validation)", None));
    };
    let account_id = id_at("/data/relationships/account/data/id");
    let Some(date) = body
        .pointer("/data/attributes/effective_date")
        .and_then(|v| v.as_str())
        .map(str::to_string)
    else {
        return (422, error_body("Validation failed: effective_date is required", None));
    };

    if !state.services.iter().any(|(id, _)| *id == service_id) {
        return (422, error_body("Service not found", Some("service_not_found")));
    }
    if let Some(id) = account_id {
        if !state.accounts.contains_key(&id) {
            return (422, error_body(&format!("Account {} not found", id), None));
        }
    }
    if state
        .rates
        .iter()
        .any(|r| r.account_id == account_id && r.service_id == service_id && r.effective_date == date)
    {
        return (422, error_body("This rate has an overlapping date with another revision", None));
    }

    let rate = MockRate {
        id: state.rates.len() + 1,
        account_id,
        service_id,
        rate: body.pointer("/data/attributes/rate").cloned().unwrap_or(JsonValue::Null),
        cogs: body
            .pointer("/data/attributes/cogs_rate")
            .cloned()
            .unwrap_or(JsonValue::Null),
        effective_date: date,
    };
    let response = json!({ "data": rate_json(&rate) });
    state.rates.push(rate);
    (201, response)
}

fn send_json(stream: &mut TcpStream, status: u16, body: &JsonValue) {
    let status_text = match status {
        200 => "OK",
        201 => "Created",
        401 => "Unauthorized",
        404 => "Not Found",
        422 => "Unprocessable Entity",
        429 => "Too Many Requests",
        _ => "Internal Server Error",
    };
    let body = body.to_string();
    let response = format!(
        "HTTP/1.1 {} {}\r\nContent-Type: application/vnd.api+json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        status,
        status_text,
        body.len(),
        body
    );
    let _ = stream.write_all(response.as_bytes());
    let _ = stream.flush();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::exivity::ExivityClient;
    use crate::domain::result::Error as DomainError;
    use crate::domain::{EffectiveDate, ErrorCategory, NewRate};
    use crate::ports::{fetch_all, PageRequest, RateApi};
    use crate::services::submitter::classify_error;
    use rust_decimal::Decimal;

    fn client(server: &MockExivityServer) -> ExivityClient {
        ExivityClient::with_token(&server.base_url(), MOCK_TOKEN, true, 10).unwrap()
    }

    fn new_rate(account_id: Option<u64>, service_id: u64, date: &str) -> NewRate {
        NewRate {
            account_id,
            service_id,
            rate: Decimal::new(1050, 2),
            cogs: Decimal::new(825, 2),
            effective_date: EffectiveDate::parse(date).unwrap(),
        }
    }

    #[test]
    fn test_login() {
        let server = MockExivityServer::start(MockConfig::default()).unwrap();
        let client =
            ExivityClient::login(&server.base_url(), MOCK_USERNAME, MOCK_PASSWORD, true, 10).unwrap();
        assert!(client.list_services(PageRequest::first(10)).is_ok());

        let bad = ExivityClient::login(&server.base_url(), MOCK_USERNAME, "wrong", true, 10);
        assert!(bad.unwrap_err().to_string().contains("Unauthorized"));
    }

    #[test]
    fn test_services_paginated() {
        let server = MockExivityServer::start(MockConfig {
            num_services: 7,
            ..Default::default()
        })
        .unwrap();
        let client = client(&server);

        let services = fetch_all(3, |p| client.list_services(p)).unwrap();
        assert_eq!(services.len(), 7);
        assert_eq!(services[0].key.as_deref(), Some("svc.1"));
        assert_eq!(services[6].description.as_deref(), Some("Service 7"));
    }

    #[test]
    fn test_create_then_overlap() {
        let server = MockExivityServer::start(MockConfig::default()).unwrap();
        let client = client(&server);

        client.create_rate(&new_rate(Some(1), 2, "20241201")).unwrap();
        client.create_rate(&new_rate(None, 2, "20241201")).unwrap();

        let err = client.create_rate(&new_rate(Some(1), 2, "2024-12-01")).unwrap_err();
        assert_eq!(err.status, Some(422));
        assert_eq!(classify_error(&err), ErrorCategory::OverlappingDate);

        let requests = server.create_requests();
        assert_eq!(requests.len(), 3);
        assert_eq!(requests[0]["data"]["attributes"]["effective_date"], "2024-12-01");
        assert!(requests[1]["data"]["relationships"]["account"]["data"].is_null());
    }

    #[test]
    fn test_create_unknown_service_and_account() {
        let server = MockExivityServer::start(MockConfig::default()).unwrap();
        let client = client(&server);

        let err = client.create_rate(&new_rate(None, 99, "20250101")).unwrap_err();
        assert_eq!(err.code.as_deref(), Some("service_not_found"));
        assert_eq!(classify_error(&err), ErrorCategory::ServiceNotFound);

        let err = client.create_rate(&new_rate(Some(42), 1, "20250101")).unwrap_err();
        assert_eq!(classify_error(&err), ErrorCategory::AccountNotFound);
    }

    #[test]
    fn test_rates_with_account_names() {
        let server = MockExivityServer::start(MockConfig::default()).unwrap();
        server.add_rate(Some(1), 1, "2024-01-01");
        server.add_rate(None, 2, "2024-02-01");
        let client = client(&server);

        let rates = fetch_all(500, |p| client.list_rates(p)).unwrap();
        assert_eq!(rates.len(), 2);
        assert_eq!(rates[0].account_name.as_deref(), Some("Account 1"));
        assert!(rates[1].is_global());
        assert_eq!(rates[1].rate, Some(Decimal::ONE));
    }

    #[test]
    fn test_accounts_paginated() {
        let server = MockExivityServer::start(MockConfig {
            num_accounts: 5,
            ..Default::default()
        })
        .unwrap();
        let client = client(&server);

        let accounts = fetch_all(2, |p| client.list_accounts(p)).unwrap();
        let ids: Vec<u64> = accounts.iter().map(|a| a.id).collect();
        assert_eq!(ids, vec![1, 2, 3, 4, 5]);
        assert_eq!(accounts[0].name, "Account 1");
    }

    #[test]
    fn test_rates_without_date_do_not_end_paging() {
        let server = MockExivityServer::start(MockConfig::default()).unwrap();
        server.add_rate(None, 1, "");
        server.add_rate(None, 2, "2024-01-01");
        server.add_rate(None, 3, "2024-02-01");
        let client = client(&server);

        let rates = fetch_all(2, |p| client.list_rates(p)).unwrap();
        let service_ids: Vec<u64> = rates.iter().map(|r| r.service_id).collect();
        assert_eq!(service_ids, vec![2, 3]);
    }

    #[test]
    fn test_auth_failure() {
        let server = MockExivityServer::start(MockConfig {
            fail_auth: true,
            ..Default::default()
        })
        .unwrap();
        let client = client(&server);

        match client.list_services(PageRequest::first(10)) {
            Err(DomainError::Auth(_)) => {}
            other => panic!("expected auth error, got {:?}", other),
        }
        let err = client.create_rate(&new_rate(None, 1, "20250101")).unwrap_err();
        assert_eq!(err.status, Some(401));
    }

    #[test]
    fn test_rate_limit() {
        let server = MockExivityServer::start(MockConfig {
            rate_limit: true,
            ..Default::default()
        })
        .unwrap();
        let client = client(&server);

        let err = client.list_rates(PageRequest::first(10)).unwrap_err();
        assert!(err.to_string().to_lowercase().contains("rate limit"));
    }
}
