//! REST transport for the tracking service.
//!
//! Speaks the ShotGrid REST API (`/api/v1`): script credentials are
//! exchanged for a short-lived bearer token, which is cached until shortly
//! before it expires. Every request has a fixed timeout. Connection failures
//! surface as [`Refused`](ErrorKind::Refused) and timeouts as
//! [`Unavailable`](ErrorKind::Unavailable), so that a
//! [`RetryingService`](super::RetryingService) knows which writes are safe
//! to repeat.

use crate::TrackingService;
use crate::error::{ErrorKind, Result};
use crate::record::{EntityType, Fields, Filter, Order, Record};
use exn::{OptionExt, ResultExt};
use nox_config::TrackingSettings;
use reqwest::StatusCode;
use reqwest::blocking::{Client, RequestBuilder};
use serde::Deserialize;
use serde_json::{Value, json};
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

const SEARCH_CONTENT_TYPE: &str = "application/vnd+shotgun.api3_array+json";
/// Refresh tokens this long before the service says they expire.
const TOKEN_MARGIN: Duration = Duration::from_secs(30);

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

struct Token {
    value: String,
    expires_at: Instant,
}

/// Blocking REST client for the tracking service.
pub struct HttpService {
    base_url: String,
    script_name: String,
    api_key: String,
    client: Client,
    token: Mutex<Option<Token>>,
}
impl HttpService {
    /// Build a client from settings.
    ///
    /// # Errors
    /// [`NotConfigured`](ErrorKind::NotConfigured) when the URL or script
    /// credentials are missing.
    pub fn new(settings: &TrackingSettings) -> Result<Self> {
        if settings.url.is_empty() || settings.script_name.is_empty() || settings.api_key.is_empty() {
            exn::bail!(ErrorKind::NotConfigured);
        }
        let client = Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .user_agent(concat!("nox/", env!("CARGO_PKG_VERSION")))
            .build()
            .or_raise(|| ErrorKind::NotConfigured)?;
        Ok(Self {
            base_url: settings.url.trim_end_matches('/').to_string(),
            script_name: settings.script_name.clone(),
            api_key: settings.api_key.clone(),
            client,
            token: Mutex::new(None),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/v1/{path}", self.base_url)
    }

    fn token(&self) -> Result<String> {
        let mut cached = self.token.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(token) = cached.as_ref()
            && Instant::now() < token.expires_at
        {
            return Ok(token.value.clone());
        }
        let request = self.client.post(self.url("auth/access_token")).form(&[
            ("grant_type", "client_credentials"),
            ("client_id", self.script_name.as_str()),
            ("client_secret", self.api_key.as_str()),
        ]);
        let response: TokenResponse =
            serde_json::from_value(send(request)?).or_raise(|| ErrorKind::InvalidResponse)?;
        tracing::debug!(expires_in = response.expires_in, "Obtained tracking service token");
        let lifetime = Duration::from_secs(response.expires_in).saturating_sub(TOKEN_MARGIN);
        let value = response.access_token;
        *cached = Some(Token { value: value.clone(), expires_at: Instant::now() + lifetime });
        Ok(value)
    }

    /// Send an authenticated request and return the decoded body.
    fn call(&self, request: RequestBuilder) -> Result<Value> {
        let result = send(request.bearer_auth(self.token()?));
        if let Err(err) = &result
            && matches!(&**err, ErrorKind::Auth)
        {
            // Revoked or expired early; fetch a fresh token next time.
            *self.token.lock().unwrap_or_else(PoisonError::into_inner) = None;
        }
        result
    }
}

/// Send `request`, mapping transport failures and error statuses.
fn send(request: RequestBuilder) -> Result<Value> {
    let response = match request.send() {
        Ok(response) => response,
        Err(err) => {
            let kind = transport_error(&err);
            return Err(err).or_raise(|| kind);
        },
    };
    let status = response.status();
    if !status.is_success() {
        let message = response.text().unwrap_or_default();
        exn::bail!(ErrorKind::from_status(status.as_u16(), error_message(&message)));
    }
    if status == StatusCode::NO_CONTENT {
        return Ok(Value::Null);
    }
    response.json::<Value>().or_raise(|| ErrorKind::InvalidResponse)
}

fn transport_error(err: &reqwest::Error) -> ErrorKind {
    if err.is_decode() {
        ErrorKind::InvalidResponse
    } else if err.is_connect() {
        ErrorKind::Refused(err.to_string())
    } else if err.is_timeout() {
        ErrorKind::Unavailable("request timed out".to_string())
    } else {
        ErrorKind::Unavailable(err.to_string())
    }
}

/// Pull the first `errors[].detail` out of an error body, if it has one.
fn error_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|value| value.pointer("/errors/0/detail").and_then(Value::as_str).map(str::to_string))
        .unwrap_or_else(|| body.chars().take(200).collect())
}

/// Query string for a search returning at most one record.
fn search_query(fields: &[&str], order: &[Order]) -> Vec<(&'static str, String)> {
    let mut query = vec![("page[size]", "1".to_string()), ("page[number]", "1".to_string())];
    if !fields.is_empty() {
        query.push(("fields", fields.join(",")));
    }
    if !order.is_empty() {
        query.push(("sort", order.iter().map(Order::to_param).collect::<Vec<_>>().join(",")));
    }
    query
}

/// Flatten a JSON:API resource into a [`Record`]: attributes and
/// relationship links share one field map.
fn parse_record(resource: &Value) -> Option<Record> {
    let entity_type = EntityType::from_name(resource.get("type")?.as_str()?)?;
    let id = resource.get("id")?.as_i64()?;
    let mut fields = resource.get("attributes").and_then(Value::as_object).cloned().unwrap_or_default();
    if let Some(relationships) = resource.get("relationships").and_then(Value::as_object) {
        for (name, relationship) in relationships {
            if let Some(data) = relationship.get("data") {
                fields.insert(name.clone(), data.clone());
            }
        }
    }
    Some(Record::new(entity_type, id, fields))
}

fn single_record(body: &Value) -> Result<Record> {
    body.get("data").and_then(parse_record).ok_or_raise(|| ErrorKind::InvalidResponse)
}

impl TrackingService for HttpService {
    fn name(&self) -> &str {
        &self.base_url
    }

    #[tracing::instrument(level = "debug", skip_all, fields(entity = %entity_type))]
    fn find_one(
        &self,
        entity_type: EntityType,
        filters: &[Filter],
        fields: &[&str],
        order: &[Order],
    ) -> Result<Option<Record>> {
        let filters: Vec<Value> = filters.iter().map(Filter::to_value).collect();
        let request = self
            .client
            .post(self.url(&format!("entity/{}/_search", entity_type.collection())))
            .query(&search_query(fields, order))
            .header(reqwest::header::CONTENT_TYPE, SEARCH_CONTENT_TYPE)
            .body(json!({ "filters": filters }).to_string());
        let body = self.call(request)?;
        let data = body.get("data").and_then(Value::as_array).ok_or_raise(|| ErrorKind::InvalidResponse)?;
        match data.first() {
            Some(resource) => Ok(Some(parse_record(resource).ok_or_raise(|| ErrorKind::InvalidResponse)?)),
            None => Ok(None),
        }
    }

    #[tracing::instrument(level = "debug", skip_all, fields(entity = %entity_type))]
    fn create(&self, entity_type: EntityType, data: &Fields) -> Result<Record> {
        let request = self.client.post(self.url(&format!("entity/{}", entity_type.collection()))).json(data);
        let record = single_record(&self.call(request)?)?;
        tracing::info!(id = record.id, "Created tracking record");
        Ok(record)
    }

    #[tracing::instrument(level = "debug", skip_all, fields(entity = %entity_type))]
    fn update(&self, entity_type: EntityType, id: i64, data: &Fields) -> Result<Record> {
        let request = self.client.put(self.url(&format!("entity/{}/{id}", entity_type.collection()))).json(data);
        single_record(&self.call(request)?)
    }
}
