// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Context, Result, bail};
use reqwest::blocking::{Client as HttpClient, RequestBuilder};
use reqwest::header::ACCEPT;
use std::time::Duration;
use url::Url;

mod customer;
mod export;
mod lookup;
mod submit;

pub use customer::DEFAULT_CUSTOMER_LOOKUP_PATH;
pub use export::Download;
pub use lookup::{
    CollectionShape, LOCATION_RESOURCES, LabelRule, ResourceCatalog, ResourceSpec,
    location_catalog, normalize_options,
};
pub use submit::interpret_response;

#[derive(Debug, Clone)]
pub struct Client {
    base_url: String,
    token: Option<String>,
    timeout: Duration,
    customer_lookup_path: String,
    http: HttpClient,
}

impl Client {
    pub fn new(base_url: &str, token: Option<&str>, timeout: Duration) -> Result<Self> {
        let base_url = base_url.trim().trim_end_matches('/').to_owned();
        if base_url.is_empty() {
            bail!("api.base_url must not be empty");
        }
        let parsed = Url::parse(&base_url)
            .with_context(|| format!("api.base_url {base_url:?} is not a valid URL"))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            bail!(
                "api.base_url must use http or https, got {:?} -- use e.g. https://fm.example.com",
                parsed.scheme()
            );
        }

        let http = HttpClient::builder()
            .timeout(timeout)
            .build()
            .context("build HTTP client")?;

        Ok(Self {
            base_url,
            token: token
                .map(str::trim)
                .filter(|token| !token.is_empty())
                .map(str::to_owned),
            timeout,
            customer_lookup_path: DEFAULT_CUSTOMER_LOOKUP_PATH.to_owned(),
            http,
        })
    }

    pub fn with_customer_lookup_path(mut self, path: &str) -> Self {
        self.customer_lookup_path = path.to_owned();
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn has_token(&self) -> bool {
        self.token.is_some()
    }

    fn url(&self, path: &str) -> String {
        if path.starts_with('/') {
            format!("{}{path}", self.base_url)
        } else {
            format!("{}/{path}", self.base_url)
        }
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    fn get_json(&self, url: &str) -> RequestBuilder {
        self.authorized(self.http.get(url))
            .header(ACCEPT, "application/json")
    }
}

fn transport_message(base_url: &str, error: &reqwest::Error) -> String {
    if error.is_timeout() {
        format!("{base_url} timed out -- check the network or raise api.timeout")
    } else {
        format!("cannot reach {base_url} ({error})")
    }
}

/// Pulls a human message out of an error body: `message`, then `error`, then
/// a short plain-text body.
fn body_message(body: &str) -> Option<String> {
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(body) {
        for key in ["message", "error"] {
            if let Some(text) = value.get(key).and_then(serde_json::Value::as_str)
                && !text.trim().is_empty()
            {
                return Some(text.trim().to_owned());
            }
        }
        return None;
    }
    let trimmed = body.trim();
    if !trimmed.is_empty() && trimmed.len() < 100 && !trimmed.contains('<') {
        return Some(trimmed.to_owned());
    }
    None
}

fn status_reason(status: reqwest::StatusCode) -> String {
    status
        .canonical_reason()
        .map_or_else(|| format!("HTTP {}", status.as_u16()), str::to_owned)
}
