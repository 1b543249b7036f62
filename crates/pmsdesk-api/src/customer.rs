// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use pmsdesk_app::{CustomerProfile, CustomerQuery, LookupError};
use reqwest::StatusCode;
use serde::Deserialize;
use tracing::{debug, warn};
use url::Url;

use crate::{Client, body_message, status_reason, transport_message};

pub const DEFAULT_CUSTOMER_LOOKUP_PATH: &str = "/pms/admin/restaurants/get_user_data.json";

#[derive(Debug, Default, Deserialize)]
struct UserDataResponse {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    mobile: Option<String>,
    #[serde(default)]
    delivery_address: Option<String>,
}

impl UserDataResponse {
    fn into_profile(self) -> Option<CustomerProfile> {
        let clean = |value: Option<String>| {
            value
                .map(|text| text.trim().to_owned())
                .unwrap_or_default()
        };
        let profile = CustomerProfile {
            customer_name: clean(self.name),
            customer_mobile: clean(self.mobile),
            customer_email: clean(self.email),
            delivery_address: clean(self.delivery_address),
        };
        let found = !profile.customer_name.is_empty()
            || !profile.customer_email.is_empty()
            || !profile.customer_mobile.is_empty();
        found.then_some(profile)
    }
}

impl Client {
    /// Looks up a known customer by mobile and/or email. `Ok(None)` means
    /// no match.
    pub fn lookup_customer(
        &self,
        query: &CustomerQuery,
    ) -> Result<Option<CustomerProfile>, LookupError> {
        let mut url = Url::parse(&self.url(&self.customer_lookup_path))
            .map_err(|error| LookupError::transport(format!("customer lookup url: {error}")))?;
        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair("skp_dr", "true");
            if let Some(mobile) = &query.mobile {
                pairs.append_pair("customer_mobile", mobile);
            }
            if let Some(email) = &query.email {
                pairs.append_pair("customer_email", email);
            }
        }
        debug!(path = %self.customer_lookup_path, "customer lookup");

        let response = self.get_json(url.as_str()).send().map_err(|error| {
            LookupError::transport(transport_message(&self.base_url, &error))
        })?;
        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            warn!("customer lookup returned 404, treating as no match");
            return Ok(None);
        }
        let body = response
            .text()
            .map_err(|error| LookupError::http(status.as_u16(), format!("read body: {error}")))?;
        if !status.is_success() {
            let message = body_message(&body).unwrap_or_else(|| status_reason(status));
            return Err(LookupError::http(status.as_u16(), message));
        }
        if body.trim().is_empty() || body.trim() == "null" {
            return Ok(None);
        }
        let parsed: UserDataResponse = serde_json::from_str(&body).map_err(|error| {
            LookupError::http(status.as_u16(), format!("decode customer: {error}"))
        })?;
        Ok(parsed.into_profile())
    }
}
