// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Result, bail};
use pmsdesk_app::{LookupError, RemoteOption};
use reqwest::StatusCode;
use serde_json::Value;
use std::collections::BTreeSet;
use tracing::{debug, warn};

use crate::{Client, body_message, status_reason, transport_message};

const PARENT_PLACEHOLDER: &str = "{parent}";

/// Where the records sit in a response body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectionShape {
    /// `{ "<key>": [ {...}, ... ] }`
    Keyed(&'static str),
    /// `[ { "<key>": {...} }, ... ]`
    Wrapped(&'static str),
    /// `[ {...}, ... ]`
    Bare,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LabelRule {
    Field(&'static str),
    /// First non-empty field wins.
    FirstOf(&'static [&'static str]),
    /// Non-empty fields joined by a space.
    Join(&'static [&'static str]),
}

impl LabelRule {
    fn fields(&self) -> &[&'static str] {
        match self {
            Self::Field(field) => std::slice::from_ref(field),
            Self::FirstOf(fields) | Self::Join(fields) => fields,
        }
    }

    fn label(&self, record: &Value) -> Option<String> {
        match self {
            Self::Field(field) => field_text(record, field).map(str::to_owned),
            Self::FirstOf(fields) => fields
                .iter()
                .find_map(|field| field_text(record, field))
                .map(str::to_owned),
            Self::Join(fields) => {
                let parts: Vec<&str> = fields
                    .iter()
                    .filter_map(|field| field_text(record, field))
                    .collect();
                (!parts.is_empty()).then(|| parts.join(" "))
            }
        }
    }
}

fn field_text<'a>(record: &'a Value, field: &str) -> Option<&'a str> {
    record
        .get(field)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|text| !text.is_empty())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourceSpec {
    pub key: &'static str,
    pub endpoint: &'static str,
    pub shape: CollectionShape,
    pub id_field: &'static str,
    pub label: LabelRule,
}

impl ResourceSpec {
    pub fn needs_parent(&self) -> bool {
        self.endpoint.contains(PARENT_PLACEHOLDER)
    }

    /// Request path, or `None` when the endpoint needs a parent that is absent.
    pub fn path(&self, parent: Option<&str>) -> Option<String> {
        if !self.needs_parent() {
            return Some(self.endpoint.to_owned());
        }
        let parent = parent.map(str::trim).filter(|value| !value.is_empty())?;
        Some(self.endpoint.replace(PARENT_PLACEHOLDER, parent))
    }

    fn validate(&self) -> Result<()> {
        if self.key.trim().is_empty() {
            bail!("resource key must not be empty");
        }
        if !self.endpoint.starts_with('/') {
            bail!(
                "resource {} endpoint {:?} must start with `/`",
                self.key,
                self.endpoint
            );
        }
        if self.endpoint.matches(PARENT_PLACEHOLDER).count() > 1 {
            bail!(
                "resource {} endpoint {:?} has more than one {PARENT_PLACEHOLDER} placeholder",
                self.key,
                self.endpoint
            );
        }
        if self.id_field.trim().is_empty() {
            bail!("resource {} needs an id field", self.key);
        }
        let label_fields = self.label.fields();
        if label_fields.is_empty() || label_fields.iter().any(|field| field.trim().is_empty()) {
            bail!("resource {} needs at least one non-empty label field", self.key);
        }
        match self.shape {
            CollectionShape::Keyed(key) | CollectionShape::Wrapped(key) if key.trim().is_empty() => {
                bail!("resource {} collection key must not be empty", self.key)
            }
            _ => Ok(()),
        }
    }
}

/// Validated set of lookup resources, addressed by key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceCatalog {
    specs: Vec<ResourceSpec>,
}

impl ResourceCatalog {
    pub fn new(specs: &[ResourceSpec]) -> Result<Self> {
        let mut seen = BTreeSet::new();
        for spec in specs {
            spec.validate()?;
            if !seen.insert(spec.key) {
                bail!("resource {} is declared twice", spec.key);
            }
        }
        Ok(Self {
            specs: specs.to_vec(),
        })
    }

    pub fn get(&self, key: &str) -> Option<&ResourceSpec> {
        self.specs.iter().find(|spec| spec.key == key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.specs.iter().map(|spec| spec.key)
    }
}

const NAME: LabelRule = LabelRule::Field("name");

pub const LOCATION_RESOURCES: &[ResourceSpec] = &[
    ResourceSpec {
        key: "sites",
        endpoint: "/pms/sites.json",
        shape: CollectionShape::Keyed("sites"),
        id_field: "id",
        label: NAME,
    },
    ResourceSpec {
        key: "buildings",
        endpoint: "/pms/sites/{parent}/buildings.json",
        shape: CollectionShape::Keyed("buildings"),
        id_field: "id",
        label: NAME,
    },
    ResourceSpec {
        key: "wings",
        endpoint: "/pms/buildings/{parent}/wings.json",
        shape: CollectionShape::Wrapped("wings"),
        id_field: "id",
        label: NAME,
    },
    ResourceSpec {
        key: "areas",
        endpoint: "/pms/wings/{parent}/areas.json",
        shape: CollectionShape::Keyed("areas"),
        id_field: "id",
        label: NAME,
    },
    ResourceSpec {
        key: "floors",
        endpoint: "/pms/areas/{parent}/floors.json",
        shape: CollectionShape::Keyed("floors"),
        id_field: "id",
        label: NAME,
    },
    ResourceSpec {
        key: "rooms",
        endpoint: "/pms/floors/{parent}/rooms.json",
        shape: CollectionShape::Wrapped("rooms"),
        id_field: "id",
        label: NAME,
    },
    ResourceSpec {
        key: "departments",
        endpoint: "/pms/departments.json",
        shape: CollectionShape::Keyed("departments"),
        id_field: "id",
        label: LabelRule::FirstOf(&["department_name", "name"]),
    },
    ResourceSpec {
        key: "users",
        endpoint: "/pms/users.json",
        shape: CollectionShape::Keyed("users"),
        id_field: "id",
        label: LabelRule::Join(&["first_name", "last_name"]),
    },
];

pub fn location_catalog() -> Result<ResourceCatalog> {
    ResourceCatalog::new(LOCATION_RESOURCES)
}

/// Maps a decoded body onto options. Records without an id or a label are
/// skipped; a body of the wrong shape is an error.
pub fn normalize_options(spec: &ResourceSpec, body: &Value) -> Result<Vec<RemoteOption>, String> {
    let records: Vec<&Value> = match spec.shape {
        CollectionShape::Keyed(key) => body
            .get(key)
            .and_then(Value::as_array)
            .ok_or_else(|| format!("expected a `{key}` array"))?
            .iter()
            .collect(),
        CollectionShape::Wrapped(key) => body
            .as_array()
            .ok_or_else(|| "expected a JSON array".to_owned())?
            .iter()
            .filter_map(|entry| entry.get(key))
            .collect(),
        CollectionShape::Bare => body
            .as_array()
            .ok_or_else(|| "expected a JSON array".to_owned())?
            .iter()
            .collect(),
    };

    Ok(records
        .into_iter()
        .filter_map(|record| {
            let id = record_id(record.get(spec.id_field)?)?;
            let label = spec.label.label(record)?;
            Some(RemoteOption::new(id, label))
        })
        .collect())
}

fn record_id(value: &Value) -> Option<i64> {
    match value {
        Value::Number(number) => number.as_i64(),
        Value::String(text) => text.trim().parse().ok(),
        _ => None,
    }
}

impl Client {
    /// Fresh GET per call; nothing is cached.
    pub fn fetch_options(
        &self,
        spec: &ResourceSpec,
        parent: Option<&str>,
    ) -> Result<Vec<RemoteOption>, LookupError> {
        let Some(path) = spec.path(parent) else {
            debug!(resource = spec.key, "no parent value, skipping lookup");
            return Ok(Vec::new());
        };
        let url = self.url(&path);
        debug!(resource = spec.key, %url, "lookup");

        let response = self.get_json(&url).send().map_err(|error| {
            LookupError::transport(transport_message(&self.base_url, &error))
        })?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            warn!(resource = spec.key, %url, "lookup returned 404, treating as empty");
            return Ok(Vec::new());
        }
        let body = response
            .text()
            .map_err(|error| LookupError::http(status.as_u16(), format!("read body: {error}")))?;
        if !status.is_success() {
            let message = body_message(&body).unwrap_or_else(|| status_reason(status));
            return Err(LookupError::http(status.as_u16(), message));
        }

        let decode_error =
            |detail: String| LookupError::http(status.as_u16(), format!("decode {}: {detail}", spec.key));
        let value: Value =
            serde_json::from_str(&body).map_err(|error| decode_error(error.to_string()))?;
        let options = normalize_options(spec, &value).map_err(decode_error)?;
        debug!(resource = spec.key, count = options.len(), "lookup done");
        Ok(options)
    }
}
