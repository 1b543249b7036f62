// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use serde::{Deserialize, Serialize};

use crate::ids::*;

/// Normalized lookup entry, whatever field names the source resource uses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteOption {
    pub id: OptionId,
    pub display_name: String,
}

impl RemoteOption {
    pub fn new(id: i64, display_name: impl Into<String>) -> Self {
        Self {
            id: OptionId::new(id),
            display_name: display_name.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileAttachment {
    pub file_name: String,
    pub mime_type: String,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum FieldValue {
    Text(String),
    Bool(bool),
    Ids(Vec<i64>),
    File(FileAttachment),
}

impl FieldValue {
    pub fn text(value: impl Into<String>) -> Self {
        Self::Text(value.into())
    }

    /// Empty means "nothing to send": blank text, no ids, or a zero-byte file.
    /// Booleans are never empty.
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Text(value) => value.trim().is_empty(),
            Self::Bool(_) => false,
            Self::Ids(ids) => ids.is_empty(),
            Self::File(file) => file.data.is_empty(),
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(value) => Some(*value),
            _ => None,
        }
    }

    pub const fn is_file(&self) -> bool {
        matches!(self, Self::File(_))
    }

    pub fn display(&self) -> String {
        match self {
            Self::Text(value) => value.clone(),
            Self::Bool(true) => "yes".to_owned(),
            Self::Bool(false) => "no".to_owned(),
            Self::Ids(ids) => ids
                .iter()
                .map(i64::to_string)
                .collect::<Vec<_>>()
                .join(", "),
            Self::File(file) => format!("{} ({} bytes)", file.file_name, file.data.len()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FormKind {
    Organization,
    Contact,
    Role,
}

impl FormKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Organization => "organization",
            Self::Contact => "contact",
            Self::Role => "role",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "organization" => Some(Self::Organization),
            "contact" => Some(Self::Contact),
            "role" => Some(Self::Role),
            _ => None,
        }
    }

    /// Fixed storage namespace for this form's draft.
    pub const fn draft_namespace(self) -> &'static str {
        match self {
            Self::Organization => "draft.organization",
            Self::Contact => "draft.contact",
            Self::Role => "draft.role",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScreenKind {
    Locations,
    Roles,
    Organization,
    Contact,
}

impl ScreenKind {
    pub const ALL: [Self; 4] = [
        Self::Locations,
        Self::Roles,
        Self::Organization,
        Self::Contact,
    ];

    pub const fn label(self) -> &'static str {
        match self {
            Self::Locations => "Locations",
            Self::Roles => "Roles",
            Self::Organization => "Organization",
            Self::Contact => "Contact",
        }
    }

    pub const fn form_kind(self) -> Option<FormKind> {
        match self {
            Self::Locations => None,
            Self::Roles => Some(FormKind::Role),
            Self::Organization => Some(FormKind::Organization),
            Self::Contact => Some(FormKind::Contact),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AppMode {
    Nav,
    Edit,
}

/// Customer record returned by the contact lookup endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CustomerProfile {
    #[serde(default)]
    pub customer_name: String,
    #[serde(default)]
    pub customer_mobile: String,
    #[serde(default)]
    pub customer_email: String,
    #[serde(default)]
    pub delivery_address: String,
}

/// Accepted submission, with the server's message when it sent one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmitOutcome {
    pub status: u16,
    pub message: Option<String>,
}
