// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use std::collections::BTreeMap;
use thiserror::Error;

/// Option-list fetch failed. Never fatal: the field stays empty.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{}", self.describe())]
pub struct LookupError {
    pub status: Option<u16>,
    pub message: String,
}

impl LookupError {
    pub fn transport(message: impl Into<String>) -> Self {
        Self {
            status: None,
            message: message.into(),
        }
    }

    pub fn http(status: u16, message: impl Into<String>) -> Self {
        Self {
            status: Some(status),
            message: message.into(),
        }
    }

    fn describe(&self) -> String {
        match self.status {
            Some(status) => format!("lookup failed ({status}): {}", self.message),
            None => format!("lookup failed: {}", self.message),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SubmissionError {
    #[error("session expired -- sign in again and retry")]
    Unauthorized,
    #[error("conflict: {message}")]
    Conflict { message: String },
    #[error("{message}")]
    Invalid {
        fields: BTreeMap<String, Vec<String>>,
        message: String,
    },
    #[error("request rejected ({status}): {message}")]
    Rejected { status: u16, message: String },
    #[error("server error ({status}) -- try again shortly")]
    ServerError { status: u16 },
    #[error("network error: {message} -- check your connection and retry")]
    Network { message: String },
}

impl SubmissionError {
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::ServerError { .. } | Self::Network { .. })
    }

    /// One-line user-facing text; field errors are flattened as `field: message`.
    pub fn notice(&self) -> String {
        match self {
            Self::Invalid { fields, message } if !fields.is_empty() => fields
                .iter()
                .flat_map(|(field, messages)| {
                    messages.iter().map(move |text| format!("{field}: {text}"))
                })
                .collect::<Vec<_>>()
                .join("; "),
            Self::Invalid { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{LookupError, SubmissionError};
    use std::collections::BTreeMap;

    #[test]
    fn invalid_notice_lists_every_field_message() {
        let mut fields = BTreeMap::new();
        fields.insert(
            "domain".to_owned(),
            vec!["is taken".to_owned(), "is too long".to_owned()],
        );
        fields.insert("name".to_owned(), vec!["can't be blank".to_owned()]);
        let error = SubmissionError::Invalid {
            fields,
            message: "validation failed".to_owned(),
        };
        assert_eq!(
            error.notice(),
            "domain: is taken; domain: is too long; name: can't be blank"
        );
    }

    #[test]
    fn invalid_without_fields_uses_generic_message() {
        let error = SubmissionError::Invalid {
            fields: BTreeMap::new(),
            message: "could not save".to_owned(),
        };
        assert_eq!(error.notice(), "could not save");
    }

    #[test]
    fn only_server_and_network_errors_are_retryable() {
        assert!(SubmissionError::ServerError { status: 503 }.is_retryable());
        assert!(
            SubmissionError::Network {
                message: "refused".to_owned()
            }
            .is_retryable()
        );
        assert!(!SubmissionError::Unauthorized.is_retryable());
        assert!(
            !SubmissionError::Conflict {
                message: "exists".to_owned()
            }
            .is_retryable()
        );
    }

    #[test]
    fn lookup_error_display_includes_status_when_known() {
        assert_eq!(
            LookupError::http(500, "boom").to_string(),
            "lookup failed (500): boom"
        );
        assert_eq!(
            LookupError::transport("refused").to_string(),
            "lookup failed: refused"
        );
    }
}
