// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use pmsdesk_app::{Part, Payload, SubmissionError, SubmitMethod, SubmitOutcome};
use reqwest::blocking::multipart::{Form, Part as FormPart};
use reqwest::header::ACCEPT;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt::Display;
use tracing::{debug, error, warn};

use crate::{Client, body_message, transport_message};

const GENERIC_INVALID: &str = "the server rejected some fields -- review the form and retry";

impl Client {
    pub fn submit(
        &self,
        method: SubmitMethod,
        path: &str,
        payload: &Payload,
    ) -> Result<SubmitOutcome, SubmissionError> {
        let url = self.url(path);
        let request = match method {
            SubmitMethod::Post => self.http.post(&url),
            SubmitMethod::Put => self.http.put(&url),
            SubmitMethod::Patch => self.http.patch(&url),
        };
        let request = self
            .authorized(request)
            .header(ACCEPT, "application/json");
        let request = match payload {
            Payload::Json(body) => request.json(body),
            Payload::Multipart(parts) => request.multipart(multipart_form(parts)),
        };
        debug!(
            method = method.as_str(),
            %url,
            multipart = payload.is_multipart(),
            "submit"
        );

        let response = request.send().map_err(|error| {
            let message = transport_message(&self.base_url, &error);
            error!(%url, "submit failed: {message}");
            SubmissionError::Network { message }
        })?;
        let status = response.status().as_u16();
        let body = response_body(&url, status, response.text());
        let result = interpret_response(status, &body);
        if let Err(failure) = &result {
            error!(%url, status, "submit rejected: {failure}");
        }
        result
    }
}

/// An unreadable body is treated as empty; for a 422 that means the
/// field errors are lost, so the failure is logged.
fn response_body<E: Display>(url: &str, status: u16, read: Result<String, E>) -> String {
    match read {
        Ok(body) => body,
        Err(read_error) => {
            warn!(%url, status, "read submit response body: {read_error}");
            String::new()
        }
    }
}

fn multipart_form(parts: &[(String, Part)]) -> Form {
    parts.iter().fold(Form::new(), |form, (key, part)| match part {
        Part::Text(text) => form.text(key.clone(), text.clone()),
        Part::File(file) => {
            let bytes = || FormPart::bytes(file.data.clone()).file_name(file.file_name.clone());
            let part = bytes().mime_str(&file.mime_type).unwrap_or_else(|_| bytes());
            form.part(key.clone(), part)
        }
    })
}

/// Maps a submission response onto the typed outcome.
pub fn interpret_response(status: u16, body: &str) -> Result<SubmitOutcome, SubmissionError> {
    let message = || body_message(body);
    match status {
        200..=299 => Ok(SubmitOutcome {
            status,
            message: message(),
        }),
        401 => Err(SubmissionError::Unauthorized),
        409 => Err(SubmissionError::Conflict {
            message: message().unwrap_or_else(|| "the record was changed elsewhere".to_owned()),
        }),
        422 => {
            let fields = field_errors(body);
            let message = message().unwrap_or_else(|| GENERIC_INVALID.to_owned());
            Err(SubmissionError::Invalid { fields, message })
        }
        400..=499 => Err(SubmissionError::Rejected {
            status,
            message: message().unwrap_or_else(|| format!("HTTP {status}")),
        }),
        _ => Err(SubmissionError::ServerError { status }),
    }
}

/// Reads `errors` as either `{field: [msgs]}` / `{field: msg}` or a list of
/// strings filed under `base`.
fn field_errors(body: &str) -> BTreeMap<String, Vec<String>> {
    let mut fields = BTreeMap::new();
    let Ok(value) = serde_json::from_str::<Value>(body) else {
        return fields;
    };
    match value.get("errors") {
        Some(Value::Object(map)) => {
            for (field, messages) in map {
                let messages = match messages {
                    Value::String(text) => vec![text.clone()],
                    Value::Array(items) => items
                        .iter()
                        .filter_map(Value::as_str)
                        .map(str::to_owned)
                        .collect(),
                    _ => Vec::new(),
                };
                if !messages.is_empty() {
                    fields.insert(field.clone(), messages);
                }
            }
        }
        Some(Value::Array(items)) => {
            let messages: Vec<String> = items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_owned)
                .collect();
            if !messages.is_empty() {
                fields.insert("base".to_owned(), messages);
            }
        }
        _ => {}
    }
    fields
}

#[cfg(test)]
mod tests {
    use super::{interpret_response, response_body};
    use pmsdesk_app::SubmissionError;

    #[test]
    fn unreadable_body_falls_back_to_generic_invalid() {
        let body = response_body("http://fm.test/organizations.json", 422, Err("connection reset"));
        assert_eq!(body, "");
        let Err(SubmissionError::Invalid { fields, message }) = interpret_response(422, &body) else {
            panic!("expected invalid");
        };
        assert!(fields.is_empty());
        assert!(message.contains("rejected some fields"));

        let read: Result<String, &str> = Ok(r#"{"id":1}"#.to_owned());
        assert_eq!(response_body("http://fm.test/x", 201, read), r#"{"id":1}"#);
    }

    #[test]
    fn success_keeps_server_message() {
        let outcome = interpret_response(201, r#"{"message":"Organization created"}"#)
            .expect("created");
        assert_eq!(outcome.status, 201);
        assert_eq!(outcome.message.as_deref(), Some("Organization created"));
        assert_eq!(interpret_response(204, "").map(|outcome| outcome.message), Ok(None));
    }

    #[test]
    fn status_classes_map_to_typed_errors() {
        assert_eq!(interpret_response(401, "{}"), Err(SubmissionError::Unauthorized));
        assert_eq!(
            interpret_response(409, r#"{"error":"domain taken"}"#),
            Err(SubmissionError::Conflict {
                message: "domain taken".to_owned()
            })
        );
        assert_eq!(
            interpret_response(403, r#"{"message":"not allowed"}"#),
            Err(SubmissionError::Rejected {
                status: 403,
                message: "not allowed".to_owned()
            })
        );
        let server = interpret_response(503, "").expect_err("server error");
        assert_eq!(server, SubmissionError::ServerError { status: 503 });
        assert!(server.is_retryable());
    }

    #[test]
    fn unprocessable_collects_field_errors() {
        let Err(SubmissionError::Invalid { fields, message }) = interpret_response(
            422,
            r#"{"errors":{"domain":["has already been taken"],"name":"can't be blank"}}"#,
        ) else {
            panic!("expected invalid");
        };
        assert_eq!(fields["domain"], vec!["has already been taken".to_owned()]);
        assert_eq!(fields["name"], vec!["can't be blank".to_owned()]);
        assert!(message.contains("rejected some fields"));
    }

    #[test]
    fn unprocessable_without_field_map_uses_single_message() {
        let error = interpret_response(422, r#"{"message":"Invalid payload"}"#)
            .expect_err("invalid");
        assert_eq!(
            error,
            SubmissionError::Invalid {
                fields: Default::default(),
                message: "Invalid payload".to_owned(),
            }
        );
        assert_eq!(error.notice(), "Invalid payload");

        let listed = interpret_response(422, r#"{"errors":["Logo is too large"]}"#)
            .expect_err("invalid");
        assert_eq!(listed.notice(), "base: Logo is too large");
    }
}
