// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use serde_json::{Map, Value};
use tracing::warn;

use crate::draft::FormDraft;
use crate::{FieldValue, FileAttachment};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitMethod {
    Post,
    Put,
    Patch,
}

impl SubmitMethod {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    Text,
    Bool,
    Ids,
    File,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expand {
    Single,
    /// `Ids` become one `remote[]` entry per id.
    Repeated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Presence {
    OmitEmpty,
    Always,
}

/// How one local draft field reaches the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldMapping {
    pub local: &'static str,
    pub remote: &'static str,
    pub kind: ValueKind,
    pub expand: Expand,
    pub presence: Presence,
}

impl FieldMapping {
    pub const fn text(local: &'static str, remote: &'static str) -> Self {
        Self {
            local,
            remote,
            kind: ValueKind::Text,
            expand: Expand::Single,
            presence: Presence::OmitEmpty,
        }
    }

    pub const fn flag(local: &'static str, remote: &'static str) -> Self {
        Self {
            local,
            remote,
            kind: ValueKind::Bool,
            expand: Expand::Single,
            presence: Presence::Always,
        }
    }

    pub const fn ids(local: &'static str, remote: &'static str) -> Self {
        Self {
            local,
            remote,
            kind: ValueKind::Ids,
            expand: Expand::Repeated,
            presence: Presence::OmitEmpty,
        }
    }

    pub const fn file(local: &'static str, remote: &'static str) -> Self {
        Self {
            local,
            remote,
            kind: ValueKind::File,
            expand: Expand::Single,
            presence: Presence::OmitEmpty,
        }
    }

    pub const fn always(mut self) -> Self {
        self.presence = Presence::Always;
        self
    }

    /// Text goes out trimmed, matching what validation checked.
    fn resolve(&self, draft: &FormDraft) -> Option<FieldValue> {
        let value = match draft.value(self.local) {
            Some(value) if !value.is_empty() => value.clone(),
            _ if self.presence == Presence::OmitEmpty => return None,
            Some(value) => value.clone(),
            None => match self.kind {
                ValueKind::Text => FieldValue::text(""),
                ValueKind::Bool => FieldValue::Bool(false),
                ValueKind::Ids => FieldValue::Ids(Vec::new()),
                // An absent file has nothing to send, whatever the presence rule.
                ValueKind::File => return None,
            },
        };
        Some(match value {
            FieldValue::Text(text) => FieldValue::Text(text.trim().to_owned()),
            other => other,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Part {
    Text(String),
    File(FileAttachment),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Json(Value),
    Multipart(Vec<(String, Part)>),
}

impl Payload {
    pub const fn is_multipart(&self) -> bool {
        matches!(self, Self::Multipart(_))
    }
}

pub fn build_payload(draft: &FormDraft, mappings: &[FieldMapping]) -> Payload {
    let has_file = mappings.iter().any(|mapping| {
        draft
            .value(mapping.local)
            .is_some_and(|value| value.is_file() && !value.is_empty())
    });
    if has_file {
        Payload::Multipart(multipart_parts(draft, mappings))
    } else {
        Payload::Json(json_body(draft, mappings))
    }
}

fn multipart_parts(draft: &FormDraft, mappings: &[FieldMapping]) -> Vec<(String, Part)> {
    let mut parts = Vec::new();
    for mapping in mappings {
        let Some(value) = mapping.resolve(draft) else {
            continue;
        };
        match value {
            FieldValue::Text(text) => parts.push((mapping.remote.to_owned(), Part::Text(text))),
            FieldValue::Bool(flag) => {
                parts.push((mapping.remote.to_owned(), Part::Text(flag.to_string())));
            }
            FieldValue::Ids(ids) => match mapping.expand {
                Expand::Repeated => {
                    let key = repeated_key(mapping.remote);
                    for id in ids {
                        parts.push((key.clone(), Part::Text(id.to_string())));
                    }
                }
                Expand::Single => {
                    let joined = ids
                        .iter()
                        .map(i64::to_string)
                        .collect::<Vec<_>>()
                        .join(",");
                    parts.push((mapping.remote.to_owned(), Part::Text(joined)));
                }
            },
            FieldValue::File(file) => {
                if !file.data.is_empty() {
                    parts.push((mapping.remote.to_owned(), Part::File(file)));
                }
            }
        }
    }
    parts
}

fn json_body(draft: &FormDraft, mappings: &[FieldMapping]) -> Value {
    let mut root = Map::new();
    for mapping in mappings {
        let Some(value) = mapping.resolve(draft) else {
            continue;
        };
        let value = match value {
            FieldValue::Text(text) => Value::String(text),
            FieldValue::Bool(flag) => Value::Bool(flag),
            FieldValue::Ids(ids) => match mapping.expand {
                Expand::Repeated => Value::Array(ids.into_iter().map(Value::from).collect()),
                Expand::Single => match ids.as_slice() {
                    [only] => Value::from(*only),
                    _ => Value::Array(ids.into_iter().map(Value::from).collect()),
                },
            },
            // Only reachable for an empty attachment, which carries nothing.
            FieldValue::File(_) => continue,
        };
        insert_nested(&mut root, mapping.remote, value);
    }
    Value::Object(root)
}

fn repeated_key(remote: &str) -> String {
    if remote.ends_with("[]") {
        remote.to_owned()
    } else {
        format!("{remote}[]")
    }
}

/// Splits `org[address][city]` into `["org", "address", "city"]` and reports
/// whether a trailing `[]` asked for array append.
pub fn key_segments(key: &str) -> (Vec<&str>, bool) {
    let (key, append) = match key.strip_suffix("[]") {
        Some(stripped) => (stripped, true),
        None => (key, false),
    };
    let Some(open) = key.find('[') else {
        return (vec![key], append);
    };
    let mut segments = vec![&key[..open]];
    for piece in key[open..].split('[').skip(1) {
        segments.push(piece.strip_suffix(']').unwrap_or(piece));
    }
    (segments, append)
}

fn insert_nested(root: &mut Map<String, Value>, key: &str, value: Value) {
    let (segments, append) = key_segments(key);
    let Some((last, parents)) = segments.split_last() else {
        return;
    };

    let mut cursor = root;
    for segment in parents {
        let slot = cursor
            .entry((*segment).to_owned())
            .or_insert_with(|| Value::Object(Map::new()));
        if !slot.is_object() {
            warn!(key, "payload key overrides a scalar with a nested object");
            *slot = Value::Object(Map::new());
        }
        let Value::Object(next) = slot else {
            return;
        };
        cursor = next;
    }

    if !append {
        cursor.insert((*last).to_owned(), value);
        return;
    }
    let slot = cursor
        .entry((*last).to_owned())
        .or_insert_with(|| Value::Array(Vec::new()));
    match (slot, value) {
        (Value::Array(items), Value::Array(more)) => items.extend(more),
        (Value::Array(items), single) => items.push(single),
        (slot, value) => *slot = Value::Array(vec![value]),
    }
}
