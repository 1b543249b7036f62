// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use std::collections::BTreeMap;
use thiserror::Error;

use crate::FieldValue;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Check {
    Required,
    Domain,
    Mobile { digits: usize },
    Email,
    Digits,
    MaxLen(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidationRule {
    pub field: &'static str,
    pub check: Check,
    pub message: &'static str,
}

impl ValidationRule {
    pub const fn new(field: &'static str, check: Check, message: &'static str) -> Self {
        Self {
            field,
            check,
            message,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{field}: {message}")]
pub struct ValidationIssue {
    pub field: String,
    pub message: String,
}

/// Runs every rule in order and reports all failures, not just the first.
pub fn evaluate(
    rules: &[ValidationRule],
    fields: &BTreeMap<String, FieldValue>,
) -> Result<(), Vec<ValidationIssue>> {
    let issues: Vec<ValidationIssue> = rules
        .iter()
        .filter(|rule| !passes(rule.check, fields.get(rule.field)))
        .map(|rule| ValidationIssue {
            field: rule.field.to_owned(),
            message: rule.message.to_owned(),
        })
        .collect();
    if issues.is_empty() {
        Ok(())
    } else {
        Err(issues)
    }
}

fn passes(check: Check, value: Option<&FieldValue>) -> bool {
    if check == Check::Required {
        return value.is_some_and(|value| !value.is_empty());
    }

    // Presence is Required's job; format checks only look at filled text.
    let Some(text) = value.and_then(FieldValue::as_text).map(str::trim) else {
        return true;
    };
    if text.is_empty() {
        return true;
    }

    match check {
        Check::Required => true,
        Check::Domain => is_valid_domain(text),
        Check::Mobile { digits } => is_valid_mobile(text, digits),
        Check::Email => is_valid_email(text),
        Check::Digits => is_all_digits(text),
        Check::MaxLen(limit) => text.chars().count() <= limit,
    }
}

/// `label(.tld)+`: the first label is 1..=63 alphanumeric/hyphen characters
/// that neither start nor end with a hyphen; every later label is at least two
/// ASCII letters.
pub fn is_valid_domain(value: &str) -> bool {
    let mut labels = value.split('.');
    let Some(head) = labels.next() else {
        return false;
    };
    if head.is_empty()
        || head.len() > 63
        || head.starts_with('-')
        || head.ends_with('-')
        || !head.chars().all(|ch| ch.is_ascii_alphanumeric() || ch == '-')
    {
        return false;
    }

    let mut tail_count = 0;
    for label in labels {
        if label.len() < 2 || !label.chars().all(|ch| ch.is_ascii_alphabetic()) {
            return false;
        }
        tail_count += 1;
    }
    tail_count > 0
}

pub fn is_valid_email(value: &str) -> bool {
    let Some((local, domain)) = value.split_once('@') else {
        return false;
    };
    let clean = |part: &str| {
        !part.is_empty() && !part.contains('@') && !part.chars().any(char::is_whitespace)
    };
    if !clean(local) || !clean(domain) {
        return false;
    }
    domain
        .char_indices()
        .any(|(index, ch)| ch == '.' && index > 0 && index + 1 < domain.len())
}

pub fn is_valid_mobile(value: &str, digits: usize) -> bool {
    value.len() == digits && is_all_digits(value)
}

pub fn is_all_digits(value: &str) -> bool {
    !value.is_empty() && value.chars().all(|ch| ch.is_ascii_digit())
}
