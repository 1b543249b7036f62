// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Context, Result, anyhow};
use reqwest::header::{CONTENT_DISPOSITION, CONTENT_TYPE};
use std::fs::OpenOptions;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::{Client, body_message, status_reason, transport_message};

const FALLBACK_FILE_NAME: &str = "download.bin";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Download {
    pub bytes: Vec<u8>,
    pub mime_type: String,
    pub file_name: String,
}

impl Download {
    /// Writes into `dir` without replacing anything already there: a taken
    /// name gets ` (1)`, ` (2)`, ... before its extension.
    pub fn save_into(&self, dir: &Path) -> Result<PathBuf> {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("create download dir {}", dir.display()))?;
        let (stem, extension) = split_extension(&self.file_name);
        for attempt in 0..10_000u32 {
            let name = match (attempt, extension) {
                (0, _) => self.file_name.clone(),
                (n, Some(ext)) => format!("{stem} ({n}).{ext}"),
                (n, None) => format!("{stem} ({n})"),
            };
            let path = dir.join(&name);
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(mut file) => {
                    file.write_all(&self.bytes)
                        .with_context(|| format!("write {}", path.display()))?;
                    return Ok(path);
                }
                Err(error) if error.kind() == ErrorKind::AlreadyExists => continue,
                Err(error) => {
                    return Err(error).with_context(|| format!("create {}", path.display()));
                }
            }
        }
        Err(anyhow!(
            "too many copies of {} in {} -- clean up the folder and retry",
            self.file_name,
            dir.display()
        ))
    }
}

fn split_extension(name: &str) -> (&str, Option<&str>) {
    match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() && !ext.is_empty() => (stem, Some(ext)),
        _ => (name, None),
    }
}

/// Name from `Content-Disposition` (`filename*=UTF-8''...` or `filename=`).
fn disposition_file_name(header: &str) -> Option<String> {
    let mut plain = None;
    for param in header.split(';').map(str::trim) {
        if let Some(value) = param.strip_prefix("filename*=") {
            let encoded = value.rsplit("''").next().unwrap_or(value);
            if let Some(name) = percent_decode(encoded.trim_matches('"')) {
                return Some(name);
            }
        } else if let Some(value) = param.strip_prefix("filename=") {
            plain = Some(value.trim_matches('"').to_owned());
        }
    }
    plain
}

fn percent_decode(value: &str) -> Option<String> {
    let bytes = value.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut index = 0;
    while index < bytes.len() {
        if bytes[index] == b'%' {
            let hex = value.get(index + 1..index + 3)?;
            out.push(u8::from_str_radix(hex, 16).ok()?);
            index += 3;
        } else {
            out.push(bytes[index]);
            index += 1;
        }
    }
    String::from_utf8(out).ok()
}

/// Keeps only the final path component and drops characters that would be
/// awkward on disk.
fn sanitize_file_name(name: &str) -> Option<String> {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
    let cleaned: String = base
        .chars()
        .filter(|ch| !ch.is_control() && !matches!(ch, ':' | '*' | '?' | '"' | '<' | '>' | '|'))
        .collect();
    let cleaned = cleaned.trim().trim_start_matches('.').to_owned();
    (!cleaned.is_empty()).then_some(cleaned)
}

fn path_file_name(path: &str) -> Option<String> {
    let without_query = path.split(['?', '#']).next().unwrap_or(path);
    sanitize_file_name(without_query)
}

impl Client {
    pub fn download(&self, path: &str) -> Result<Download> {
        let url = self.url(path);
        debug!(%url, "download");
        let response = self
            .authorized(self.http.get(&url))
            .send()
            .map_err(|error| anyhow!(transport_message(&self.base_url, &error)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            let message = body_message(&body).unwrap_or_else(|| status_reason(status));
            return Err(anyhow!("download failed ({}): {message}", status.as_u16()));
        }

        let headers = response.headers();
        let mime_type = headers
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(|value| value.split(';').next().unwrap_or(value).trim().to_owned())
            .unwrap_or_else(|| "application/octet-stream".to_owned());
        let file_name = headers
            .get(CONTENT_DISPOSITION)
            .and_then(|value| value.to_str().ok())
            .and_then(disposition_file_name)
            .and_then(|name| sanitize_file_name(&name))
            .or_else(|| path_file_name(path))
            .unwrap_or_else(|| FALLBACK_FILE_NAME.to_owned());

        let bytes = response.bytes().context("read download body")?.to_vec();
        debug!(%url, file_name = %file_name, size = bytes.len(), "download done");
        Ok(Download {
            bytes,
            mime_type,
            file_name,
        })
    }
}
