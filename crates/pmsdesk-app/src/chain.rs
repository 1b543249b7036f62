// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

//! Cascading dependent selection.
//!
//! Each field's option list is fetched for the current value of its parent.
//! Changing a value blanks every descendant immediately and hands back the
//! lookups the caller must run for the direct children. Responses are
//! matched against the request id and the parent value that triggered them,
//! so a slow response for an old parent value never lands.

use anyhow::{Result, anyhow, bail};
use tracing::warn;

use crate::{FieldKey, LookupError, OptionId, RemoteOption};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    pub key: FieldKey,
    pub parent: Option<FieldKey>,
    pub resource: &'static str,
    pub label: &'static str,
}

pub const LOCATION_FIELDS: [FieldSpec; 6] = [
    FieldSpec {
        key: FieldKey::new("site"),
        parent: None,
        resource: "sites",
        label: "Site",
    },
    FieldSpec {
        key: FieldKey::new("building"),
        parent: Some(FieldKey::new("site")),
        resource: "buildings",
        label: "Building",
    },
    FieldSpec {
        key: FieldKey::new("wing"),
        parent: Some(FieldKey::new("building")),
        resource: "wings",
        label: "Wing",
    },
    FieldSpec {
        key: FieldKey::new("area"),
        parent: Some(FieldKey::new("wing")),
        resource: "areas",
        label: "Area",
    },
    FieldSpec {
        key: FieldKey::new("floor"),
        parent: Some(FieldKey::new("area")),
        resource: "floors",
        label: "Floor",
    },
    FieldSpec {
        key: FieldKey::new("room"),
        parent: Some(FieldKey::new("floor")),
        resource: "rooms",
        label: "Room",
    },
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependentField {
    pub key: FieldKey,
    pub parent_key: Option<FieldKey>,
    pub label: &'static str,
    pub resource: &'static str,
    pub options: Vec<RemoteOption>,
    pub selected_id: Option<OptionId>,
    pub loading: bool,
    pending_request: Option<u64>,
}

impl DependentField {
    pub fn selected_option(&self) -> Option<&RemoteOption> {
        let selected = self.selected_id?;
        self.options.iter().find(|option| option.id == selected)
    }

    fn blank(&mut self) {
        self.options.clear();
        self.selected_id = None;
        self.loading = false;
        self.pending_request = None;
    }
}

/// A fetch the caller owes the chain, tagged with what triggered it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LookupRequest {
    pub field: FieldKey,
    pub resource: &'static str,
    pub parent_value: Option<OptionId>,
    pub request_id: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChainEvent {
    Populated { field: FieldKey, count: usize },
    LookupFailed { field: FieldKey, message: String },
    Stale { field: FieldKey },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependentChain {
    fields: Vec<DependentField>,
    next_request_id: u64,
}

impl DependentChain {
    pub fn new(specs: &[FieldSpec]) -> Result<Self> {
        let mut fields: Vec<DependentField> = Vec::with_capacity(specs.len());
        for spec in specs {
            if fields.iter().any(|field| field.key == spec.key) {
                bail!("field `{}` is declared twice", spec.key);
            }
            if let Some(parent) = spec.parent
                && !fields.iter().any(|field| field.key == parent)
            {
                bail!(
                    "field `{}` depends on `{parent}`, which must be declared before it",
                    spec.key
                );
            }
            fields.push(DependentField {
                key: spec.key,
                parent_key: spec.parent,
                label: spec.label,
                resource: spec.resource,
                options: Vec::new(),
                selected_id: None,
                loading: false,
                pending_request: None,
            });
        }
        Ok(Self {
            fields,
            next_request_id: 0,
        })
    }

    pub fn fields(&self) -> &[DependentField] {
        &self.fields
    }

    pub fn field(&self, key: FieldKey) -> Option<&DependentField> {
        self.fields.iter().find(|field| field.key == key)
    }

    pub fn selected(&self, key: FieldKey) -> Option<OptionId> {
        self.field(key).and_then(|field| field.selected_id)
    }

    /// Ordered `(field, id)` pairs for every field with a selection.
    pub fn selections(&self) -> Vec<(FieldKey, OptionId)> {
        self.fields
            .iter()
            .filter_map(|field| field.selected_id.map(|id| (field.key, id)))
            .collect()
    }

    /// Lookups for root fields; issued once when the screen mounts.
    pub fn initial_requests(&mut self) -> Vec<LookupRequest> {
        let roots = self
            .fields
            .iter()
            .enumerate()
            .filter(|(_, field)| field.parent_key.is_none())
            .map(|(index, _)| index)
            .collect::<Vec<_>>();
        roots
            .into_iter()
            .map(|index| self.issue_request(index, None))
            .collect()
    }

    pub fn on_parent_change(
        &mut self,
        key: FieldKey,
        value: Option<OptionId>,
    ) -> Result<Vec<LookupRequest>> {
        let index = self.index_of(key)?;
        let field = &self.fields[index];
        if let Some(id) = value
            && !field.options.iter().any(|option| option.id == id)
        {
            bail!("option {id} is not available for {}", field.label);
        }
        if field.selected_id == value {
            return Ok(Vec::new());
        }

        self.fields[index].selected_id = value;
        for descendant in self.descendants_of(index) {
            self.fields[descendant].blank();
        }

        let Some(parent_value) = value else {
            return Ok(Vec::new());
        };
        let children = self
            .fields
            .iter()
            .enumerate()
            .filter(|(_, field)| field.parent_key == Some(key))
            .map(|(child, _)| child)
            .collect::<Vec<_>>();
        Ok(children
            .into_iter()
            .map(|child| self.issue_request(child, Some(parent_value)))
            .collect())
    }

    pub fn apply_lookup(
        &mut self,
        request: LookupRequest,
        result: std::result::Result<Vec<RemoteOption>, LookupError>,
    ) -> ChainEvent {
        let Some(index) = self.fields.iter().position(|f| f.key == request.field) else {
            return ChainEvent::Stale {
                field: request.field,
            };
        };

        let parent_value = self.fields[index]
            .parent_key
            .and_then(|parent| self.selected(parent));
        let field = &mut self.fields[index];
        if field.pending_request != Some(request.request_id)
            || parent_value != request.parent_value
        {
            warn!(
                field = %request.field,
                request_id = request.request_id,
                "dropping stale lookup response"
            );
            return ChainEvent::Stale {
                field: request.field,
            };
        }

        field.pending_request = None;
        field.loading = false;
        match result {
            Ok(options) => {
                field.options = options;
                ChainEvent::Populated {
                    field: request.field,
                    count: field.options.len(),
                }
            }
            Err(error) => {
                field.options.clear();
                ChainEvent::LookupFailed {
                    field: request.field,
                    message: error.to_string(),
                }
            }
        }
    }

    /// Clears every root selection, which blanks the whole chain below it.
    pub fn clear_selections(&mut self) {
        let roots = self
            .fields
            .iter()
            .filter(|field| field.parent_key.is_none())
            .map(|field| field.key)
            .collect::<Vec<_>>();
        for root in roots {
            if let Ok(index) = self.index_of(root) {
                self.fields[index].selected_id = None;
                for descendant in self.descendants_of(index) {
                    self.fields[descendant].blank();
                }
            }
        }
    }

    /// True when no field holds options or a selection its parent does not justify.
    pub fn is_consistent(&self) -> bool {
        self.fields.iter().all(|field| {
            let selection_valid = field
                .selected_id
                .is_none_or(|id| field.options.iter().any(|option| option.id == id));
            let parent_satisfied = match field.parent_key {
                Some(parent) => self.selected(parent).is_some(),
                None => true,
            };
            selection_valid
                && (parent_satisfied
                    || (field.options.is_empty() && field.selected_id.is_none()))
        })
    }

    fn index_of(&self, key: FieldKey) -> Result<usize> {
        self.fields
            .iter()
            .position(|field| field.key == key)
            .ok_or_else(|| anyhow!("unknown field `{key}`"))
    }

    fn descendants_of(&self, index: usize) -> Vec<usize> {
        let mut lineage = vec![self.fields[index].key];
        let mut descendants = Vec::new();
        for (offset, field) in self.fields.iter().enumerate().skip(index + 1) {
            if let Some(parent) = field.parent_key
                && lineage.contains(&parent)
            {
                lineage.push(field.key);
                descendants.push(offset);
            }
        }
        descendants
    }

    fn issue_request(&mut self, index: usize, parent_value: Option<OptionId>) -> LookupRequest {
        self.next_request_id = self.next_request_id.wrapping_add(1);
        let field = &mut self.fields[index];
        field.loading = true;
        field.pending_request = Some(self.next_request_id);
        LookupRequest {
            field: field.key,
            resource: field.resource,
            parent_value,
            request_id: self.next_request_id,
        }
    }
}
