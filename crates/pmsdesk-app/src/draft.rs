// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Result, anyhow, bail};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, warn};

use crate::validation::{ValidationIssue, ValidationRule, evaluate};
use crate::{FieldValue, FormKind};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormDraft {
    #[serde(default)]
    pub fields: BTreeMap<String, FieldValue>,
    #[serde(default)]
    pub current_step: Option<String>,
    #[serde(default)]
    pub completed_steps: BTreeSet<String>,
}

impl FormDraft {
    pub fn is_blank(&self) -> bool {
        self.fields.values().all(FieldValue::is_empty)
            && self.current_step.is_none()
            && self.completed_steps.is_empty()
    }

    pub fn value(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }

    pub fn text(&self, name: &str) -> &str {
        self.fields
            .get(name)
            .and_then(FieldValue::as_text)
            .unwrap_or("")
    }

    /// Copy safe to write to disk: file attachments are dropped.
    pub fn persistable(&self) -> Self {
        Self {
            fields: self
                .fields
                .iter()
                .filter(|(_, value)| !value.is_file())
                .map(|(name, value)| (name.clone(), value.clone()))
                .collect(),
            current_step: self.current_step.clone(),
            completed_steps: self.completed_steps.clone(),
        }
    }
}

/// Durable per-form slot. Implementations must make `save` visible to the
/// next `load` even across process restarts.
pub trait DraftStorage {
    fn load(&self, kind: FormKind) -> Result<Option<FormDraft>>;
    fn save(&mut self, kind: FormKind, draft: &FormDraft) -> Result<()>;
    fn clear(&mut self, kind: FormKind) -> Result<()>;
}

impl<T: DraftStorage + ?Sized> DraftStorage for Box<T> {
    fn load(&self, kind: FormKind) -> Result<Option<FormDraft>> {
        (**self).load(kind)
    }

    fn save(&mut self, kind: FormKind, draft: &FormDraft) -> Result<()> {
        (**self).save(kind, draft)
    }

    fn clear(&mut self, kind: FormKind) -> Result<()> {
        (**self).clear(kind)
    }
}

#[derive(Debug, Default, Clone)]
pub struct MemoryDraftStorage {
    slots: BTreeMap<&'static str, FormDraft>,
}

impl MemoryDraftStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_draft(kind: FormKind, draft: FormDraft) -> Self {
        let mut storage = Self::default();
        storage.slots.insert(kind.draft_namespace(), draft);
        storage
    }

    pub fn stored(&self, kind: FormKind) -> Option<&FormDraft> {
        self.slots.get(kind.draft_namespace())
    }
}

impl DraftStorage for MemoryDraftStorage {
    fn load(&self, kind: FormKind) -> Result<Option<FormDraft>> {
        Ok(self.slots.get(kind.draft_namespace()).cloned())
    }

    fn save(&mut self, kind: FormKind, draft: &FormDraft) -> Result<()> {
        self.slots.insert(kind.draft_namespace(), draft.clone());
        Ok(())
    }

    fn clear(&mut self, kind: FormKind) -> Result<()> {
        self.slots.remove(kind.draft_namespace());
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Empty,
    Editing,
    Submitting,
    Submitted,
    Abandoned,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MountOutcome {
    Fresh,
    DraftAvailable,
}

/// Snapshot handed to the submitter; includes attachments the draft store
/// never sees.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmitTicket {
    pub kind: FormKind,
    pub draft: FormDraft,
}

#[derive(Debug)]
pub struct FormSession<S: DraftStorage> {
    kind: FormKind,
    storage: S,
    state: SessionState,
    draft: FormDraft,
    saved: Option<FormDraft>,
}

impl<S: DraftStorage> FormSession<S> {
    pub fn mount(kind: FormKind, storage: S) -> Result<(Self, MountOutcome)> {
        let saved = storage
            .load(kind)?
            .filter(|draft| !draft.is_blank());
        let outcome = if saved.is_some() {
            MountOutcome::DraftAvailable
        } else {
            MountOutcome::Fresh
        };
        debug!(form = kind.as_str(), ?outcome, "form mounted");
        Ok((
            Self {
                kind,
                storage,
                state: SessionState::Empty,
                draft: FormDraft::default(),
                saved,
            },
            outcome,
        ))
    }

    pub const fn kind(&self) -> FormKind {
        self.kind
    }

    pub const fn state(&self) -> SessionState {
        self.state
    }

    pub const fn draft(&self) -> &FormDraft {
        &self.draft
    }

    pub fn saved_draft(&self) -> Option<&FormDraft> {
        self.saved.as_ref()
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn resume(&mut self) -> Result<()> {
        let saved = self
            .saved
            .take()
            .ok_or_else(|| anyhow!("no saved {} draft to resume", self.kind.as_str()))?;
        self.draft = saved;
        self.state = SessionState::Editing;
        Ok(())
    }

    pub fn discard(&mut self) -> Result<()> {
        self.storage.clear(self.kind)?;
        self.saved = None;
        self.draft = FormDraft::default();
        self.state = SessionState::Empty;
        Ok(())
    }

    pub fn set_field(&mut self, name: &str, value: FieldValue) -> Result<()> {
        self.ensure_editable()?;
        self.draft.fields.insert(name.to_owned(), value);
        self.write_through()
    }

    pub fn set_step(&mut self, step: &str) -> Result<()> {
        self.ensure_editable()?;
        self.draft.current_step = Some(step.to_owned());
        self.write_through()
    }

    pub fn complete_step(&mut self, step: &str) -> Result<()> {
        self.ensure_editable()?;
        self.draft.completed_steps.insert(step.to_owned());
        self.write_through()
    }

    pub fn begin_submit(
        &mut self,
        rules: &[ValidationRule],
    ) -> Result<SubmitTicket, Vec<ValidationIssue>> {
        if self.state == SessionState::Submitting {
            return Err(vec![ValidationIssue {
                field: "form".to_owned(),
                message: "submission already in progress".to_owned(),
            }]);
        }
        evaluate(rules, &self.draft.fields)?;
        self.state = SessionState::Submitting;
        Ok(SubmitTicket {
            kind: self.kind,
            draft: self.draft.clone(),
        })
    }

    /// Passes `result` back unchanged after moving the session: success
    /// clears the stored draft, failure returns to editing with it intact.
    pub fn finish_submit<T, E>(&mut self, result: Result<T, E>) -> Result<T, E> {
        if self.state != SessionState::Submitting {
            warn!(
                form = self.kind.as_str(),
                state = ?self.state,
                "submit result arrived outside a submission"
            );
        }
        match &result {
            Ok(_) => {
                if let Err(error) = self.storage.clear(self.kind) {
                    warn!(form = self.kind.as_str(), "clear submitted draft: {error:#}");
                }
                self.draft = FormDraft::default();
                self.state = SessionState::Submitted;
            }
            Err(_) => self.state = SessionState::Editing,
        }
        result
    }

    pub fn abandon(&mut self) {
        if self.state == SessionState::Editing {
            self.state = SessionState::Abandoned;
        }
    }

    fn ensure_editable(&mut self) -> Result<()> {
        match self.state {
            SessionState::Empty | SessionState::Editing => {}
            SessionState::Submitting => bail!("form is being submitted -- wait for the result"),
            SessionState::Submitted | SessionState::Abandoned => {
                bail!("form is closed -- reopen it to edit")
            }
        }
        // Editing without resuming replaces the saved draft.
        self.saved = None;
        self.state = SessionState::Editing;
        Ok(())
    }

    fn write_through(&mut self) -> Result<()> {
        self.storage.save(self.kind, &self.draft.persistable())
    }
}
