// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::Result;
use pmsdesk_api::{Client, ResourceCatalog, ResourceSpec};
use pmsdesk_app::{
    CustomerProfile, CustomerQuery, FormKind, LookupError, LookupRequest, Payload, RemoteOption,
    SubmissionError, SubmitMethod, SubmitOutcome,
};
use pmsdesk_db::{DraftSlot, Store};
use pmsdesk_tui::{AppRuntime, DraftBox, InternalEvent, SubmitRequest};
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::sync::mpsc::Sender;
use std::thread;
use std::time::Duration;
use tracing::debug;

/// Network work runs on one short-lived thread per call; drafts stay on the
/// UI thread with the shared store.
pub struct ApiRuntime {
    client: Client,
    catalog: ResourceCatalog,
    store: Rc<Store>,
    debounce: Duration,
    download_dir: PathBuf,
}

impl ApiRuntime {
    pub fn new(
        client: Client,
        catalog: ResourceCatalog,
        store: Rc<Store>,
        debounce: Duration,
        download_dir: PathBuf,
    ) -> Self {
        Self {
            client,
            catalog,
            store,
            debounce,
            download_dir,
        }
    }

    fn resource(&self, key: &str) -> Result<ResourceSpec, LookupError> {
        self.catalog
            .get(key)
            .copied()
            .ok_or_else(|| LookupError::transport(format!("no lookup resource named {key:?}")))
    }
}

fn fetch(
    client: &Client,
    spec: Result<ResourceSpec, LookupError>,
    request: &LookupRequest,
) -> Result<Vec<RemoteOption>, LookupError> {
    let spec = spec?;
    let parent = request.parent_value.map(|id| id.to_string());
    client.fetch_options(&spec, parent.as_deref())
}

fn export(client: &Client, path: &str, dir: &Path) -> Result<PathBuf> {
    client.download(path)?.save_into(dir)
}

impl AppRuntime for ApiRuntime {
    fn fetch_options(&mut self, request: &LookupRequest) -> Result<Vec<RemoteOption>, LookupError> {
        fetch(&self.client, self.resource(request.resource), request)
    }

    fn lookup_customer(
        &mut self,
        query: &CustomerQuery,
    ) -> Result<Option<CustomerProfile>, LookupError> {
        self.client.lookup_customer(query)
    }

    fn submit(
        &mut self,
        method: SubmitMethod,
        path: &str,
        payload: &Payload,
    ) -> Result<SubmitOutcome, SubmissionError> {
        self.client.submit(method, path, payload)
    }

    fn export(&mut self, path: &str) -> Result<PathBuf> {
        export(&self.client, path, &self.download_dir)
    }

    fn draft_storage(&mut self, _kind: FormKind) -> Result<DraftBox> {
        Ok(Box::new(DraftSlot::new(Rc::clone(&self.store))))
    }

    fn debounce_period(&self) -> Duration {
        self.debounce
    }

    fn spawn_lookup(
        &mut self,
        generation: u64,
        request: LookupRequest,
        tx: Sender<InternalEvent>,
    ) -> Result<()> {
        let client = self.client.clone();
        let spec = self.resource(request.resource);
        debug!(resource = request.resource, request_id = request.request_id, "spawning lookup");
        thread::spawn(move || {
            let result = fetch(&client, spec, &request);
            let _ = tx.send(InternalEvent::LookupFinished {
                generation,
                request,
                result,
            });
        });
        Ok(())
    }

    fn spawn_customer_lookup(
        &mut self,
        generation: u64,
        request_id: u64,
        query: CustomerQuery,
        tx: Sender<InternalEvent>,
    ) -> Result<()> {
        let client = self.client.clone();
        thread::spawn(move || {
            let result = client.lookup_customer(&query);
            let _ = tx.send(InternalEvent::CustomerFound {
                generation,
                request_id,
                result,
            });
        });
        Ok(())
    }

    fn spawn_submit(
        &mut self,
        generation: u64,
        kind: FormKind,
        request: SubmitRequest,
        tx: Sender<InternalEvent>,
    ) -> Result<()> {
        let client = self.client.clone();
        thread::spawn(move || {
            let result = client.submit(request.method, &request.path, &request.payload);
            let _ = tx.send(InternalEvent::SubmitFinished {
                generation,
                kind,
                result,
            });
        });
        Ok(())
    }

    fn spawn_export(&mut self, path: String, tx: Sender<InternalEvent>) -> Result<()> {
        let client = self.client.clone();
        let dir = self.download_dir.clone();
        thread::spawn(move || {
            let result = export(&client, &path, &dir).map_err(|error| format!("{error:#}"));
            let _ = tx.send(InternalEvent::ExportFinished { path, result });
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::ApiRuntime;
    use anyhow::Result;
    use pmsdesk_api::{Client, location_catalog};
    use pmsdesk_app::{
        DependentChain, DraftStorage, FieldValue, FormDraft, FormKind, LOCATION_FIELDS, Payload,
        PermissionMatrix, SubmitMethod, SubmitScope,
    };
    use pmsdesk_db::Store;
    use pmsdesk_testkit::{LocationTree, MockApi, MockRoute, sample_permission_catalog};
    use pmsdesk_tui::{AppRuntime, InternalEvent, SubmitRequest};
    use serde_json::json;
    use std::path::Path;
    use std::rc::Rc;
    use std::sync::mpsc;
    use std::time::Duration;

    const WAIT: Duration = Duration::from_secs(5);

    fn runtime_for(api: &MockApi, download_dir: &Path) -> Result<ApiRuntime> {
        let store = Store::open_memory()?;
        store.bootstrap()?;
        Ok(ApiRuntime::new(
            Client::new(api.base_url(), Some("secret"), Duration::from_secs(2))?,
            location_catalog()?,
            Rc::new(store),
            Duration::from_millis(300),
            download_dir.to_path_buf(),
        ))
    }

    #[test]
    fn worker_lookups_walk_the_location_tree() -> Result<()> {
        let tree = LocationTree::generate(7);
        let api = MockApi::start(tree.routes())?;
        let temp = tempfile::tempdir()?;
        let mut runtime = runtime_for(&api, temp.path())?;
        let (tx, rx) = mpsc::channel();

        let mut chain = DependentChain::new(&LOCATION_FIELDS)?;
        let root = chain.initial_requests().remove(0);
        runtime.spawn_lookup(3, root, tx.clone())?;
        let InternalEvent::LookupFinished {
            generation,
            request,
            result,
        } = rx.recv_timeout(WAIT)?
        else {
            panic!("expected a lookup event");
        };
        assert_eq!(generation, 3);
        assert_eq!(result.clone()?, tree.site_options());
        chain.apply_lookup(request, result);

        let site = tree.sites[1].id;
        let buildings = chain.on_parent_change(LOCATION_FIELDS[0].key, Some(pmsdesk_app::OptionId::new(site)))?;
        let options = runtime.fetch_options(&buildings[0])?;
        let expected = tree
            .find(site)
            .map(|node| node.children.iter().map(|child| child.option()).collect::<Vec<_>>())
            .unwrap_or_default();
        assert_eq!(options, expected);
        assert_eq!(api.request_count(&format!("/pms/sites/{site}/buildings.json")), 1);
        Ok(())
    }

    #[test]
    fn role_submission_reaches_the_roles_endpoint() -> Result<()> {
        let api = MockApi::start(vec![MockRoute::json(
            "POST",
            "/lock_roles.json",
            201,
            json!({ "message": "Role created" }),
        )])?;
        let temp = tempfile::tempdir()?;
        let mut runtime = runtime_for(&api, temp.path())?;
        let (tx, rx) = mpsc::channel();

        let mut matrix = PermissionMatrix::new(sample_permission_catalog());
        matrix.set_category_all("Setup", true)?;
        let body = matrix.role_payload("Supervisor", &SubmitScope::All)?;
        runtime.spawn_submit(
            1,
            FormKind::Role,
            SubmitRequest {
                method: SubmitMethod::Post,
                path: "/lock_roles.json".to_owned(),
                payload: Payload::Json(body),
            },
            tx,
        )?;

        let InternalEvent::SubmitFinished { kind, result, .. } = rx.recv_timeout(WAIT)? else {
            panic!("expected a submit event");
        };
        assert_eq!(kind, FormKind::Role);
        assert_eq!(result?.message.as_deref(), Some("Role created"));

        let requests = api.requests();
        let sent: serde_json::Value = serde_json::from_str(&requests[0].body_text())?;
        assert_eq!(sent["lock_role"]["name"], "Supervisor");
        assert_eq!(sent["lock_modules"], 2);
        assert_eq!(requests[0].header("Authorization"), Some("Bearer secret"));
        Ok(())
    }

    #[test]
    fn export_lands_in_the_download_dir() -> Result<()> {
        let api = MockApi::start(vec![
            MockRoute::bytes("GET", "/pms/floors/5/rooms.xlsx", 200, b"PK\x03\x04").with_header(
                "Content-Disposition",
                "attachment; filename=\"rooms.xlsx\"",
            ),
        ])?;
        let temp = tempfile::tempdir()?;
        let mut runtime = runtime_for(&api, temp.path())?;
        let (tx, rx) = mpsc::channel();

        runtime.spawn_export("/pms/floors/5/rooms.xlsx".to_owned(), tx)?;
        let InternalEvent::ExportFinished { result, .. } = rx.recv_timeout(WAIT)? else {
            panic!("expected an export event");
        };
        let saved = result.map_err(anyhow::Error::msg)?;
        assert_eq!(saved, temp.path().join("rooms.xlsx"));
        assert_eq!(std::fs::read(&saved)?, b"PK\x03\x04");
        Ok(())
    }

    #[test]
    fn draft_slots_share_one_store() -> Result<()> {
        let api = MockApi::start(Vec::new())?;
        let temp = tempfile::tempdir()?;
        let mut runtime = runtime_for(&api, temp.path())?;

        let mut draft = FormDraft::default();
        draft
            .fields
            .insert("name".to_owned(), FieldValue::text("Acme"));
        runtime
            .draft_storage(FormKind::Organization)?
            .save(FormKind::Organization, &draft)?;

        let loaded = runtime
            .draft_storage(FormKind::Organization)?
            .load(FormKind::Organization)?;
        assert_eq!(loaded, Some(draft));
        assert_eq!(
            runtime.draft_storage(FormKind::Contact)?.load(FormKind::Contact)?,
            None
        );
        assert_eq!(runtime.debounce_period(), Duration::from_millis(300));
        Ok(())
    }
}
