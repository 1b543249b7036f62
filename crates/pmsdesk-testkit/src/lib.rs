// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Context, Result, anyhow};
use pmsdesk_app::{PermissionCategory, RemoteOption};
use serde_json::{Value, json};
use std::io::Read;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tiny_http::{Header, Response, Server};

const SITE_NAMES: [&str; 8] = [
    "Muscat Hills",
    "Al Mouj",
    "Seeb Park",
    "Qurum Heights",
    "Madinat Sultan",
    "Bausher Gardens",
    "Ghubra Point",
    "Azaiba Yard",
];

const BUILDING_NAMES: [&str; 6] = ["Tower A", "Tower B", "Annex", "Podium", "Block C", "Villa 7"];
const WING_NAMES: [&str; 4] = ["East Wing", "West Wing", "North Wing", "South Wing"];
const AREA_NAMES: [&str; 5] = ["Lobby", "Plant Room", "Retail", "Office", "Parking"];

#[derive(Debug, Clone)]
struct DeterministicRng {
    state: u64,
}

impl DeterministicRng {
    fn new(seed: u64) -> Self {
        let mut state = seed ^ 0x9E37_79B9_7F4A_7C15;
        if state == 0 {
            state = 0xA409_3822_299F_31D0;
        }
        Self { state }
    }

    fn next_u64(&mut self) -> u64 {
        self.state = self
            .state
            .wrapping_mul(6_364_136_223_846_793_005)
            .wrapping_add(1_442_695_040_888_963_407);

        let mut x = self.state;
        x ^= x >> 13;
        x ^= x << 7;
        x ^= x >> 17;
        x
    }

    fn int_n(&mut self, n: usize) -> usize {
        if n <= 1 {
            return 0;
        }
        (self.next_u64() % (n as u64)) as usize
    }

    fn pick<'a>(&mut self, items: &[&'a str]) -> &'a str {
        items[self.int_n(items.len())]
    }
}

/// Levels of the location hierarchy, root first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocationLevel {
    Site,
    Building,
    Wing,
    Area,
    Floor,
    Room,
}

impl LocationLevel {
    pub const fn child(self) -> Option<Self> {
        match self {
            Self::Site => Some(Self::Building),
            Self::Building => Some(Self::Wing),
            Self::Wing => Some(Self::Area),
            Self::Area => Some(Self::Floor),
            Self::Floor => Some(Self::Room),
            Self::Room => None,
        }
    }

    const fn collection(self) -> &'static str {
        match self {
            Self::Site => "sites",
            Self::Building => "buildings",
            Self::Wing => "wings",
            Self::Area => "areas",
            Self::Floor => "floors",
            Self::Room => "rooms",
        }
    }

    const fn id_base(self) -> i64 {
        match self {
            Self::Site => 1,
            Self::Building => 100,
            Self::Wing => 1_000,
            Self::Area => 10_000,
            Self::Floor => 100_000,
            Self::Room => 1_000_000,
        }
    }

    /// Wings and rooms come back as `[{ "<collection>": {...} }]`.
    const fn wrapped(self) -> bool {
        matches!(self, Self::Wing | Self::Room)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocationNode {
    pub id: i64,
    pub name: String,
    pub level: LocationLevel,
    pub children: Vec<LocationNode>,
}

impl LocationNode {
    pub fn option(&self) -> RemoteOption {
        RemoteOption::new(self.id, self.name.clone())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocationTree {
    pub sites: Vec<LocationNode>,
}

impl LocationTree {
    /// Two children per node at every level, with seeded names.
    pub fn generate(seed: u64) -> Self {
        let mut rng = DeterministicRng::new(if seed == 0 { 1 } else { seed });
        let mut counters = [0_i64; 6];
        let sites = (0..2)
            .map(|_| build_node(&mut rng, &mut counters, LocationLevel::Site))
            .collect();
        Self { sites }
    }

    pub fn site_options(&self) -> Vec<RemoteOption> {
        self.sites.iter().map(LocationNode::option).collect()
    }

    pub fn find(&self, id: i64) -> Option<&LocationNode> {
        fn walk(nodes: &[LocationNode], id: i64) -> Option<&LocationNode> {
            nodes
                .iter()
                .find_map(|node| (node.id == id).then_some(node).or_else(|| walk(&node.children, id)))
        }
        walk(&self.sites, id)
    }

    /// GET routes serving this tree in the remote response shapes.
    pub fn routes(&self) -> Vec<MockRoute> {
        let mut routes = vec![MockRoute::json(
            "GET",
            "/pms/sites.json",
            200,
            collection_body(LocationLevel::Site, &self.sites),
        )];
        let mut stack: Vec<&LocationNode> = self.sites.iter().collect();
        while let Some(node) = stack.pop() {
            let Some(child_level) = node.level.child() else {
                continue;
            };
            routes.push(MockRoute::json(
                "GET",
                &format!(
                    "/pms/{}/{}/{}.json",
                    node.level.collection(),
                    node.id,
                    child_level.collection()
                ),
                200,
                collection_body(child_level, &node.children),
            ));
            stack.extend(node.children.iter());
        }
        routes
    }
}

fn build_node(
    rng: &mut DeterministicRng,
    counters: &mut [i64; 6],
    level: LocationLevel,
) -> LocationNode {
    let slot = level as usize;
    let id = level.id_base() + counters[slot];
    counters[slot] += 1;
    let name = match level {
        LocationLevel::Site => rng.pick(&SITE_NAMES).to_owned(),
        LocationLevel::Building => rng.pick(&BUILDING_NAMES).to_owned(),
        LocationLevel::Wing => rng.pick(&WING_NAMES).to_owned(),
        LocationLevel::Area => rng.pick(&AREA_NAMES).to_owned(),
        LocationLevel::Floor => format!("Floor {}", rng.int_n(30) + 1),
        LocationLevel::Room => format!("Room {}", 100 + rng.int_n(900)),
    };
    let children = match level.child() {
        Some(child) => (0..2).map(|_| build_node(rng, counters, child)).collect(),
        None => Vec::new(),
    };
    LocationNode {
        id,
        name,
        level,
        children,
    }
}

fn collection_body(level: LocationLevel, nodes: &[LocationNode]) -> Value {
    let key = level.collection();
    let records: Vec<Value> = nodes
        .iter()
        .map(|node| json!({ "id": node.id, "name": node.name }))
        .collect();
    if level.wrapped() {
        Value::Array(records.into_iter().map(|record| json!({ key: record })).collect())
    } else {
        json!({ key: records })
    }
}

/// Small catalog with one duplicated row name.
pub fn sample_permission_catalog() -> Vec<PermissionCategory> {
    vec![
        PermissionCategory::new("All Functions", &["Tickets", "Assets", "Meters"]),
        PermissionCategory::new("Inventory", &["GRN", "Consumption"]),
        PermissionCategory::new("Setup", &["Email Rule", "FM Groups", "Email Rule"]),
    ]
}

#[derive(Debug, Clone)]
pub struct MockRoute {
    pub method: String,
    pub path: String,
    pub status: u16,
    pub body: Vec<u8>,
    pub headers: Vec<(String, String)>,
}

impl MockRoute {
    pub fn json(method: &str, path: &str, status: u16, body: Value) -> Self {
        Self {
            method: method.to_owned(),
            path: path.to_owned(),
            status,
            body: body.to_string().into_bytes(),
            headers: vec![("Content-Type".to_owned(), "application/json".to_owned())],
        }
    }

    pub fn bytes(method: &str, path: &str, status: u16, body: &[u8]) -> Self {
        Self {
            method: method.to_owned(),
            path: path.to_owned(),
            status,
            body: body.to_vec(),
            headers: Vec::new(),
        }
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_owned(), value.to_owned()));
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedRequest {
    pub method: String,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl RecordedRequest {
    pub fn path(&self) -> &str {
        self.url.split('?').next().unwrap_or(&self.url)
    }

    pub fn query(&self) -> Option<&str> {
        self.url.split_once('?').map(|(_, query)| query)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(field, _)| field.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// HTTP server on an ephemeral port answering from a fixed route table.
/// Unmatched requests get a JSON 404. Stops when dropped.
pub struct MockApi {
    base_url: String,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
    shutdown: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl MockApi {
    pub fn start(routes: Vec<MockRoute>) -> Result<Self> {
        let server =
            Server::http("127.0.0.1:0").map_err(|error| anyhow!("start mock server: {error}"))?;
        let base_url = format!("http://{}", server.server_addr());
        let requests = Arc::new(Mutex::new(Vec::new()));
        let shutdown = Arc::new(AtomicBool::new(false));

        let handle = {
            let requests = Arc::clone(&requests);
            let shutdown = Arc::clone(&shutdown);
            thread::spawn(move || serve(&server, &routes, &requests, &shutdown))
        };

        Ok(Self {
            base_url,
            requests,
            shutdown,
            handle: Some(handle),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests
            .lock()
            .map(|requests| requests.clone())
            .unwrap_or_default()
    }

    pub fn request_count(&self, path: &str) -> usize {
        self.requests()
            .iter()
            .filter(|request| request.path() == path)
            .count()
    }
}

impl Drop for MockApi {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn serve(
    server: &Server,
    routes: &[MockRoute],
    requests: &Mutex<Vec<RecordedRequest>>,
    shutdown: &AtomicBool,
) {
    while !shutdown.load(Ordering::SeqCst) {
        let mut request = match server.recv_timeout(Duration::from_millis(20)) {
            Ok(Some(request)) => request,
            Ok(None) => continue,
            Err(_) => return,
        };

        let mut body = Vec::new();
        let _ = request.as_reader().read_to_end(&mut body);
        let recorded = RecordedRequest {
            method: request.method().to_string(),
            url: request.url().to_owned(),
            headers: request
                .headers()
                .iter()
                .map(|header| (header.field.to_string(), header.value.to_string()))
                .collect(),
            body,
        };

        let route = routes.iter().find(|route| {
            route.method.eq_ignore_ascii_case(&recorded.method) && route.path == recorded.path()
        });
        if let Ok(mut log) = requests.lock() {
            log.push(recorded);
        }

        let response = match route {
            Some(route) => {
                let mut response =
                    Response::from_data(route.body.clone()).with_status_code(route.status);
                for (name, value) in &route.headers {
                    if let Ok(header) = Header::from_bytes(name.as_bytes(), value.as_bytes()) {
                        response = response.with_header(header);
                    }
                }
                response
            }
            None => Response::from_data(br#"{"error":"no route"}"#.to_vec()).with_status_code(404),
        };
        let _ = request.respond(response);
    }
}

pub fn temp_db_path() -> Result<(tempfile::TempDir, PathBuf)> {
    let dir = tempfile::tempdir().context("create temp dir")?;
    let db_path = dir.path().join("pmsdesk.db");
    Ok((dir, db_path))
}

#[cfg(test)]
mod tests {
    use super::{LocationLevel, LocationTree, MockApi, MockRoute, sample_permission_catalog};
    use anyhow::Result;
    use serde_json::{Value, json};
    use std::io::{Read, Write};
    use std::net::TcpStream;

    #[test]
    fn tree_is_deterministic_per_seed() {
        assert_eq!(LocationTree::generate(7), LocationTree::generate(7));
        let tree = LocationTree::generate(7);
        assert_eq!(tree.sites.len(), 2);
        assert_eq!(tree.sites[0].id, 1);
        assert_eq!(tree.sites[0].children[0].level, LocationLevel::Building);
        assert_eq!(tree.sites[0].children[0].id, 100);
    }

    #[test]
    fn routes_cover_every_non_leaf_node() {
        let tree = LocationTree::generate(3);
        let routes = tree.routes();
        // 1 root route + 2 sites + 4 buildings + 8 wings + 16 areas + 32 floors.
        assert_eq!(routes.len(), 1 + 2 + 4 + 8 + 16 + 32);

        let wing_route = routes
            .iter()
            .find(|route| route.path == "/pms/buildings/100/wings.json")
            .expect("wings for first building");
        let body: Value = serde_json::from_slice(&wing_route.body).expect("json body");
        assert!(body[0]["wings"]["id"].is_i64());

        let site_route = routes
            .iter()
            .find(|route| route.path == "/pms/sites.json")
            .expect("sites route");
        let sites: Value = serde_json::from_slice(&site_route.body).expect("json body");
        assert_eq!(sites["sites"].as_array().map(Vec::len), Some(2));
    }

    #[test]
    fn find_walks_the_whole_tree() {
        let tree = LocationTree::generate(5);
        let room = tree.find(1_000_000).expect("first room");
        assert_eq!(room.level, LocationLevel::Room);
        assert!(tree.find(42).is_none());
    }

    #[test]
    fn sample_catalog_drops_duplicate_rows() {
        let catalog = sample_permission_catalog();
        assert_eq!(catalog[2].permissions.len(), 2);
    }

    #[test]
    fn mock_api_records_requests_and_404s_unknown_paths() -> Result<()> {
        let api = MockApi::start(vec![MockRoute::json(
            "GET",
            "/ping.json",
            200,
            json!({ "ok": true }),
        )])?;
        let address = api.base_url().trim_start_matches("http://").to_owned();

        for path in ["/ping.json?x=1", "/missing.json"] {
            let mut stream = TcpStream::connect(&address)?;
            write!(
                stream,
                "GET {path} HTTP/1.1\r\nHost: {address}\r\nAuthorization: Bearer t0k\r\nConnection: close\r\n\r\n"
            )?;
            let mut response = String::new();
            stream.read_to_string(&mut response)?;
            let expected = if path.starts_with("/ping") { "200" } else { "404" };
            assert!(response.starts_with(&format!("HTTP/1.1 {expected}")), "{response}");
        }

        let requests = api.requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].path(), "/ping.json");
        assert_eq!(requests[0].query(), Some("x=1"));
        assert_eq!(requests[0].header("authorization"), Some("Bearer t0k"));
        assert_eq!(api.request_count("/missing.json"), 1);
        Ok(())
    }
}
