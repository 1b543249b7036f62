// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Context, Result, anyhow};
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyModifiers};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode};
use crossterm::{execute, terminal};
use pmsdesk_app::{
    AppCommand, AppEvent, AppMode, AppState, CUSTOMER_EMAIL, CUSTOMER_MOBILE, ChainEvent,
    CustomerProfile, CustomerQuery, DEFAULT_QUIET_PERIOD, Debouncer, DependentChain,
    DraftStorage, FieldKey, FieldValue, FileAttachment, FormKind, FormSchema, FormSession,
    InputKind, LOCATION_FIELDS, LookupError, LookupRequest, MountOutcome, Payload,
    PermissionCategory, PermissionFlag, PermissionMatrix, ROLE_RULES, ROLE_TITLE, ROLES_ENDPOINT,
    RemoteOption, ScreenKind, SessionState, SubmissionError, SubmitMethod, SubmitOutcome,
    SubmitScope, ValidationIssue, build_payload, customer_autofill, customer_query,
    default_role_catalog, schema_for,
};
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Constraint, Direction, Layout};
use ratatui::style::{Color, Modifier, Style};
use ratatui::widgets::{Block, Borders, Paragraph, Tabs, Wrap};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

const EVENT_POLL: Duration = Duration::from_millis(120);
const STATUS_CLEAR_AFTER: Duration = Duration::from_secs(4);
const FLOOR: FieldKey = FieldKey::new("floor");
const CURSOR_MARK: &str = ">";
const EDIT_MARK: &str = "_";
const RESUME_PROMPT: &str = "unsaved draft found: y to resume, n to discard";

pub type DraftBox = Box<dyn DraftStorage>;

/// Everything the UI needs from the outside world. The `spawn_*` defaults
/// run inline and report through `tx`; real runtimes move the work onto
/// worker threads.
pub trait AppRuntime {
    fn fetch_options(&mut self, request: &LookupRequest) -> Result<Vec<RemoteOption>, LookupError>;
    fn lookup_customer(
        &mut self,
        query: &CustomerQuery,
    ) -> Result<Option<CustomerProfile>, LookupError>;
    fn submit(
        &mut self,
        method: SubmitMethod,
        path: &str,
        payload: &Payload,
    ) -> Result<SubmitOutcome, SubmissionError>;
    /// Downloads `path` and saves it; returns where it landed.
    fn export(&mut self, path: &str) -> Result<PathBuf>;
    fn draft_storage(&mut self, kind: FormKind) -> Result<DraftBox>;

    fn debounce_period(&self) -> Duration {
        DEFAULT_QUIET_PERIOD
    }

    fn role_catalog(&mut self) -> Vec<PermissionCategory> {
        default_role_catalog()
    }

    fn spawn_lookup(
        &mut self,
        generation: u64,
        request: LookupRequest,
        tx: Sender<InternalEvent>,
    ) -> Result<()> {
        let result = self.fetch_options(&request);
        tx.send(InternalEvent::LookupFinished {
            generation,
            request,
            result,
        })
        .map_err(|_| anyhow!("lookup event channel closed"))
    }

    fn spawn_customer_lookup(
        &mut self,
        generation: u64,
        request_id: u64,
        query: CustomerQuery,
        tx: Sender<InternalEvent>,
    ) -> Result<()> {
        let result = self.lookup_customer(&query);
        tx.send(InternalEvent::CustomerFound {
            generation,
            request_id,
            result,
        })
        .map_err(|_| anyhow!("customer event channel closed"))
    }

    fn spawn_submit(
        &mut self,
        generation: u64,
        kind: FormKind,
        request: SubmitRequest,
        tx: Sender<InternalEvent>,
    ) -> Result<()> {
        let result = self.submit(request.method, &request.path, &request.payload);
        tx.send(InternalEvent::SubmitFinished {
            generation,
            kind,
            result,
        })
        .map_err(|_| anyhow!("submit event channel closed"))
    }

    fn spawn_export(&mut self, path: String, tx: Sender<InternalEvent>) -> Result<()> {
        let result = self.export(&path).map_err(|error| format!("{error:#}"));
        tx.send(InternalEvent::ExportFinished { path, result })
            .map_err(|_| anyhow!("export event channel closed"))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SubmitRequest {
    pub method: SubmitMethod,
    pub path: String,
    pub payload: Payload,
}

#[derive(Debug, Clone, PartialEq)]
pub enum InternalEvent {
    ClearStatus {
        token: u64,
    },
    LookupFinished {
        generation: u64,
        request: LookupRequest,
        result: Result<Vec<RemoteOption>, LookupError>,
    },
    CustomerFound {
        generation: u64,
        request_id: u64,
        result: Result<Option<CustomerProfile>, LookupError>,
    },
    SubmitFinished {
        generation: u64,
        kind: FormKind,
        result: Result<SubmitOutcome, SubmissionError>,
    },
    ExportFinished {
        path: String,
        result: Result<PathBuf, String>,
    },
}

struct LocationsView {
    chain: DependentChain,
    field_index: usize,
    option_index: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RoleLine {
    Category(usize),
    Row(usize, usize),
}

struct RolesView {
    matrix: PermissionMatrix,
    session: FormSession<DraftBox>,
    prompt_resume: bool,
    line_index: usize,
    flag_index: usize,
}

struct CustomerAutofill {
    debouncer: Debouncer<CustomerQuery>,
    request_id: u64,
}

struct FormView {
    schema: &'static FormSchema,
    session: FormSession<DraftBox>,
    field_index: usize,
    prompt_resume: bool,
    /// Path being typed for a file field; read on commit.
    file_input: Option<String>,
    issues: Vec<ValidationIssue>,
    customer: Option<CustomerAutofill>,
}

enum ScreenView {
    Locations(LocationsView),
    Roles(Box<RolesView>),
    Form(Box<FormView>),
    Unavailable(String),
}

struct ViewData {
    status_token: u64,
    screen: ScreenView,
}

impl Default for ViewData {
    fn default() -> Self {
        Self {
            status_token: 0,
            screen: ScreenView::Unavailable("loading".to_owned()),
        }
    }
}

pub fn run_app<R: AppRuntime>(state: &mut AppState, runtime: &mut R) -> Result<()> {
    enable_raw_mode().context("enable raw mode")?;
    let mut stdout = io::stdout();
    execute!(stdout, terminal::EnterAlternateScreen).context("enter alternate screen")?;

    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend).context("create terminal")?;

    let mut view_data = ViewData::default();
    let (internal_tx, internal_rx) = mpsc::channel();
    mount_active_screen(state, runtime, &mut view_data, &internal_tx);

    let mut result = Ok(());
    loop {
        process_internal_events(state, runtime, &mut view_data, &internal_tx, &internal_rx);
        poll_debouncers(state, runtime, &mut view_data, &internal_tx, Instant::now());

        if let Err(error) = terminal.draw(|frame| render(frame, state, &view_data)) {
            result = Err(error).context("draw frame");
            break;
        }

        let timeout = poll_timeout(&view_data, Instant::now());
        let has_event = event::poll(timeout).context("poll event")?;
        if has_event {
            match event::read().context("read event")? {
                Event::Key(key) => {
                    if handle_key_event(state, runtime, &mut view_data, &internal_tx, key) {
                        break;
                    }
                }
                Event::Resize(_, _) => {}
                _ => {}
            }
        }
    }

    disable_raw_mode().context("disable raw mode")?;
    execute!(io::stdout(), terminal::LeaveAlternateScreen).context("leave alternate screen")?;
    result
}

/// Waits no longer than the nearest debounce deadline.
fn poll_timeout(view_data: &ViewData, now: Instant) -> Duration {
    let deadline = match &view_data.screen {
        ScreenView::Form(view) => view
            .customer
            .as_ref()
            .and_then(|customer| customer.debouncer.next_deadline()),
        _ => None,
    };
    deadline
        .map(|deadline| deadline.saturating_duration_since(now).min(EVENT_POLL))
        .unwrap_or(EVENT_POLL)
}

fn schedule_status_clear(internal_tx: &Sender<InternalEvent>, token: u64) {
    let sender = internal_tx.clone();
    thread::spawn(move || {
        thread::sleep(STATUS_CLEAR_AFTER);
        let _ = sender.send(InternalEvent::ClearStatus { token });
    });
}

fn emit_status(
    state: &mut AppState,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
    message: impl Into<String>,
) {
    let message = message.into();
    state.set_status(&message);
    view_data.status_token = view_data.status_token.saturating_add(1);
    schedule_status_clear(internal_tx, view_data.status_token);
}

fn emit_optional_status(
    state: &mut AppState,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
    message: Option<String>,
) {
    if let Some(message) = message {
        emit_status(state, view_data, internal_tx, message);
    }
}

fn process_internal_events<R: AppRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    view_data: &mut ViewData,
    tx: &Sender<InternalEvent>,
    rx: &Receiver<InternalEvent>,
) {
    while let Ok(event) = rx.try_recv() {
        let status = match event {
            InternalEvent::ClearStatus { token } if token == view_data.status_token => {
                state.dispatch(AppCommand::ClearStatus);
                None
            }
            InternalEvent::ClearStatus { .. } => None,
            InternalEvent::LookupFinished {
                generation,
                request,
                result,
            } => {
                if !state.is_current(generation) {
                    debug!(field = %request.field, generation, "dropping lookup for a closed screen");
                    continue;
                }
                apply_lookup_result(view_data, request, result)
            }
            InternalEvent::CustomerFound {
                generation,
                request_id,
                result,
            } => {
                if !state.is_current(generation) {
                    debug!(request_id, "dropping customer lookup for a closed screen");
                    continue;
                }
                apply_customer_result(view_data, request_id, result)
            }
            InternalEvent::SubmitFinished {
                generation,
                kind,
                result,
            } => {
                if state.is_current(generation) {
                    apply_submit_result(runtime, view_data, kind, result)
                } else {
                    settle_orphaned_submit(runtime, kind, result)
                }
            }
            InternalEvent::ExportFinished { path, result } => Some(match result {
                Ok(saved) => format!("saved {}", saved.display()),
                Err(error) => format!("export {path} failed: {error}"),
            }),
        };
        emit_optional_status(state, view_data, tx, status);
    }
}

fn apply_lookup_result(
    view_data: &mut ViewData,
    request: LookupRequest,
    result: Result<Vec<RemoteOption>, LookupError>,
) -> Option<String> {
    let ScreenView::Locations(view) = &mut view_data.screen else {
        return None;
    };
    match view.chain.apply_lookup(request, result) {
        ChainEvent::Populated { field, count } => {
            debug!(%field, count, "options loaded");
            sync_option_cursor(view);
            None
        }
        ChainEvent::LookupFailed { field, message } => {
            sync_option_cursor(view);
            Some(format!("{field}: {message}"))
        }
        ChainEvent::Stale { .. } => None,
    }
}

fn apply_customer_result(
    view_data: &mut ViewData,
    request_id: u64,
    result: Result<Option<CustomerProfile>, LookupError>,
) -> Option<String> {
    let ScreenView::Form(view) = &mut view_data.screen else {
        return None;
    };
    let current = view
        .customer
        .as_ref()
        .is_some_and(|customer| customer.request_id == request_id);
    if !current {
        debug!(request_id, "dropping superseded customer lookup");
        return None;
    }
    match result {
        Ok(Some(profile)) => {
            if view.session.state() == SessionState::Submitting {
                return None;
            }
            let changes = customer_autofill(view.session.draft(), &profile);
            if changes.is_empty() {
                return None;
            }
            for (name, value) in changes {
                if let Err(error) = view.session.set_field(name, value) {
                    return Some(format!("autofill failed: {error:#}"));
                }
            }
            Some(format!("customer found: {}", profile.customer_name))
        }
        Ok(None) => None,
        Err(error) => Some(format!("customer {error}")),
    }
}

fn apply_submit_result<R: AppRuntime>(
    runtime: &mut R,
    view_data: &mut ViewData,
    kind: FormKind,
    result: Result<SubmitOutcome, SubmissionError>,
) -> Option<String> {
    match &mut view_data.screen {
        ScreenView::Roles(view) if kind == FormKind::Role => {
            match view.session.finish_submit(result) {
                Ok(outcome) => {
                    view.matrix.reset();
                    let status = outcome
                        .message
                        .unwrap_or_else(|| "role created".to_owned());
                    match remount_session(runtime, kind) {
                        Ok(session) => view.session = session,
                        Err(error) => return Some(format!("{status}; {error:#}")),
                    }
                    Some(status)
                }
                Err(error) => Some(submission_notice(&error)),
            }
        }
        ScreenView::Form(view) if view.schema.kind == kind => {
            match view.session.finish_submit(result) {
                Ok(outcome) => {
                    view.issues.clear();
                    view.field_index = 0;
                    let status = outcome.message.unwrap_or_else(|| "saved".to_owned());
                    match remount_session(runtime, kind) {
                        Ok(session) => view.session = session,
                        Err(error) => return Some(format!("{status}; {error:#}")),
                    }
                    Some(status)
                }
                Err(error) => {
                    if let SubmissionError::Invalid { fields, .. } = &error {
                        view.issues = fields
                            .iter()
                            .flat_map(|(field, messages)| {
                                messages.iter().map(move |message| ValidationIssue {
                                    field: field.clone(),
                                    message: message.clone(),
                                })
                            })
                            .collect();
                    }
                    Some(submission_notice(&error))
                }
            }
        }
        _ => settle_orphaned_submit(runtime, kind, result),
    }
}

/// The screen closed mid-flight. An accepted form still owes its draft a clear.
fn settle_orphaned_submit<R: AppRuntime>(
    runtime: &mut R,
    kind: FormKind,
    result: Result<SubmitOutcome, SubmissionError>,
) -> Option<String> {
    match result {
        Ok(_) => {
            info!(form = kind.as_str(), "submission accepted after its screen closed");
            let cleared = runtime
                .draft_storage(kind)
                .and_then(|mut storage| storage.clear(kind));
            if let Err(error) = cleared {
                warn!(form = kind.as_str(), "clear submitted draft: {error:#}");
            }
            Some(format!("{} saved", kind.as_str()))
        }
        Err(error) => Some(submission_notice(&error)),
    }
}

fn submission_notice(error: &SubmissionError) -> String {
    if error.is_retryable() {
        format!("{} (press s to retry)", error.notice())
    } else {
        error.notice()
    }
}

fn remount_session<R: AppRuntime>(runtime: &mut R, kind: FormKind) -> Result<FormSession<DraftBox>> {
    let storage = runtime.draft_storage(kind)?;
    let (session, _) = FormSession::mount(kind, storage)?;
    Ok(session)
}

fn poll_debouncers<R: AppRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    view_data: &mut ViewData,
    tx: &Sender<InternalEvent>,
    now: Instant,
) {
    let generation = state.screen_generation;
    let ScreenView::Form(view) = &mut view_data.screen else {
        return;
    };
    let Some(customer) = view.customer.as_mut() else {
        return;
    };
    let Some(query) = customer.debouncer.poll(now) else {
        return;
    };
    customer.request_id = customer.request_id.saturating_add(1);
    let request_id = customer.request_id;
    debug!(request_id, "customer lookup fired");
    if let Err(error) = runtime.spawn_customer_lookup(generation, request_id, query, tx.clone()) {
        emit_status(state, view_data, tx, format!("customer lookup failed: {error:#}"));
    }
}

fn mount_active_screen<R: AppRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    view_data: &mut ViewData,
    tx: &Sender<InternalEvent>,
) {
    let generation = state.screen_generation;
    let (screen, status) = match mount_screen(state.active_screen, runtime, generation, tx) {
        Ok(mounted) => mounted,
        Err(error) => {
            let message = format!("{} unavailable: {error:#}", state.active_screen.label());
            (ScreenView::Unavailable(message.clone()), Some(message))
        }
    };
    view_data.screen = screen;
    emit_optional_status(state, view_data, tx, status);
}

fn mount_screen<R: AppRuntime>(
    screen: ScreenKind,
    runtime: &mut R,
    generation: u64,
    tx: &Sender<InternalEvent>,
) -> Result<(ScreenView, Option<String>)> {
    match screen {
        ScreenKind::Locations => {
            let mut chain = DependentChain::new(&LOCATION_FIELDS)?;
            for request in chain.initial_requests() {
                runtime.spawn_lookup(generation, request, tx.clone())?;
            }
            Ok((
                ScreenView::Locations(LocationsView {
                    chain,
                    field_index: 0,
                    option_index: 0,
                }),
                None,
            ))
        }
        ScreenKind::Roles => {
            let storage = runtime.draft_storage(FormKind::Role)?;
            let (session, outcome) = FormSession::mount(FormKind::Role, storage)?;
            let prompt_resume = outcome == MountOutcome::DraftAvailable;
            Ok((
                ScreenView::Roles(Box::new(RolesView {
                    matrix: PermissionMatrix::new(runtime.role_catalog()),
                    session,
                    prompt_resume,
                    line_index: 0,
                    flag_index: 0,
                })),
                prompt_resume.then(|| RESUME_PROMPT.to_owned()),
            ))
        }
        ScreenKind::Organization | ScreenKind::Contact => {
            let kind = screen
                .form_kind()
                .ok_or_else(|| anyhow!("{} has no form", screen.label()))?;
            let schema =
                schema_for(kind).ok_or_else(|| anyhow!("no schema for {}", kind.as_str()))?;
            let storage = runtime.draft_storage(kind)?;
            let (session, outcome) = FormSession::mount(kind, storage)?;
            let prompt_resume = outcome == MountOutcome::DraftAvailable;
            let customer = (kind == FormKind::Contact).then(|| CustomerAutofill {
                debouncer: Debouncer::new(runtime.debounce_period()),
                request_id: 0,
            });
            Ok((
                ScreenView::Form(Box::new(FormView {
                    schema,
                    session,
                    field_index: 0,
                    prompt_resume,
                    file_input: None,
                    issues: Vec::new(),
                    customer,
                })),
                prompt_resume.then(|| RESUME_PROMPT.to_owned()),
            ))
        }
    }
}

/// Leaves the current screen: pending debounce work is dropped and an
/// editing session is marked abandoned.
fn close_screen(view_data: &mut ViewData) {
    match &mut view_data.screen {
        ScreenView::Form(view) => {
            if let Some(customer) = view.customer.as_mut() {
                customer.debouncer.cancel();
            }
            view.session.abandon();
        }
        ScreenView::Roles(view) => view.session.abandon(),
        ScreenView::Locations(_) | ScreenView::Unavailable(_) => {}
    }
}

fn handle_key_event<R: AppRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
    key: KeyEvent,
) -> bool {
    if key.code == KeyCode::Char('q') && key.modifiers.contains(KeyModifiers::CONTROL) {
        return true;
    }

    if state.mode == AppMode::Nav
        && let Some(command) = screen_command_for_key(key)
    {
        let events = state.dispatch(command);
        if events
            .iter()
            .any(|event| matches!(event, AppEvent::ScreenChanged { .. }))
        {
            close_screen(view_data);
            mount_active_screen(state, runtime, view_data, internal_tx);
        }
        return false;
    }

    let generation = state.screen_generation;
    let status = match &mut view_data.screen {
        ScreenView::Locations(view) => {
            handle_locations_key(runtime, view, generation, internal_tx, key)
        }
        ScreenView::Roles(view) => handle_roles_key(state, runtime, view, internal_tx, key),
        ScreenView::Form(view) => handle_form_key(state, runtime, view, internal_tx, key),
        ScreenView::Unavailable(_) => None,
    };
    emit_optional_status(state, view_data, internal_tx, status);
    false
}

fn screen_command_for_key(key: KeyEvent) -> Option<AppCommand> {
    match key.code {
        KeyCode::Tab => Some(AppCommand::NextScreen),
        KeyCode::BackTab => Some(AppCommand::PrevScreen),
        KeyCode::Char(digit @ '1'..='4') => {
            let index = digit as usize - '1' as usize;
            ScreenKind::ALL.get(index).copied().map(AppCommand::OpenScreen)
        }
        _ => None,
    }
}

fn handle_locations_key<R: AppRuntime>(
    runtime: &mut R,
    view: &mut LocationsView,
    generation: u64,
    tx: &Sender<InternalEvent>,
    key: KeyEvent,
) -> Option<String> {
    let field_count = view.chain.fields().len();
    match key.code {
        KeyCode::Char('j') | KeyCode::Down => {
            view.field_index = (view.field_index + 1).min(field_count.saturating_sub(1));
            sync_option_cursor(view);
            None
        }
        KeyCode::Char('k') | KeyCode::Up => {
            view.field_index = view.field_index.saturating_sub(1);
            sync_option_cursor(view);
            None
        }
        KeyCode::Char('h') | KeyCode::Left => move_option_cursor(view, -1),
        KeyCode::Char('l') | KeyCode::Right => move_option_cursor(view, 1),
        KeyCode::Enter => {
            let field = view.chain.fields().get(view.field_index)?;
            let Some(option) = field.options.get(view.option_index) else {
                return Some(format!("{} has no options yet", field.label));
            };
            let (key, id, label) = (field.key, option.id, option.display_name.clone());
            select_location(runtime, view, generation, tx, key, Some(id))
                .map(|status| Some(status.unwrap_or_else(|| format!("selected {label}"))))
                .unwrap_or_else(|error| Some(format!("{error:#}")))
        }
        KeyCode::Backspace | KeyCode::Delete => {
            let key = view.chain.fields().get(view.field_index)?.key;
            select_location(runtime, view, generation, tx, key, None)
                .unwrap_or_else(|error| Some(format!("{error:#}")))
        }
        KeyCode::Char('c') => {
            view.chain.clear_selections();
            view.field_index = 0;
            sync_option_cursor(view);
            Some("selection cleared".to_owned())
        }
        KeyCode::Char('x') => {
            let Some(floor) = view.chain.selected(FLOOR) else {
                return Some("select a floor to export its rooms".to_owned());
            };
            let path = rooms_export_path(floor.get());
            runtime
                .spawn_export(path, tx.clone())
                .err()
                .map(|error| format!("export failed: {error:#}"))
                .or_else(|| Some("exporting rooms...".to_owned()))
        }
        _ => None,
    }
}

fn rooms_export_path(floor_id: i64) -> String {
    format!("/pms/floors/{floor_id}/rooms.xlsx")
}

/// Applies a selection and dispatches the child lookups it triggers.
fn select_location<R: AppRuntime>(
    runtime: &mut R,
    view: &mut LocationsView,
    generation: u64,
    tx: &Sender<InternalEvent>,
    key: FieldKey,
    value: Option<pmsdesk_app::OptionId>,
) -> Result<Option<String>> {
    let requests = view.chain.on_parent_change(key, value)?;
    for request in requests {
        runtime.spawn_lookup(generation, request, tx.clone())?;
    }
    sync_option_cursor(view);
    Ok(value.is_none().then(|| format!("{key} cleared")))
}

fn sync_option_cursor(view: &mut LocationsView) {
    let Some(field) = view.chain.fields().get(view.field_index) else {
        view.option_index = 0;
        return;
    };
    view.option_index = field
        .selected_id
        .and_then(|id| field.options.iter().position(|option| option.id == id))
        .unwrap_or(0);
}

fn move_option_cursor(view: &mut LocationsView, delta: isize) -> Option<String> {
    let field = view.chain.fields().get(view.field_index)?;
    if field.options.is_empty() {
        return Some(if field.loading {
            format!("{} is loading", field.label)
        } else {
            format!("{} has no options", field.label)
        });
    }
    let len = field.options.len() as isize;
    view.option_index = (view.option_index as isize + delta).rem_euclid(len) as usize;
    None
}

fn role_lines(matrix: &PermissionMatrix) -> Vec<RoleLine> {
    matrix
        .categories()
        .iter()
        .enumerate()
        .flat_map(|(category_index, category)| {
            std::iter::once(RoleLine::Category(category_index)).chain(
                (0..category.permissions.len()).map(move |row| RoleLine::Row(category_index, row)),
            )
        })
        .collect()
}

fn handle_roles_key<R: AppRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    view: &mut RolesView,
    tx: &Sender<InternalEvent>,
    key: KeyEvent,
) -> Option<String> {
    if view.prompt_resume {
        return Some(answer_resume_prompt(&mut view.session, &mut view.prompt_resume, key));
    }
    if state.mode == AppMode::Edit {
        return edit_role_title(state, view, key);
    }

    let lines = role_lines(&view.matrix);
    match key.code {
        KeyCode::Char('j') | KeyCode::Down => {
            view.line_index = (view.line_index + 1).min(lines.len().saturating_sub(1));
            None
        }
        KeyCode::Char('k') | KeyCode::Up => {
            view.line_index = view.line_index.saturating_sub(1);
            None
        }
        KeyCode::Char('h') | KeyCode::Left => {
            view.flag_index = view.flag_index.saturating_sub(1);
            None
        }
        KeyCode::Char('l') | KeyCode::Right => {
            view.flag_index = (view.flag_index + 1).min(PermissionFlag::ALL.len() - 1);
            None
        }
        KeyCode::Char(' ') => toggle_role_line(view, lines.get(view.line_index).copied()?)
            .unwrap_or_else(|error| Some(format!("{error:#}"))),
        KeyCode::Char('e') | KeyCode::Char('i') => {
            state.dispatch(AppCommand::EnterEditMode);
            Some("editing role title (enter to finish)".to_owned())
        }
        KeyCode::Char('s') => submit_role(state, runtime, view, tx, SubmitScope::All),
        KeyCode::Char('S') => {
            let category = match lines.get(view.line_index)? {
                RoleLine::Category(index) | RoleLine::Row(index, _) => {
                    view.matrix.categories().get(*index)?.name.clone()
                }
            };
            submit_role(state, runtime, view, tx, SubmitScope::Category(category))
        }
        KeyCode::Char('c') | KeyCode::Esc => {
            view.matrix.reset();
            view.line_index = 0;
            match view.session.discard() {
                Ok(()) => Some("role form reset".to_owned()),
                Err(error) => Some(format!("reset failed: {error:#}")),
            }
        }
        _ => None,
    }
}

fn toggle_role_line(view: &mut RolesView, line: RoleLine) -> Result<Option<String>> {
    match line {
        RoleLine::Category(index) => {
            let name = view
                .matrix
                .categories()
                .get(index)
                .map(|category| category.name.clone())
                .ok_or_else(|| anyhow!("no permission category at line {index}"))?;
            let enabled = !view.matrix.category_enabled(&name);
            view.matrix.set_category_all(&name, enabled)?;
            Ok(None)
        }
        RoleLine::Row(category_index, row_index) => {
            let flag = PermissionFlag::ALL[view.flag_index.min(PermissionFlag::ALL.len() - 1)];
            let (category, row) = view
                .matrix
                .categories()
                .get(category_index)
                .and_then(|category| {
                    category
                        .permissions
                        .get(row_index)
                        .map(|row| (category.name.clone(), row.clone()))
                })
                .ok_or_else(|| anyhow!("no permission row at line {row_index}"))?;
            view.matrix
                .set_row_flag(&category, &row.name, flag, !row.flag(flag))?;
            Ok(None)
        }
    }
}

fn edit_role_title(state: &mut AppState, view: &mut RolesView, key: KeyEvent) -> Option<String> {
    let mut title = view.session.draft().text(ROLE_TITLE).to_owned();
    match key.code {
        KeyCode::Enter | KeyCode::Esc => {
            state.dispatch(AppCommand::ExitToNav);
            return None;
        }
        KeyCode::Backspace => {
            title.pop();
        }
        KeyCode::Char(ch) => title.push(ch),
        _ => return None,
    }
    view.session
        .set_field(ROLE_TITLE, FieldValue::Text(title))
        .err()
        .map(|error| format!("{error:#}"))
}

fn submit_role<R: AppRuntime>(
    state: &AppState,
    runtime: &mut R,
    view: &mut RolesView,
    tx: &Sender<InternalEvent>,
    scope: SubmitScope,
) -> Option<String> {
    let ticket = match view.session.begin_submit(ROLE_RULES) {
        Ok(ticket) => ticket,
        Err(issues) => return Some(issues_notice(&issues)),
    };
    let body = match view
        .matrix
        .role_payload(ticket.draft.text(ROLE_TITLE), &scope)
    {
        Ok(body) => body,
        Err(error) => {
            let _ = view.session.finish_submit::<(), ()>(Err(()));
            return Some(format!("{error:#}"));
        }
    };
    let request = SubmitRequest {
        method: SubmitMethod::Post,
        path: ROLES_ENDPOINT.to_owned(),
        payload: Payload::Json(body),
    };
    if let Err(error) = runtime.spawn_submit(state.screen_generation, FormKind::Role, request, tx.clone()) {
        let _ = view.session.finish_submit::<(), ()>(Err(()));
        return Some(format!("submit failed: {error:#}"));
    }
    Some("creating role...".to_owned())
}

/// `y` resumes the saved draft, `n` discards it; any other key repeats the
/// question.
fn answer_resume_prompt(
    session: &mut FormSession<DraftBox>,
    prompt_resume: &mut bool,
    key: KeyEvent,
) -> String {
    let (answer, label) = match key.code {
        KeyCode::Char('y') => (session.resume(), "draft restored"),
        KeyCode::Char('n') => (session.discard(), "draft discarded"),
        _ => return RESUME_PROMPT.to_owned(),
    };
    *prompt_resume = false;
    match answer {
        Ok(()) => label.to_owned(),
        Err(error) => format!("{error:#}"),
    }
}

fn issues_notice(issues: &[ValidationIssue]) -> String {
    match issues {
        [] => "nothing to fix".to_owned(),
        [only] => only.message.clone(),
        [first, rest @ ..] => format!("{} (+{} more)", first.message, rest.len()),
    }
}

fn handle_form_key<R: AppRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    view: &mut FormView,
    tx: &Sender<InternalEvent>,
    key: KeyEvent,
) -> Option<String> {
    if view.prompt_resume {
        return Some(answer_resume_prompt(&mut view.session, &mut view.prompt_resume, key));
    }

    if state.mode == AppMode::Edit {
        return edit_form_field(state, view, key, Instant::now());
    }

    let field_count = view.schema.fields.len();
    match key.code {
        KeyCode::Char('j') | KeyCode::Down => {
            view.field_index = (view.field_index + 1).min(field_count.saturating_sub(1));
            None
        }
        KeyCode::Char('k') | KeyCode::Up => {
            view.field_index = view.field_index.saturating_sub(1);
            None
        }
        KeyCode::Enter | KeyCode::Char('e') | KeyCode::Char('i') => {
            let field = view.schema.fields.get(view.field_index)?;
            match field.input {
                InputKind::Text => {
                    state.dispatch(AppCommand::EnterEditMode);
                    Some(format!("editing {}", field.label))
                }
                InputKind::Toggle => {
                    let current = view
                        .session
                        .draft()
                        .value(field.name)
                        .and_then(FieldValue::as_bool)
                        .unwrap_or(false);
                    view.session
                        .set_field(field.name, FieldValue::Bool(!current))
                        .err()
                        .map(|error| format!("{error:#}"))
                }
                InputKind::File => {
                    view.file_input = Some(String::new());
                    state.dispatch(AppCommand::EnterEditMode);
                    Some(format!("path for {} (enter to attach)", field.label))
                }
            }
        }
        KeyCode::Char('s') => submit_form(state, runtime, view, tx),
        _ => None,
    }
}

fn edit_form_field(
    state: &mut AppState,
    view: &mut FormView,
    key: KeyEvent,
    now: Instant,
) -> Option<String> {
    let field = *view.schema.fields.get(view.field_index)?;

    if let Some(path) = view.file_input.as_mut() {
        return match key.code {
            KeyCode::Esc => {
                view.file_input = None;
                state.dispatch(AppCommand::ExitToNav);
                None
            }
            KeyCode::Enter => {
                let path = std::mem::take(path);
                view.file_input = None;
                state.dispatch(AppCommand::ExitToNav);
                let attached = read_attachment(Path::new(path.trim())).and_then(|attachment| {
                    let label = format!("attached {}", attachment.file_name);
                    view.session
                        .set_field(field.name, FieldValue::File(attachment))?;
                    Ok(label)
                });
                Some(attached.unwrap_or_else(|error| format!("{error:#}")))
            }
            KeyCode::Backspace => {
                path.pop();
                None
            }
            KeyCode::Char(ch) => {
                path.push(ch);
                None
            }
            _ => None,
        };
    }

    let mut text = view.session.draft().text(field.name).to_owned();
    match key.code {
        KeyCode::Enter | KeyCode::Esc => {
            state.dispatch(AppCommand::ExitToNav);
            return None;
        }
        KeyCode::Backspace => {
            text.pop();
        }
        KeyCode::Char(ch) => text.push(ch),
        _ => return None,
    }
    if let Err(error) = view.session.set_field(field.name, FieldValue::Text(text)) {
        return Some(format!("{error:#}"));
    }
    view.issues.retain(|issue| issue.field != field.name);

    if matches!(field.name, CUSTOMER_MOBILE | CUSTOMER_EMAIL)
        && let Some(customer) = view.customer.as_mut()
    {
        // Any reply already in flight answers a query the user has moved past.
        customer.request_id = customer.request_id.saturating_add(1);
        let draft = view.session.draft();
        match customer_query(draft.text(CUSTOMER_MOBILE), draft.text(CUSTOMER_EMAIL)) {
            Some(query) => customer.debouncer.trigger(now, query),
            None => customer.debouncer.cancel(),
        }
    }
    None
}

fn read_attachment(path: &Path) -> Result<FileAttachment> {
    if path.as_os_str().is_empty() {
        return Err(anyhow!("no file path given"));
    }
    let data = std::fs::read(path).with_context(|| format!("read {}", path.display()))?;
    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("upload.bin")
        .to_owned();
    Ok(FileAttachment {
        mime_type: mime_for(&file_name).to_owned(),
        file_name,
        data,
    })
}

fn mime_for(file_name: &str) -> &'static str {
    let extension = file_name
        .rsplit_once('.')
        .map(|(_, extension)| extension.to_ascii_lowercase())
        .unwrap_or_default();
    match extension.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "svg" => "image/svg+xml",
        "webp" => "image/webp",
        "pdf" => "application/pdf",
        _ => "application/octet-stream",
    }
}

fn submit_form<R: AppRuntime>(
    state: &AppState,
    runtime: &mut R,
    view: &mut FormView,
    tx: &Sender<InternalEvent>,
) -> Option<String> {
    let ticket = match view.session.begin_submit(view.schema.rules) {
        Ok(ticket) => ticket,
        Err(issues) => {
            let notice = issues_notice(&issues);
            view.issues = issues;
            return Some(notice);
        }
    };
    view.issues.clear();
    if let Some(customer) = view.customer.as_mut() {
        customer.debouncer.cancel();
    }
    let request = SubmitRequest {
        method: view.schema.method,
        path: view.schema.endpoint.to_owned(),
        payload: build_payload(&ticket.draft, view.schema.mappings),
    };
    if let Err(error) = runtime.spawn_submit(state.screen_generation, ticket.kind, request, tx.clone()) {
        let _ = view.session.finish_submit::<(), ()>(Err(()));
        return Some(format!("submit failed: {error:#}"));
    }
    Some("submitting...".to_owned())
}

fn render(frame: &mut ratatui::Frame<'_>, state: &AppState, view_data: &ViewData) {
    let layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Min(1),
            Constraint::Length(3),
        ])
        .split(frame.area());

    let selected = ScreenKind::ALL
        .iter()
        .position(|screen| *screen == state.active_screen)
        .unwrap_or(0);
    let titles = ScreenKind::ALL
        .iter()
        .enumerate()
        .map(|(index, screen)| format!("{} {}", index + 1, screen.label()))
        .collect::<Vec<String>>();
    let tabs = Tabs::new(titles)
        .block(Block::default().title("pmsdesk").borders(Borders::ALL))
        .style(Style::default().fg(Color::White))
        .highlight_style(
            Style::default()
                .fg(Color::Cyan)
                .add_modifier(Modifier::BOLD),
        )
        .select(selected);
    frame.render_widget(tabs, layout[0]);

    let body = Paragraph::new(render_screen_text(state, view_data))
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title(state.active_screen.label()),
        )
        .wrap(Wrap { trim: false });
    frame.render_widget(body, layout[1]);

    let status = Paragraph::new(status_text(state, view_data))
        .style(Style::default().fg(Color::Yellow))
        .block(Block::default().borders(Borders::ALL));
    frame.render_widget(status, layout[2]);
}

fn render_screen_text(state: &AppState, view_data: &ViewData) -> String {
    match &view_data.screen {
        ScreenView::Locations(view) => render_locations_text(view),
        ScreenView::Roles(view) => render_roles_text(state, view),
        ScreenView::Form(view) => render_form_text(state, view),
        ScreenView::Unavailable(message) => message.clone(),
    }
}

fn render_locations_text(view: &LocationsView) -> String {
    view.chain
        .fields()
        .iter()
        .enumerate()
        .map(|(index, field)| {
            let marker = if index == view.field_index { CURSOR_MARK } else { " " };
            let selected = field
                .selected_option()
                .map(|option| option.display_name.as_str())
                .unwrap_or("-");
            let detail = if field.loading {
                "loading...".to_owned()
            } else if field.options.is_empty() {
                String::new()
            } else if index == view.field_index {
                let highlighted = field
                    .options
                    .get(view.option_index)
                    .map(|option| option.display_name.as_str())
                    .unwrap_or("");
                format!(
                    "< {highlighted} > ({}/{})",
                    view.option_index + 1,
                    field.options.len()
                )
            } else {
                format!("{} options", field.options.len())
            };
            format!("{marker} {:<10} [{selected}] {detail}", field.label)
                .trim_end()
                .to_owned()
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn check_mark(value: bool) -> &'static str {
    if value { "[x]" } else { "[ ]" }
}

fn render_roles_text(state: &AppState, view: &RolesView) -> String {
    if view.prompt_resume {
        return "New role\n\nAn unsaved role title exists. Resume it? (y/n)".to_owned();
    }
    let title = view.session.draft().text(ROLE_TITLE);
    let editing = if state.mode == AppMode::Edit { EDIT_MARK } else { "" };
    let mut lines = vec![format!("Role title: {title}{editing}"), String::new()];
    let header = PermissionFlag::ALL
        .iter()
        .enumerate()
        .map(|(index, flag)| {
            if index == view.flag_index {
                format!("[{}]", flag.as_str())
            } else {
                format!(" {} ", flag.as_str())
            }
        })
        .collect::<Vec<_>>()
        .join(" ");
    lines.push(format!("  {:<28} {header}", ""));

    for (index, line) in role_lines(&view.matrix).into_iter().enumerate() {
        let marker = if index == view.line_index { CURSOR_MARK } else { " " };
        let text = match line {
            RoleLine::Category(category_index) => {
                let Some(category) = view.matrix.categories().get(category_index) else {
                    continue;
                };
                format!(
                    "{marker} {} {}",
                    check_mark(view.matrix.category_enabled(&category.name)),
                    category.name
                )
            }
            RoleLine::Row(category_index, row_index) => {
                let Some(row) = view
                    .matrix
                    .categories()
                    .get(category_index)
                    .and_then(|category| category.permissions.get(row_index))
                else {
                    continue;
                };
                let flags = PermissionFlag::ALL
                    .iter()
                    .map(|flag| format!("{:^width$}", check_mark(row.flag(*flag)), width = flag.as_str().len() + 2))
                    .collect::<Vec<_>>()
                    .join(" ");
                format!("{marker}   {:<26} {flags}", row.name)
            }
        };
        lines.push(text);
    }
    lines.join("\n")
}

fn render_form_text(state: &AppState, view: &FormView) -> String {
    let mut lines = vec![view.schema.title.to_owned(), String::new()];
    if view.prompt_resume {
        lines.push("An unsaved draft exists. Resume it? (y/n)".to_owned());
        return lines.join("\n");
    }

    let draft = view.session.draft();
    for (index, field) in view.schema.fields.iter().enumerate() {
        let active = index == view.field_index;
        let marker = if active { CURSOR_MARK } else { " " };
        let value = if active && let Some(path) = &view.file_input {
            format!("path: {path}{EDIT_MARK}")
        } else {
            let shown = draft.value(field.name).map(FieldValue::display).unwrap_or_default();
            if active && state.mode == AppMode::Edit {
                format!("{shown}{EDIT_MARK}")
            } else {
                shown
            }
        };
        let flagged = if view.issues.iter().any(|issue| issue.field == field.name) {
            " !"
        } else {
            ""
        };
        lines.push(format!("{marker} {:<20} {value}{flagged}", field.label));
    }

    if !view.issues.is_empty() {
        lines.push(String::new());
        lines.extend(view.issues.iter().map(|issue| format!("  ! {}", issue.message)));
    }
    if view.session.state() == SessionState::Submitting {
        lines.push(String::new());
        lines.push("submitting...".to_owned());
    }
    lines.join("\n")
}

fn status_text(state: &AppState, view_data: &ViewData) -> String {
    if let Some(status) = &state.status_line {
        return status.clone();
    }
    let hints = match (&view_data.screen, state.mode) {
        (_, AppMode::Edit) => "type to edit | enter/esc done",
        (ScreenView::Locations(_), _) => {
            "j/k field | h/l option | enter select | del clear | c clear all | x export rooms"
        }
        (ScreenView::Roles(_), _) => {
            "j/k row | h/l flag | space toggle | e title | s submit | S submit category | c reset"
        }
        (ScreenView::Form(_), _) => "j/k field | enter edit | s submit",
        (ScreenView::Unavailable(_), _) => "",
    };
    format!("tab/1-4 screens | ctrl+q quit | {hints}")
}

#[cfg(test)]
mod tests {
    use super::{
        AppRuntime, DraftBox, EVENT_POLL, InternalEvent, ScreenView, SubmitRequest, ViewData,
        handle_key_event, mime_for, mount_active_screen, poll_debouncers, poll_timeout,
        process_internal_events, render_form_text, render_locations_text, render_roles_text,
        rooms_export_path, status_text,
    };
    use anyhow::{Result, anyhow};
    use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
    use pmsdesk_app::{
        AppMode, AppState, CUSTOMER_EMAIL, CUSTOMER_MOBILE, CUSTOMER_NAME, CustomerProfile,
        CustomerQuery, DELIVERY_ADDRESS, DraftStorage, FieldValue, FormDraft, FormKind,
        LookupError, LookupRequest, MemoryDraftStorage, Payload, PermissionCategory,
        RemoteOption, ROLE_TITLE, ROLES_ENDPOINT, ScreenKind, SubmissionError, SubmitMethod,
        SubmitOutcome,
    };
    use std::collections::BTreeMap;
    use std::path::PathBuf;
    use std::sync::mpsc::{self, Receiver, Sender};
    use std::time::{Duration, Instant};

    const QUIET: Duration = Duration::from_millis(300);

    #[derive(Debug, Clone)]
    struct SharedDrafts(std::rc::Rc<std::cell::RefCell<MemoryDraftStorage>>);

    impl DraftStorage for SharedDrafts {
        fn load(&self, kind: FormKind) -> Result<Option<FormDraft>> {
            self.0.borrow().load(kind)
        }

        fn save(&mut self, kind: FormKind, draft: &FormDraft) -> Result<()> {
            self.0.borrow_mut().save(kind, draft)
        }

        fn clear(&mut self, kind: FormKind) -> Result<()> {
            self.0.borrow_mut().clear(kind)
        }
    }

    struct TestRuntime {
        options: BTreeMap<(&'static str, Option<i64>), Vec<RemoteOption>>,
        lookups: Vec<LookupRequest>,
        customer: Option<CustomerProfile>,
        customer_queries: Vec<CustomerQuery>,
        submit_result: Result<SubmitOutcome, SubmissionError>,
        submits: Vec<(FormKind, SubmitRequest)>,
        exports: Vec<String>,
        drafts: SharedDrafts,
        hold_submits: bool,
    }

    impl Default for TestRuntime {
        fn default() -> Self {
            let mut options = BTreeMap::new();
            options.insert(
                ("sites", None),
                vec![RemoteOption::new(1, "North"), RemoteOption::new(2, "South")],
            );
            options.insert(
                ("buildings", Some(1)),
                vec![RemoteOption::new(10, "Tower A"), RemoteOption::new(11, "Tower B")],
            );
            options.insert(
                ("buildings", Some(2)),
                vec![RemoteOption::new(20, "Annex")],
            );
            options.insert(("wings", Some(10)), vec![RemoteOption::new(100, "East")]);
            Self {
                options,
                lookups: Vec::new(),
                customer: None,
                customer_queries: Vec::new(),
                submit_result: Ok(SubmitOutcome {
                    status: 201,
                    message: None,
                }),
                submits: Vec::new(),
                exports: Vec::new(),
                drafts: SharedDrafts(Default::default()),
                hold_submits: false,
            }
        }
    }

    impl TestRuntime {
        fn stored(&self, kind: FormKind) -> Option<FormDraft> {
            self.drafts.0.borrow().stored(kind).cloned()
        }

        fn seed(&self, kind: FormKind, fields: &[(&str, &str)]) {
            let mut draft = FormDraft::default();
            for (name, value) in fields {
                draft
                    .fields
                    .insert((*name).to_owned(), FieldValue::text(*value));
            }
            self.drafts
                .0
                .borrow_mut()
                .save(kind, &draft)
                .expect("seed draft");
        }
    }

    impl AppRuntime for TestRuntime {
        fn fetch_options(
            &mut self,
            request: &LookupRequest,
        ) -> Result<Vec<RemoteOption>, LookupError> {
            self.lookups.push(*request);
            let parent = request.parent_value.map(|id| id.get());
            Ok(self
                .options
                .get(&(request.resource, parent))
                .cloned()
                .unwrap_or_default())
        }

        fn lookup_customer(
            &mut self,
            query: &CustomerQuery,
        ) -> Result<Option<CustomerProfile>, LookupError> {
            self.customer_queries.push(query.clone());
            Ok(self.customer.clone())
        }

        fn submit(
            &mut self,
            _method: SubmitMethod,
            _path: &str,
            _payload: &Payload,
        ) -> Result<SubmitOutcome, SubmissionError> {
            self.submit_result.clone()
        }

        fn export(&mut self, path: &str) -> Result<PathBuf> {
            self.exports.push(path.to_owned());
            Ok(PathBuf::from("/tmp/rooms.xlsx"))
        }

        fn draft_storage(&mut self, _kind: FormKind) -> Result<DraftBox> {
            Ok(Box::new(self.drafts.clone()))
        }

        fn debounce_period(&self) -> Duration {
            QUIET
        }

        fn role_catalog(&mut self) -> Vec<PermissionCategory> {
            vec![
                PermissionCategory::new("Inventory", &["Items", "Stock"]),
                PermissionCategory::new("Setup", &["Sites"]),
            ]
        }

        fn spawn_submit(
            &mut self,
            generation: u64,
            kind: FormKind,
            request: SubmitRequest,
            tx: Sender<InternalEvent>,
        ) -> Result<()> {
            self.submits.push((kind, request.clone()));
            if self.hold_submits {
                return Ok(());
            }
            let result = self.submit(request.method, &request.path, &request.payload);
            tx.send(InternalEvent::SubmitFinished {
                generation,
                kind,
                result,
            })
            .map_err(|_| anyhow!("submit event channel closed"))
        }
    }

    struct Harness {
        state: AppState,
        runtime: TestRuntime,
        view_data: ViewData,
        tx: Sender<InternalEvent>,
        rx: Receiver<InternalEvent>,
    }

    impl Harness {
        fn open(screen: ScreenKind, runtime: TestRuntime) -> Self {
            let (tx, rx) = mpsc::channel();
            let mut harness = Self {
                state: AppState {
                    active_screen: screen,
                    ..AppState::default()
                },
                runtime,
                view_data: ViewData::default(),
                tx,
                rx,
            };
            mount_active_screen(
                &mut harness.state,
                &mut harness.runtime,
                &mut harness.view_data,
                &harness.tx,
            );
            harness.pump();
            harness
        }

        fn press(&mut self, code: KeyCode) -> bool {
            self.key(KeyEvent::new(code, KeyModifiers::NONE))
        }

        fn key(&mut self, key: KeyEvent) -> bool {
            let quit = handle_key_event(
                &mut self.state,
                &mut self.runtime,
                &mut self.view_data,
                &self.tx,
                key,
            );
            self.pump();
            quit
        }

        fn type_text(&mut self, text: &str) {
            for ch in text.chars() {
                self.press(KeyCode::Char(ch));
            }
        }

        fn pump(&mut self) {
            process_internal_events(
                &mut self.state,
                &mut self.runtime,
                &mut self.view_data,
                &self.tx,
                &self.rx,
            );
        }

        fn status(&self) -> String {
            self.state.status_line.clone().unwrap_or_default()
        }

        fn draft_text(&self, name: &str) -> String {
            match &self.view_data.screen {
                ScreenView::Form(view) => view.session.draft().text(name).to_owned(),
                ScreenView::Roles(view) => view.session.draft().text(name).to_owned(),
                _ => String::new(),
            }
        }

        fn screen_text(&self) -> String {
            match &self.view_data.screen {
                ScreenView::Locations(view) => render_locations_text(view),
                ScreenView::Roles(view) => render_roles_text(&self.state, view),
                ScreenView::Form(view) => render_form_text(&self.state, view),
                ScreenView::Unavailable(message) => message.clone(),
            }
        }
    }

    #[test]
    fn locations_mount_loads_sites_and_selection_loads_buildings() {
        let mut harness = Harness::open(ScreenKind::Locations, TestRuntime::default());
        assert_eq!(harness.runtime.lookups.len(), 1);
        assert_eq!(harness.runtime.lookups[0].resource, "sites");

        harness.press(KeyCode::Enter);
        assert_eq!(harness.status(), "selected North");
        let last = harness.runtime.lookups.last().expect("buildings lookup");
        assert_eq!(last.resource, "buildings");
        assert_eq!(last.parent_value.map(|id| id.get()), Some(1));

        let text = harness.screen_text();
        assert!(text.contains("[North]"));
        assert!(text.contains("2 options"));
    }

    #[test]
    fn changing_site_blanks_lower_levels() {
        let mut harness = Harness::open(ScreenKind::Locations, TestRuntime::default());
        harness.press(KeyCode::Enter);
        harness.press(KeyCode::Char('j'));
        harness.press(KeyCode::Enter);
        assert!(harness.screen_text().contains("[Tower A]"));

        harness.press(KeyCode::Char('k'));
        harness.press(KeyCode::Char('l'));
        harness.press(KeyCode::Enter);

        let ScreenView::Locations(view) = &harness.view_data.screen else {
            panic!("expected locations screen");
        };
        let fields = view.chain.fields();
        assert_eq!(fields[0].selected_option().map(|o| o.display_name.as_str()), Some("South"));
        assert_eq!(fields[1].options, vec![RemoteOption::new(20, "Annex")]);
        assert_eq!(fields[1].selected_id, None);
        assert!(fields[2].options.is_empty());
        assert!(view.chain.is_consistent());
    }

    #[test]
    fn lookup_from_a_previous_visit_is_dropped() {
        let mut harness = Harness::open(ScreenKind::Locations, TestRuntime::default());
        let stale_request = harness.runtime.lookups[0];
        harness.press(KeyCode::Tab);
        harness.press(KeyCode::BackTab);
        assert_eq!(harness.state.active_screen, ScreenKind::Locations);
        assert_eq!(harness.state.screen_generation, 2);

        harness
            .tx
            .send(InternalEvent::LookupFinished {
                generation: 0,
                request: stale_request,
                result: Ok(vec![RemoteOption::new(9, "Ghost")]),
            })
            .expect("send stale lookup");
        harness.pump();
        assert!(!harness.screen_text().contains("Ghost"));
    }

    #[test]
    fn lookup_failure_lands_on_the_status_line() {
        let mut harness = Harness::open(ScreenKind::Locations, TestRuntime::default());
        let ScreenView::Locations(view) = &mut harness.view_data.screen else {
            panic!("expected locations screen");
        };
        let request = view
            .chain
            .on_parent_change(pmsdesk_app::FieldKey::new("site"), Some(pmsdesk_app::OptionId::new(1)))
            .expect("select site")
            .remove(0);
        harness
            .tx
            .send(InternalEvent::LookupFinished {
                generation: harness.state.screen_generation,
                request,
                result: Err(LookupError::http(500, "boom")),
            })
            .expect("send failure");
        harness.pump();
        assert_eq!(harness.status(), "building: lookup failed (500): boom");
    }

    #[test]
    fn export_needs_a_floor() {
        let mut harness = Harness::open(ScreenKind::Locations, TestRuntime::default());
        harness.press(KeyCode::Char('x'));
        assert_eq!(harness.status(), "select a floor to export its rooms");
        assert!(harness.runtime.exports.is_empty());
        assert_eq!(rooms_export_path(7), "/pms/floors/7/rooms.xlsx");
    }

    #[test]
    fn role_row_toggle_derives_all_and_header() {
        let mut harness = Harness::open(ScreenKind::Roles, TestRuntime::default());
        // Line 1 is the first Inventory row; column 0 is `all`.
        harness.press(KeyCode::Char('j'));
        harness.press(KeyCode::Char(' '));
        harness.press(KeyCode::Char('j'));
        for _ in 0..4 {
            harness.press(KeyCode::Char('l'));
            harness.press(KeyCode::Char(' '));
        }
        let ScreenView::Roles(view) = &harness.view_data.screen else {
            panic!("expected roles screen");
        };
        let inventory = view.matrix.category("Inventory").expect("inventory");
        assert!(inventory.permissions.iter().all(|row| row.all));
        assert!(view.matrix.category_enabled("Inventory"));
        assert!(!view.matrix.category_enabled("Setup"));
    }

    #[test]
    fn role_header_toggle_flips_every_row() {
        let mut harness = Harness::open(ScreenKind::Roles, TestRuntime::default());
        harness.press(KeyCode::Char(' '));
        assert!(harness.screen_text().contains("> [x] Inventory"));
        harness.press(KeyCode::Char(' '));
        let ScreenView::Roles(view) = &harness.view_data.screen else {
            panic!("expected roles screen");
        };
        let inventory = view.matrix.category("Inventory").expect("inventory");
        assert!(inventory.permissions.iter().all(|row| !row.any_set()));
    }

    #[test]
    fn role_submit_requires_a_title() {
        let mut harness = Harness::open(ScreenKind::Roles, TestRuntime::default());
        harness.press(KeyCode::Char('s'));
        assert_eq!(harness.status(), "Role title is required");
        assert!(harness.runtime.submits.is_empty());
    }

    #[test]
    fn role_submit_posts_permissions_and_resets() {
        let mut harness = Harness::open(ScreenKind::Roles, TestRuntime::default());
        harness.press(KeyCode::Char('e'));
        assert_eq!(harness.state.mode, AppMode::Edit);
        harness.type_text("Auditor");
        harness.press(KeyCode::Enter);
        assert_eq!(harness.state.mode, AppMode::Nav);
        assert_eq!(
            harness.runtime.stored(FormKind::Role).map(|d| d.text(ROLE_TITLE).to_owned()),
            Some("Auditor".to_owned())
        );

        harness.press(KeyCode::Char(' '));
        harness.press(KeyCode::Char('s'));

        let (kind, request) = harness.runtime.submits.last().expect("role submitted");
        assert_eq!(*kind, FormKind::Role);
        assert_eq!(request.path, ROLES_ENDPOINT);
        let Payload::Json(body) = &request.payload else {
            panic!("role payload should be JSON");
        };
        assert_eq!(body["lock_role"]["name"], "Auditor");
        assert_eq!(body["lock_modules"], 2);

        assert_eq!(harness.status(), "role created");
        assert_eq!(harness.draft_text(ROLE_TITLE), "");
        assert_eq!(harness.runtime.stored(FormKind::Role), None);
        let ScreenView::Roles(view) = &harness.view_data.screen else {
            panic!("expected roles screen");
        };
        assert!(!view.matrix.category_enabled("Inventory"));
    }

    #[test]
    fn saved_role_title_asks_before_resuming() {
        let runtime = TestRuntime::default();
        runtime.seed(FormKind::Role, &[(ROLE_TITLE, "Auditor")]);
        let mut harness = Harness::open(ScreenKind::Roles, runtime);
        assert_eq!(harness.status(), "unsaved draft found: y to resume, n to discard");
        assert!(harness.screen_text().contains("Resume it? (y/n)"));
        assert_eq!(harness.draft_text(ROLE_TITLE), "");

        // Matrix keys wait for an answer.
        harness.press(KeyCode::Char(' '));
        assert_eq!(harness.status(), "unsaved draft found: y to resume, n to discard");

        harness.press(KeyCode::Char('y'));
        assert_eq!(harness.status(), "draft restored");
        assert_eq!(harness.draft_text(ROLE_TITLE), "Auditor");
        assert!(harness.screen_text().contains("Role title: Auditor"));
    }

    #[test]
    fn discarding_a_role_draft_clears_storage() {
        let runtime = TestRuntime::default();
        runtime.seed(FormKind::Role, &[(ROLE_TITLE, "Auditor")]);
        let mut harness = Harness::open(ScreenKind::Roles, runtime);
        harness.press(KeyCode::Char('n'));
        assert_eq!(harness.status(), "draft discarded");
        assert_eq!(harness.draft_text(ROLE_TITLE), "");
        assert_eq!(harness.runtime.stored(FormKind::Role), None);

        let ScreenView::Roles(view) = &harness.view_data.screen else {
            panic!("expected roles screen");
        };
        assert!(!view.prompt_resume);
    }

    #[test]
    fn saved_form_draft_offers_resume() {
        let runtime = TestRuntime::default();
        runtime.seed(FormKind::Organization, &[("name", "Acme")]);
        let mut harness = Harness::open(ScreenKind::Organization, runtime);
        assert_eq!(harness.status(), "unsaved draft found: y to resume, n to discard");
        assert!(harness.screen_text().contains("Resume it?"));

        harness.press(KeyCode::Char('y'));
        assert_eq!(harness.status(), "draft restored");
        assert_eq!(harness.draft_text("name"), "Acme");
    }

    #[test]
    fn discarding_a_draft_clears_storage() {
        let runtime = TestRuntime::default();
        runtime.seed(FormKind::Organization, &[("name", "Acme")]);
        let mut harness = Harness::open(ScreenKind::Organization, runtime);
        harness.press(KeyCode::Char('n'));
        assert_eq!(harness.status(), "draft discarded");
        assert_eq!(harness.draft_text("name"), "");
        assert_eq!(harness.runtime.stored(FormKind::Organization), None);
    }

    #[test]
    fn invalid_form_lists_issues_without_submitting() {
        let mut harness = Harness::open(ScreenKind::Organization, TestRuntime::default());
        harness.press(KeyCode::Char('s'));
        assert!(harness.runtime.submits.is_empty());
        assert!(harness.status().contains("more)"));
        assert!(harness.screen_text().contains("  ! "));
    }

    #[test]
    fn typing_writes_through_to_the_draft_store() {
        let mut harness = Harness::open(ScreenKind::Contact, TestRuntime::default());
        harness.press(KeyCode::Enter);
        harness.type_text("Dana");
        harness.press(KeyCode::Esc);
        assert_eq!(harness.draft_text(CUSTOMER_NAME), "Dana");
        let stored = harness.runtime.stored(FormKind::Contact).expect("draft saved");
        assert_eq!(stored.text(CUSTOMER_NAME), "Dana");
    }

    #[test]
    fn contact_lookup_waits_for_quiet_period_and_autofills() {
        let mut runtime = TestRuntime::default();
        runtime.customer = Some(CustomerProfile {
            customer_name: "Dana Lee".to_owned(),
            customer_mobile: "91234567".to_owned(),
            customer_email: "dana@example.com".to_owned(),
            delivery_address: "12 Harbour Rd".to_owned(),
        });
        let mut harness = Harness::open(ScreenKind::Contact, runtime);
        harness.press(KeyCode::Char('j'));
        harness.press(KeyCode::Enter);
        harness.type_text("91234567");
        harness.press(KeyCode::Enter);

        let start = Instant::now();
        assert!(poll_timeout(&harness.view_data, start) <= EVENT_POLL);
        poll_debouncers(
            &mut harness.state,
            &mut harness.runtime,
            &mut harness.view_data,
            &harness.tx,
            start,
        );
        assert!(harness.runtime.customer_queries.is_empty());

        poll_debouncers(
            &mut harness.state,
            &mut harness.runtime,
            &mut harness.view_data,
            &harness.tx,
            start + QUIET * 2,
        );
        harness.pump();
        assert_eq!(
            harness.runtime.customer_queries,
            vec![CustomerQuery {
                mobile: Some("91234567".to_owned()),
                email: None,
            }]
        );
        assert_eq!(harness.draft_text(CUSTOMER_NAME), "Dana Lee");
        assert_eq!(harness.draft_text(CUSTOMER_EMAIL), "dana@example.com");
        assert_eq!(harness.draft_text(DELIVERY_ADDRESS), "12 Harbour Rd");
        assert_eq!(harness.status(), "customer found: Dana Lee");
    }

    #[test]
    fn superseded_customer_response_is_ignored() {
        let mut harness = Harness::open(ScreenKind::Contact, TestRuntime::default());
        harness
            .tx
            .send(InternalEvent::CustomerFound {
                generation: harness.state.screen_generation,
                request_id: 5,
                result: Ok(Some(CustomerProfile {
                    customer_name: "Stale".to_owned(),
                    ..CustomerProfile::default()
                })),
            })
            .expect("send customer");
        harness.pump();
        assert_eq!(harness.draft_text(CUSTOMER_NAME), "");
    }

    #[test]
    fn edit_after_lookup_fired_wins_over_the_late_reply() {
        let mut runtime = TestRuntime::default();
        runtime.customer = Some(CustomerProfile {
            customer_name: "Old Owner".to_owned(),
            customer_mobile: "91234567".to_owned(),
            ..CustomerProfile::default()
        });
        let mut harness = Harness::open(ScreenKind::Contact, runtime);
        harness.press(KeyCode::Char('j'));
        harness.press(KeyCode::Enter);
        harness.type_text("91234567");

        // The lookup fires and its reply waits in the channel.
        poll_debouncers(
            &mut harness.state,
            &mut harness.runtime,
            &mut harness.view_data,
            &harness.tx,
            Instant::now() + QUIET * 2,
        );
        assert_eq!(harness.runtime.customer_queries.len(), 1);

        for code in [KeyCode::Backspace, KeyCode::Char('8')] {
            handle_key_event(
                &mut harness.state,
                &mut harness.runtime,
                &mut harness.view_data,
                &harness.tx,
                KeyEvent::new(code, KeyModifiers::NONE),
            );
        }
        harness.pump();

        assert_eq!(harness.draft_text(CUSTOMER_MOBILE), "91234568");
        assert_eq!(harness.draft_text(CUSTOMER_NAME), "");
        assert_ne!(harness.status(), "customer found: Old Owner");
    }

    #[test]
    fn incomplete_mobile_does_not_schedule_lookup() {
        let mut harness = Harness::open(ScreenKind::Contact, TestRuntime::default());
        harness.press(KeyCode::Char('j'));
        harness.press(KeyCode::Enter);
        harness.type_text("9123");
        let ScreenView::Form(view) = &harness.view_data.screen else {
            panic!("expected form screen");
        };
        assert!(
            view.customer
                .as_ref()
                .is_some_and(|customer| !customer.debouncer.is_pending())
        );
        assert_eq!(poll_timeout(&harness.view_data, Instant::now()), EVENT_POLL);
    }

    fn fill_contact(harness: &mut Harness) {
        for (index, value) in ["Dana", "91234567", "dana@example.com", "12 Harbour Rd"]
            .into_iter()
            .enumerate()
        {
            if index > 0 {
                harness.press(KeyCode::Char('j'));
            }
            harness.press(KeyCode::Enter);
            harness.type_text(value);
            harness.press(KeyCode::Enter);
        }
    }

    #[test]
    fn accepted_contact_clears_the_draft() {
        let mut harness = Harness::open(ScreenKind::Contact, TestRuntime::default());
        fill_contact(&mut harness);
        harness.press(KeyCode::Char('s'));

        let (kind, request) = harness.runtime.submits.last().expect("submitted");
        assert_eq!(*kind, FormKind::Contact);
        assert_eq!(request.path, "/pms/food_orders.json");
        assert!(!request.payload.is_multipart());
        assert_eq!(harness.status(), "saved");
        assert_eq!(harness.draft_text(CUSTOMER_MOBILE), "");
        assert_eq!(harness.runtime.stored(FormKind::Contact), None);
    }

    #[test]
    fn rejected_contact_keeps_the_draft_and_shows_field_errors() {
        let mut runtime = TestRuntime::default();
        let mut fields = BTreeMap::new();
        fields.insert(
            "customer_email".to_owned(),
            vec!["has already been taken".to_owned()],
        );
        runtime.submit_result = Err(SubmissionError::Invalid {
            fields,
            message: "invalid".to_owned(),
        });
        let mut harness = Harness::open(ScreenKind::Contact, runtime);
        fill_contact(&mut harness);
        harness.press(KeyCode::Char('s'));

        assert_eq!(harness.status(), "customer_email: has already been taken");
        assert_eq!(harness.draft_text(CUSTOMER_MOBILE), "91234567");
        assert!(harness.runtime.stored(FormKind::Contact).is_some());
        assert!(harness.screen_text().contains("has already been taken"));
    }

    #[test]
    fn network_failure_offers_retry() {
        let mut runtime = TestRuntime::default();
        runtime.submit_result = Err(SubmissionError::Network {
            message: "connection refused".to_owned(),
        });
        let mut harness = Harness::open(ScreenKind::Contact, runtime);
        fill_contact(&mut harness);
        harness.press(KeyCode::Char('s'));
        assert!(harness.status().ends_with("(press s to retry)"));

        harness.runtime.submit_result = Ok(SubmitOutcome {
            status: 200,
            message: Some("order placed".to_owned()),
        });
        harness.press(KeyCode::Char('s'));
        assert_eq!(harness.status(), "order placed");
        assert_eq!(harness.runtime.submits.len(), 2);
    }

    #[test]
    fn submit_finishing_after_screen_change_still_clears_draft() {
        let mut runtime = TestRuntime::default();
        runtime.hold_submits = true;
        let mut harness = Harness::open(ScreenKind::Contact, runtime);
        fill_contact(&mut harness);
        harness.press(KeyCode::Char('s'));
        let generation = harness.state.screen_generation;
        harness.press(KeyCode::Tab);
        assert_eq!(harness.state.active_screen, ScreenKind::Locations);
        assert!(harness.runtime.stored(FormKind::Contact).is_some());

        harness
            .tx
            .send(InternalEvent::SubmitFinished {
                generation,
                kind: FormKind::Contact,
                result: Ok(SubmitOutcome {
                    status: 201,
                    message: None,
                }),
            })
            .expect("send submit result");
        harness.pump();
        assert_eq!(harness.runtime.stored(FormKind::Contact), None);
        assert_eq!(harness.status(), "contact saved");
    }

    #[test]
    fn screen_keys_are_ignored_while_editing() {
        let mut harness = Harness::open(ScreenKind::Contact, TestRuntime::default());
        harness.press(KeyCode::Enter);
        harness.press(KeyCode::Char('2'));
        assert_eq!(harness.state.active_screen, ScreenKind::Contact);
        assert_eq!(harness.draft_text(CUSTOMER_NAME), "2");

        harness.press(KeyCode::Esc);
        harness.press(KeyCode::Char('2'));
        assert_eq!(harness.state.active_screen, ScreenKind::Roles);
    }

    #[test]
    fn ctrl_q_quits() {
        let mut harness = Harness::open(ScreenKind::Locations, TestRuntime::default());
        assert!(harness.key(KeyEvent::new(KeyCode::Char('q'), KeyModifiers::CONTROL)));
        assert!(!harness.press(KeyCode::Char('q')));
    }

    #[test]
    fn status_line_falls_back_to_key_hints() {
        let harness = Harness::open(ScreenKind::Organization, TestRuntime::default());
        let hints = status_text(&harness.state, &harness.view_data);
        assert!(hints.contains("s submit"));
        assert!(hints.starts_with("tab/1-4 screens"));
    }

    #[test]
    fn mime_types_follow_extension() {
        assert_eq!(mime_for("logo.PNG"), "image/png");
        assert_eq!(mime_for("brand.jpeg"), "image/jpeg");
        assert_eq!(mime_for("README"), "application/octet-stream");
    }
}
