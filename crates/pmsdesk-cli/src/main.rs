// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

mod config;
mod logging;
mod runtime;

use anyhow::{Context, Result, anyhow, bail};
use config::Config;
use pmsdesk_api::{Client, location_catalog};
use pmsdesk_app::AppState;
use pmsdesk_db::Store;
use runtime::ApiRuntime;
use std::env;
use std::path::PathBuf;
use std::rc::Rc;
use tracing::info;

fn main() {
    if let Err(error) = run() {
        eprintln!("{error:#}");
        std::process::exit(1);
    }
}

/// What one invocation does. Only `Desk` and `Check` touch the network
/// client or the draft database.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Desk,
    Check,
    ShowConfigPath,
    ShowDbPath,
    ShowExampleConfig,
    Help,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Invocation {
    command: Command,
    config_path: PathBuf,
}

fn run() -> Result<()> {
    let invocation = parse_invocation(env::args().skip(1), Config::default_path()?)?;
    let config_path = &invocation.config_path;
    match invocation.command {
        Command::Help => {
            print_help();
            return Ok(());
        }
        Command::ShowConfigPath => {
            println!("{}", config_path.display());
            return Ok(());
        }
        Command::ShowExampleConfig => {
            print!("{}", Config::example_config(config_path));
            return Ok(());
        }
        Command::Desk | Command::Check | Command::ShowDbPath => {}
    }

    let config = Config::load(config_path).with_context(|| {
        format!(
            "load config {}; run `pmsdesk --print-example-config` for a v1 template",
            config_path.display()
        )
    })?;
    let db_path = config.db_path()?;
    if invocation.command == Command::ShowDbPath {
        println!("{}", db_path.display());
        return Ok(());
    }

    logging::init(config.log_level(), &config.log_file()?)?;

    let store = Store::open(&db_path).with_context(|| {
        format!(
            "open draft database {} -- set [storage].db_path or {} to a writable file",
            db_path.display(),
            pmsdesk_db::DB_PATH_ENV
        )
    })?;
    store.bootstrap()?;

    let client = Client::new(config.base_url()?, config.token().as_deref(), config.timeout()?)
        .with_context(|| format!("[api] section of {} is invalid", config_path.display()))?
        .with_customer_lookup_path(config.customer_lookup_path());
    let catalog = location_catalog()?;
    info!(
        base_url = client.base_url(),
        authenticated = client.has_token(),
        db = %db_path.display(),
        "pmsdesk starting"
    );
    if invocation.command == Command::Check {
        println!("config, database, and api client look good");
        for draft in store.list_drafts()? {
            println!(
                "saved {} draft: {} fields, updated {}",
                draft.kind.as_str(),
                draft.field_count,
                draft.updated_at
            );
        }
        return Ok(());
    }

    let mut runtime = ApiRuntime::new(
        client,
        catalog,
        Rc::new(store),
        config.debounce()?,
        config.download_dir()?,
    );
    let mut state = AppState::default();
    pmsdesk_tui::run_app(&mut state, &mut runtime)
}

fn flag_command(flag: &str) -> Option<Command> {
    match flag {
        "--check" => Some(Command::Check),
        "--print-config-path" => Some(Command::ShowConfigPath),
        "--print-path" => Some(Command::ShowDbPath),
        "--print-example-config" => Some(Command::ShowExampleConfig),
        "--help" | "-h" => Some(Command::Help),
        _ => None,
    }
}

/// At most one action flag; `--config <path>` may appear anywhere.
fn parse_invocation<I, S>(args: I, default_config_path: PathBuf) -> Result<Invocation>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut config_path = default_config_path;
    let mut command: Option<(String, Command)> = None;

    let mut args = args.into_iter();
    while let Some(arg) = args.next() {
        let arg = arg.as_ref();
        if arg == "--config" {
            let path = args
                .next()
                .ok_or_else(|| anyhow!("--config needs a file path"))?;
            config_path = PathBuf::from(path.as_ref());
            continue;
        }
        let Some(next) = flag_command(arg) else {
            bail!("unknown argument {arg:?}; see `pmsdesk --help`");
        };
        if let Some((previous, _)) = &command {
            bail!("{arg} cannot be combined with {previous}");
        }
        command = Some((arg.to_owned(), next));
    }

    Ok(Invocation {
        command: command.map_or(Command::Desk, |(_, command)| command),
        config_path,
    })
}

fn print_help() {
    println!("pmsdesk: terminal desk for facility management records");
    println!();
    println!("usage: pmsdesk [--config <path>] [action]");
    println!("  --config <path>          Read config from <path>");
    println!("  --check                  Validate config, draft database, and api client");
    println!("  --print-config-path      Show where the config is read from");
    println!("  --print-path             Show where drafts are stored");
    println!("  --print-example-config   Print a v1 config template");
    println!("  -h, --help               Show this help");
}
