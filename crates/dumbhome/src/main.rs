//! dumbhome - a minimalist launcher core
//!
//! This binary is the command-line host for the launcher services: a curated
//! app list, a single optional widget slot, clock, theme, and weather.

mod services;

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Instant;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::{debug, info};

use dumbhome_core::{INVALID_WIDGET_ID, PrefsStore, logging};

use crate::services::app_directory::{self, DesktopEntryDirectory};
use crate::services::clock;
use crate::services::weather::{self, EnvLocation, LocationProvider};
use crate::services::widget_host::{ProviderRef, SlotId, WidgetHost, WidgetHostController};

/// App identifier the directory filter must never list.
const OWN_APP_ID: &str = "dumbhome";

/// [`WidgetHost`] for a process with no live host connection. Slot calls are
/// bookkeeping no-ops; every provider resolves as gone. Lets the CLI drive
/// the same controller paths the long-running host uses.
struct DetachedWidgetHost;

impl WidgetHost for DetachedWidgetHost {
    fn allocate_slot(&mut self) -> SlotId {
        dumbhome_core::INVALID_WIDGET_ID
    }

    fn bind_direct(&mut self, _slot: SlotId, _provider: &ProviderRef) -> bool {
        false
    }

    fn deallocate_slot(&mut self, _slot: SlotId) {}

    fn resolve_provider(&self, _slot: SlotId) -> Option<ProviderRef> {
        None
    }
}

/// dumbhome - a minimalist launcher core
#[derive(Parser, Debug)]
#[command(name = "dumbhome", version, about, long_about = None)]
struct Args {
    /// Path to the preferences file (uses XDG lookup if not specified)
    #[arg(short, long)]
    prefs: Option<PathBuf>,

    /// Increase verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show the home screen: clock, date, curated apps, widget, weather
    Status,
    /// Inspect or edit the curated app list
    Apps {
        #[command(subcommand)]
        action: AppsAction,
    },
    /// Inspect or edit preferences
    Prefs {
        #[command(subcommand)]
        action: PrefsAction,
    },
    /// Inspect or remove the hosted widget
    Widget {
        #[command(subcommand)]
        action: WidgetAction,
    },
    /// Fetch and print current weather for the configured location
    Weather,
}

#[derive(Subcommand, Debug)]
enum AppsAction {
    /// List apps (curated list by default)
    List {
        /// List every installed app, not just the curated ones
        #[arg(long)]
        all: bool,
        /// Filter by label or identifier substring
        query: Option<String>,
    },
    /// Add an app to the curated list
    Include {
        /// App identifier
        id: String,
    },
    /// Remove an app from the curated list
    Exclude {
        /// App identifier
        id: String,
    },
}

#[derive(Subcommand, Debug)]
enum PrefsAction {
    /// Print all preferences
    Show,
    /// Set a preference value
    Set {
        /// Preference key (e.g. accent_color, icon_size, use_24_hour)
        key: String,
        /// New value
        value: String,
    },
}

#[derive(Subcommand, Debug)]
enum WidgetAction {
    /// Show the persisted widget handle state
    Status,
    /// Remove the hosted widget and disable the weather display
    Remove,
}

fn main() -> ExitCode {
    let args = Args::parse();

    logging::init(args.verbose);

    let mut prefs = match PrefsStore::open(args.prefs.as_deref()) {
        Ok(store) => store,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::FAILURE;
        }
    };
    debug!("Preferences file: {}", prefs.path().display());

    let result = match args.command {
        Command::Status => cmd_status(&mut prefs),
        Command::Apps { action } => cmd_apps(action, &mut prefs),
        Command::Prefs { action } => cmd_prefs(action, &mut prefs),
        Command::Widget { action } => cmd_widget(action, &mut prefs),
        Command::Weather => cmd_weather(),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

/// The home screen, rendered as text.
fn cmd_status(prefs: &mut PrefsStore) -> anyhow::Result<()> {
    let now = chrono::Local::now();

    println!(
        "{}",
        clock::format_time(&now, prefs.use_24_hour(), prefs.show_seconds())
    );
    println!("{}", clock::format_date(&now));

    let theme = prefs.theme();
    println!("theme: {} (dim {})", theme.foreground, theme.dim);

    if prefs.weather_enabled() {
        match weather_line() {
            Some(line) => println!("weather: {}", line),
            None => println!("weather: unavailable"),
        }
    }

    println!();
    let directory = DesktopEntryDirectory::from_env();
    let apps = app_directory::visible_apps(&directory, prefs.whitelist(), OWN_APP_ID);
    if apps.is_empty() {
        println!("No apps on the home screen. Add some with: dumbhome apps include <ID>");
    } else {
        for app in &apps {
            if prefs.show_app_labels() {
                println!("{}  ({})", app.label, app.id);
            } else {
                println!("{}", app.label);
            }
        }
    }

    if prefs.has_widget() {
        println!();
        println!("widget: slot {}", prefs.widget_id());
    }

    if prefs.first_run() {
        prefs.set_first_run(false)?;
        info!("First run complete");
    }

    Ok(())
}

/// One weather line through the cache rules, or None if it cannot be had.
///
/// Each invocation is a fresh process, so the cache is always cold here; the
/// fetch still goes through [`weather::WeatherService`] so the display rules
/// match the long-running host.
fn weather_line() -> Option<String> {
    let location = EnvLocation;
    let (lat, lon) = location.last_known()?;
    let mut service = weather::WeatherService::new();
    service.request_refresh(&location, Instant::now());
    // Blocking host: wait for the worker to settle.
    for _ in 0..60 {
        if service.poll(Instant::now()) {
            break;
        }
        std::thread::sleep(std::time::Duration::from_millis(100));
    }
    debug!("Weather fetched for {:.3},{:.3}", lat, lon);
    service.cache().reading().map(|r| r.display())
}

fn cmd_apps(action: AppsAction, prefs: &mut PrefsStore) -> anyhow::Result<()> {
    let directory = DesktopEntryDirectory::from_env();

    match action {
        AppsAction::List { all, query } => {
            let apps = if all {
                app_directory::all_apps(&directory, OWN_APP_ID)
            } else {
                app_directory::visible_apps(&directory, prefs.whitelist(), OWN_APP_ID)
            };
            let apps = app_directory::filter_apps(&apps, query.as_deref().unwrap_or(""));
            for app in &apps {
                let marker = if prefs.is_whitelisted(&app.id) { "*" } else { " " };
                println!("{} {}  ({})", marker, app.label, app.id);
            }
            debug!("Listed {} apps", apps.len());
        }
        AppsAction::Include { id } => {
            prefs.include_app(&id)?;
            println!("Included {}", id);
        }
        AppsAction::Exclude { id } => {
            prefs.exclude_app(&id)?;
            println!("Excluded {}", id);
        }
    }
    Ok(())
}

fn cmd_prefs(action: PrefsAction, prefs: &mut PrefsStore) -> anyhow::Result<()> {
    match action {
        PrefsAction::Show => print!("{}", prefs.summary()),
        PrefsAction::Set { key, value } => {
            prefs
                .set_by_key(&key, &value)
                .with_context(|| format!("could not set '{}'", key))?;
            println!("{} = {}", key, value);
        }
    }
    Ok(())
}

fn cmd_widget(action: WidgetAction, prefs: &mut PrefsStore) -> anyhow::Result<()> {
    match action {
        WidgetAction::Status => {
            if prefs.has_widget() {
                println!("widget: slot {}", prefs.widget_id());
            } else {
                println!("widget: none");
            }
            if prefs.pending_widget_id() != INVALID_WIDGET_ID {
                println!(
                    "pending: slot {} (interrupted handshake, rolled back on next start)",
                    prefs.pending_widget_id()
                );
            }
        }
        WidgetAction::Remove => {
            if !prefs.has_widget() && prefs.pending_widget_id() == INVALID_WIDGET_ID {
                println!("widget: none");
                return Ok(());
            }
            let mut controller = WidgetHostController::new(DetachedWidgetHost);
            controller.remove(prefs)?;
            // A fresh process has no handshake in flight, so any pending
            // marker is stale; clear it along with the feature flag.
            prefs.set_pending_widget_id(INVALID_WIDGET_ID)?;
            prefs.set_weather_enabled(false)?;
            println!("Widget removed");
        }
    }
    Ok(())
}

fn cmd_weather() -> anyhow::Result<()> {
    let Some((lat, lon)) = EnvLocation.last_known() else {
        anyhow::bail!(
            "no location configured (set DUMBHOME_LATITUDE and DUMBHOME_LONGITUDE)"
        );
    };
    let reading = weather::fetch_current(lat, lon)?;
    println!("{}", reading.display());
    Ok(())
}
