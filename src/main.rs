#![forbid(unsafe_code)]

mod commands;
mod config;
mod constants;
mod event_handler;
mod launcher;
mod overlay;
mod persistence;
mod presets;
mod selection;
mod session;
mod snapping;
mod types;
mod window_mirror;
mod x11_utils;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use tracing::{error, info, warn, Level as TraceLevel};
use tracing_subscriber::FmtSubscriber;
use x11rb::connection::Connection;

use commands::{encoder_command, ConversionPlan};
use config::Config;
use constants::validation::{MAX_FPS, MIN_FPS};
use launcher::SystemLauncher;
use overlay::{LoopContext, Overlay};
use persistence::{load_state, save_state, state_path, PersistedState};
use presets::PresetTable;
use session::{RecordingSettings, Session};
use selection::Selection;
use types::{Bounds, Rect, SelectionMode};
use x11_utils::{display_name, query_geometry, CachedAtoms, KeyMap};

#[derive(Parser, Debug)]
#[command(
    name = "regioncast",
    version,
    about = "Pick a screen region on X11, record it with ffmpeg and convert the result"
)]
struct Cli {
    /// Config file (default: $XDG_CONFIG_HOME/regioncast/config.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Persisted presets and previous rectangle
    #[arg(long, global = true)]
    state_file: Option<PathBuf>,

    /// Initial placement: interior, entire, center or previous
    #[arg(long, global = true)]
    mode: Option<String>,

    /// Capture frame rate
    #[arg(long, global = true)]
    fps: Option<u32>,

    /// Exact selection, monitor relative, e.g. 10,20,640x360
    #[arg(long, global = true, value_name = "X,Y,WxH")]
    rect: Option<Rect>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
enum Commands {
    /// Show the selection overlay (default)
    Select,
    /// Print the encoder command for the previous rectangle
    Command,
    /// Turn temp.mkv in the recording directory into the configured outputs
    Convert,
    /// List the preset sizes
    Presets,
}

fn parse_level(value: &str) -> TraceLevel {
    match value.to_lowercase().as_str() {
        "trace" => TraceLevel::TRACE,
        "debug" => TraceLevel::DEBUG,
        "warn" => TraceLevel::WARN,
        "error" => TraceLevel::ERROR,
        _ => TraceLevel::INFO,
    }
}

/// `LOG_LEVEL` wins over the config file, which is only peeked at here
fn log_level(config_path: &Path) -> TraceLevel {
    if let Ok(level) = std::env::var("LOG_LEVEL") {
        return parse_level(&level);
    }
    std::fs::read_to_string(config_path)
        .ok()
        .and_then(|contents| serde_json::from_str::<Config>(&contents).ok())
        .map(|config| parse_level(&config.log_level))
        .unwrap_or(TraceLevel::INFO)
}

/// Configured presets replace the built-in table, and fix the record length
fn load_persisted(config: &Config, path: &Path) -> PersistedState {
    let mut defaults = PersistedState::builtin();
    let configured = config.preset_table();
    if let Some(table) = &configured {
        defaults.presets = table.clone();
    }
    let mut state = load_state(path, defaults);
    if let Some(table) = configured {
        state.presets = table;
    }
    state
}

fn preset_list(presets: &PresetTable) -> String {
    presets
        .entries()
        .iter()
        .enumerate()
        .map(|(i, p)| format!("{:>2}  {}x{}", i, p.width, p.height))
        .collect::<Vec<_>>()
        .join("\n")
}

fn run_select(config: &Config, state_file: &Path, mode: SelectionMode, entered: Option<Rect>) -> Result<()> {
    let (conn, screen_num) = x11rb::connect(None).context("Failed to connect to the X server")?;
    let screen = &conn.setup().roots[screen_num];
    info!(screen = screen_num, width = screen.width_in_pixels, height = screen.height_in_pixels, "Connected to X11");

    let atoms = CachedAtoms::new(&conn)?;
    let keymap = KeyMap::load(&conn)?;
    let snapshot = query_geometry(&conn, screen, &atoms)?;

    let settings = RecordingSettings {
        encoder: config.encoder.clone(),
        fps: config.fps,
        display: display_name(),
        recording_dir: config.recording_dir(),
    };
    let mut session = Session::new(load_persisted(config, state_file), mode, snapshot.geometry, settings)
        .with_entered_rect(entered);

    let shutdown = Arc::new(AtomicBool::new(false));
    for signal in [signal_hook::consts::SIGINT, signal_hook::consts::SIGTERM] {
        signal_hook::flag::register(signal, Arc::clone(&shutdown))
            .context(format!("Failed to register handler for signal {}", signal))?;
    }

    let mut overlay = Overlay::new(&conn, screen, &atoms, snapshot.geometry.monitor)?;
    let mut launcher = SystemLauncher::new();
    let ctx = LoopContext {
        conn: &conn,
        keymap: &keymap,
        active_window: snapshot.window,
        shutdown: &shutdown,
    };
    let result = overlay::run(&ctx, &mut overlay, &mut session, &mut launcher);
    drop(overlay);

    if let Err(e) = save_state(state_file, session.presets(), session.rect()) {
        error!(error = ?e, "Failed to save selection state");
    }
    result
}

/// Rectangle for `command`: the entered one, else the previous selection,
/// clamped to the monitor when it is known
fn command_rect(entered: Option<Rect>, previous: Rect, monitor: Option<Rect>) -> Rect {
    let mut selection = Selection::new(previous);
    if let Some(rect) = entered {
        selection.set_x(rect.x);
        selection.set_y(rect.y);
        selection.set_width(rect.width);
        selection.set_height(rect.height);
    }
    if let Some(monitor) = monitor {
        selection.clamp_to_monitor(Bounds::new(monitor.width, monitor.height));
    }
    selection.rect()
}

fn run_command(config: &Config, state_file: &Path, entered: Option<Rect>) -> Result<()> {
    let state = load_persisted(config, state_file);
    let monitor = match x11rb::connect(None) {
        Ok((conn, screen_num)) => {
            let screen = &conn.setup().roots[screen_num];
            let atoms = CachedAtoms::new(&conn)?;
            Some(query_geometry(&conn, screen, &atoms)?.geometry.monitor)
        }
        Err(e) => {
            warn!(error = %e, "No X server, assuming the rectangle is on the first monitor");
            None
        }
    };
    let origin = monitor.map_or((0, 0), |m| (m.x, m.y));
    let command = encoder_command(
        &config.encoder,
        command_rect(entered, state.previous, monitor),
        origin,
        config.fps,
        &display_name(),
        &config.recording_dir(),
    );
    println!("{command}");
    Ok(())
}

fn run_convert(config: &Config) -> Result<()> {
    let dir = config.recording_dir();
    let plan = ConversionPlan::new(&config.outputs, config.fps, &config.encoder);
    info!(dir = %dir.display(), steps = plan.steps.len(), "Converting recording");
    plan.run(&dir, &mut SystemLauncher::new())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config_path = cli.config.clone().unwrap_or_else(Config::path);

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level(&config_path))
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let mut config = Config::load(&config_path);
    if let Some(fps) = cli.fps {
        let clamped = fps.clamp(MIN_FPS, MAX_FPS);
        if clamped != fps {
            warn!(fps, using = clamped, "--fps out of range, clamping");
        }
        config.fps = clamped;
    }
    let mode = cli
        .mode
        .as_deref()
        .map(SelectionMode::parse)
        .unwrap_or_else(|| config.selection_mode());
    let state_file = cli.state_file.clone().unwrap_or_else(state_path);

    match cli.command.unwrap_or(Commands::Select) {
        Commands::Select => run_select(&config, &state_file, mode, cli.rect)?,
        Commands::Command => run_command(&config, &state_file, cli.rect)?,
        Commands::Convert => run_convert(&config)?,
        Commands::Presets => {
            let state = load_persisted(&config, &state_file);
            println!("{}", preset_list(&state.presets));
        }
    }
    Ok(())
}
