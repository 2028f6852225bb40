//! Per-session state and input dispatch
//!
//! One [`Session`] exists per overlay. It owns the selection, the preset table,
//! the window geometry taken at startup and the mode flags, and is only touched
//! from the thread running the overlay loop. Inputs arrive already translated
//! from X events; the returned [`Outcome`] tells the loop what to redraw, which
//! geometry to push to the active window, and which external action to take.

use std::path::PathBuf;
use tracing::{debug, info, warn};

use crate::commands::encoder_command;
use crate::constants::{geometry::DEFAULT_PREVIOUS, mouse};
use crate::persistence::PersistedState;
use crate::presets::PresetTable;
use crate::selection::Selection;
use crate::types::{Rect, ScrollDirection, SelectionMode, WindowGeometry, WindowOffset};
use crate::window_mirror;

pub const HELP_TEXT: &str = "\
Mouse
  left click/drag     move the rectangle
  right click/drag    resize the rectangle
  middle click        toggle window decorations and wrap the active window
  middle drag         resize to the preset that fits
  wheel up/down       step to the next smaller/larger preset
Keys
  F1   this help
  F2   toggle resizing the active window with the rectangle
  F3   print the ffmpeg command for the rectangle
  F4   start recording (F4 again stops it)
  F11  toggle fullscreen rectangle
  Esc  quit, q quit";

/// Pointer button held during a motion event, in priority order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeldButton {
    Primary,
    Middle,
    Secondary,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyAction {
    Help,
    ToggleMirror,
    ShowCommand,
    Record,
    ToggleFullscreen,
    Quit,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Input {
    /// The overlay became visible for the first time
    SurfaceMapped,
    /// Part of the overlay needs repainting
    Exposed,
    Press { button: u8, x: i32, y: i32 },
    Motion { held: HeldButton, x: f64, y: f64 },
    Scroll(ScrollDirection),
    Key(KeyAction),
    /// The user asked to end the running recording
    RecordingStopped,
    /// Exact geometry typed in by the user
    EnterGeometry(Rect),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    None,
    ShowHelp,
    ShowCommand(String),
    StartRecording { command: String, dir: PathBuf },
    StopRecording,
    Quit,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    pub redraw: bool,
    /// Root-coordinate geometry for the active window
    pub mirror: Option<Rect>,
    pub action: Action,
}

impl Outcome {
    fn nothing() -> Self {
        Self { redraw: false, mirror: None, action: Action::None }
    }

    fn action(action: Action) -> Self {
        Self { redraw: false, mirror: None, action }
    }
}

/// Everything needed to format the encoder command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordingSettings {
    pub encoder: String,
    pub fps: u32,
    pub display: String,
    pub recording_dir: PathBuf,
}

/// Map a wheel button to a scroll direction
pub fn scroll_direction(button: u8) -> Option<ScrollDirection> {
    match button {
        mouse::SCROLL_UP => Some(ScrollDirection::Up),
        mouse::SCROLL_DOWN => Some(ScrollDirection::Down),
        mouse::SCROLL_LEFT => Some(ScrollDirection::Left),
        mouse::SCROLL_RIGHT => Some(ScrollDirection::Right),
        _ => None,
    }
}

#[derive(Debug)]
pub struct Session {
    selection: Selection,
    presets: PresetTable,
    /// Encoded rectangle of the previous session
    previous: (f64, f64),
    mode: SelectionMode,
    geometry: WindowGeometry,
    offset: WindowOffset,
    include_extents: bool,
    should_resize_active: bool,
    initialized: bool,
    recording: bool,
    /// Geometry from `--rect`, applied once the overlay is placed
    entered: Option<Rect>,
    settings: RecordingSettings,
}

impl Session {
    pub fn new(
        persisted: PersistedState,
        mode: SelectionMode,
        geometry: WindowGeometry,
        settings: RecordingSettings,
    ) -> Self {
        let (x, y, width, height) = DEFAULT_PREVIOUS;
        let offset = window_mirror::compute_offset(geometry.active, geometry.extents);
        info!(mode = mode.as_str(), geometry = ?geometry, offset = ?offset, "Session created");
        Self {
            selection: Selection::new(Rect::new(x, y, width, height)),
            previous: persisted.previous_encoded(),
            presets: persisted.presets,
            mode,
            geometry,
            offset,
            include_extents: mode.includes_extents(),
            should_resize_active: false,
            initialized: false,
            recording: false,
            entered: None,
            settings,
        }
    }

    /// Start from `rect` instead of the mode's placement
    pub fn with_entered_rect(mut self, rect: Option<Rect>) -> Self {
        self.entered = rect;
        self
    }

    pub fn encoder(&self) -> &str {
        &self.settings.encoder
    }

    pub fn rect(&self) -> Rect {
        self.selection.rect()
    }

    pub fn presets(&self) -> &PresetTable {
        &self.presets
    }

    pub fn is_recording(&self) -> bool {
        self.recording
    }

    /// `x,y WxH` shown under the rectangle
    pub fn label(&self) -> String {
        let rect = self.rect();
        format!("{},{} {}x{}", rect.x, rect.y, rect.width, rect.height)
    }

    /// Encoder command for the current rectangle
    pub fn encoder_command(&self) -> String {
        encoder_command(
            &self.settings.encoder,
            self.rect(),
            (self.geometry.monitor.x, self.geometry.monitor.y),
            self.settings.fps,
            &self.settings.display,
            &self.settings.recording_dir,
        )
    }

    pub fn handle(&mut self, input: Input) -> Outcome {
        debug!(input = ?input, "Session input");
        match input {
            Input::SurfaceMapped => {
                if self.initialized {
                    return self.changed();
                }
                self.initialized = true;
                let placed = self.selection.initialize_from_mode(
                    self.mode,
                    self.geometry.active,
                    self.geometry.extents,
                    self.include_extents,
                    self.previous,
                    self.geometry.bounds(),
                );
                if let Some(rect) = self.entered.take() {
                    info!(rect = ?rect, "Using entered geometry");
                    return self.handle(Input::EnterGeometry(rect));
                }
                if !placed {
                    warn!(mode = self.mode.as_str(), "Keeping the default rectangle");
                }
                self.changed()
            }
            Input::Exposed => Outcome { redraw: true, mirror: None, action: Action::None },
            Input::Press { button, x, y } => self.press(button, x, y),
            Input::Motion { held, x, y } => {
                match held {
                    HeldButton::Primary => self.selection.position_at(x as i32, y as i32),
                    HeldButton::Middle => self.selection.snap_drag(x, y, &self.presets),
                    HeldButton::Secondary => self.selection.resize_to(x as i32, y as i32),
                }
                self.changed()
            }
            Input::Scroll(direction) => {
                self.selection.snap_scroll(direction, &self.presets);
                self.changed()
            }
            Input::Key(key) => self.key(key),
            Input::EnterGeometry(rect) => {
                self.selection.set_x(rect.x);
                self.selection.set_y(rect.y);
                self.selection.set_width(rect.width);
                self.selection.set_height(rect.height);
                self.changed()
            }
            Input::RecordingStopped => {
                if !self.recording {
                    return Outcome::nothing();
                }
                self.recording = false;
                info!("Recording stopped");
                Outcome { redraw: true, mirror: None, action: Action::StopRecording }
            }
        }
    }

    fn press(&mut self, button: u8, x: i32, y: i32) -> Outcome {
        if let Some(direction) = scroll_direction(button) {
            return self.handle(Input::Scroll(direction));
        }
        match button {
            mouse::BUTTON_LEFT => self.selection.position_at(x, y),
            mouse::BUTTON_RIGHT => self.selection.resize_to(x, y),
            mouse::BUTTON_MIDDLE => {
                self.include_extents = !self.include_extents;
                info!(include_extents = self.include_extents, "Toggled window decorations");
                self.selection.wrap_active_window(
                    self.geometry.active,
                    self.geometry.extents,
                    self.include_extents,
                );
            }
            _ => return Outcome::nothing(),
        }
        self.changed()
    }

    fn key(&mut self, key: KeyAction) -> Outcome {
        match key {
            KeyAction::Help => Outcome::action(Action::ShowHelp),
            KeyAction::ToggleMirror => {
                self.should_resize_active = !self.should_resize_active;
                info!(should_resize_active = self.should_resize_active, "Toggled active window resizing");
                self.changed()
            }
            KeyAction::ShowCommand => Outcome::action(Action::ShowCommand(self.encoder_command())),
            KeyAction::Record => {
                if self.recording {
                    return Outcome::nothing();
                }
                self.recording = true;
                let command = self.encoder_command();
                info!(command = %command, "Recording requested");
                Outcome::action(Action::StartRecording {
                    command,
                    dir: self.settings.recording_dir.clone(),
                })
            }
            KeyAction::ToggleFullscreen => {
                self.selection.toggle_fullscreen(self.geometry.bounds());
                info!(fullscreen = self.selection.is_fullscreen(), "Toggled fullscreen");
                self.changed()
            }
            KeyAction::Quit => Outcome::action(Action::Quit),
        }
    }

    /// Clamp after a change and work out the mirrored window geometry
    fn changed(&mut self) -> Outcome {
        self.selection.clamp_to_monitor(self.geometry.bounds());
        let mirror = self.should_resize_active.then(|| {
            window_mirror::apply(self.rect(), self.include_extents, self.offset)
                .translated(self.geometry.monitor.x, self.geometry.monitor.y)
        });
        Outcome { redraw: true, mirror, action: Action::None }
    }
}
