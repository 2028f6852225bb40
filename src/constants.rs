//! Application-wide constants
//!
//! This module contains all magic numbers and string literals used throughout
//! the application, providing a single source of truth for constant values.

/// Combined width/height metric encoding (`a + b / SCALE`)
pub mod metric {
    /// Divisor applied to the second component of an encoded pair
    pub const SCALE: f64 = 100_000.0;

    /// Exclusive upper bound for the second component (y or height)
    pub const MAX_SECONDARY: i32 = 100_000;
}

/// Selection rectangle geometry
pub mod geometry {
    /// Minimum side length kept while resizing with the pointer
    pub const MIN_SIDE: i32 = 16;

    /// Rectangle used when nothing was persisted yet
    pub const DEFAULT_PREVIOUS: (i32, i32, i32, i32) = (130, 130, 260, 260);

    /// Offset of the status label below the rectangle
    pub const LABEL_GAP: i16 = 14;
}

/// X11 protocol constants
pub mod x11 {
    /// Override redirect flag for unmanaged windows
    pub const OVERRIDE_REDIRECT: u32 = 1;

    /// Overlay opacity as a 32-bit cardinal (~70%)
    pub const OVERLAY_OPACITY: u32 = 0xB333_3333;

    /// Outline color (green) for the root visual
    pub const OUTLINE_PIXEL: u32 = 0x00_00FF_00;

    /// Core font used for the status label
    pub const LABEL_FONT: &[u8] = b"fixed";

    /// Idle sleep between event polls
    pub const POLL_INTERVAL_MS: u64 = 10;
}

/// Mouse button constants
pub mod mouse {
    /// Left mouse button number
    pub const BUTTON_LEFT: u8 = 1;

    /// Middle mouse button number
    pub const BUTTON_MIDDLE: u8 = 2;

    /// Right mouse button number
    pub const BUTTON_RIGHT: u8 = 3;

    /// Wheel up
    pub const SCROLL_UP: u8 = 4;

    /// Wheel down
    pub const SCROLL_DOWN: u8 = 5;

    /// Horizontal wheel left
    pub const SCROLL_LEFT: u8 = 6;

    /// Horizontal wheel right
    pub const SCROLL_RIGHT: u8 = 7;
}

/// X keysyms the overlay reacts to
pub mod keysym {
    pub const F1: u32 = 0xffbe;
    pub const F2: u32 = 0xffbf;
    pub const F3: u32 = 0xffc0;
    pub const F4: u32 = 0xffc1;
    pub const F11: u32 = 0xffc8;
    pub const ESCAPE: u32 = 0xff1b;
    pub const LOWER_Q: u32 = 0x0071;
}

/// External tool invocation
pub mod encoder {
    /// Default encoder binary
    pub const DEFAULT_BINARY: &str = "/usr/bin/ffmpeg";

    /// Image assembler used for animated GIFs
    pub const GIF_ASSEMBLER: &str = "convert";

    /// Subdirectory of the working directory holding recordings
    pub const RECORDING_SUBDIR: &str = "regioncast";

    /// Raw recording file name
    pub const RAW_RECORDING: &str = "temp.mkv";

    /// Frame file pattern handed to the encoder
    pub const FRAME_PATTERN: &str = "ew-%03d.png";

    /// Frame file name prefix
    pub const FRAME_PREFIX: &str = "ew-";

    /// Environment variable enabling encoder logging
    pub const REPORT_ENV: &str = "FFREPORT";

    /// Encoder log target
    pub const REPORT_VALUE: &str = "file=ffcom.log:level=32";

    /// Animated output base name
    pub const ANIM_BASENAME: &str = "anim";
}

/// Configuration file constants
pub mod config {
    /// Application directory name under the XDG config dir
    pub const APP_DIR: &str = "regioncast";

    /// Configuration file name
    pub const FILENAME: &str = "config.json";

    /// Persisted preset/previous-rectangle file name
    pub const STATE_FILENAME: &str = "presets";
}

/// Validation limits for config values
pub mod validation {
    pub const MIN_FPS: u32 = 1;
    pub const MAX_FPS: u32 = 60;
}

/// Process inspection paths
pub mod paths {
    /// procfs root scanned for kill-by-name
    pub const PROC: &str = "/proc";
}
