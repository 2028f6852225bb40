use anyhow::{Context, Result};
use tracing::{debug, info, warn};
use x11rb::connection::Connection;
use x11rb::protocol::randr::ConnectionExt as RandrExt;
use x11rb::protocol::xproto::*;
use x11rb::rust_connection::RustConnection;

use crate::types::{Rect, WindowGeometry};

/// Pre-cached X11 atoms to avoid repeated roundtrips
pub struct CachedAtoms {
    pub net_active_window: Atom,
    pub net_frame_extents: Atom,
    pub net_wm_window_opacity: Atom,
    pub net_wm_state: Atom,
    pub net_wm_state_above: Atom,
    pub wm_class: Atom,
}

fn intern(conn: &RustConnection, name: &str) -> Result<Atom> {
    Ok(conn
        .intern_atom(false, name.as_bytes())
        .context(format!("Failed to intern {} atom", name))?
        .reply()
        .context(format!("Failed to get reply for {} atom", name))?
        .atom)
}

impl CachedAtoms {
    pub fn new(conn: &RustConnection) -> Result<Self> {
        Ok(Self {
            net_active_window: intern(conn, "_NET_ACTIVE_WINDOW")?,
            net_frame_extents: intern(conn, "_NET_FRAME_EXTENTS")?,
            net_wm_window_opacity: intern(conn, "_NET_WM_WINDOW_OPACITY")?,
            net_wm_state: intern(conn, "_NET_WM_STATE")?,
            net_wm_state_above: intern(conn, "_NET_WM_STATE_ABOVE")?,
            wm_class: intern(conn, "WM_CLASS")?,
        })
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum GeometryError {
    #[error("No usable monitor size (got {width}x{height})")]
    Unavailable { width: i32, height: i32 },
}

/// What the window system reported when the session started
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GeometrySnapshot {
    /// Window to mirror the selection onto, if any is active
    pub window: Option<Window>,
    pub geometry: WindowGeometry,
}

/// Grow `active` by `_NET_FRAME_EXTENTS` (`[left, right, top, bottom]`)
pub fn frame_rect(active: Rect, extents: [u32; 4]) -> Rect {
    let [left, right, top, bottom] = extents.map(|v| i32::try_from(v).unwrap_or(0));
    Rect::new(
        active.x - left,
        active.y - top,
        active.width + left + right,
        active.height + top + bottom,
    )
}

/// Monitor holding the center of `window`, else the primary, else the first
pub fn pick_monitor(monitors: &[Rect], primary: Option<usize>, window: Option<Rect>) -> Option<Rect> {
    window
        .and_then(|w| {
            let (cx, cy) = (w.x + w.width / 2, w.y + w.height / 2);
            monitors.iter().find(|m| m.contains(cx, cy)).copied()
        })
        .or_else(|| primary.and_then(|i| monitors.get(i).copied()))
        .or_else(|| monitors.first().copied())
}

fn active_window(conn: &RustConnection, screen: &Screen, atoms: &CachedAtoms) -> Result<Option<Window>> {
    let prop = conn
        .get_property(false, screen.root, atoms.net_active_window, AtomEnum::WINDOW, 0, 1)
        .context("Failed to query _NET_ACTIVE_WINDOW property")?
        .reply()
        .context("Failed to get reply for _NET_ACTIVE_WINDOW query")?;
    Ok(prop
        .value32()
        .and_then(|mut values| values.next())
        .filter(|&window| window != x11rb::NONE))
}

/// Client area of `window` in root coordinates
fn window_rect(conn: &RustConnection, screen: &Screen, window: Window) -> Result<Rect> {
    let geom = conn
        .get_geometry(window)
        .context(format!("Failed to send geometry query for window {}", window))?
        .reply()
        .context(format!("Failed to get geometry for window {}", window))?;
    let origin = conn
        .translate_coordinates(window, screen.root, 0, 0)
        .context(format!("Failed to translate coordinates for window {}", window))?
        .reply()
        .context(format!("Failed to get translated coordinates for window {}", window))?;
    Ok(Rect::new(
        i32::from(origin.dst_x),
        i32::from(origin.dst_y),
        i32::from(geom.width),
        i32::from(geom.height),
    ))
}

fn frame_extents(conn: &RustConnection, window: Window, atoms: &CachedAtoms) -> Result<Option<[u32; 4]>> {
    let prop = conn
        .get_property(false, window, atoms.net_frame_extents, AtomEnum::CARDINAL, 0, 4)
        .context(format!("Failed to query _NET_FRAME_EXTENTS for window {}", window))?
        .reply()
        .context(format!("Failed to get _NET_FRAME_EXTENTS reply for window {}", window))?;
    let values: Vec<u32> = prop.value32().map(|v| v.collect()).unwrap_or_default();
    Ok(<[u32; 4]>::try_from(values.as_slice()).ok())
}

fn monitors(conn: &RustConnection, screen: &Screen) -> Result<(Vec<Rect>, Option<usize>)> {
    let reply = conn
        .randr_get_monitors(screen.root, true)
        .context("Failed to query RandR monitors")?
        .reply()
        .context("Failed to get reply for RandR monitors query")?;
    let primary = reply.monitors.iter().position(|m| m.primary);
    let rects = reply
        .monitors
        .iter()
        .map(|m| Rect::new(i32::from(m.x), i32::from(m.y), i32::from(m.width), i32::from(m.height)))
        .collect();
    Ok((rects, primary))
}

/// Take the active window, its frame and the monitor it sits on.
/// Window lookups degrade to empty rectangles; only a missing monitor size is fatal.
pub fn query_geometry(conn: &RustConnection, screen: &Screen, atoms: &CachedAtoms) -> Result<GeometrySnapshot> {
    let window = active_window(conn, screen, atoms).unwrap_or_else(|e| {
        warn!(error = %e, "Could not determine the active window");
        None
    });

    let (active, extents) = match window {
        Some(window) => match window_rect(conn, screen, window) {
            Ok(active) => {
                let extents = match frame_extents(conn, window, atoms) {
                    Ok(Some(frame)) => frame_rect(active, frame),
                    Ok(None) => {
                        debug!(window, "No _NET_FRAME_EXTENTS, using client area");
                        active
                    }
                    Err(e) => {
                        warn!(window, error = %e, "Failed to read frame extents");
                        active
                    }
                };
                (active, extents)
            }
            Err(e) => {
                warn!(window, error = %e, "Failed to read active window geometry");
                (Rect::default(), Rect::default())
            }
        },
        None => (Rect::default(), Rect::default()),
    };

    let screen_rect = Rect::new(0, 0, i32::from(screen.width_in_pixels), i32::from(screen.height_in_pixels));
    let monitor = match monitors(conn, screen) {
        Ok((rects, primary)) => {
            pick_monitor(&rects, primary, active.has_area().then_some(active)).unwrap_or(screen_rect)
        }
        Err(e) => {
            warn!(error = %e, "RandR unavailable, using the whole screen");
            screen_rect
        }
    };
    if monitor.width <= 0 || monitor.height <= 0 {
        return Err(GeometryError::Unavailable { width: monitor.width, height: monitor.height }.into());
    }

    let geometry = WindowGeometry {
        active: relative_to(active, monitor),
        extents: relative_to(extents, monitor),
        monitor,
    };
    info!(window = ?window, geometry = ?geometry, "Queried window geometry");
    Ok(GeometrySnapshot { window, geometry })
}

fn relative_to(rect: Rect, monitor: Rect) -> Rect {
    if rect.has_area() {
        rect.translated(-monitor.x, -monitor.y)
    } else {
        rect
    }
}

/// First-column keysym for each keycode
#[derive(Debug, Clone)]
pub struct KeyMap {
    min_keycode: u8,
    per_keycode: u8,
    keysyms: Vec<Keysym>,
}

impl KeyMap {
    pub fn load(conn: &RustConnection) -> Result<Self> {
        let setup = conn.setup();
        let (min, max) = (setup.min_keycode, setup.max_keycode);
        let reply = conn
            .get_keyboard_mapping(min, max - min + 1)
            .context("Failed to request keyboard mapping")?
            .reply()
            .context("Failed to get keyboard mapping reply")?;
        Ok(Self::from_parts(min, reply.keysyms_per_keycode, reply.keysyms))
    }

    pub fn from_parts(min_keycode: u8, per_keycode: u8, keysyms: Vec<Keysym>) -> Self {
        Self { min_keycode, per_keycode, keysyms }
    }

    pub fn keysym(&self, keycode: Keycode) -> Option<Keysym> {
        let row = usize::from(keycode.checked_sub(self.min_keycode)?);
        self.keysyms
            .get(row * usize::from(self.per_keycode))
            .copied()
            .filter(|&sym| sym != 0)
    }

    pub fn keycode_for(&self, keysym: Keysym) -> Option<Keycode> {
        if self.per_keycode == 0 {
            return None;
        }
        let row = self
            .keysyms
            .chunks(usize::from(self.per_keycode))
            .position(|syms| syms.first() == Some(&keysym))?;
        u8::try_from(row).ok()?.checked_add(self.min_keycode)
    }
}

/// Move and resize `window` to `rect` (root coordinates)
pub fn move_resize_window(conn: &RustConnection, window: Window, rect: Rect) -> Result<()> {
    let width = u32::try_from(rect.width.max(1)).unwrap_or(1);
    let height = u32::try_from(rect.height.max(1)).unwrap_or(1);
    conn.configure_window(
        window,
        &ConfigureWindowAux::new().x(rect.x).y(rect.y).width(width).height(height),
    )
    .context(format!("Failed to move/resize window {}", window))?;
    debug!(window, rect = ?rect, "Mirrored selection onto window");
    Ok(())
}

/// `$DISPLAY`, defaulting to `:0`
pub fn display_name() -> String {
    std::env::var("DISPLAY")
        .ok()
        .filter(|d| !d.is_empty())
        .unwrap_or_else(|| ":0".to_string())
}
