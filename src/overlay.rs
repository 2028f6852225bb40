//! Overlay window and the interactive loop driving a [`Session`]
//!
//! The overlay is an unmanaged, translucent window covering the monitor. It
//! owns the keyboard while visible, is unmapped while recording, and comes
//! back when the stop key (grabbed on the root window) is pressed.

use anyhow::{Context, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;
use tracing::{debug, error, info, warn};
use x11rb::connection::Connection;
use x11rb::protocol::xproto::*;
use x11rb::rust_connection::RustConnection;
use x11rb::wrapper::ConnectionExt as WrapperExt;

use crate::constants::{geometry::LABEL_GAP, keysym, x11};
use crate::event_handler::translate;
use crate::launcher::{Launcher, Recorder};
use crate::session::{Action, HELP_TEXT, Input, Session};
use crate::types::Rect;
use crate::x11_utils::{move_resize_window, CachedAtoms, KeyMap};

fn to_i16(v: i32) -> i16 {
    v.clamp(i32::from(i16::MIN), i32::from(i16::MAX)) as i16
}

fn to_u16(v: i32) -> u16 {
    v.clamp(0, i32::from(u16::MAX)) as u16
}

/// Baseline of the label: below the rectangle, or inside its bottom edge
/// when there is no room under it
pub fn label_position(rect: Rect, monitor_height: i32) -> (i16, i16) {
    let gap = i32::from(LABEL_GAP);
    let below = rect.bottom() + gap;
    let y = if below <= monitor_height { below } else { rect.bottom() - gap / 2 };
    (to_i16(rect.x.max(0) + 2), to_i16(y))
}

pub struct Overlay<'a> {
    conn: &'a RustConnection,
    pub window: Window,
    root: Window,
    gc: Gcontext,
    font: Font,
    monitor: Rect,
    mapped: bool,
}

impl<'a> Overlay<'a> {
    pub fn new(conn: &'a RustConnection, screen: &Screen, atoms: &CachedAtoms, monitor: Rect) -> Result<Self> {
        let window = conn.generate_id().context("Failed to generate X11 window ID")?;
        conn.create_window(
            screen.root_depth,
            window,
            screen.root,
            to_i16(monitor.x),
            to_i16(monitor.y),
            to_u16(monitor.width),
            to_u16(monitor.height),
            0,
            WindowClass::INPUT_OUTPUT,
            screen.root_visual,
            &CreateWindowAux::new()
                .background_pixel(screen.black_pixel)
                .override_redirect(x11::OVERRIDE_REDIRECT)
                .event_mask(
                    EventMask::EXPOSURE
                        | EventMask::STRUCTURE_NOTIFY
                        | EventMask::BUTTON_PRESS
                        | EventMask::BUTTON_RELEASE
                        | EventMask::POINTER_MOTION
                        | EventMask::KEY_PRESS,
                ),
        )
        .context("Failed to create overlay window")?;

        conn.change_property32(
            PropMode::REPLACE,
            window,
            atoms.net_wm_window_opacity,
            AtomEnum::CARDINAL,
            &[x11::OVERLAY_OPACITY],
        )
        .context("Failed to set overlay opacity")?;
        conn.change_property8(
            PropMode::REPLACE,
            window,
            atoms.wm_class,
            AtomEnum::STRING,
            b"regioncast\0regioncast\0",
        )
        .context("Failed to set WM_CLASS on overlay")?;
        conn.change_property32(
            PropMode::REPLACE,
            window,
            atoms.net_wm_state,
            AtomEnum::ATOM,
            &[atoms.net_wm_state_above],
        )
        .context("Failed to set overlay always-on-top")?;

        let font = conn.generate_id().context("Failed to generate font ID")?;
        conn.open_font(font, x11::LABEL_FONT)
            .context("Failed to open label font")?;
        let gc = conn.generate_id().context("Failed to generate graphics context ID")?;
        conn.create_gc(
            gc,
            window,
            &CreateGCAux::new()
                .foreground(x11::OUTLINE_PIXEL)
                .background(screen.black_pixel)
                .line_width(2)
                .font(font),
        )
        .context("Failed to create overlay graphics context")?;

        info!(window, monitor = ?monitor, "Created overlay window");
        Ok(Self {
            conn,
            window,
            root: screen.root,
            gc,
            font,
            monitor,
            mapped: false,
        })
    }

    pub fn is_mapped(&self) -> bool {
        self.mapped
    }

    pub fn show(&mut self) -> Result<()> {
        if self.mapped {
            return Ok(());
        }
        self.conn.map_window(self.window).context("Failed to map overlay window")?;
        self.mapped = true;
        Ok(())
    }

    pub fn hide(&mut self) -> Result<()> {
        if !self.mapped {
            return Ok(());
        }
        self.conn.ungrab_keyboard(x11rb::CURRENT_TIME).context("Failed to release keyboard")?;
        self.conn.unmap_window(self.window).context("Failed to unmap overlay window")?;
        self.mapped = false;
        Ok(())
    }

    /// Take the keyboard once the window is viewable
    pub fn grab_keyboard(&self) -> Result<()> {
        let reply = self
            .conn
            .grab_keyboard(false, self.window, x11rb::CURRENT_TIME, GrabMode::ASYNC, GrabMode::ASYNC)
            .context("Failed to request keyboard grab")?
            .reply()
            .context("Failed to get keyboard grab reply")?;
        if reply.status != GrabStatus::SUCCESS {
            warn!(status = ?reply.status, "Keyboard grab refused, keys may go to other windows");
        }
        Ok(())
    }

    /// Passive grab of `keycode` on the root window while the overlay is hidden
    pub fn grab_stop_key(&self, keycode: Keycode) -> Result<()> {
        self.conn
            .grab_key(false, self.root, ModMask::ANY, keycode, GrabMode::ASYNC, GrabMode::ASYNC)
            .context("Failed to grab stop key")?;
        Ok(())
    }

    pub fn ungrab_stop_key(&self, keycode: Keycode) -> Result<()> {
        self.conn
            .ungrab_key(keycode, self.root, ModMask::ANY)
            .context("Failed to release stop key")?;
        Ok(())
    }

    /// Repaint the outline and the status label
    pub fn draw(&self, rect: Rect, label: &str) -> Result<()> {
        self.conn
            .clear_area(false, self.window, 0, 0, 0, 0)
            .context("Failed to clear overlay")?;
        self.conn
            .poly_rectangle(
                self.window,
                self.gc,
                &[Rectangle {
                    x: to_i16(rect.x),
                    y: to_i16(rect.y),
                    width: to_u16(rect.width - 1),
                    height: to_u16(rect.height - 1),
                }],
            )
            .context("Failed to draw selection outline")?;
        let (x, y) = label_position(rect, self.monitor.height);
        let text = &label.as_bytes()[..label.len().min(255)];
        self.conn
            .image_text8(self.window, self.gc, x, y, text)
            .context("Failed to draw selection label")?;
        Ok(())
    }
}

impl Drop for Overlay<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.conn.free_gc(self.gc) {
            error!(error = %e, "Failed to free overlay graphics context");
        }
        if let Err(e) = self.conn.close_font(self.font) {
            error!(error = %e, "Failed to close label font");
        }
        if let Err(e) = self.conn.destroy_window(self.window) {
            error!(window = self.window, error = %e, "Failed to destroy overlay window");
        }
        let _ = self.conn.flush();
    }
}

/// Everything the loop borrows from `main`
pub struct LoopContext<'a> {
    pub conn: &'a RustConnection,
    pub keymap: &'a KeyMap,
    /// Window receiving mirrored geometry
    pub active_window: Option<Window>,
    pub shutdown: &'a AtomicBool,
}

/// Show the overlay and process events until the user quits or a
/// termination signal arrives
pub fn run(
    ctx: &LoopContext,
    overlay: &mut Overlay,
    session: &mut Session,
    launcher: &mut dyn Launcher,
) -> Result<()> {
    let stop_key = ctx.keymap.keycode_for(keysym::F4);
    if stop_key.is_none() {
        warn!("F4 is not on the keyboard map, recordings cannot be stopped from the keyboard");
    }

    let mut recorder = Recorder::new(session.encoder());
    overlay.show()?;
    ctx.conn.flush()?;

    loop {
        if ctx.shutdown.load(Ordering::Relaxed) {
            info!("Received termination signal, shutting down");
            if session.is_recording() {
                session.handle(Input::RecordingStopped);
                recorder.stop(launcher)?;
            }
            break;
        }

        let Some(event) = ctx.conn.poll_for_event().context("Lost connection to the X server")? else {
            thread::sleep(Duration::from_millis(x11::POLL_INTERVAL_MS));
            continue;
        };
        let Some(input) = translate(&event, overlay.window, ctx.keymap, session.is_recording()) else {
            continue;
        };
        if input == Input::SurfaceMapped {
            overlay.grab_keyboard()?;
        }

        let outcome = session.handle(input);

        if let Some(rect) = outcome.mirror
            && let Some(window) = ctx.active_window
            && let Err(e) = move_resize_window(ctx.conn, window, rect)
        {
            warn!(error = %e, "Failed to mirror selection onto the active window");
        }

        match outcome.action {
            Action::None => {}
            Action::ShowHelp => {
                println!("{HELP_TEXT}");
            }
            Action::ShowCommand(command) => {
                info!(command = %command, "Encoder command");
                println!("{command}");
            }
            Action::StartRecording { command, dir } => {
                overlay.hide()?;
                if let Some(key) = stop_key {
                    overlay.grab_stop_key(key)?;
                }
                // let the overlay disappear before the first frame is grabbed
                ctx.conn.sync().context("Failed to sync with the X server")?;
                match recorder.start(launcher, &command, &dir) {
                    Ok(pid) => info!(pid, "Recording, press F4 to stop"),
                    Err(e) => {
                        error!(error = ?e, "Failed to start the encoder");
                        session.handle(Input::RecordingStopped);
                        if let Some(key) = stop_key {
                            overlay.ungrab_stop_key(key)?;
                        }
                        overlay.show()?;
                    }
                }
            }
            Action::StopRecording => {
                let stopped = recorder.stop(launcher)?;
                debug!(stopped, "Stopped encoder processes");
                if stopped == 0 {
                    warn!("No running encoder found to stop");
                }
                if let Some(key) = stop_key {
                    overlay.ungrab_stop_key(key)?;
                }
                overlay.show()?;
            }
            Action::Quit => {
                info!("Quit requested");
                break;
            }
        }

        if outcome.redraw && overlay.is_mapped() {
            overlay.draw(session.rect(), &session.label())?;
        }
        ctx.conn.flush()?;
    }

    overlay.hide()?;
    ctx.conn.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_label_below_rect() {
        assert_eq!(label_position(Rect::new(10, 20, 100, 50), 1080), (12, 84));
    }

    #[test]
    fn test_label_inside_when_at_bottom() {
        assert_eq!(label_position(Rect::new(0, 980, 100, 100), 1080), (2, 1073));
    }

    #[test]
    fn test_coordinate_conversion_saturates() {
        assert_eq!(to_i16(40_000), i16::MAX);
        assert_eq!(to_i16(-40_000), i16::MIN);
        assert_eq!(to_u16(-1), 0);
        assert_eq!(to_u16(70_000), u16::MAX);
    }
}
