use x11rb::protocol::Event;
use x11rb::protocol::xproto::{KeyButMask, Window};

use crate::constants::keysym;
use crate::session::{HeldButton, Input, KeyAction};
use crate::x11_utils::KeyMap;

/// Turn an X event into a session input, if the session cares about it.
/// While recording only the stop key is honoured.
pub fn translate(event: &Event, overlay: Window, keymap: &KeyMap, recording: bool) -> Option<Input> {
    match event {
        Event::MapNotify(event) if event.window == overlay => Some(Input::SurfaceMapped),
        Event::Expose(event) if event.window == overlay && event.count == 0 => Some(Input::Exposed),
        Event::ButtonPress(event) if event.event == overlay => Some(Input::Press {
            button: event.detail,
            x: i32::from(event.event_x),
            y: i32::from(event.event_y),
        }),
        Event::MotionNotify(event) if event.event == overlay => {
            held_button(u16::from(event.state)).map(|held| Input::Motion {
                held,
                x: f64::from(event.event_x),
                y: f64::from(event.event_y),
            })
        }
        Event::KeyPress(event) => {
            let sym = keymap.keysym(event.detail)?;
            if recording {
                (sym == keysym::F4).then_some(Input::RecordingStopped)
            } else {
                key_action(sym).map(Input::Key)
            }
        }
        _ => None,
    }
}

/// First held button in left, middle, right order
pub fn held_button(state: u16) -> Option<HeldButton> {
    if state & u16::from(KeyButMask::BUTTON1) != 0 {
        Some(HeldButton::Primary)
    } else if state & u16::from(KeyButMask::BUTTON2) != 0 {
        Some(HeldButton::Middle)
    } else if state & u16::from(KeyButMask::BUTTON3) != 0 {
        Some(HeldButton::Secondary)
    } else {
        None
    }
}

pub fn key_action(sym: u32) -> Option<KeyAction> {
    match sym {
        keysym::F1 => Some(KeyAction::Help),
        keysym::F2 => Some(KeyAction::ToggleMirror),
        keysym::F3 => Some(KeyAction::ShowCommand),
        keysym::F4 => Some(KeyAction::Record),
        keysym::F11 => Some(KeyAction::ToggleFullscreen),
        keysym::ESCAPE | keysym::LOWER_Q => Some(KeyAction::Quit),
        _ => None,
    }
}
