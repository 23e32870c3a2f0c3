//! Keyboard, mouse and clipboard state polled once per frame.

use std::collections::HashSet;

use glam::Vec2;
use log::debug;
use winit::event::{DeviceEvent, ElementState, KeyEvent, MouseButton, WindowEvent};
use winit::keyboard::{KeyCode, PhysicalKey};

pub type KeyCallback = Box<dyn FnMut(KeyCode)>;

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct CursorState {
    pub position: Vec2,
    /// Movement since the previous `poll_events`.
    pub delta: Vec2,
    pub locked: bool,
}

/// Input capabilities the application reads every frame.
///
/// `jpressed`/`jclicked` report keys and buttons that went down since the
/// previous [`Input::poll_events`] call.
pub trait Input {
    /// Makes the events received since the last call visible.
    fn poll_events(&mut self);

    fn pressed(&self, key: KeyCode) -> bool;
    fn jpressed(&self, key: KeyCode) -> bool;
    fn clicked(&self, button: MouseButton) -> bool;
    fn jclicked(&self, button: MouseButton) -> bool;

    fn cursor(&self) -> CursorState;
    fn set_cursor_locked(&mut self, locked: bool);

    fn clipboard_text(&self) -> Option<&str>;
    fn set_clipboard_text(&mut self, text: &str);

    /// Runs `callback` every time `key` goes down.
    fn add_key_callback(&mut self, key: KeyCode, callback: KeyCallback);
}

/// [`Input`] fed by winit window and device events.
#[derive(Default)]
pub struct WinitInput {
    keys: HashSet<KeyCode>,
    just_pressed: HashSet<KeyCode>,
    next_pressed: HashSet<KeyCode>,
    buttons: HashSet<MouseButton>,
    just_clicked: HashSet<MouseButton>,
    next_clicked: HashSet<MouseButton>,
    cursor: CursorState,
    pending_delta: Vec2,
    last_position: Option<Vec2>,
    clipboard: Option<String>,
    callbacks: Vec<(KeyCode, KeyCallback)>,
}

impl WinitInput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn handle_window_event(&mut self, event: &WindowEvent) {
        match event {
            WindowEvent::KeyboardInput {
                event:
                    KeyEvent {
                        physical_key: PhysicalKey::Code(code),
                        state,
                        repeat,
                        ..
                    },
                ..
            } => match state {
                ElementState::Pressed if !repeat => self.press_key(*code),
                ElementState::Pressed => {}
                ElementState::Released => self.release_key(*code),
            },
            WindowEvent::MouseInput { state, button, .. } => match state {
                ElementState::Pressed => self.press_button(*button),
                ElementState::Released => self.release_button(*button),
            },
            WindowEvent::CursorMoved { position, .. } => {
                self.move_cursor(Vec2::new(position.x as f32, position.y as f32));
            }
            WindowEvent::Focused(false) => {
                debug!("Focus lost, releasing held keys");
                self.keys.clear();
                self.buttons.clear();
            }
            _ => {}
        }
    }

    /// Raw mouse motion drives the cursor delta while the cursor is locked.
    pub fn handle_device_event(&mut self, event: &DeviceEvent) {
        if let DeviceEvent::MouseMotion { delta } = event {
            if self.cursor.locked {
                self.pending_delta += Vec2::new(delta.0 as f32, delta.1 as f32);
            }
        }
    }

    pub fn press_key(&mut self, code: KeyCode) {
        if self.keys.insert(code) {
            self.next_pressed.insert(code);
            for (key, callback) in &mut self.callbacks {
                if *key == code {
                    callback(code);
                }
            }
        }
    }

    pub fn release_key(&mut self, code: KeyCode) {
        self.keys.remove(&code);
    }

    pub fn press_button(&mut self, button: MouseButton) {
        if self.buttons.insert(button) {
            self.next_clicked.insert(button);
        }
    }

    pub fn release_button(&mut self, button: MouseButton) {
        self.buttons.remove(&button);
    }

    pub fn move_cursor(&mut self, position: Vec2) {
        if !self.cursor.locked {
            if let Some(last) = self.last_position {
                self.pending_delta += position - last;
            }
        }
        self.last_position = Some(position);
        self.cursor.position = position;
    }
}

impl Input for WinitInput {
    fn poll_events(&mut self) {
        self.just_pressed = std::mem::take(&mut self.next_pressed);
        self.just_clicked = std::mem::take(&mut self.next_clicked);
        self.cursor.delta = std::mem::take(&mut self.pending_delta);
    }

    fn pressed(&self, key: KeyCode) -> bool {
        self.keys.contains(&key)
    }

    fn jpressed(&self, key: KeyCode) -> bool {
        self.just_pressed.contains(&key)
    }

    fn clicked(&self, button: MouseButton) -> bool {
        self.buttons.contains(&button)
    }

    fn jclicked(&self, button: MouseButton) -> bool {
        self.just_clicked.contains(&button)
    }

    fn cursor(&self) -> CursorState {
        self.cursor
    }

    fn set_cursor_locked(&mut self, locked: bool) {
        self.cursor.locked = locked;
        self.pending_delta = Vec2::ZERO;
    }

    fn clipboard_text(&self) -> Option<&str> {
        self.clipboard.as_deref()
    }

    fn set_clipboard_text(&mut self, text: &str) {
        self.clipboard = Some(text.to_string());
    }

    fn add_key_callback(&mut self, key: KeyCode, callback: KeyCallback) {
        self.callbacks.push((key, callback));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    #[test]
    fn just_pressed_lasts_one_poll() {
        let mut input = WinitInput::new();
        input.press_key(KeyCode::KeyW);
        assert!(!input.jpressed(KeyCode::KeyW));
        input.poll_events();
        assert!(input.jpressed(KeyCode::KeyW));
        assert!(input.pressed(KeyCode::KeyW));
        input.poll_events();
        assert!(!input.jpressed(KeyCode::KeyW));
        assert!(input.pressed(KeyCode::KeyW));
        input.release_key(KeyCode::KeyW);
        assert!(!input.pressed(KeyCode::KeyW));
    }

    #[test]
    fn held_key_fires_callback_once() {
        let count = Rc::new(Cell::new(0));
        let mut input = WinitInput::new();
        let seen = count.clone();
        input.add_key_callback(KeyCode::F3, Box::new(move |_| seen.set(seen.get() + 1)));
        input.press_key(KeyCode::F3);
        input.press_key(KeyCode::F3);
        input.press_key(KeyCode::F4);
        assert_eq!(count.get(), 1);
    }

    #[test]
    fn cursor_delta_accumulates_between_polls() {
        let mut input = WinitInput::new();
        input.move_cursor(Vec2::new(10.0, 10.0));
        input.move_cursor(Vec2::new(12.0, 15.0));
        input.move_cursor(Vec2::new(13.0, 14.0));
        input.poll_events();
        assert_eq!(input.cursor().delta, Vec2::new(3.0, 4.0));
        assert_eq!(input.cursor().position, Vec2::new(13.0, 14.0));
        input.poll_events();
        assert_eq!(input.cursor().delta, Vec2::ZERO);
    }

    #[test]
    fn clipboard_round_trips_text() {
        let mut input = WinitInput::new();
        assert_eq!(input.clipboard_text(), None);
        input.set_clipboard_text("stone");
        assert_eq!(input.clipboard_text(), Some("stone"));
        input.press_button(MouseButton::Left);
        input.poll_events();
        assert!(input.jclicked(MouseButton::Left));
        assert!(input.clicked(MouseButton::Left));
    }
}
