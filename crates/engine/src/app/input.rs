use std::collections::HashMap;
use std::hash::Hash;

use super::{Vec2, Viewport};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Key {
    Char(char),
    Space,
    Enter,
    Escape,
    Tab,
    Shift,
    Control,
    ArrowUp,
    ArrowDown,
    ArrowLeft,
    ArrowRight,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PointerButton {
    Left,
    Right,
    Middle,
    Other(u16),
}

/// Edge-triggered state of one key or pointer button.
///
/// `Inactive -> JustPressed -> Held -> JustReleased -> Inactive`, where the
/// `JustPressed -> Held` and `JustReleased -> Inactive` edges only happen during
/// [`KeyState::consolidated`], once per simulation tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum KeyState {
    JustPressed,
    Held,
    JustReleased,
    #[default]
    Inactive,
}

impl KeyState {
    pub fn pressed(self) -> Self {
        match self {
            KeyState::Inactive | KeyState::JustReleased => KeyState::JustPressed,
            KeyState::JustPressed | KeyState::Held => self,
        }
    }

    pub fn released(self) -> Self {
        match self {
            KeyState::Inactive => KeyState::Inactive,
            KeyState::JustPressed | KeyState::Held | KeyState::JustReleased => {
                KeyState::JustReleased
            }
        }
    }

    pub fn consolidated(self) -> Self {
        match self {
            KeyState::JustPressed => KeyState::Held,
            KeyState::JustReleased => KeyState::Inactive,
            KeyState::Held | KeyState::Inactive => self,
        }
    }

    pub fn is_down(self) -> bool {
        matches!(self, KeyState::JustPressed | KeyState::Held)
    }

    pub fn is_active(self) -> bool {
        self != KeyState::Inactive
    }
}

#[derive(Debug, Clone)]
struct ButtonStates<K> {
    states: HashMap<K, KeyState>,
}

impl<K> Default for ButtonStates<K> {
    fn default() -> Self {
        Self {
            states: HashMap::new(),
        }
    }
}

impl<K: Copy + Eq + Hash> ButtonStates<K> {
    fn state(&self, button: K) -> KeyState {
        self.states.get(&button).copied().unwrap_or_default()
    }

    fn press(&mut self, button: K) {
        let next = self.state(button).pressed();
        self.states.insert(button, next);
    }

    fn release(&mut self, button: K) {
        // Entries only exist for buttons seen going down.
        if let Some(state) = self.states.get_mut(&button) {
            *state = state.released();
        }
    }

    fn consolidate(&mut self) {
        self.states.retain(|_, state| {
            *state = state.consolidated();
            state.is_active()
        });
    }

    fn tracked_len(&self) -> usize {
        self.states.len()
    }
}

/// Device events land here between ticks; queries read the edge-triggered
/// state that stays put until the next [`InputTracker::consolidate`].
#[derive(Debug, Clone)]
pub struct InputTracker {
    keys: ButtonStates<Key>,
    buttons: ButtonStates<PointerButton>,
    pointer_position: Vec2,
    viewport: Viewport,
}

impl InputTracker {
    pub fn new(viewport: Viewport) -> Self {
        Self {
            keys: ButtonStates::default(),
            buttons: ButtonStates::default(),
            pointer_position: Vec2::default(),
            viewport,
        }
    }

    pub fn on_key_down(&mut self, key: Key) {
        self.keys.press(key);
    }

    pub fn on_key_up(&mut self, key: Key) {
        self.keys.release(key);
    }

    pub fn on_pointer_down(&mut self, button: PointerButton) {
        self.buttons.press(button);
    }

    pub fn on_pointer_up(&mut self, button: PointerButton) {
        self.buttons.release(button);
    }

    pub fn on_pointer_move(&mut self, x: f32, y: f32) {
        if !x.is_finite() || !y.is_finite() {
            return;
        }
        self.pointer_position = Vec2 {
            x: x.clamp(0.0, self.viewport.width as f32).ceil(),
            y: y.clamp(0.0, self.viewport.height as f32).ceil(),
        };
    }

    pub fn consolidate(&mut self) {
        self.keys.consolidate();
        self.buttons.consolidate();
    }

    pub fn key_state(&self, key: Key) -> KeyState {
        self.keys.state(key)
    }

    pub fn is_just_pressed(&self, key: Key) -> bool {
        self.key_state(key) == KeyState::JustPressed
    }

    pub fn is_held(&self, key: Key) -> bool {
        self.key_state(key).is_down()
    }

    pub fn is_just_released(&self, key: Key) -> bool {
        self.key_state(key) == KeyState::JustReleased
    }

    pub fn is_active(&self, key: Key) -> bool {
        self.key_state(key).is_active()
    }

    pub fn pointer_state(&self, button: PointerButton) -> KeyState {
        self.buttons.state(button)
    }

    pub fn is_pointer_just_pressed(&self, button: PointerButton) -> bool {
        self.pointer_state(button) == KeyState::JustPressed
    }

    pub fn is_pointer_held(&self, button: PointerButton) -> bool {
        self.pointer_state(button).is_down()
    }

    pub fn is_pointer_just_released(&self, button: PointerButton) -> bool {
        self.pointer_state(button) == KeyState::JustReleased
    }

    pub fn is_pointer_active(&self, button: PointerButton) -> bool {
        self.pointer_state(button).is_active()
    }

    pub fn pointer_position(&self) -> Vec2 {
        self.pointer_position
    }

    pub fn tracked_key_count(&self) -> usize {
        self.keys.tracked_len()
    }
}
