//! Keymap resolution
//!
//! Resolves key events against the active layers. Layers are kept in two bit masks like in
//! most keyboard firmware: the default layer state (persistent base layer) and the layer
//! state (layers enabled by layer keys). A key takes its action from the highest active layer
//! on which it is not transparent. The action is resolved once, on press, and the release
//! always uses that cached action.
//!
//! Hold-tap keys delay processing of all following events until they are resolved. A hold-tap
//! resolves to "tap" when released before [`TAPPING_TERM`] and to "hold" when the term
//! elapses or when another key is both pressed and released while it is pending (permissive
//! hold). Queued events are processed one per tick so that every key state change is visible
//! in at least one HID report.

use heapless::{Deque, Vec};
use keyberon::key_code::KeyCode;
use keyberon::layout::{CustomEvent, Event};

use super::actions::Action as CustomAction;
use super::layers::{Layer, LayerState, N_LAYERS};
use crate::config::{NCOLS, NROWS, TAPPING_TERM};
use crate::macros::{debug, warn};

/// Keymap entry
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Action {
    /// Does nothing
    NoOp,
    /// Use the action of the next active layer below
    Trans,
    /// Single key
    Key(KeyCode),
    /// Multiple keys pressed at once
    Keys(&'static [KeyCode]),
    /// Modifier when held, key when tapped
    ModTap { hold: KeyCode, tap: KeyCode },
    /// Layer when held, key when tapped
    LayerTap { layer: Layer, tap: KeyCode },
    /// Layer active while the key is held
    ///
    /// Lower and raise layers apply the tri-layer rule of their OS after each press/release.
    Momentary(Layer),
    /// Layer active for the next key press
    OneShot(Layer),
    /// Action handled by the keyboard logic
    Custom(CustomAction),
}

/// Keymap of all layers
pub type Keymap = [[[Action; NCOLS]; NROWS]; N_LAYERS];

/// Custom events generated during a single tick
pub type CustomEvents = Vec<CustomEvent<CustomAction>, 8>;

type Coord = (u8, u8);

const MAX_STATES: usize = 64;
const QUEUE_LEN: usize = 32;

/// State of a pressed key
#[derive(Clone, Copy, Debug, PartialEq)]
enum State {
    /// Key code held until release
    Key { keycode: KeyCode, coord: Coord },
    /// Key code held for a single tick
    Tap { keycode: KeyCode },
    /// Layer held until release
    Layer { layer: Layer, tri_layer: bool, coord: Coord },
    /// One-shot layer key
    OneShot { coord: Coord },
    /// Custom action held until release
    Custom { action: &'static CustomAction, coord: Coord },
    /// Key with no effect, keeps the press from being resolved again
    Inert { coord: Coord },
}

/// Hold-tap key waiting for resolution
struct Waiting {
    coord: Coord,
    action: &'static Action,
    timer: u16,
}

enum Resolution {
    Tap,
    Hold,
}

#[derive(Default)]
struct OneShot {
    /// Layer enabled by a one-shot key
    layer: Option<Layer>,
    /// Coordinates of the one-shot key while it is held
    held: Option<Coord>,
    /// Another key has been pressed since the one-shot key was pressed
    used: bool,
}

/// Layout engine
pub struct Layout {
    keymap: &'static Keymap,
    layer_state: LayerState,
    default_layer_state: LayerState,
    states: Vec<State, MAX_STATES>,
    queue: Deque<Event, QUEUE_LEN>,
    waiting: Option<Waiting>,
    oneshot: OneShot,
    customs: CustomEvents,
}

impl State {
    fn coord(&self) -> Option<Coord> {
        match *self {
            State::Key { coord, .. }
            | State::Layer { coord, .. }
            | State::OneShot { coord }
            | State::Custom { coord, .. }
            | State::Inert { coord } => Some(coord),
            State::Tap { .. } => None,
        }
    }

    fn keycode(&self) -> Option<KeyCode> {
        match *self {
            State::Key { keycode, .. } | State::Tap { keycode } => Some(keycode),
            _ => None,
        }
    }
}

impl Action {
    /// Whether pressing this key consumes a pending one-shot layer
    fn uses_oneshot(&self) -> bool {
        match self {
            Action::Key(kc) => !is_modifier(*kc),
            Action::NoOp | Action::Trans | Action::Momentary(_) | Action::OneShot(_) => false,
            Action::LayerTap { .. } => false,
            Action::Keys(_) | Action::ModTap { .. } | Action::Custom(_) => true,
        }
    }
}

fn is_modifier(kc: KeyCode) -> bool {
    use KeyCode::*;
    matches!(kc, LCtrl | LShift | LAlt | LGui | RCtrl | RShift | RAlt | RGui)
}

impl Layout {
    pub fn new(keymap: &'static Keymap) -> Self {
        Self {
            keymap,
            layer_state: LayerState::EMPTY,
            default_layer_state: LayerState::single(Layer::LinuxBase),
            states: Vec::new(),
            queue: Deque::new(),
            waiting: None,
            oneshot: OneShot::default(),
            customs: Vec::new(),
        }
    }

    /// Layers enabled by layer keys
    pub fn layer_state(&self) -> LayerState {
        self.layer_state
    }

    /// Persistent base layers
    pub fn default_layer_state(&self) -> LayerState {
        self.default_layer_state
    }

    /// Replace the default layer state with a single layer
    pub fn set_default_layer(&mut self, layer: Layer) {
        self.default_layer_state = LayerState::single(layer);
    }

    /// Highest layer that takes part in key resolution
    pub fn active_layer(&self) -> Layer {
        (self.layer_state | self.default_layer_state).highest()
    }

    /// Layer enabled by a pending or held one-shot key
    pub fn oneshot_layer(&self) -> Option<Layer> {
        self.oneshot.layer
    }

    /// Key codes of currently pressed keys
    pub fn keycodes(&self) -> impl Iterator<Item = KeyCode> + '_ {
        self.states.iter().filter_map(State::keycode)
    }

    /// Register a key event, processed during the following ticks
    pub fn event(&mut self, event: Event) {
        if let Err(event) = self.queue.push_back(event) {
            warn!("Event queue full, forcing resolution");
            if let Some(waiting) = self.waiting.take() {
                self.resolve(waiting, Resolution::Hold);
            }
            if let Some(oldest) = self.queue.pop_front() {
                self.process(oldest);
            }
            self.queue.push_back(event).ok();
        }
    }

    /// Advance time by 1 ms
    ///
    /// Returns custom actions pressed or released during this tick.
    pub fn tick(&mut self) -> CustomEvents {
        self.states.retain(|s| !matches!(s, State::Tap { .. }));

        if let Some(mut waiting) = self.waiting.take() {
            waiting.timer = waiting.timer.saturating_add(1);
            match self.check_waiting(&waiting) {
                Some(resolution) => self.resolve(waiting, resolution),
                None => self.waiting = Some(waiting),
            }
        }

        if self.waiting.is_none() {
            if let Some(event) = self.queue.pop_front() {
                self.process(event);
            }
        }

        core::mem::take(&mut self.customs)
    }

    fn check_waiting(&self, waiting: &Waiting) -> Option<Resolution> {
        let released = |coord: Coord| {
            self.queue.iter().any(|e| matches!(e, Event::Release(i, j) if (*i, *j) == coord))
        };

        if released(waiting.coord) {
            return Some(Resolution::Tap);
        }
        if waiting.timer >= TAPPING_TERM {
            return Some(Resolution::Hold);
        }
        // Permissive hold: other key both pressed and released
        let mut pressed: Vec<Coord, QUEUE_LEN> = Vec::new();
        for event in self.queue.iter() {
            match *event {
                Event::Press(i, j) => {
                    pressed.push((i, j)).ok();
                },
                Event::Release(i, j) => if pressed.contains(&(i, j)) {
                    return Some(Resolution::Hold);
                },
            }
        }
        None
    }

    fn resolve(&mut self, waiting: Waiting, resolution: Resolution) {
        let coord = waiting.coord;
        match (waiting.action, resolution) {
            (Action::ModTap { tap, .. } | Action::LayerTap { tap, .. }, Resolution::Tap) => {
                debug!("Hold-tap at ({=u8}, {=u8}) tapped", coord.0, coord.1);
                self.push_state(State::Tap { keycode: *tap });
            },
            (Action::ModTap { hold, .. }, Resolution::Hold) => {
                debug!("Hold-tap at ({=u8}, {=u8}) held", coord.0, coord.1);
                self.push_state(State::Key { keycode: *hold, coord });
            },
            (Action::LayerTap { layer, .. }, Resolution::Hold) => {
                debug!("Hold-tap at ({=u8}, {=u8}) held", coord.0, coord.1);
                self.layer_state.on(*layer);
                self.push_state(State::Layer { layer: *layer, tri_layer: false, coord });
            },
            _ => {},
        }
    }

    fn push_state(&mut self, state: State) {
        if self.states.push(state).is_err() {
            warn!("Too many keys pressed");
        }
    }

    fn process(&mut self, event: Event) {
        match event {
            Event::Press(i, j) => self.press((i, j)),
            Event::Release(i, j) => self.release((i, j)),
        }
    }

    /// Find the action for given key on the highest non-transparent active layer
    fn resolve_action(&self, (i, j): Coord) -> &'static Action {
        let keymap = self.keymap;
        let active = self.layer_state | self.default_layer_state;
        active.iter_rev()
            .filter_map(|layer| keymap[layer.index()].get(i as usize)?.get(j as usize))
            .find(|action| **action != Action::Trans)
            .unwrap_or(&Action::NoOp)
    }

    fn press(&mut self, coord: Coord) {
        let action = self.resolve_action(coord);

        let consumes_oneshot = self.oneshot.layer.is_some() && action.uses_oneshot();

        match action {
            Action::NoOp | Action::Trans => self.push_state(State::Inert { coord }),
            Action::Key(keycode) => self.push_state(State::Key { keycode: *keycode, coord }),
            Action::Keys(keycodes) => for keycode in keycodes.iter() {
                self.push_state(State::Key { keycode: *keycode, coord });
            },
            Action::ModTap { .. } | Action::LayerTap { .. } => {
                self.waiting = Some(Waiting { coord, action, timer: 0 });
            },
            Action::Momentary(layer) => {
                self.layer_state.on(*layer);
                let tri_layer = match layer.tri_layer() {
                    Some(tri) => {
                        self.layer_state.update_tri_layer(tri);
                        true
                    },
                    None => false,
                };
                self.push_state(State::Layer { layer: *layer, tri_layer, coord });
            },
            Action::OneShot(layer) => {
                if let Some(prev) = self.oneshot.layer.replace(*layer) {
                    self.layer_state.off(prev);
                }
                self.layer_state.on(*layer);
                self.oneshot.held = Some(coord);
                self.oneshot.used = false;
                self.push_state(State::OneShot { coord });
            },
            Action::Custom(custom) => {
                self.customs.push(CustomEvent::Press(custom)).ok();
                self.push_state(State::Custom { action: custom, coord });
            },
        }

        if consumes_oneshot {
            self.oneshot.used = true;
            if self.oneshot.held.is_none() {
                self.clear_oneshot();
            }
        }
    }

    fn release(&mut self, coord: Coord) {
        let mut released: Vec<State, MAX_STATES> = Vec::new();
        self.states.retain(|s| {
            if s.coord() == Some(coord) {
                released.push(*s).ok();
                false
            } else {
                true
            }
        });

        for state in released {
            match state {
                State::Layer { layer, tri_layer, .. } => {
                    self.layer_state.off(layer);
                    if tri_layer {
                        if let Some(tri) = layer.tri_layer() {
                            self.layer_state.update_tri_layer(tri);
                        }
                    }
                },
                State::OneShot { .. } => {
                    self.oneshot.held = None;
                    if self.oneshot.used {
                        self.clear_oneshot();
                    }
                },
                State::Custom { action, .. } => {
                    self.customs.push(CustomEvent::Release(action)).ok();
                },
                State::Key { .. } | State::Tap { .. } | State::Inert { .. } => {},
            }
        }
    }

    fn clear_oneshot(&mut self) {
        if let Some(layer) = self.oneshot.layer.take() {
            self.layer_state.off(layer);
        }
        self.oneshot.used = false;
    }
}
