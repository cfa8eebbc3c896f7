//! Input adapter
//!
//! Produces the normalized [`InputState`] the core consumes each step from
//! connected gamepads, their saved mappings and any host-supplied input
//! (keyboard handling lives in the front end and arrives here already
//! translated).

use bx_core::config::InputConfig;
use bx_core::error::InputError;
use bx_core::input::{InputState, LogicalAxis, PlayerInput, MAX_PLAYERS};
use bx_input::{GamepadDelegate, GamepadDevice, GamepadManager, HotplugSender, InputMapping};
use parking_lot::{Mutex, RwLock};
use std::sync::Weak;

pub struct InputAdapter {
    manager: Mutex<GamepadManager>,
    /// Connected gamepads, refreshed after every hot-plug poll so the run
    /// loop never waits on device registration
    gamepads: RwLock<Vec<GamepadDevice>>,
    mapping: RwLock<InputMapping>,
    host: Mutex<InputState>,
    deadzone: f32,
}

impl InputAdapter {
    pub fn new(mapping: InputMapping, deadzone: f32) -> Self {
        Self {
            manager: Mutex::new(GamepadManager::new()),
            gamepads: RwLock::new(Vec::new()),
            mapping: RwLock::new(mapping),
            host: Mutex::new(InputState::default()),
            deadzone: deadzone.clamp(0.0, 1.0),
        }
    }

    /// Build an adapter from configuration, loading saved mappings
    pub fn from_config(config: &InputConfig) -> Self {
        Self::new(InputMapping::load_or_default(&config.mapping_path), config.deadzone)
    }

    /// Handle for platform discovery code
    pub fn hotplug_sender(&self) -> HotplugSender {
        self.manager.lock().sender()
    }

    pub fn set_delegate(&self, delegate: Option<Weak<dyn GamepadDelegate>>) {
        self.manager.lock().set_delegate(delegate);
    }

    /// Process pending hot-plug events. Returns how many were handled.
    pub fn poll_devices(&self) -> usize {
        let mut manager = self.manager.lock();
        let handled = manager.poll();
        if handled > 0 {
            *self.gamepads.write() = manager.gamepads().to_vec();
        }
        handled
    }

    pub fn gamepads(&self) -> Vec<GamepadDevice> {
        self.gamepads.read().clone()
    }

    pub fn set_mapping(&self, mapping: InputMapping) {
        *self.mapping.write() = mapping;
    }

    pub fn mapping(&self) -> InputMapping {
        self.mapping.read().clone()
    }

    /// Replace the host-supplied part of the input
    pub fn set_host_input(&self, state: InputState) {
        *self.host.lock() = state;
    }

    /// Update one player's host-supplied controls
    pub fn set_host_player(&self, index: usize, player: PlayerInput) -> Result<(), InputError> {
        let mut host = self.host.lock();
        let slot = host
            .player_mut(index)
            .ok_or_else(|| InputError::Mapping(format!("no player slot {}", index)))?;
        *slot = player;
        Ok(())
    }

    /// Current controls for every player slot
    pub fn snapshot(&self) -> InputState {
        let mut state = *self.host.lock();
        let gamepads = self.gamepads.read().clone();
        let mapping = self.mapping.read();

        for gamepad in gamepads.iter().filter(|g| g.is_connected()) {
            let index = gamepad.index();
            if index >= MAX_PLAYERS {
                continue;
            }
            let pad = mapping.player_input(gamepad, self.deadzone);
            if let Some(player) = state.player_mut(index) {
                merge(player, &pad);
            }
        }

        state
    }
}

/// Combine two sources: buttons are or-ed, the larger deflection wins
fn merge(into: &mut PlayerInput, other: &PlayerInput) {
    into.buttons |= other.buttons;
    for axis in LogicalAxis::ALL {
        let value = other.axis(axis);
        if value.abs() > into.axis(axis).abs() {
            into.set_axis(axis, value);
        }
    }
}

impl Default for InputAdapter {
    fn default() -> Self {
        Self::new(InputMapping::default(), InputConfig::default().deadzone)
    }
}
