//! Normalized input model consumed by emulation cores
//!
//! Physical devices are translated into this representation by the
//! runtime's input adapter, so cores never see raw HID usages.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

/// Number of player slots exposed to a core
pub const MAX_PLAYERS: usize = 4;

/// Number of analog axes per player
pub const AXIS_COUNT: usize = 4;

bitflags! {
    /// Arcade control panel buttons
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct LogicalButtons: u32 {
        const UP      = 0x0001;
        const DOWN    = 0x0002;
        const LEFT    = 0x0004;
        const RIGHT   = 0x0008;
        const BUTTON1 = 0x0010;
        const BUTTON2 = 0x0020;
        const BUTTON3 = 0x0040;
        const BUTTON4 = 0x0080;
        const BUTTON5 = 0x0100;
        const BUTTON6 = 0x0200;
        const START   = 0x0400;
        const COIN    = 0x0800;
        const SERVICE = 0x1000;
    }
}

/// Analog controls
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LogicalAxis {
    LeftX = 0,
    LeftY = 1,
    RightX = 2,
    RightY = 3,
}

impl LogicalAxis {
    pub const ALL: [LogicalAxis; AXIS_COUNT] = [
        LogicalAxis::LeftX,
        LogicalAxis::LeftY,
        LogicalAxis::RightX,
        LogicalAxis::RightY,
    ];
}

/// Control state for a single player
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PlayerInput {
    /// Digital controls
    pub buttons: LogicalButtons,
    /// Analog controls, -1.0..=1.0 with 0.0 at rest
    pub axes: [f32; AXIS_COUNT],
}

impl PlayerInput {
    pub fn is_pressed(&self, button: LogicalButtons) -> bool {
        self.buttons.contains(button)
    }

    pub fn set_button(&mut self, button: LogicalButtons, pressed: bool) {
        self.buttons.set(button, pressed);
    }

    pub fn axis(&self, axis: LogicalAxis) -> f32 {
        self.axes[axis as usize]
    }

    pub fn set_axis(&mut self, axis: LogicalAxis, value: f32) {
        self.axes[axis as usize] = value.clamp(-1.0, 1.0);
    }
}

/// Control state for every player slot
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct InputState {
    players: [PlayerInput; MAX_PLAYERS],
}

impl InputState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a player's controls, `None` for slots past `MAX_PLAYERS`
    pub fn player(&self, index: usize) -> Option<&PlayerInput> {
        self.players.get(index)
    }

    pub fn player_mut(&mut self, index: usize) -> Option<&mut PlayerInput> {
        self.players.get_mut(index)
    }

    pub fn players(&self) -> &[PlayerInput] {
        &self.players
    }

    /// True when no control is held on any slot
    pub fn is_neutral(&self) -> bool {
        self.players
            .iter()
            .all(|p| p.buttons.is_empty() && p.axes.iter().all(|&a| a == 0.0))
    }
}
