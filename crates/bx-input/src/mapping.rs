//! Input mapping
//!
//! Maps gamepad buttons and axes onto arcade controls. Mappings are stored
//! per controller model, keyed by the vendor/product string, so a saved
//! layout follows the model regardless of port or enumeration order.

use crate::gamepad::{AxisId, GamepadDevice};
use bx_core::error::InputError;
use bx_core::input::{LogicalAxis, LogicalButtons, PlayerInput};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// A gamepad button driving an arcade button
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ButtonBinding {
    /// 1-based HID button number
    pub button: u16,
    /// Name of a [`LogicalButtons`] flag, e.g. `"COIN"`
    pub control: String,
}

/// A gamepad axis driving an analog control, a pair of digital
/// directions, or both
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AxisBinding {
    pub axis: AxisId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analog: Option<LogicalAxis>,
    /// Button pressed when the axis is pushed past the deadzone towards -1
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub negative: Option<String>,
    /// Button pressed when the axis is pushed past the deadzone towards +1
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub positive: Option<String>,
}

/// Mapping for one controller model
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceMapping {
    /// Informational, shown in front-end preferences
    pub name: Option<String>,
    pub buttons: Vec<ButtonBinding>,
    pub axes: Vec<AxisBinding>,
}

impl DeviceMapping {
    /// Layout used for controllers without a saved mapping
    pub fn arcade_default() -> Self {
        let buttons = [
            (1, "BUTTON1"),
            (2, "BUTTON2"),
            (3, "BUTTON3"),
            (4, "BUTTON4"),
            (5, "BUTTON5"),
            (6, "BUTTON6"),
            (9, "COIN"),
            (10, "START"),
        ]
        .into_iter()
        .map(|(button, control)| ButtonBinding {
            button,
            control: control.to_string(),
        })
        .collect();

        let digital = |axis, analog, negative: &str, positive: &str| AxisBinding {
            axis,
            analog,
            negative: Some(negative.to_string()),
            positive: Some(positive.to_string()),
        };
        let analog = |axis, target| AxisBinding {
            axis,
            analog: Some(target),
            negative: None,
            positive: None,
        };

        Self {
            name: None,
            buttons,
            axes: vec![
                digital(AxisId::X, Some(LogicalAxis::LeftX), "LEFT", "RIGHT"),
                digital(AxisId::Y, Some(LogicalAxis::LeftY), "UP", "DOWN"),
                digital(AxisId::HatX, None, "LEFT", "RIGHT"),
                digital(AxisId::HatY, None, "UP", "DOWN"),
                analog(AxisId::Rx, LogicalAxis::RightX),
                analog(AxisId::Ry, LogicalAxis::RightY),
            ],
        }
    }

    /// Check that every control name refers to a real button
    pub fn validate(&self) -> Result<(), InputError> {
        let names = self
            .buttons
            .iter()
            .map(|b| &b.control)
            .chain(self.axes.iter().flat_map(|a| a.negative.iter().chain(a.positive.iter())));
        for name in names {
            control(name)?;
        }
        Ok(())
    }

    /// Translate a gamepad's current state into one player's controls
    pub fn player_input(&self, gamepad: &GamepadDevice, deadzone: f32) -> PlayerInput {
        let mut player = PlayerInput::default();

        let pressed = gamepad.button_states();
        for binding in &self.buttons {
            if pressed.get(&binding.button).copied().unwrap_or(false) {
                if let Ok(button) = control(&binding.control) {
                    player.set_button(button, true);
                }
            }
        }

        let values = gamepad.current_axis_values();
        for binding in &self.axes {
            let value = values.get(&binding.axis).copied().unwrap_or(0.0);
            let active = value.abs() >= deadzone && value != 0.0;

            if let Some(axis) = binding.analog {
                player.set_axis(axis, if active { value } else { 0.0 });
            }
            let direction = match (active, value < 0.0) {
                (false, _) => None,
                (true, true) => binding.negative.as_deref(),
                (true, false) => binding.positive.as_deref(),
            };
            if let Some(Ok(button)) = direction.map(control) {
                player.set_button(button, true);
            }
        }

        player
    }
}

fn control(name: &str) -> Result<LogicalButtons, InputError> {
    LogicalButtons::from_name(name)
        .ok_or_else(|| InputError::Mapping(format!("unknown control '{}'", name)))
}

/// Saved mappings for every known controller model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputMapping {
    /// Keyed by vendor/product string (`vvvvpppp`)
    #[serde(default)]
    devices: BTreeMap<String, DeviceMapping>,
    #[serde(skip, default = "DeviceMapping::arcade_default")]
    fallback: DeviceMapping,
}

impl InputMapping {
    pub fn new() -> Self {
        Self {
            devices: BTreeMap::new(),
            fallback: DeviceMapping::arcade_default(),
        }
    }

    /// Mapping for a controller model, or the arcade default
    pub fn mapping_for(&self, vendor_product: &str) -> &DeviceMapping {
        self.devices.get(vendor_product).unwrap_or(&self.fallback)
    }

    pub fn has_mapping(&self, vendor_product: &str) -> bool {
        self.devices.contains_key(vendor_product)
    }

    pub fn set_mapping(&mut self, vendor_product: impl Into<String>, mapping: DeviceMapping) -> Result<(), InputError> {
        mapping.validate()?;
        self.devices.insert(vendor_product.into(), mapping);
        Ok(())
    }

    pub fn remove_mapping(&mut self, vendor_product: &str) -> Option<DeviceMapping> {
        self.devices.remove(vendor_product)
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    /// Controls for a gamepad, using its model's mapping
    pub fn player_input(&self, gamepad: &GamepadDevice, deadzone: f32) -> PlayerInput {
        self.mapping_for(&gamepad.vendor_product_string())
            .player_input(gamepad, deadzone)
    }

    /// Parse mappings from TOML
    pub fn from_toml(content: &str) -> Result<Self, InputError> {
        let mapping: Self =
            toml::from_str(content).map_err(|e| InputError::Mapping(e.to_string()))?;
        for device in mapping.devices.values() {
            device.validate()?;
        }
        Ok(mapping)
    }

    pub fn to_toml(&self) -> Result<String, InputError> {
        toml::to_string_pretty(self).map_err(|e| InputError::Mapping(e.to_string()))
    }

    /// Load mappings from a file
    pub fn load(path: &Path) -> Result<Self, InputError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| InputError::Mapping(format!("{}: {}", path.display(), e)))?;
        Self::from_toml(&content)
    }

    /// Load mappings, falling back to defaults when the file is missing or
    /// unreadable
    pub fn load_or_default(path: &Path) -> Self {
        if !path.exists() {
            return Self::new();
        }
        match Self::load(path) {
            Ok(mapping) => {
                tracing::info!("Loaded {} controller mappings from {}", mapping.len(), path.display());
                mapping
            }
            Err(e) => {
                tracing::warn!("Ignoring controller mappings: {}", e);
                Self::new()
            }
        }
    }

    /// Save mappings to a file
    pub fn save(&self, path: &Path) -> Result<(), InputError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| InputError::Mapping(format!("{}: {}", parent.display(), e)))?;
        }
        std::fs::write(path, self.to_toml()?)
            .map_err(|e| InputError::Mapping(format!("{}: {}", path.display(), e)))
    }
}

impl Default for InputMapping {
    fn default() -> Self {
        Self::new()
    }
}
