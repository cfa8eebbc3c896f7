//! Game controller input for burnx
//!
//! Translates HID game controllers into the normalized input model:
//! - `hid`: the hardware abstraction and a virtual device
//! - `gamepad`: per-device state, identity and delegate notifications
//! - `manager`: hot-plug queue and player slot assignment
//! - `mapping`: persisted per-model control mappings

pub mod gamepad;
pub mod hid;
pub mod manager;
pub mod mapping;

pub use gamepad::{AxisId, GamepadDelegate, GamepadDevice, GamepadIdentity};
pub use hid::{HidDevice, HidElement, HidValue, VirtualHidDevice};
pub use manager::{GamepadManager, HotplugEvent, HotplugSender};
pub use mapping::{DeviceMapping, InputMapping};
