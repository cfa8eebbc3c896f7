//! Game controller state
//!
//! A [`GamepadDevice`] wraps one HID device. Reports arrive on the device's
//! own thread and update a small state table under a lock that is held only
//! for the update; the delegate is notified afterwards, outside the lock.

use crate::hid::{
    HidDevice, HidElement, HidValue, USAGE_HAT_SWITCH, USAGE_PAGE_BUTTON,
    USAGE_PAGE_GENERIC_DESKTOP, USAGE_RX, USAGE_RY, USAGE_RZ, USAGE_X, USAGE_Y, USAGE_Z,
};
use bx_core::error::InputError;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

/// Logical axis of a game controller
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum AxisId {
    X,
    Y,
    Z,
    Rx,
    Ry,
    Rz,
    /// Horizontal component of the hat switch, -1, 0 or 1
    HatX,
    /// Vertical component of the hat switch, -1 (up), 0 or 1 (down)
    HatY,
}

impl AxisId {
    /// Axis reported by a Generic Desktop usage. The hat switch maps to two
    /// axes and is handled separately.
    fn from_usage(usage: u16) -> Option<Self> {
        match usage {
            USAGE_X => Some(Self::X),
            USAGE_Y => Some(Self::Y),
            USAGE_Z => Some(Self::Z),
            USAGE_RX => Some(Self::Rx),
            USAGE_RY => Some(Self::Ry),
            USAGE_RZ => Some(Self::Rz),
            _ => None,
        }
    }
}

/// Identity used to persist per-device settings
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GamepadIdentity {
    pub location_id: u32,
    pub vendor_id: u16,
    pub product_id: u16,
    pub name: String,
    /// Player slot assigned at connection time
    pub index: usize,
}

impl GamepadIdentity {
    pub fn vendor_product_id(&self) -> u32 {
        ((self.vendor_id as u32) << 16) | self.product_id as u32
    }

    pub fn vendor_product_string(&self) -> String {
        format!("{:04x}{:04x}", self.vendor_id, self.product_id)
    }
}

/// Optional notifications about a gamepad
pub trait GamepadDelegate: Send + Sync {
    fn gamepad_did_connect(&self, _gamepad: &GamepadIdentity) {}

    fn gamepad_did_disconnect(&self, _gamepad: &GamepadIdentity) {}

    fn axis_changed(&self, _gamepad: &GamepadIdentity, _axis: AxisId, _value: f32) {}

    /// `button` is the 1-based HID button number
    fn button_changed(&self, _gamepad: &GamepadIdentity, _button: u16, _pressed: bool) {}
}

enum Change {
    Axis(AxisId, f32),
    Button(u16, bool),
}

/// Normalized controller state, keyed by raw HID usage
#[derive(Debug, Default)]
struct GamepadState {
    /// Raw usage -> element description
    elements: HashMap<u32, HidElement>,
    axes: BTreeMap<AxisId, f32>,
    buttons: BTreeMap<u16, bool>,
}

impl GamepadState {
    fn new(elements: &[HidElement]) -> Self {
        let mut state = Self::default();
        for element in elements {
            state.elements.insert(element.raw_usage(), *element);
            match (element.usage_page, element.usage) {
                (USAGE_PAGE_GENERIC_DESKTOP, USAGE_HAT_SWITCH) => {
                    state.axes.insert(AxisId::HatX, 0.0);
                    state.axes.insert(AxisId::HatY, 0.0);
                }
                (USAGE_PAGE_GENERIC_DESKTOP, usage) => {
                    if let Some(axis) = AxisId::from_usage(usage) {
                        state.axes.insert(axis, 0.0);
                    }
                }
                (USAGE_PAGE_BUTTON, number) => {
                    state.buttons.insert(number, false);
                }
                _ => {}
            }
        }
        state
    }

    /// Apply a report and return what changed
    fn apply(&mut self, value: HidValue, changes: &mut Vec<Change>) {
        let Some(element) = self.elements.get(&value.raw_usage()).copied() else {
            return;
        };

        match (value.usage_page, value.usage) {
            (USAGE_PAGE_GENERIC_DESKTOP, USAGE_HAT_SWITCH) => {
                let (x, y) = hat_direction(&element, value.value);
                self.set_axis(AxisId::HatX, x, changes);
                self.set_axis(AxisId::HatY, y, changes);
            }
            (USAGE_PAGE_GENERIC_DESKTOP, usage) => {
                if let Some(axis) = AxisId::from_usage(usage) {
                    self.set_axis(axis, normalize(&element, value.value), changes);
                }
            }
            (USAGE_PAGE_BUTTON, number) => {
                let pressed = value.value != 0;
                let previous = self.buttons.insert(number, pressed);
                if previous != Some(pressed) {
                    changes.push(Change::Button(number, pressed));
                }
            }
            _ => {}
        }
    }

    fn set_axis(&mut self, axis: AxisId, value: f32, changes: &mut Vec<Change>) {
        let previous = self.axes.insert(axis, value);
        if previous != Some(value) {
            changes.push(Change::Axis(axis, value));
        }
    }

    fn reset(&mut self) {
        self.axes.values_mut().for_each(|v| *v = 0.0);
        self.buttons.values_mut().for_each(|v| *v = false);
    }
}

/// Map a raw axis value onto -1.0..=1.0
fn normalize(element: &HidElement, value: i32) -> f32 {
    let min = element.logical_min as f64;
    let max = element.logical_max as f64;
    if max <= min {
        return 0.0;
    }
    let normalized = 2.0 * (value as f64 - min) / (max - min) - 1.0;
    normalized.clamp(-1.0, 1.0) as f32
}

/// Decode a hat switch into (x, y). Out-of-range values are the null
/// (centered) state. Four-way hats are scaled onto the eight directions.
fn hat_direction(element: &HidElement, value: i32) -> (f32, f32) {
    const DIRECTIONS: [(f32, f32); 8] = [
        (0.0, -1.0),
        (1.0, -1.0),
        (1.0, 0.0),
        (1.0, 1.0),
        (0.0, 1.0),
        (-1.0, 1.0),
        (-1.0, 0.0),
        (-1.0, -1.0),
    ];

    if value < element.logical_min || value > element.logical_max {
        return (0.0, 0.0);
    }
    let min = i64::from(element.logical_min);
    let positions = i64::from(element.logical_max) - min + 1;
    let position = i64::from(value) - min;
    DIRECTIONS[(position * 8 / positions) as usize % 8]
}

struct Shared {
    identity: GamepadIdentity,
    gamepad_id: u64,
    device: Arc<dyn HidDevice>,
    state: Mutex<GamepadState>,
    connected: AtomicBool,
    registered: AtomicBool,
    delegate: RwLock<Option<Weak<dyn GamepadDelegate>>>,
}

impl Shared {
    fn delegate(&self) -> Option<Arc<dyn GamepadDelegate>> {
        self.delegate.read().as_ref().and_then(Weak::upgrade)
    }

    fn handle_report(&self, value: HidValue) {
        if !self.connected.load(Ordering::Acquire) {
            return;
        }

        let mut changes = Vec::new();
        self.state.lock().apply(value, &mut changes);
        if changes.is_empty() {
            return;
        }

        // A disconnect may have raced with the update
        if !self.connected.load(Ordering::Acquire) {
            return;
        }
        if let Some(delegate) = self.delegate() {
            for change in changes {
                match change {
                    Change::Axis(axis, v) => delegate.axis_changed(&self.identity, axis, v),
                    Change::Button(n, pressed) => {
                        delegate.button_changed(&self.identity, n, pressed)
                    }
                }
            }
        }
    }
}

/// One connected game controller
#[derive(Clone)]
pub struct GamepadDevice {
    shared: Arc<Shared>,
}

impl GamepadDevice {
    /// Wrap a discovered device. Nothing is delivered until
    /// [`register_for_events`](Self::register_for_events) succeeds.
    pub fn new(device: Arc<dyn HidDevice>, gamepad_id: u64, index: usize) -> Self {
        let identity = GamepadIdentity {
            location_id: device.location_id(),
            vendor_id: device.vendor_id(),
            product_id: device.product_id(),
            name: device.name().to_string(),
            index,
        };
        let state = GamepadState::new(&device.elements());

        Self {
            shared: Arc::new(Shared {
                identity,
                gamepad_id,
                device,
                state: Mutex::new(state),
                connected: AtomicBool::new(true),
                registered: AtomicBool::new(false),
                delegate: RwLock::new(None),
            }),
        }
    }

    /// Subscribe to the device's input reports
    pub fn register_for_events(&self) -> Result<(), InputError> {
        let location_id = self.location_id();
        if !self.is_connected() || !self.shared.device.is_connected() {
            return Err(InputError::DeviceUnavailable { location_id });
        }
        if self.shared.registered.swap(true, Ordering::AcqRel) {
            return Err(InputError::AlreadyRegistered(location_id));
        }

        let weak = Arc::downgrade(&self.shared);
        let subscribed = self.shared.device.subscribe(Box::new(move |value| {
            if let Some(shared) = weak.upgrade() {
                shared.handle_report(value);
            }
        }));
        if let Err(e) = subscribed {
            self.shared.registered.store(false, Ordering::Release);
            return Err(e);
        }

        tracing::debug!(
            "Gamepad {} registered: {} ({}) at 0x{:08x}",
            self.index(),
            self.name(),
            self.vendor_product_string(),
            location_id
        );
        if let Some(delegate) = self.shared.delegate() {
            delegate.gamepad_did_connect(&self.shared.identity);
        }
        Ok(())
    }

    /// Mark the device gone. Later reports are dropped and no further
    /// delegate callbacks fire apart from the disconnect notification.
    pub fn disconnect(&self) {
        if !self.shared.connected.swap(false, Ordering::AcqRel) {
            return;
        }
        self.shared.state.lock().reset();
        tracing::debug!("Gamepad {} disconnected", self.index());

        if let Some(delegate) = self.shared.delegate() {
            delegate.gamepad_did_disconnect(&self.shared.identity);
        }
    }

    pub fn set_delegate(&self, delegate: Option<Weak<dyn GamepadDelegate>>) {
        *self.shared.delegate.write() = delegate;
    }

    pub fn identity(&self) -> &GamepadIdentity {
        &self.shared.identity
    }

    pub fn gamepad_id(&self) -> u64 {
        self.shared.gamepad_id
    }

    pub fn index(&self) -> usize {
        self.shared.identity.index
    }

    pub fn location_id(&self) -> u32 {
        self.shared.identity.location_id
    }

    pub fn vendor_id(&self) -> u16 {
        self.shared.identity.vendor_id
    }

    pub fn product_id(&self) -> u16 {
        self.shared.identity.product_id
    }

    pub fn name(&self) -> &str {
        &self.shared.identity.name
    }

    pub fn is_connected(&self) -> bool {
        self.shared.connected.load(Ordering::Acquire)
    }

    /// `(vendor << 16) | product`
    pub fn vendor_product_id(&self) -> u32 {
        self.shared.identity.vendor_product_id()
    }

    /// Eight lowercase hex digits, vendor then product
    pub fn vendor_product_string(&self) -> String {
        self.shared.identity.vendor_product_string()
    }

    /// Last known value of every axis the device has. Axes that have not
    /// reported yet read 0.0.
    pub fn current_axis_values(&self) -> BTreeMap<AxisId, f32> {
        self.shared.state.lock().axes.clone()
    }

    pub fn axis_value(&self, axis: AxisId) -> f32 {
        self.shared
            .state
            .lock()
            .axes
            .get(&axis)
            .copied()
            .unwrap_or(0.0)
    }

    /// Last known state of every button, by 1-based HID button number
    pub fn button_states(&self) -> BTreeMap<u16, bool> {
        self.shared.state.lock().buttons.clone()
    }

    pub fn is_button_pressed(&self, button: u16) -> bool {
        self.shared
            .state
            .lock()
            .buttons
            .get(&button)
            .copied()
            .unwrap_or(false)
    }
}

impl std::fmt::Debug for GamepadDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GamepadDevice")
            .field("gamepad_id", &self.gamepad_id())
            .field("identity", self.identity())
            .field("connected", &self.is_connected())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hid::VirtualHidDevice;

    #[derive(Default)]
    struct Recorder {
        axes: Mutex<Vec<(AxisId, f32)>>,
        buttons: Mutex<Vec<(u16, bool)>>,
        connects: Mutex<u32>,
        disconnects: Mutex<u32>,
    }

    impl GamepadDelegate for Recorder {
        fn gamepad_did_connect(&self, _gamepad: &GamepadIdentity) {
            *self.connects.lock() += 1;
        }

        fn gamepad_did_disconnect(&self, _gamepad: &GamepadIdentity) {
            *self.disconnects.lock() += 1;
        }

        fn axis_changed(&self, _gamepad: &GamepadIdentity, axis: AxisId, value: f32) {
            self.axes.lock().push((axis, value));
        }

        fn button_changed(&self, _gamepad: &GamepadIdentity, button: u16, pressed: bool) {
            self.buttons.lock().push((button, pressed));
        }
    }

    fn pad() -> (Arc<VirtualHidDevice>, GamepadDevice) {
        let hid = Arc::new(VirtualHidDevice::gamepad(0x1420_0000, 0x045e, 0x028e, "Controller"));
        let gamepad = GamepadDevice::new(hid.clone(), 1, 0);
        (hid, gamepad)
    }

    fn axis(usage: u16, value: i32) -> HidValue {
        HidValue::new(USAGE_PAGE_GENERIC_DESKTOP, usage, value)
    }

    #[test]
    fn test_vendor_product_key() {
        let (_hid, gamepad) = pad();
        assert_eq!(gamepad.vendor_product_id(), 0x045e_028e);
        assert_eq!(gamepad.vendor_product_string(), "045e028e");

        let hid = Arc::new(VirtualHidDevice::gamepad(1, 0x000a, 0x00b1, "Pad"));
        let gamepad = GamepadDevice::new(hid, 2, 1);
        assert_eq!(gamepad.vendor_product_string(), "000a00b1");
    }

    #[test]
    fn test_axes_default_to_zero() {
        let (_hid, gamepad) = pad();
        let values = gamepad.current_axis_values();
        assert_eq!(values.len(), 6);
        assert!(values.values().all(|&v| v == 0.0));
        assert_eq!(gamepad.axis_value(AxisId::Rz), 0.0);
    }

    #[test]
    fn test_reports_update_state() {
        let (hid, gamepad) = pad();
        gamepad.register_for_events().unwrap();

        hid.push(axis(USAGE_X, 255));
        hid.push(axis(USAGE_Y, 0));
        hid.push(HidValue::button(3, true));

        let values = gamepad.current_axis_values();
        assert_eq!(values[&AxisId::X], 1.0);
        assert_eq!(values[&AxisId::Y], -1.0);
        assert!(gamepad.is_button_pressed(3));
        assert!(!gamepad.is_button_pressed(4));
    }

    #[test]
    fn test_hat_switch() {
        let (hid, gamepad) = pad();
        gamepad.register_for_events().unwrap();

        hid.push(axis(USAGE_HAT_SWITCH, 3));
        assert_eq!(gamepad.axis_value(AxisId::HatX), 1.0);
        assert_eq!(gamepad.axis_value(AxisId::HatY), 1.0);

        // Null state
        hid.push(axis(USAGE_HAT_SWITCH, 8));
        assert_eq!(gamepad.axis_value(AxisId::HatX), 0.0);
        assert_eq!(gamepad.axis_value(AxisId::HatY), 0.0);

        let four_way = HidElement::new(USAGE_PAGE_GENERIC_DESKTOP, USAGE_HAT_SWITCH, 0, 3);
        assert_eq!(hat_direction(&four_way, 1), (1.0, 0.0));
        assert_eq!(hat_direction(&four_way, 3), (-1.0, 0.0));
    }

    #[test]
    fn test_hat_switch_full_range() {
        let wide = HidElement::new(USAGE_PAGE_GENERIC_DESKTOP, USAGE_HAT_SWITCH, i32::MIN, i32::MAX);
        assert_eq!(hat_direction(&wide, i32::MIN), (0.0, -1.0));
        assert_eq!(hat_direction(&wide, 0), (0.0, 1.0));
        assert_eq!(hat_direction(&wide, i32::MAX), (-1.0, -1.0));
    }

    #[test]
    fn test_normalize() {
        let signed = HidElement::new(USAGE_PAGE_GENERIC_DESKTOP, USAGE_X, -32768, 32767);
        assert_eq!(normalize(&signed, -32768), -1.0);
        assert_eq!(normalize(&signed, 32767), 1.0);
        assert!(normalize(&signed, 0).abs() < 0.001);

        let degenerate = HidElement::new(USAGE_PAGE_GENERIC_DESKTOP, USAGE_X, 5, 5);
        assert_eq!(normalize(&degenerate, 5), 0.0);
    }

    #[test]
    fn test_delegate_notifications() {
        let (hid, gamepad) = pad();
        let recorder = Arc::new(Recorder::default());
        let delegate: Arc<dyn GamepadDelegate> = recorder.clone();
        gamepad.set_delegate(Some(Arc::downgrade(&delegate)));
        gamepad.register_for_events().unwrap();

        hid.push(HidValue::button(1, true));
        hid.push(HidValue::button(1, true));
        hid.push(axis(USAGE_HAT_SWITCH, 2));

        assert_eq!(*recorder.connects.lock(), 1);
        assert_eq!(*recorder.buttons.lock(), vec![(1, true)]);
        assert_eq!(*recorder.axes.lock(), vec![(AxisId::HatX, 1.0)]);
    }

    #[test]
    fn test_reports_after_disconnect_are_dropped() {
        let (hid, gamepad) = pad();
        let recorder = Arc::new(Recorder::default());
        let delegate: Arc<dyn GamepadDelegate> = recorder.clone();
        gamepad.set_delegate(Some(Arc::downgrade(&delegate)));
        gamepad.register_for_events().unwrap();

        hid.push(HidValue::button(2, true));
        gamepad.disconnect();
        gamepad.disconnect();
        hid.push(HidValue::button(5, true));

        assert!(!gamepad.is_button_pressed(2));
        assert!(!gamepad.is_button_pressed(5));
        assert_eq!(recorder.buttons.lock().len(), 1);
        assert_eq!(*recorder.disconnects.lock(), 1);
    }

    #[test]
    fn test_register_unavailable_device() {
        let (hid, gamepad) = pad();
        hid.disconnect();
        assert_eq!(
            gamepad.register_for_events(),
            Err(InputError::DeviceUnavailable {
                location_id: 0x1420_0000
            })
        );
    }

    #[test]
    fn test_register_twice() {
        let (_hid, gamepad) = pad();
        gamepad.register_for_events().unwrap();
        assert!(matches!(
            gamepad.register_for_events(),
            Err(InputError::AlreadyRegistered(_))
        ));
    }

    #[test]
    fn test_dropped_gamepad_ignores_reports() {
        let (hid, gamepad) = pad();
        gamepad.register_for_events().unwrap();
        drop(gamepad);
        assert!(hid.push(HidValue::button(1, true)));
    }
}
