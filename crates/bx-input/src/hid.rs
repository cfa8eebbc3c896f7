//! HID device abstraction
//!
//! Platform backends expose each controller as a [`HidDevice`]: static
//! identity, the list of input elements it reports and an asynchronous
//! value callback. [`VirtualHidDevice`] is an in-process implementation
//! used for tests and for hosts that synthesize controllers.

use bx_core::error::InputError;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Generic Desktop usage page
pub const USAGE_PAGE_GENERIC_DESKTOP: u16 = 0x01;
/// Button usage page
pub const USAGE_PAGE_BUTTON: u16 = 0x09;

pub const USAGE_X: u16 = 0x30;
pub const USAGE_Y: u16 = 0x31;
pub const USAGE_Z: u16 = 0x32;
pub const USAGE_RX: u16 = 0x33;
pub const USAGE_RY: u16 = 0x34;
pub const USAGE_RZ: u16 = 0x35;
pub const USAGE_HAT_SWITCH: u16 = 0x39;

/// Combine a usage page and usage into one key
pub const fn raw_usage(usage_page: u16, usage: u16) -> u32 {
    ((usage_page as u32) << 16) | usage as u32
}

/// One input element a device reports
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HidElement {
    pub usage_page: u16,
    pub usage: u16,
    pub logical_min: i32,
    pub logical_max: i32,
}

impl HidElement {
    pub const fn new(usage_page: u16, usage: u16, logical_min: i32, logical_max: i32) -> Self {
        Self {
            usage_page,
            usage,
            logical_min,
            logical_max,
        }
    }

    pub const fn raw_usage(&self) -> u32 {
        raw_usage(self.usage_page, self.usage)
    }
}

/// A value change reported by a device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HidValue {
    pub usage_page: u16,
    pub usage: u16,
    pub value: i32,
}

impl HidValue {
    pub const fn new(usage_page: u16, usage: u16, value: i32) -> Self {
        Self {
            usage_page,
            usage,
            value,
        }
    }

    pub const fn button(number: u16, pressed: bool) -> Self {
        Self::new(USAGE_PAGE_BUTTON, number, pressed as i32)
    }

    pub const fn raw_usage(&self) -> u32 {
        raw_usage(self.usage_page, self.usage)
    }
}

/// Callback invoked on the device's report thread
pub type ReportCallback = Box<dyn Fn(HidValue) + Send + Sync>;

/// A human-interface device as seen by the input layer
pub trait HidDevice: Send + Sync {
    /// Port-stable identifier, distinct for identical devices
    fn location_id(&self) -> u32;
    fn vendor_id(&self) -> u16;
    fn product_id(&self) -> u16;
    fn name(&self) -> &str;

    fn is_connected(&self) -> bool;

    /// Input elements this device can report
    fn elements(&self) -> Vec<HidElement>;

    /// Start delivering value changes to `callback`
    fn subscribe(&self, callback: ReportCallback) -> Result<(), InputError>;
}

/// In-process HID device driven by [`VirtualHidDevice::push`]
pub struct VirtualHidDevice {
    location_id: u32,
    vendor_id: u16,
    product_id: u16,
    name: String,
    elements: Vec<HidElement>,
    connected: AtomicBool,
    callbacks: Mutex<Vec<Arc<ReportCallback>>>,
}

impl VirtualHidDevice {
    pub fn new(
        location_id: u32,
        vendor_id: u16,
        product_id: u16,
        name: impl Into<String>,
        elements: Vec<HidElement>,
    ) -> Self {
        Self {
            location_id,
            vendor_id,
            product_id,
            name: name.into(),
            elements,
            connected: AtomicBool::new(true),
            callbacks: Mutex::new(Vec::new()),
        }
    }

    /// A typical USB pad: two 8-bit sticks, an 8-way hat and ten buttons
    pub fn gamepad(location_id: u32, vendor_id: u16, product_id: u16, name: impl Into<String>) -> Self {
        let mut elements = vec![
            HidElement::new(USAGE_PAGE_GENERIC_DESKTOP, USAGE_X, 0, 255),
            HidElement::new(USAGE_PAGE_GENERIC_DESKTOP, USAGE_Y, 0, 255),
            HidElement::new(USAGE_PAGE_GENERIC_DESKTOP, USAGE_RX, 0, 255),
            HidElement::new(USAGE_PAGE_GENERIC_DESKTOP, USAGE_RY, 0, 255),
            HidElement::new(USAGE_PAGE_GENERIC_DESKTOP, USAGE_HAT_SWITCH, 0, 7),
        ];
        elements.extend((1..=10).map(|n| HidElement::new(USAGE_PAGE_BUTTON, n, 0, 1)));
        Self::new(location_id, vendor_id, product_id, name, elements)
    }

    /// Deliver a value change to every subscriber. Returns false when the
    /// device is disconnected and the report went nowhere.
    pub fn push(&self, value: HidValue) -> bool {
        if !self.is_connected() {
            return false;
        }
        let callbacks = self.callbacks.lock().clone();
        for callback in &callbacks {
            callback(value);
        }
        true
    }

    /// Simulate unplugging the device. Subscriptions are dropped.
    pub fn disconnect(&self) {
        self.connected.store(false, Ordering::Release);
        self.callbacks.lock().clear();
    }

    pub fn subscriber_count(&self) -> usize {
        self.callbacks.lock().len()
    }
}

impl HidDevice for VirtualHidDevice {
    fn location_id(&self) -> u32 {
        self.location_id
    }

    fn vendor_id(&self) -> u16 {
        self.vendor_id
    }

    fn product_id(&self) -> u16 {
        self.product_id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    fn elements(&self) -> Vec<HidElement> {
        self.elements.clone()
    }

    fn subscribe(&self, callback: ReportCallback) -> Result<(), InputError> {
        if !self.is_connected() {
            return Err(InputError::DeviceUnavailable {
                location_id: self.location_id,
            });
        }
        self.callbacks.lock().push(Arc::new(callback));
        Ok(())
    }
}
