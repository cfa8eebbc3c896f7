//! Gamepad hot-plug handling
//!
//! Platform discovery code runs on whatever thread the OS calls back on and
//! only pushes [`HotplugEvent`]s into a channel. The session drains that
//! channel with [`GamepadManager::poll`], so device registration never races
//! with emulation.

use crate::gamepad::{GamepadDelegate, GamepadDevice};
use crate::hid::HidDevice;
use bx_core::error::InputError;
use crossbeam::channel::{unbounded, Receiver, Sender, TryRecvError};
use std::sync::{Arc, Weak};

/// Device arrival or removal
pub enum HotplugEvent {
    DeviceAdded(Arc<dyn HidDevice>),
    DeviceRemoved { location_id: u32 },
}

impl std::fmt::Debug for HotplugEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DeviceAdded(device) => f
                .debug_struct("DeviceAdded")
                .field("location_id", &device.location_id())
                .field("name", &device.name())
                .finish(),
            Self::DeviceRemoved { location_id } => f
                .debug_struct("DeviceRemoved")
                .field("location_id", location_id)
                .finish(),
        }
    }
}

/// Handle used by discovery code to report devices
#[derive(Clone)]
pub struct HotplugSender {
    tx: Sender<HotplugEvent>,
}

impl HotplugSender {
    pub fn device_added(&self, device: Arc<dyn HidDevice>) {
        // The manager owns the receiver; a send can only fail after it is gone
        let _ = self.tx.send(HotplugEvent::DeviceAdded(device));
    }

    pub fn device_removed(&self, location_id: u32) {
        let _ = self.tx.send(HotplugEvent::DeviceRemoved { location_id });
    }
}

/// Tracks connected gamepads and their player slots
pub struct GamepadManager {
    tx: Sender<HotplugEvent>,
    rx: Receiver<HotplugEvent>,
    /// Sorted by index
    gamepads: Vec<GamepadDevice>,
    next_id: u64,
    delegate: Option<Weak<dyn GamepadDelegate>>,
}

impl GamepadManager {
    pub fn new() -> Self {
        let (tx, rx) = unbounded();
        Self {
            tx,
            rx,
            gamepads: Vec::new(),
            next_id: 1,
            delegate: None,
        }
    }

    pub fn sender(&self) -> HotplugSender {
        HotplugSender {
            tx: self.tx.clone(),
        }
    }

    /// Delegate for every current and future gamepad
    pub fn set_delegate(&mut self, delegate: Option<Weak<dyn GamepadDelegate>>) {
        for gamepad in &self.gamepads {
            gamepad.set_delegate(delegate.clone());
        }
        self.delegate = delegate;
    }

    /// Process queued hot-plug events. Returns how many were handled.
    pub fn poll(&mut self) -> usize {
        let mut handled = 0;
        loop {
            match self.rx.try_recv() {
                Ok(event) => {
                    self.handle(event);
                    handled += 1;
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }
        handled
    }

    fn handle(&mut self, event: HotplugEvent) {
        match event {
            HotplugEvent::DeviceAdded(device) => {
                if let Err(e) = self.add_device(device) {
                    tracing::warn!("Gamepad excluded: {}", e);
                }
            }
            HotplugEvent::DeviceRemoved { location_id } => {
                self.remove_device(location_id);
            }
        }
    }

    /// Register a device and assign it the lowest free player slot
    pub fn add_device(&mut self, device: Arc<dyn HidDevice>) -> Result<GamepadDevice, InputError> {
        let location_id = device.location_id();
        if self.by_location(location_id).is_some() {
            return Err(InputError::AlreadyRegistered(location_id));
        }

        let index = self.free_index();
        let gamepad = GamepadDevice::new(device, self.next_id, index);
        gamepad.set_delegate(self.delegate.clone());
        gamepad.register_for_events()?;

        self.next_id += 1;
        let position = self
            .gamepads
            .iter()
            .position(|g| g.index() > index)
            .unwrap_or(self.gamepads.len());
        self.gamepads.insert(position, gamepad.clone());

        tracing::info!(
            "Gamepad connected: {} [{}] as player {}",
            gamepad.name(),
            gamepad.vendor_product_string(),
            index + 1
        );
        Ok(gamepad)
    }

    /// Forget a device and free its slot
    pub fn remove_device(&mut self, location_id: u32) -> Option<GamepadDevice> {
        let position = self
            .gamepads
            .iter()
            .position(|g| g.location_id() == location_id)?;
        let gamepad = self.gamepads.remove(position);
        gamepad.disconnect();
        tracing::info!(
            "Gamepad disconnected: {} (player {})",
            gamepad.name(),
            gamepad.index() + 1
        );
        Some(gamepad)
    }

    fn free_index(&self) -> usize {
        // Sorted by index, so the first gap is the lowest free slot
        self.gamepads
            .iter()
            .enumerate()
            .find(|(slot, g)| g.index() != *slot)
            .map(|(slot, _)| slot)
            .unwrap_or(self.gamepads.len())
    }

    /// Connected gamepads in slot order
    pub fn gamepads(&self) -> &[GamepadDevice] {
        &self.gamepads
    }

    pub fn by_index(&self, index: usize) -> Option<&GamepadDevice> {
        self.gamepads.iter().find(|g| g.index() == index)
    }

    pub fn by_location(&self, location_id: u32) -> Option<&GamepadDevice> {
        self.gamepads.iter().find(|g| g.location_id() == location_id)
    }

    pub fn len(&self) -> usize {
        self.gamepads.len()
    }

    pub fn is_empty(&self) -> bool {
        self.gamepads.is_empty()
    }
}

impl Default for GamepadManager {
    fn default() -> Self {
        Self::new()
    }
}
