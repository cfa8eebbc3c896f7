//! Video frame types shared between the run loop and presentation consumers

use crate::error::CoreFault;
use serde::{Deserialize, Serialize};

/// A width/height pair in pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Size {
    pub width: u32,
    pub height: u32,
}

impl Size {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// Shape of the video output produced by an emulation core
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Geometry {
    /// Width of the rendered bitmap in pixels
    pub width: u32,
    /// Height of the rendered bitmap in pixels
    pub height: u32,
    /// Bytes per pixel (2 for RGB565, 4 for XRGB8888)
    pub bytes_per_pixel: u32,
    /// The bitmap is rendered in portrait orientation and must be rotated
    /// by the presentation side
    pub rotated: bool,
}

impl Geometry {
    pub const fn new(width: u32, height: u32, bytes_per_pixel: u32) -> Self {
        Self {
            width,
            height,
            bytes_per_pixel,
            rotated: false,
        }
    }

    pub const fn with_rotation(mut self, rotated: bool) -> Self {
        self.rotated = rotated;
        self
    }

    /// Bytes per row
    pub fn pitch(&self) -> usize {
        self.width as usize * self.bytes_per_pixel as usize
    }

    /// Total buffer length in bytes
    pub fn buffer_len(&self) -> usize {
        self.pitch() * self.height as usize
    }

    /// Size of the image as it should appear on screen, after rotation
    pub fn display_size(&self) -> Size {
        if self.rotated {
            Size::new(self.height, self.width)
        } else {
            Size::new(self.width, self.height)
        }
    }
}

/// Borrowed view of the pixels an emulation core produced for one step
#[derive(Debug, Clone, Copy)]
pub struct Frame<'a> {
    pub geometry: Geometry,
    pub pixels: &'a [u8],
}

impl<'a> Frame<'a> {
    pub fn new(geometry: Geometry, pixels: &'a [u8]) -> Self {
        Self { geometry, pixels }
    }
}

/// Producer-owned frame buffer handed to presentation consumers
///
/// The buffer length always equals `width * height * bytes_per_pixel`.
/// Storage is only reallocated when the geometry changes.
#[derive(Debug, Clone)]
pub struct FrameBuffer {
    geometry: Geometry,
    pixels: Vec<u8>,
}

impl FrameBuffer {
    pub fn new(geometry: Geometry) -> Self {
        Self {
            geometry,
            pixels: vec![0; geometry.buffer_len()],
        }
    }

    pub fn geometry(&self) -> Geometry {
        self.geometry
    }

    pub fn width(&self) -> u32 {
        self.geometry.width
    }

    pub fn height(&self) -> u32 {
        self.geometry.height
    }

    pub fn bytes_per_pixel(&self) -> u32 {
        self.geometry.bytes_per_pixel
    }

    pub fn is_rotated(&self) -> bool {
        self.geometry.rotated
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    /// Copy a core frame into this buffer.
    ///
    /// Returns `true` when the geometry changed and the buffer was
    /// reallocated. A frame whose pixel slice does not match its declared
    /// geometry means the core is in an undefined state.
    pub fn copy_from(&mut self, frame: &Frame<'_>) -> Result<bool, CoreFault> {
        let expected = frame.geometry.buffer_len();
        if frame.pixels.len() != expected {
            return Err(CoreFault::CorruptState(format!(
                "frame of {}x{}x{} carries {} bytes, expected {}",
                frame.geometry.width,
                frame.geometry.height,
                frame.geometry.bytes_per_pixel,
                frame.pixels.len(),
                expected
            )));
        }

        let changed = frame.geometry != self.geometry;
        if changed {
            self.geometry = frame.geometry;
            self.pixels = vec![0; expected];
        }
        self.pixels.copy_from_slice(frame.pixels);

        Ok(changed)
    }
}
