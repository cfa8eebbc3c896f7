//! Test pattern machine
//!
//! A stand-in core that needs no ROM data. It renders a solid background
//! with an animated stripe so a front end can tell the loop is alive, and
//! produces a square-wave tone whose pitch follows player one's first button.

use super::{AudioFormat, Machine, MachineFactory};
use crate::config::{MachineConfig, TestPatternConfig};
use crate::error::{CoreFault, InitError};
use crate::frame::{Frame, Geometry};
use crate::input::{InputState, LogicalButtons};

/// ROM name served by [`TestPatternFactory`]
pub const TEST_PATTERN_ROM: &str = "testpattern";

const AMPLITUDE: i16 = 4000;
const BASE_TONE_HZ: f64 = 440.0;
const STRIPE_HEIGHT: u32 = 4;

pub struct TestPatternMachine {
    geometry: Geometry,
    pixels: Vec<u8>,
    frame_rate: f64,
    format: AudioFormat,
    samples: Vec<i16>,
    /// Fractional audio frames carried between steps
    sample_carry: f64,
    phase: f64,
    input: InputState,
    frame_count: u64,
    fault_after: Option<u64>,
}

impl TestPatternMachine {
    pub fn new(config: &TestPatternConfig) -> Result<Self, InitError> {
        if config.width == 0 || config.height == 0 {
            return Err(InitError::UnsupportedConfig(format!(
                "empty screen {}x{}",
                config.width, config.height
            )));
        }
        if config.bytes_per_pixel != 2 && config.bytes_per_pixel != 4 {
            return Err(InitError::UnsupportedConfig(format!(
                "{} bytes per pixel",
                config.bytes_per_pixel
            )));
        }
        if !(config.frame_rate > 0.0) || config.sample_rate == 0 {
            return Err(InitError::UnsupportedConfig(format!(
                "timing {} Hz / {} Hz",
                config.frame_rate, config.sample_rate
            )));
        }

        let geometry = Geometry::new(config.width, config.height, config.bytes_per_pixel)
            .with_rotation(config.rotated);

        Ok(Self {
            geometry,
            pixels: vec![0; geometry.buffer_len()],
            frame_rate: config.frame_rate,
            format: AudioFormat::new(config.sample_rate, 2),
            samples: Vec::new(),
            sample_carry: 0.0,
            phase: 0.0,
            input: InputState::default(),
            frame_count: 0,
            fault_after: config.fault_after,
        })
    }

    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    fn render(&mut self) {
        let player = self.input.player(0).copied().unwrap_or_default();
        let base = if player.is_pressed(LogicalButtons::BUTTON1) {
            [0x80, 0x10, 0x10]
        } else {
            [0x10, 0x10, 0x50]
        };

        let stripe_y = (self.frame_count as u32 * 2) % self.geometry.height;
        let bpp = self.geometry.bytes_per_pixel as usize;
        let pitch = self.geometry.pitch();

        for y in 0..self.geometry.height {
            let in_stripe = (y + self.geometry.height - stripe_y) % self.geometry.height < STRIPE_HEIGHT;
            let [r, g, b] = if in_stripe { [0xff, 0xff, 0xff] } else { base };
            let row = &mut self.pixels[y as usize * pitch..(y as usize + 1) * pitch];
            for pixel in row.chunks_exact_mut(bpp) {
                write_pixel(pixel, r, g, b);
            }
        }
    }

    fn synthesize(&mut self) {
        let wanted = self.format.sample_rate as f64 / self.frame_rate + self.sample_carry;
        let frames = wanted.floor();
        self.sample_carry = wanted - frames;

        let pressed = self
            .input
            .player(0)
            .is_some_and(|p| p.is_pressed(LogicalButtons::BUTTON1));
        let tone = if pressed { BASE_TONE_HZ * 2.0 } else { BASE_TONE_HZ };
        let step = tone / self.format.sample_rate as f64;

        for _ in 0..frames as usize {
            let value = if self.phase < 0.5 { AMPLITUDE } else { -AMPLITUDE };
            for _ in 0..self.format.channels {
                self.samples.push(value);
            }
            self.phase = (self.phase + step).fract();
        }
    }
}

fn write_pixel(pixel: &mut [u8], r: u8, g: u8, b: u8) {
    match pixel.len() {
        4 => pixel.copy_from_slice(&[b, g, r, 0xff]),
        2 => {
            let rgb565 = ((r as u16 >> 3) << 11) | ((g as u16 >> 2) << 5) | (b as u16 >> 3);
            pixel.copy_from_slice(&rgb565.to_le_bytes());
        }
        _ => {}
    }
}

impl Machine for TestPatternMachine {
    fn name(&self) -> &str {
        TEST_PATTERN_ROM
    }

    fn frame_rate(&self) -> f64 {
        self.frame_rate
    }

    fn audio_format(&self) -> AudioFormat {
        self.format
    }

    fn set_input(&mut self, input: &InputState) {
        self.input = *input;
    }

    fn step(&mut self) -> Result<(), CoreFault> {
        if let Some(limit) = self.fault_after {
            if self.frame_count >= limit {
                return Err(CoreFault::UnsupportedOpcode {
                    addr: 0x0000_1000 + self.frame_count as u32,
                    opcode: 0xffff,
                });
            }
        }

        self.render();
        self.synthesize();
        self.frame_count += 1;
        Ok(())
    }

    fn current_frame(&self) -> Frame<'_> {
        Frame::new(self.geometry, &self.pixels)
    }

    fn drain_audio_samples(&mut self, out: &mut Vec<i16>) {
        out.append(&mut self.samples);
    }
}

/// Factory serving the test pattern under the `testpattern` ROM name
#[derive(Debug, Clone, Copy, Default)]
pub struct TestPatternFactory;

impl MachineFactory for TestPatternFactory {
    fn create(&self, config: &MachineConfig) -> Result<Box<dyn Machine>, InitError> {
        if config.rom_name != TEST_PATTERN_ROM {
            let archive = config.rom_path.join(format!("{}.zip", config.rom_name));
            return Err(InitError::MissingAsset(archive.display().to_string()));
        }

        let machine = TestPatternMachine::new(&config.test_pattern)?;
        tracing::info!(
            "Test pattern machine: {}x{} @ {} Hz",
            config.test_pattern.width,
            config.test_pattern.height,
            config.test_pattern.frame_rate
        );
        Ok(Box::new(machine))
    }
}
