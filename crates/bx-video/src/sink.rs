//! Frame fan-out to presentation consumers
//!
//! The run loop is the only producer. Every callback runs synchronously on
//! the producer thread, and the frame buffer is lent for the duration of the
//! call only.

use crate::observer::{ObserverSet, Registered};
use bx_core::config::VideoConfig;
use bx_core::frame::{FrameBuffer, Geometry, Size};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Presentation consumer. Every capability is optional.
pub trait FrameObserver: Send + Sync {
    /// The displayed size of the emulated screen changed
    fn screen_size_did_change(&self, _size: Size) {}

    /// (Re)create whatever texture backs frames of this geometry
    fn init_texture(&self, _geometry: &Geometry) {}

    /// A new frame is ready. The buffer must not be retained.
    fn render_frame(&self, _frame: &FrameBuffer) {}

    /// The output surface was resized by the host
    fn output_did_resize(&self, _size: Size) {}
}

/// What an observer has been told so far
#[derive(Debug, Default)]
pub struct TextureState {
    screen_size: Mutex<Option<Size>>,
    geometry: Mutex<Option<Geometry>>,
}

impl TextureState {
    /// Screen size last announced to this observer
    pub fn screen_size(&self) -> Option<Size> {
        *self.screen_size.lock()
    }

    /// Geometry this observer last initialized a texture for
    pub fn geometry(&self) -> Option<Geometry> {
        *self.geometry.lock()
    }

    fn set_screen_size(&self, size: Size) {
        *self.screen_size.lock() = Some(size);
    }

    fn set(&self, geometry: Geometry) {
        *self.geometry.lock() = Some(geometry);
    }
}

/// Placement of the emulated screen inside the output surface
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

type Observers = ObserverSet<dyn FrameObserver, TextureState>;

/// Thread-safe multicast registry of frame observers
pub struct FrameSink {
    observers: Observers,
    output_size: Mutex<Size>,
    keep_aspect: bool,
    integer_scale: bool,
    /// Geometry most recently announced by the producer
    geometry: Mutex<Option<Geometry>>,
    frames: AtomicU64,
}

impl FrameSink {
    pub fn new(config: &VideoConfig) -> Self {
        Self {
            observers: ObserverSet::new(),
            output_size: Mutex::new(config.output_size),
            keep_aspect: config.keep_aspect,
            integer_scale: config.integer_scale,
            geometry: Mutex::new(None),
            frames: AtomicU64::new(0),
        }
    }

    /// Register an observer. Returns false if it was already registered.
    pub fn add_observer(&self, observer: &Arc<dyn FrameObserver>) -> bool {
        let added = self.observers.add(observer);
        if added {
            tracing::debug!("Frame observer added ({} total)", self.observers.len());
        }
        added
    }

    /// Unregister an observer. It receives nothing further, including on a
    /// dispatch pass already in progress.
    pub fn remove_observer(&self, observer: &Arc<dyn FrameObserver>) -> bool {
        let removed = self.observers.remove(observer);
        if removed {
            tracing::debug!("Frame observer removed ({} left)", self.observers.len());
        }
        removed
    }

    pub fn observer_count(&self) -> usize {
        self.observers.len()
    }

    /// Geometry of the frames currently being produced
    pub fn geometry(&self) -> Option<Geometry> {
        *self.geometry.lock()
    }

    /// Frames dispatched so far
    pub fn frames_delivered(&self) -> u64 {
        self.frames.load(Ordering::Relaxed)
    }

    pub fn screen_size_did_change(&self, size: Size) {
        tracing::debug!("Screen size changed to {}x{}", size.width, size.height);
        self.observers.for_each(|r| {
            r.observer().screen_size_did_change(size);
            r.state().set_screen_size(size);
        });
    }

    /// Announce a new frame geometry to every observer. An observer that
    /// missed the matching screen size (added since) gets it first.
    pub fn init_texture(&self, geometry: &Geometry) {
        *self.geometry.lock() = Some(*geometry);
        self.observers.for_each(|r| {
            announce_screen_size(r, geometry.display_size());
            r.observer().init_texture(geometry);
            r.state().set(*geometry);
        });
    }

    /// Deliver a frame. Observers that have not seen this geometry yet
    /// (late registrations) are brought up to date first.
    pub fn render_frame(&self, frame: &FrameBuffer) {
        let geometry = frame.geometry();
        let delivered = self.observers.for_each(|r| {
            catch_up(r, &geometry);
            r.observer().render_frame(frame);
        });

        self.frames.fetch_add(1, Ordering::Relaxed);
        tracing::trace!("Frame delivered to {} observers", delivered);
    }

    /// Store a new output surface size and tell observers about it
    pub fn resize_output(&self, size: Size) {
        *self.output_size.lock() = size;
        tracing::debug!("Output resized to {}x{}", size.width, size.height);
        self.observers.for_each(|r| r.observer().output_did_resize(size));
    }

    pub fn output_size(&self) -> Size {
        *self.output_size.lock()
    }

    /// Where a frame of `geometry` lands inside the current output surface
    pub fn presentation_rect(&self, geometry: &Geometry) -> Rect {
        presentation_rect(
            geometry.display_size(),
            self.output_size(),
            self.keep_aspect,
            self.integer_scale,
        )
    }
}

fn catch_up(registered: &Registered<dyn FrameObserver, TextureState>, geometry: &Geometry) {
    if registered.state().geometry() == Some(*geometry) {
        return;
    }

    let observer = registered.observer();
    observer.screen_size_did_change(geometry.display_size());
    registered.state().set_screen_size(geometry.display_size());
    observer.init_texture(geometry);
    registered.state().set(*geometry);
}

fn announce_screen_size(registered: &Registered<dyn FrameObserver, TextureState>, size: Size) {
    if registered.state().screen_size() != Some(size) {
        registered.observer().screen_size_did_change(size);
        registered.state().set_screen_size(size);
    }
}

/// Fit `screen` into `output`, centered
pub fn presentation_rect(screen: Size, output: Size, keep_aspect: bool, integer_scale: bool) -> Rect {
    if screen.is_empty() || output.is_empty() {
        return Rect::default();
    }

    let (width, height) = if !keep_aspect {
        (output.width, output.height)
    } else {
        let sx = output.width as f64 / screen.width as f64;
        let sy = output.height as f64 / screen.height as f64;
        let mut scale = sx.min(sy);
        if integer_scale {
            scale = scale.floor().max(1.0);
        }
        (
            (screen.width as f64 * scale).round() as u32,
            (screen.height as f64 * scale).round() as u32,
        )
    };

    Rect {
        x: (output.width as i32 - width as i32) / 2,
        y: (output.height as i32 - height as i32) / 2,
        width,
        height,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    enum Event {
        Size(Size),
        Texture(Geometry),
        Frame(Geometry),
        Output(Size),
    }

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<Event>>,
    }

    impl Recorder {
        fn events(&self) -> Vec<Event> {
            self.events.lock().clone()
        }
    }

    impl FrameObserver for Recorder {
        fn screen_size_did_change(&self, size: Size) {
            self.events.lock().push(Event::Size(size));
        }

        fn init_texture(&self, geometry: &Geometry) {
            self.events.lock().push(Event::Texture(*geometry));
        }

        fn render_frame(&self, frame: &FrameBuffer) {
            self.events.lock().push(Event::Frame(frame.geometry()));
        }

        fn output_did_resize(&self, size: Size) {
            self.events.lock().push(Event::Output(size));
        }
    }

    /// Implements nothing at all
    struct Silent;
    impl FrameObserver for Silent {}

    fn sink() -> FrameSink {
        FrameSink::new(&VideoConfig::default())
    }

    fn announce(sink: &FrameSink, buffer: &FrameBuffer) {
        sink.screen_size_did_change(buffer.geometry().display_size());
        sink.init_texture(&buffer.geometry());
    }

    #[test]
    fn test_texture_precedes_frames() {
        let sink = sink();
        let recorder = Arc::new(Recorder::default());
        let observer: Arc<dyn FrameObserver> = recorder.clone();
        sink.add_observer(&observer);

        let geometry = Geometry::new(4, 2, 4);
        let buffer = FrameBuffer::new(geometry);
        announce(&sink, &buffer);
        sink.render_frame(&buffer);
        sink.render_frame(&buffer);

        assert_eq!(
            recorder.events(),
            vec![
                Event::Size(Size::new(4, 2)),
                Event::Texture(geometry),
                Event::Frame(geometry),
                Event::Frame(geometry),
            ]
        );
        assert_eq!(sink.frames_delivered(), 2);
    }

    #[test]
    fn test_late_observer_catches_up() {
        let sink = sink();
        let geometry = Geometry::new(4, 2, 4).with_rotation(true);
        let buffer = FrameBuffer::new(geometry);
        announce(&sink, &buffer);
        sink.render_frame(&buffer);

        let recorder = Arc::new(Recorder::default());
        let observer: Arc<dyn FrameObserver> = recorder.clone();
        sink.add_observer(&observer);
        sink.render_frame(&buffer);

        assert_eq!(
            recorder.events(),
            vec![
                Event::Size(Size::new(2, 4)),
                Event::Texture(geometry),
                Event::Frame(geometry),
            ]
        );
    }

    #[test]
    fn test_observer_added_during_size_change_gets_size_first() {
        struct Adder {
            sink: Arc<FrameSink>,
            newcomer: Arc<dyn FrameObserver>,
        }
        impl FrameObserver for Adder {
            fn screen_size_did_change(&self, _size: Size) {
                self.sink.add_observer(&self.newcomer);
            }
        }

        let sink = Arc::new(sink());
        let newcomer = Arc::new(Recorder::default());
        let newcomer_dyn: Arc<dyn FrameObserver> = newcomer.clone();
        let adder: Arc<dyn FrameObserver> = Arc::new(Adder {
            sink: Arc::clone(&sink),
            newcomer: newcomer_dyn.clone(),
        });
        sink.add_observer(&adder);

        let geometry = Geometry::new(6, 4, 4);
        let buffer = FrameBuffer::new(geometry);
        announce(&sink, &buffer);
        sink.render_frame(&buffer);

        assert_eq!(
            newcomer.events(),
            vec![
                Event::Size(Size::new(6, 4)),
                Event::Texture(geometry),
                Event::Frame(geometry),
            ]
        );
    }

    #[test]
    fn test_size_not_repeated_for_announced_observers() {
        let sink = sink();
        let recorder = Arc::new(Recorder::default());
        let observer: Arc<dyn FrameObserver> = recorder.clone();
        sink.add_observer(&observer);

        // Same display size, different pixel format
        let first = FrameBuffer::new(Geometry::new(4, 2, 4));
        let second = FrameBuffer::new(Geometry::new(4, 2, 2));
        announce(&sink, &first);
        sink.render_frame(&first);
        sink.init_texture(&second.geometry());
        sink.render_frame(&second);

        let sizes = recorder
            .events()
            .iter()
            .filter(|e| matches!(e, Event::Size(_)))
            .count();
        assert_eq!(sizes, 1);
    }

    #[test]
    fn test_geometry_change_reannounces_once() {
        let sink = sink();
        let recorder = Arc::new(Recorder::default());
        let observer: Arc<dyn FrameObserver> = recorder.clone();
        sink.add_observer(&observer);

        let first = FrameBuffer::new(Geometry::new(4, 2, 4));
        let second = FrameBuffer::new(Geometry::new(8, 8, 2));
        announce(&sink, &first);
        sink.render_frame(&first);
        announce(&sink, &second);
        sink.render_frame(&second);

        let textures = recorder
            .events()
            .iter()
            .filter(|e| matches!(e, Event::Texture(_)))
            .count();
        assert_eq!(textures, 2);
        assert_eq!(sink.geometry(), Some(second.geometry()));
    }

    #[test]
    fn test_removed_observer_gets_nothing() {
        let sink = Arc::new(sink());
        let buffer = FrameBuffer::new(Geometry::new(2, 2, 4));

        let victim = Arc::new(Recorder::default());
        let victim_dyn: Arc<dyn FrameObserver> = victim.clone();

        struct Remover {
            sink: Arc<FrameSink>,
            target: Arc<dyn FrameObserver>,
        }
        impl FrameObserver for Remover {
            fn render_frame(&self, _frame: &FrameBuffer) {
                self.sink.remove_observer(&self.target);
            }
        }

        let remover: Arc<dyn FrameObserver> = Arc::new(Remover {
            sink: Arc::clone(&sink),
            target: victim_dyn.clone(),
        });
        let tail = Arc::new(Recorder::default());
        let tail_dyn: Arc<dyn FrameObserver> = tail.clone();

        sink.add_observer(&remover);
        sink.add_observer(&victim_dyn);
        sink.add_observer(&tail_dyn);
        sink.render_frame(&buffer);

        assert!(victim.events().iter().all(|e| !matches!(e, Event::Frame(_))));
        assert_eq!(
            tail.events().iter().filter(|e| matches!(e, Event::Frame(_))).count(),
            1
        );
        assert_eq!(sink.observer_count(), 2);
    }

    #[test]
    fn test_partial_observer() {
        let sink = sink();
        let silent: Arc<dyn FrameObserver> = Arc::new(Silent);
        sink.add_observer(&silent);
        assert!(!sink.add_observer(&silent));

        let buffer = FrameBuffer::new(Geometry::new(2, 2, 4));
        announce(&sink, &buffer);
        sink.render_frame(&buffer);
        sink.resize_output(Size::new(10, 10));
        assert_eq!(sink.frames_delivered(), 1);
    }

    #[test]
    fn test_resize_output() {
        let sink = sink();
        let recorder = Arc::new(Recorder::default());
        let observer: Arc<dyn FrameObserver> = recorder.clone();
        sink.add_observer(&observer);

        sink.resize_output(Size::new(1280, 720));
        assert_eq!(sink.output_size(), Size::new(1280, 720));
        assert_eq!(recorder.events(), vec![Event::Output(Size::new(1280, 720))]);
    }

    #[test]
    fn test_presentation_rect() {
        // 384x224 into 1280x720: height bound, scale 720/224
        let rect = presentation_rect(Size::new(384, 224), Size::new(1280, 720), true, false);
        assert_eq!(rect.height, 720);
        assert_eq!(rect.width, 1234);
        assert_eq!(rect.x, 23);
        assert_eq!(rect.y, 0);

        let rect = presentation_rect(Size::new(384, 224), Size::new(1280, 720), true, true);
        assert_eq!((rect.width, rect.height), (1152, 672));
        assert_eq!((rect.x, rect.y), (64, 24));

        let rect = presentation_rect(Size::new(384, 224), Size::new(1280, 720), false, false);
        assert_eq!(rect, Rect { x: 0, y: 0, width: 1280, height: 720 });

        // Smaller output than the screen still yields at least 1x when integer scaling
        let rect = presentation_rect(Size::new(384, 224), Size::new(200, 100), true, true);
        assert_eq!((rect.width, rect.height), (384, 224));
        assert!(rect.x < 0);
    }

    #[test]
    fn test_presentation_rect_rotated() {
        let sink = sink();
        sink.resize_output(Size::new(448, 768));
        let geometry = Geometry::new(384, 224, 4).with_rotation(true);
        let rect = sink.presentation_rect(&geometry);
        assert_eq!(rect, Rect { x: 0, y: 0, width: 448, height: 768 });
    }
}
