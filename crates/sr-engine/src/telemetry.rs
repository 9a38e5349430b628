//! Lock-free telemetry from the render path
//!
//! Values are plain atomic stores. A reader may miss intermediate updates;
//! only the latest value is kept. Module meters come and go with rack edits;
//! those changes travel to the control plane over a wait-free queue.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use rtrb::{Consumer, Producer, PushError, RingBuffer};
use sr_dsp::metering::LOUDNESS_FLOOR;

/// Atomic float for lock-free metering
#[derive(Debug)]
pub struct AtomicF64(AtomicU64);

impl AtomicF64 {
    pub fn new(value: f64) -> Self {
        Self(AtomicU64::new(value.to_bits()))
    }

    pub fn load(&self) -> f64 {
        f64::from_bits(self.0.load(Ordering::Relaxed))
    }

    pub fn store(&self, value: f64) {
        self.0.store(value.to_bits(), Ordering::Relaxed);
    }
}

impl Default for AtomicF64 {
    fn default() -> Self {
        Self::new(0.0)
    }
}

// ============ Strip meters ============

/// Peak and RMS of a strip's post-fader signal (dBFS)
#[derive(Debug)]
pub struct MeterData {
    pub peak: AtomicF64,
    pub rms: AtomicF64,
}

impl MeterData {
    pub fn new() -> Self {
        Self {
            peak: AtomicF64::new(-120.0),
            rms: AtomicF64::new(-120.0),
        }
    }

    /// Store linear readings as dBFS
    pub fn publish(&self, peak: f64, rms: f64) {
        self.peak.store(to_dbfs(peak));
        self.rms.store(to_dbfs(rms));
    }
}

impl Default for MeterData {
    fn default() -> Self {
        Self::new()
    }
}

#[inline]
fn to_dbfs(linear: f64) -> f64 {
    20.0 * linear.max(1e-6).log10()
}

// ============ Module meters ============

/// Telemetry posted by one rack processor
#[derive(Debug)]
pub struct ModuleMeter {
    /// Largest gain reduction over the last period (dB, positive)
    pub gain_reduction: AtomicF64,
    /// Momentary loudness (LUFS)
    pub momentary: AtomicF64,
    /// Short-term loudness (LUFS)
    pub short_term: AtomicF64,
    updates: AtomicU64,
}

impl ModuleMeter {
    pub fn new() -> Self {
        Self {
            gain_reduction: AtomicF64::new(0.0),
            momentary: AtomicF64::new(LOUDNESS_FLOOR),
            short_term: AtomicF64::new(LOUDNESS_FLOOR),
            updates: AtomicU64::new(0),
        }
    }

    pub fn publish_gain_reduction(&self, db: f64) {
        self.gain_reduction.store(db);
        self.updates.fetch_add(1, Ordering::Release);
    }

    pub fn publish_loudness(&self, momentary: f64, short_term: f64) {
        self.momentary.store(momentary);
        self.short_term.store(short_term);
        self.updates.fetch_add(1, Ordering::Release);
    }

    /// Number of posts so far
    pub fn updates(&self) -> u64 {
        self.updates.load(Ordering::Acquire)
    }
}

impl Default for ModuleMeter {
    fn default() -> Self {
        Self::new()
    }
}

// ============ Throttle ============

/// Counts rendered audio and fires once per period
#[derive(Debug, Clone)]
pub(crate) enum Throttle {
    /// Period in samples
    Samples { period: usize, elapsed: usize },
    /// Period in render blocks
    Blocks { period: u32, elapsed: u32 },
}

impl Throttle {
    pub(crate) fn samples(period: usize) -> Self {
        Throttle::Samples {
            period: period.max(1),
            elapsed: 0,
        }
    }

    pub(crate) fn blocks(period: u32) -> Self {
        Throttle::Blocks {
            period: period.max(1),
            elapsed: 0,
        }
    }

    /// Milliseconds at a sample rate, at least one sample
    pub(crate) fn millis(ms: f64, sample_rate: f64) -> Self {
        Self::samples((ms * 0.001 * sample_rate).round().max(1.0) as usize)
    }

    /// Account for one rendered block of `frames`; true when a post is due
    #[inline]
    pub(crate) fn tick(&mut self, frames: usize) -> bool {
        match self {
            Throttle::Samples { period, elapsed } => {
                *elapsed += frames;
                if *elapsed >= *period {
                    *elapsed %= *period;
                    true
                } else {
                    false
                }
            }
            Throttle::Blocks { period, elapsed } => {
                *elapsed += 1;
                if *elapsed >= *period {
                    *elapsed = 0;
                    true
                } else {
                    false
                }
            }
        }
    }

    pub(crate) fn reset(&mut self) {
        match self {
            Throttle::Samples { elapsed, .. } => *elapsed = 0,
            Throttle::Blocks { elapsed, .. } => *elapsed = 0,
        }
    }
}

// ============ Bridge ============

/// Module meter address: owning strip and module id
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MeterKey {
    pub strip: String,
    pub module: String,
}

impl MeterKey {
    pub fn new(strip: impl Into<String>, module: impl Into<String>) -> Self {
        Self {
            strip: strip.into(),
            module: module.into(),
        }
    }
}

/// Registry change queued by the render path
#[derive(Debug)]
pub enum MeterEvent {
    Register(MeterKey, Arc<ModuleMeter>),
    Unregister(MeterKey),
}

/// Capacity of the registry change queue
const METER_EVENT_CAPACITY: usize = 256;

/// Render-side end of the meter registry.
///
/// Pushes never block; events that do not fit wait in a backlog and go out
/// on the next flush.
pub struct MeterPublisher {
    tx: Producer<MeterEvent>,
    backlog: VecDeque<MeterEvent>,
}

impl MeterPublisher {
    pub fn publish(&mut self, events: impl IntoIterator<Item = MeterEvent>) {
        self.backlog.extend(events);
        self.flush();
    }

    pub fn flush(&mut self) {
        while let Some(event) = self.backlog.pop_front() {
            if let Err(PushError::Full(event)) = self.tx.push(event) {
                self.backlog.push_front(event);
                log::debug!("meter queue full, {} events deferred", self.backlog.len());
                break;
            }
        }
    }

    /// Events not yet handed to the control plane
    pub fn pending(&self) -> usize {
        self.backlog.len()
    }
}

struct Registry {
    rx: Consumer<MeterEvent>,
    modules: HashMap<MeterKey, Arc<ModuleMeter>>,
}

impl Registry {
    fn sync(&mut self) -> &HashMap<MeterKey, Arc<ModuleMeter>> {
        while let Ok(event) = self.rx.pop() {
            match event {
                MeterEvent::Register(key, meter) => {
                    self.modules.insert(key, meter);
                }
                MeterEvent::Unregister(key) => {
                    self.modules.remove(&key);
                }
            }
        }
        &self.modules
    }
}

/// Shared meter state between the render path and the control plane.
///
/// Strip levels and the transport position are atomics. The module meter
/// registry is owned by the control plane: the render path only queues
/// changes through its [`MeterPublisher`], and readers apply them on lookup.
pub struct MeterBridge {
    pub master: Arc<MeterData>,
    /// Transport position (seconds)
    pub position: AtomicF64,
    registry: Mutex<Registry>,
}

impl MeterBridge {
    /// Bridge plus the publisher the render path registers meters through
    pub fn channel() -> (Arc<Self>, MeterPublisher) {
        let (tx, rx) = RingBuffer::new(METER_EVENT_CAPACITY);
        let bridge = Arc::new(Self {
            master: Arc::new(MeterData::new()),
            position: AtomicF64::new(0.0),
            registry: Mutex::new(Registry {
                rx,
                modules: HashMap::new(),
            }),
        });
        let publisher = MeterPublisher {
            tx,
            backlog: VecDeque::new(),
        };
        (bridge, publisher)
    }

    /// Meter of a module currently instantiated on `strip`
    pub fn module(&self, strip: &str, module: &str) -> Option<Arc<ModuleMeter>> {
        self.registry
            .lock()
            .sync()
            .get(&MeterKey::new(strip, module))
            .cloned()
    }

    /// Registered meters, sorted by strip then module
    pub fn module_keys(&self) -> Vec<MeterKey> {
        let mut keys: Vec<MeterKey> = self.registry.lock().sync().keys().cloned().collect();
        keys.sort();
        keys
    }
}
