use std::{
    cell::{Cell, RefCell},
    io::Write,
    time::{Duration, Instant, SystemTime, UNIX_EPOCH},
};

use rand::{rngs::SmallRng, Rng, SeedableRng};

/// Execution bounds for a single top-level call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    pub max_steps: u64,
    pub max_depth: usize,
    pub deadline: Option<Instant>,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_steps: 200_000,
            max_depth: 64,
            deadline: None,
        }
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Captured {
    pub stdout: String,
    pub stderr: String,
}

impl Captured {
    pub fn is_empty(&self) -> bool {
        self.stdout.is_empty() && self.stderr.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stream {
    Stdout,
    Stderr,
}

/// The world as seen by interpreted code: console streams, randomness, the
/// clock and execution limits.
#[derive(Debug)]
pub struct Host {
    captures: RefCell<Vec<Captured>>,
    rng: RefCell<SmallRng>,
    limits: Cell<Limits>,
    uuid_counter: Cell<u64>,
}

impl Default for Host {
    fn default() -> Self {
        Self::new(SmallRng::from_entropy())
    }
}

impl Host {
    fn new(rng: SmallRng) -> Self {
        Self {
            captures: RefCell::default(),
            rng: RefCell::new(rng),
            limits: Cell::new(Limits::default()),
            uuid_counter: Cell::new(0),
        }
    }
    pub fn seeded(seed: u64) -> Self {
        Self::new(SmallRng::seed_from_u64(seed))
    }

    pub fn reseed(&self, seed: u64) {
        *self.rng.borrow_mut() = SmallRng::seed_from_u64(seed);
    }
    pub fn with_rng<T>(&self, f: impl FnOnce(&mut SmallRng) -> T) -> T {
        f(&mut self.rng.borrow_mut())
    }

    pub fn limits(&self) -> Limits {
        self.limits.get()
    }
    pub fn set_limits(&self, limits: Limits) {
        self.limits.set(limits);
    }
    /// Runs `f` under `limits`, restoring the previous limits afterwards.
    pub fn with_limits<T>(&self, limits: Limits, f: impl FnOnce() -> T) -> T {
        let prev = self.limits.replace(limits);
        let res = f();
        self.limits.set(prev);
        res
    }
    pub fn with_deadline<T>(&self, timeout: Option<Duration>, f: impl FnOnce() -> T) -> T {
        let limits = Limits {
            deadline: timeout.map(|t| Instant::now() + t),
            ..self.limits()
        };
        self.with_limits(limits, f)
    }

    /// Runs `f` with console output redirected into a buffer.
    pub fn capture<T>(&self, f: impl FnOnce() -> T) -> (T, Captured) {
        self.captures.borrow_mut().push(Captured::default());
        let res = f();
        let captured = self.captures.borrow_mut().pop().unwrap_or_default();
        (res, captured)
    }

    pub fn write(&self, stream: Stream, text: &str) {
        if let Some(top) = self.captures.borrow_mut().last_mut() {
            match stream {
                Stream::Stdout => top.stdout.push_str(text),
                Stream::Stderr => top.stderr.push_str(text),
            }
            return;
        }
        let _ = match stream {
            Stream::Stdout => std::io::stdout().write_all(text.as_bytes()),
            Stream::Stderr => std::io::stderr().write_all(text.as_bytes()),
        };
    }

    /// Seconds since the unix epoch.
    pub fn now(&self) -> f64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs_f64())
            .unwrap_or_default()
    }

    pub fn uuid4(&self) -> String {
        let bits: u128 = self.with_rng(|rng| rng.gen());
        format_uuid(bits & !(0xf << 76) | (0x4 << 76))
    }
    pub fn uuid1(&self) -> String {
        let n = self.uuid_counter.get() + 1;
        self.uuid_counter.set(n);
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or_default();
        format_uuid((nanos << 64) ^ n as u128)
    }
}

fn format_uuid(bits: u128) -> String {
    let hex = format!("{bits:032x}");
    format!(
        "{}-{}-{}-{}-{}",
        &hex[0..8],
        &hex[8..12],
        &hex[12..16],
        &hex[16..20],
        &hex[20..32]
    )
}
