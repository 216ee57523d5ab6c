//! Fixed window and window key computation.

use std::fmt;

/// A fixed time slice of `interval` milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    /// `floor(now / interval)`
    pub index: i64,
    /// Epoch milliseconds when the next window begins
    pub reset: i64,
}

impl Window {
    /// The window containing `now_millis`. `interval` must be positive.
    pub fn at(now_millis: i64, interval: i64) -> Self {
        let index = now_millis.div_euclid(interval);
        Self {
            index,
            reset: (index + 1).saturating_mul(interval),
        }
    }
}

/// Cache key for one identifier in one window.
///
/// Two requests share a key iff they fall in the same fixed window for the
/// same identifier and shard.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WindowKey {
    pub identifier: String,
    pub window: i64,
    pub shard: Option<String>,
}

impl WindowKey {
    pub fn new(identifier: &str, window: Window, shard: Option<&str>) -> Self {
        Self {
            identifier: identifier.to_string(),
            window: window.index,
            shard: shard.map(str::to_string),
        }
    }
}

impl fmt::Display for WindowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}::{}::{}",
            self.identifier,
            self.window,
            self.shard.as_deref().unwrap_or_default()
        )
    }
}
