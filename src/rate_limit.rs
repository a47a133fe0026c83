use std::collections::{HashMap, hash_map};
use std::hash::Hash;
use std::time::Duration;

use instant::Instant;


#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct RateLimit {
    pub window: Duration,
    pub max_messages: u32,
}

impl Default for RateLimit {
    fn default() -> Self {
        RateLimit {
            window: Duration::from_millis(1000),
            max_messages: 50,
        }
    }
}

#[derive(Clone, Copy, Debug)]
struct RateWindow {
    count: u32,
    window_end: Instant,
}

// Fixed-window message counter per connection. A burst straddling a window boundary may get
// up to twice the limit through; this is accepted.
pub struct RateLimiter<K> {
    limit: RateLimit,
    windows: HashMap<K, RateWindow>,
}

impl<K: Eq + Hash> RateLimiter<K> {
    pub fn new(limit: RateLimit) -> Self {
        RateLimiter { limit, windows: HashMap::new() }
    }

    // Registers an incoming message. Returns whether it should be processed.
    pub fn admit(&mut self, key: K, now: Instant) -> bool {
        let fresh_window = RateWindow { count: 1, window_end: now + self.limit.window };
        match self.windows.entry(key) {
            hash_map::Entry::Vacant(e) => {
                e.insert(fresh_window);
                true
            }
            hash_map::Entry::Occupied(mut e) => {
                let window = e.get_mut();
                if now > window.window_end {
                    *window = fresh_window;
                    true
                } else if window.count >= self.limit.max_messages {
                    false
                } else {
                    window.count += 1;
                    true
                }
            }
        }
    }

    pub fn forget(&mut self, key: &K) { self.windows.remove(key); }

    #[cfg(test)]
    pub fn num_tracked(&self) -> usize { self.windows.len() }
}
