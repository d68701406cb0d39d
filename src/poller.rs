//! Adaptive polling coordinator: produces timer ticks tagged by channel.
//!
//! The Poller only produces ticks; screens wire ticks to
//! `Pool::fetch_if_stale`. Mirrors the backoff shape in
//! `loadbalance/adaptive.rs`'s per-instance metrics map: one entry per
//! channel, guarded by a single lock.

use std::collections::HashMap;
use std::time::Duration;

use parking_lot::Mutex;
use rand::Rng;

#[derive(Debug, Clone, Copy)]
pub struct PollerConfig {
    pub default_base: Duration,
    pub default_background: Duration,
    pub default_max: Duration,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            default_base: Duration::from_secs(10),
            default_background: Duration::from_secs(30),
            default_max: Duration::from_secs(120),
        }
    }
}

struct Channel {
    base: Duration,
    background: Duration,
    max: Duration,
    miss_count: u32,
    current: Duration,
    focused: bool,
}

pub struct Poller {
    config: PollerConfig,
    channels: Mutex<HashMap<String, Channel>>,
}

impl Poller {
    pub fn new(config: PollerConfig) -> Self {
        Self {
            config,
            channels: Mutex::new(HashMap::new()),
        }
    }

    /// Registers `tag` with explicit cadences, or does nothing if already
    /// registered.
    pub fn register(&self, tag: &str, base: Duration, background: Duration, max: Duration) {
        let mut channels = self.channels.lock();
        channels.entry(tag.to_string()).or_insert(Channel {
            base,
            background,
            max,
            miss_count: 0,
            current: base,
            focused: true,
        });
    }

    fn ensure(&self, channels: &mut HashMap<String, Channel>, tag: &str) {
        channels.entry(tag.to_string()).or_insert(Channel {
            base: self.config.default_base,
            background: self.config.default_background,
            max: self.config.default_max,
            miss_count: 0,
            current: self.config.default_base,
            focused: true,
        });
    }

    /// Current recommended tick period for `tag`.
    pub fn current(&self, tag: &str) -> Duration {
        let mut channels = self.channels.lock();
        self.ensure(&mut channels, tag);
        channels[tag].current
    }

    pub fn record_hit(&self, tag: &str) {
        let mut channels = self.channels.lock();
        self.ensure(&mut channels, tag);
        let channel = channels.get_mut(tag).unwrap();
        channel.miss_count = 0;
        channel.current = if channel.focused {
            channel.base
        } else {
            channel.background
        };
    }

    pub fn record_miss(&self, tag: &str) {
        let mut channels = self.channels.lock();
        self.ensure(&mut channels, tag);
        let channel = channels.get_mut(tag).unwrap();
        channel.miss_count += 1;
        let mut next = channel.current * 2;
        if !channel.max.is_zero() && next >= channel.max {
            next = channel.max;
        }
        channel.current = next;
    }

    pub fn set_focused(&self, tag: &str, focused: bool) {
        let mut channels = self.channels.lock();
        self.ensure(&mut channels, tag);
        let channel = channels.get_mut(tag).unwrap();
        channel.focused = focused;
        channel.current = if focused {
            channel.base
        } else {
            channel.background
        };
    }

    /// A one-shot timer that fires after the channel's current period.
    /// Callers `select!` on this alongside other work; it does not spawn a
    /// task itself — the screen, not the Pool or the Poller, owns the timer.
    pub async fn schedule(&self, tag: &str) {
        let period = self.current(tag);
        if period.is_zero() {
            std::future::pending::<()>().await;
        } else {
            tokio::time::sleep(jitter(period)).await;
        }
    }
}

/// +/-10% jitter so channels sharing a period don't all wake in lockstep —
/// the advertised period from `current()` stays exact; only the actual
/// sleep is spread out.
fn jitter(period: Duration) -> Duration {
    let millis = period.as_millis() as i64;
    let spread = (millis / 10).max(1);
    let offset = rand::rng().random_range(-spread..=spread);
    Duration::from_millis((millis + offset).max(0) as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hit_resets_and_miss_doubles_with_cap() {
        let poller = Poller::new(PollerConfig::default());
        poller.register(
            "people",
            Duration::from_secs(10),
            Duration::from_secs(30),
            Duration::from_secs(120),
        );

        assert_eq!(poller.current("people"), Duration::from_secs(10));
        poller.record_miss("people");
        assert_eq!(poller.current("people"), Duration::from_secs(20));
        poller.record_miss("people");
        assert_eq!(poller.current("people"), Duration::from_secs(40));
        poller.record_hit("people");
        assert_eq!(poller.current("people"), Duration::from_secs(10));

        poller.set_focused("people", false);
        assert_eq!(poller.current("people"), Duration::from_secs(30));

        for _ in 0..10 {
            poller.record_miss("people");
        }
        assert_eq!(poller.current("people"), Duration::from_secs(120));
    }

    #[test]
    fn jitter_stays_within_ten_percent() {
        let period = Duration::from_secs(10);
        for _ in 0..100 {
            let jittered = jitter(period);
            assert!(jittered >= Duration::from_millis(9000));
            assert!(jittered <= Duration::from_millis(11000));
        }
    }
}
