use std::{
    borrow::Borrow,
    collections::HashMap,
    hash::Hash,
    time::{Duration, Instant},
};

/// Last action time per subject, suppressing repeats within a fixed window.
///
/// Files and subsystems each get their own instance so one never blocks the
/// other.
#[derive(Debug, Clone)]
pub struct Cooldown<K> {
    window: Duration,
    last_action: HashMap<K, Instant>,
}

impl<K: Eq + Hash> Cooldown<K> {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            last_action: HashMap::new(),
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// True while `key` acted less than `window` before `now`.
    pub fn is_cooling<Q>(&self, key: &Q, now: Instant) -> bool
    where
        K: Borrow<Q>,
        Q: Eq + Hash + ?Sized,
    {
        self.remaining(key, now).is_some()
    }

    /// Time left before `key` may act again, if any.
    pub fn remaining<Q>(&self, key: &Q, now: Instant) -> Option<Duration>
    where
        K: Borrow<Q>,
        Q: Eq + Hash + ?Sized,
    {
        let last = self.last_action.get(key)?;
        let elapsed = now.saturating_duration_since(*last);
        (elapsed < self.window).then(|| self.window - elapsed)
    }

    pub fn last<Q>(&self, key: &Q) -> Option<Instant>
    where
        K: Borrow<Q>,
        Q: Eq + Hash + ?Sized,
    {
        self.last_action.get(key).copied()
    }

    pub fn mark(&mut self, key: K, now: Instant) {
        self.last_action.insert(key, now);
    }

    pub fn clear<Q>(&mut self, key: &Q)
    where
        K: Borrow<Q>,
        Q: Eq + Hash + ?Sized,
    {
        self.last_action.remove(key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn window_boundary_is_exclusive() {
        let start = Instant::now();
        let mut cooldown = Cooldown::new(Duration::from_secs(300));
        assert!(!cooldown.is_cooling("bot.py", start));

        cooldown.mark("bot.py".to_string(), start);
        assert!(cooldown.is_cooling("bot.py", start + Duration::from_secs(299)));
        assert!(!cooldown.is_cooling("bot.py", start + Duration::from_secs(300)));
        assert!(!cooldown.is_cooling("config.py", start));
        assert_eq!(
            cooldown.remaining("bot.py", start + Duration::from_secs(100)),
            Some(Duration::from_secs(200))
        );
    }

    proptest! {
        #[test]
        fn cooling_matches_elapsed(window in 1u64..10_000, elapsed in 0u64..20_000) {
            let start = Instant::now();
            let mut cooldown = Cooldown::new(Duration::from_secs(window));
            cooldown.mark(1u8, start);
            let cooling = cooldown.is_cooling(&1u8, start + Duration::from_secs(elapsed));
            prop_assert_eq!(cooling, elapsed < window);
        }
    }
}
