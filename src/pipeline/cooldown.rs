use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Per-class alert throttle.
///
/// A class is admitted when at least `interval` has passed since its last
/// admission; the check and the update happen under one lock.
pub struct CooldownGate {
    interval: Duration,
    last_admitted: Mutex<HashMap<String, Instant>>,
}

impl CooldownGate {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_admitted: Mutex::new(HashMap::new()),
        }
    }

    pub fn admit(&self, label: &str, now: Instant) -> bool {
        let mut last_admitted = self.last_admitted.lock();

        if let Some(&last) = last_admitted.get(label) {
            // A `now` earlier than `last` saturates to zero and is rejected
            let elapsed = now.saturating_duration_since(last);
            if elapsed < self.interval {
                tracing::debug!(
                    "Alert blocked for {} - {:.1}s remaining",
                    label,
                    (self.interval - elapsed).as_secs_f64()
                );
                return false;
            }
        }

        last_admitted.insert(label.to_string(), now);
        tracing::debug!("Alert approved for {}", label);
        true
    }

    pub fn last_admitted(&self, label: &str) -> Option<Instant> {
        self.last_admitted.lock().get(label).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    const COOLDOWN: Duration = Duration::from_secs(5);

    #[test]
    fn first_occurrence_always_passes() {
        let gate = CooldownGate::new(COOLDOWN);
        assert!(gate.admit("severe", Instant::now()));
    }

    #[test]
    fn blocks_within_cooldown() {
        let gate = CooldownGate::new(COOLDOWN);
        let t0 = Instant::now();
        assert!(gate.admit("severe", t0));
        assert!(!gate.admit("severe", t0 + Duration::from_secs(2)));
        assert!(!gate.admit("severe", t0 + Duration::from_millis(4999)));
        // Rejection leaves the admitted time untouched
        assert_eq!(gate.last_admitted("severe"), Some(t0));
    }

    #[test]
    fn admits_at_exact_boundary_and_moves_timestamp() {
        let gate = CooldownGate::new(COOLDOWN);
        let t0 = Instant::now();
        assert!(gate.admit("fall", t0));
        let t1 = t0 + COOLDOWN;
        assert!(gate.admit("fall", t1));
        assert_eq!(gate.last_admitted("fall"), Some(t1));
        assert!(!gate.admit("fall", t1 + Duration::from_secs(1)));
    }

    #[test]
    fn classes_are_independent() {
        let gate = CooldownGate::new(COOLDOWN);
        let t0 = Instant::now();
        assert!(gate.admit("severe", t0));
        assert!(gate.admit("moderate", t0 + Duration::from_secs(1)));
    }

    #[test]
    fn earlier_timestamp_is_rejected() {
        let gate = CooldownGate::new(COOLDOWN);
        let t0 = Instant::now() + Duration::from_secs(60);
        assert!(gate.admit("fall", t0));
        assert!(!gate.admit("fall", t0 - Duration::from_secs(30)));
    }

    #[test]
    fn concurrent_callers_admit_once() {
        let gate = Arc::new(CooldownGate::new(COOLDOWN));
        let now = Instant::now();
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let gate = Arc::clone(&gate);
                std::thread::spawn(move || gate.admit("severe", now))
            })
            .collect();

        let admitted = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|&ok| ok)
            .count();
        assert_eq!(admitted, 1);
    }
}
