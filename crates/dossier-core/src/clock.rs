use chrono::{DateTime, Duration, Utc};
use std::sync::Mutex;

/// Injectable time source so TTL decisions are testable without wall-clock
/// time.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock that only moves when told to. Used by cache tests.
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn advance_hours(&self, hours: f64) {
        let mut now = self.now.lock().unwrap();
        *now += Duration::seconds((hours * 3600.0) as i64);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }
}

#[derive(Debug, Clone)]
pub struct CacheEntry<T> {
    pub value: T,
    pub created_at: DateTime<Utc>,
}

/// Pure freshness predicate: the entry is fresh iff it is younger than
/// `ttl_hours` as of `now`.
pub fn is_fresh<T>(entry: &CacheEntry<T>, ttl_hours: f64, now: DateTime<Utc>) -> bool {
    let age = now.signed_duration_since(entry.created_at);
    let ttl_secs = (ttl_hours * 3600.0) as i64;
    age.num_seconds() < ttl_secs
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_fresh_boundaries() {
        let created = Utc::now();
        let entry = CacheEntry {
            value: (),
            created_at: created,
        };

        assert!(is_fresh(&entry, 24.0, created + Duration::hours(23)));
        assert!(!is_fresh(&entry, 24.0, created + Duration::hours(24)));
        assert!(!is_fresh(&entry, 24.0, created + Duration::hours(25)));
    }

    #[test]
    fn test_manual_clock_advances() {
        let clock = ManualClock::new(Utc::now());
        let t0 = clock.now();
        clock.advance_hours(2.5);
        let dt = clock.now().signed_duration_since(t0);
        assert_eq!(dt.num_seconds(), 9000);
    }
}
