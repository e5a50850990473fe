use std::time::Duration;

/// Runtime configuration, loaded from the environment. Every field has
/// a documented default; `from_env` only ever overlays it, it never
/// panics on a missing or malformed variable.
#[derive(Debug, Clone)]
pub struct Config {
    pub max_concurrent_bookings_per_user: u32,
    pub max_booking_advance_days: i64,
    pub booking_cancellation_window_hours: i64,
    pub slot_lock_ttl: Duration,
    pub availability_cache_ttl: Duration,
    pub worker_concurrency: usize,
    pub queue_rate_max: u32,
    pub queue_rate_window: Duration,
    /// Per-subscriber event bus buffer size; implementation-chosen, not
    /// something callers are expected to tune often.
    pub event_bus_subscriber_buffer: usize,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            max_concurrent_bookings_per_user: 5,
            max_booking_advance_days: 90,
            booking_cancellation_window_hours: 24,
            slot_lock_ttl: Duration::from_millis(15_000),
            availability_cache_ttl: Duration::from_secs(60),
            worker_concurrency: 5,
            queue_rate_max: 50,
            queue_rate_window: Duration::from_millis(1_000),
            event_bus_subscriber_buffer: 64,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let defaults = Config::default();

        let config = Config {
            max_concurrent_bookings_per_user: env_parse("MAX_CONCURRENT_BOOKINGS_PER_USER", defaults.max_concurrent_bookings_per_user),
            max_booking_advance_days: env_parse("MAX_BOOKING_ADVANCE_DAYS", defaults.max_booking_advance_days),
            booking_cancellation_window_hours: env_parse("BOOKING_CANCELLATION_WINDOW_HOURS", defaults.booking_cancellation_window_hours),
            slot_lock_ttl: Duration::from_millis(env_parse("SLOT_LOCK_TTL_MS", defaults.slot_lock_ttl.as_millis() as u64)),
            availability_cache_ttl: Duration::from_secs(env_parse("AVAILABILITY_CACHE_TTL_S", defaults.availability_cache_ttl.as_secs())),
            worker_concurrency: env_parse("WORKER_CONCURRENCY", defaults.worker_concurrency),
            queue_rate_max: env_parse("QUEUE_RATE_MAX", defaults.queue_rate_max),
            queue_rate_window: Duration::from_millis(env_parse("QUEUE_RATE_WINDOW_MS", defaults.queue_rate_window.as_millis() as u64)),
            event_bus_subscriber_buffer: env_parse("EVENT_BUS_SUBSCRIBER_BUFFER", defaults.event_bus_subscriber_buffer),
        };

        log::info!(
            "config loaded: max_concurrent_bookings_per_user={} max_booking_advance_days={} \
             booking_cancellation_window_hours={} slot_lock_ttl={:?} availability_cache_ttl={:?} \
             worker_concurrency={} queue_rate={}/{:?}",
            config.max_concurrent_bookings_per_user,
            config.max_booking_advance_days,
            config.booking_cancellation_window_hours,
            config.slot_lock_ttl,
            config.availability_cache_ttl,
            config.worker_concurrency,
            config.queue_rate_max,
            config.queue_rate_window,
        );

        config
    }
}

fn env_parse<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_documented_table() {
        let config = Config::default();
        assert_eq!(config.max_concurrent_bookings_per_user, 5);
        assert_eq!(config.max_booking_advance_days, 90);
        assert_eq!(config.booking_cancellation_window_hours, 24);
        assert_eq!(config.slot_lock_ttl, Duration::from_millis(15_000));
        assert_eq!(config.availability_cache_ttl, Duration::from_secs(60));
        assert_eq!(config.worker_concurrency, 5);
        assert_eq!(config.queue_rate_max, 50);
        assert_eq!(config.queue_rate_window, Duration::from_millis(1_000));
    }

    #[test]
    fn malformed_env_falls_back_to_default() {
        unsafe {
            std::env::set_var("MAX_BOOKING_ADVANCE_DAYS", "not-a-number");
        }
        let config = Config::from_env();
        assert_eq!(config.max_booking_advance_days, 90);
        unsafe {
            std::env::remove_var("MAX_BOOKING_ADVANCE_DAYS");
        }
    }
}
