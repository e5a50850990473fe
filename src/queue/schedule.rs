use std::time::Duration;

/// Recurring-producer schedule for `enqueue`'s `cronPattern` option. This
/// is deliberately a narrow subset, not a general cron parser: the only
/// recurring job the core requires (`slot:reclaim-expired-holds`, every
/// 5 minutes) is a fixed-minute interval.
#[derive(Debug, Clone, Copy)]
pub enum Schedule {
    Interval(Duration),
    /// Restricted to `*/N * * * *` — fire every N minutes, every hour,
    /// every day. Anything else fails to parse.
    Cron { every_minutes: u32 },
}

impl Schedule {
    pub fn interval(&self) -> Duration {
        match self {
            Schedule::Interval(d) => *d,
            Schedule::Cron { every_minutes } => Duration::from_secs(u64::from(*every_minutes) * 60),
        }
    }

    /// Parses the `*/N * * * *` subset. Returns `None` for anything else,
    /// including full cron expressions this core does not attempt to
    /// support.
    pub fn parse_cron(pattern: &str) -> Option<Schedule> {
        let fields: Vec<&str> = pattern.split_whitespace().collect();
        if fields.len() != 5 {
            return None;
        }
        let [minute, hour, dom, month, dow] = [fields[0], fields[1], fields[2], fields[3], fields[4]];
        if hour != "*" || dom != "*" || month != "*" || dow != "*" {
            return None;
        }
        let every_minutes = minute.strip_prefix("*/")?.parse::<u32>().ok()?;
        if every_minutes == 0 {
            return None;
        }
        Some(Schedule::Cron { every_minutes })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_the_reclaim_job_pattern() {
        let schedule = Schedule::parse_cron("*/5 * * * *").unwrap();
        assert_eq!(schedule.interval(), Duration::from_secs(5 * 60));
    }

    #[test]
    fn rejects_patterns_outside_the_supported_subset() {
        assert!(Schedule::parse_cron("0 0 * * *").is_none());
        assert!(Schedule::parse_cron("*/5 * * * 1-5").is_none());
        assert!(Schedule::parse_cron("not a cron").is_none());
    }
}
