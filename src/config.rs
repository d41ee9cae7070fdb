use chrono::FixedOffset;

/// Largest UTC offset chrono accepts (UTC+14 / UTC-14), in minutes.
const MAX_TZ_OFFSET_MINUTES: i32 = 14 * 60;

/// Runtime configuration for the scheduling engine.
///
/// Every knob is read from the environment with a sensible default, so the
/// binary starts with no setup. Capacity ceilings are per deployed recruiter
/// resource: one process schedules one recruiter's calendar.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Length of each bookable slot in minutes.
    pub slot_duration_minutes: u32,
    /// Hard ceiling on interviews per calendar day.
    pub daily_capacity: u32,
    /// Hard ceiling on interviews per ISO week.
    pub weekly_capacity: u32,
    /// Recruiter time zone as a fixed UTC offset in minutes.
    pub tz_offset_minutes: i32,
    /// How many days ahead the engine looks for open slots.
    pub engine_window_days: u32,
    /// Days a queue entry may wait before it expires.
    pub queue_ttl_days: i64,
    /// HTTP listen port.
    pub port: u16,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            slot_duration_minutes: 30,
            daily_capacity: 20,
            weekly_capacity: 100,
            tz_offset_minutes: 0,
            engine_window_days: 14,
            queue_ttl_days: 30,
            port: 8080,
        }
    }
}

impl SchedulerConfig {
    /// Builds the configuration from environment variables, falling back to
    /// defaults for anything unset or unparseable.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            slot_duration_minutes: env_or("SLOT_DURATION_MINUTES", defaults.slot_duration_minutes),
            daily_capacity: env_or("DAILY_CAPACITY", defaults.daily_capacity),
            weekly_capacity: env_or("WEEKLY_CAPACITY", defaults.weekly_capacity),
            tz_offset_minutes: env_or("TZ_OFFSET_MINUTES", defaults.tz_offset_minutes)
                .clamp(-MAX_TZ_OFFSET_MINUTES, MAX_TZ_OFFSET_MINUTES),
            engine_window_days: env_or("ENGINE_WINDOW_DAYS", defaults.engine_window_days),
            queue_ttl_days: env_or("QUEUE_TTL_DAYS", defaults.queue_ttl_days),
            port: env_or("PORT", defaults.port),
        }
    }

    /// The recruiter time zone. The offset is clamped on load, so the
    /// conversion cannot fail.
    pub fn tz(&self) -> FixedOffset {
        let seconds = self.tz_offset_minutes.clamp(-MAX_TZ_OFFSET_MINUTES, MAX_TZ_OFFSET_MINUTES) * 60;
        FixedOffset::east_opt(seconds).expect("offset clamped to valid range")
    }
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}
