use crate::domain::transaction::Category;
use std::collections::HashSet;
use std::time::Duration;

/// Tunables for the retry scheduler, processor and dispatcher.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retry attempts per transaction.
    pub max_attempts: u32,
    /// Delay before attempt `n + 1`, indexed by the current retry count.
    /// Counts past the end reuse the last entry.
    pub backoff_schedule: Vec<Duration>,
    /// Upper bound on a single idle wait of the processor.
    pub max_idle_wait: Duration,
    /// Pause between processed batches.
    pub batch_pause: Duration,
    /// Timeout imposed on every settlement collaborator call.
    pub settlement_timeout: Duration,
    /// Categories the dispatcher is allowed to settle.
    pub allowed_categories: HashSet<Category>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_schedule: vec![
                Duration::from_secs(5),
                Duration::from_secs(15),
                Duration::from_secs(45),
            ],
            max_idle_wait: Duration::from_secs(30),
            batch_pause: Duration::from_millis(100),
            settlement_timeout: Duration::from_secs(30),
            // Generic has no settlement of its own; it must be opted into.
            allowed_categories: Category::ALL
                .into_iter()
                .filter(|c| *c != Category::Generic)
                .collect(),
        }
    }
}

impl RetryConfig {
    /// Load configuration from environment variables with defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a config from an arbitrary key lookup. Unparseable values keep the default.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(attempts) = lookup("RETRY_MAX_ATTEMPTS").and_then(|v| v.parse::<u32>().ok())
            && attempts > 0
        {
            config.max_attempts = attempts;
        }

        if let Some(raw) = lookup("RETRY_BACKOFF_MS") {
            match parse_millis_list(&raw) {
                Some(schedule) => config.backoff_schedule = schedule,
                None => tracing::warn!(value = %raw, "Ignoring malformed RETRY_BACKOFF_MS"),
            }
        }

        if let Some(ms) = lookup("RETRY_MAX_IDLE_WAIT_MS").and_then(|v| v.parse::<u64>().ok()) {
            config.max_idle_wait = Duration::from_millis(ms);
        }

        if let Some(ms) = lookup("RETRY_BATCH_PAUSE_MS").and_then(|v| v.parse::<u64>().ok()) {
            config.batch_pause = Duration::from_millis(ms);
        }

        if let Some(ms) = lookup("SETTLEMENT_TIMEOUT_MS").and_then(|v| v.parse::<u64>().ok()) {
            config.settlement_timeout = Duration::from_millis(ms);
        }

        if let Some(raw) = lookup("RETRY_ALLOWED_CATEGORIES") {
            match raw
                .split(',')
                .filter(|s| !s.trim().is_empty())
                .map(str::parse::<Category>)
                .collect::<Result<HashSet<_>, _>>()
            {
                Ok(categories) => config.allowed_categories = categories,
                Err(e) => tracing::warn!(error = %e, "Ignoring malformed RETRY_ALLOWED_CATEGORIES"),
            }
        }

        config
    }

    /// Delay before the next attempt of a transaction that has already been retried
    /// `retry_count` times.
    pub fn backoff_for(&self, retry_count: u32) -> Duration {
        self.backoff_schedule
            .get(retry_count as usize)
            .or_else(|| self.backoff_schedule.last())
            .copied()
            .unwrap_or_default()
    }

    pub fn allows(&self, category: Category) -> bool {
        self.allowed_categories.contains(&category)
    }
}

fn parse_millis_list(raw: &str) -> Option<Vec<Duration>> {
    let schedule = raw
        .split(',')
        .map(|part| part.trim().parse::<u64>().map(Duration::from_millis))
        .collect::<Result<Vec<_>, _>>()
        .ok()?;
    (!schedule.is_empty()).then_some(schedule)
}
