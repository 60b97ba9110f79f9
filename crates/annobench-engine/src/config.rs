//! Engine configuration.

/// Seconds in seven days.
const DEFAULT_RESULT_DURABILITY_SECS: i64 = 7 * 24 * 60 * 60;

/// Engine configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// How long a computed result may be reused (seconds). Values <= 0
    /// disable result caching.
    pub result_durability_secs: i64,

    /// Maximum number of tasks of one experiment running at the same time.
    pub max_concurrent_tasks: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            result_durability_secs: DEFAULT_RESULT_DURABILITY_SECS,
            max_concurrent_tasks: 4,
        }
    }
}
