pub trait TimeSource: Send + Sync {
    // Milliseconds since the Unix epoch
    fn current_time_ms(&self) -> i64;
}

#[derive(Clone)]
pub struct SystemTime {}

impl TimeSource for SystemTime {
    fn current_time_ms(&self) -> i64 {
        let nanos = time::OffsetDateTime::now_utc().unix_timestamp_nanos();

        (nanos / 1_000_000) as i64
    }
}
