use std::time::Duration;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

/// Duration since the unix epoch, zero if the clock is set before it
pub fn get_duration_since_epoch() -> Duration {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
}

/// return millisecond
pub fn get_now_as_millis() -> u64 {
    get_duration_since_epoch().as_millis() as u64
}

/// return second
pub fn get_now_as_secs() -> i64 {
    get_duration_since_epoch().as_secs() as i64
}

/// return nanosecond
pub fn get_now_as_nanos() -> i64 {
    get_duration_since_epoch().as_nanos() as i64
}

/// Unix seconds of `t`, negative before the epoch
pub fn system_time_to_secs(t: SystemTime) -> i64 {
    match t.duration_since(UNIX_EPOCH) {
        Ok(d) => d.as_secs() as i64,
        Err(e) => -(e.duration().as_secs() as i64),
    }
}
