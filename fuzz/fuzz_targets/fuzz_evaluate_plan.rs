#![no_main]
use chrono::{TimeZone, Utc};
use libfuzzer_sys::fuzz_target;
use openei_rates::rates::RatePlan;

fuzz_target!(|data: &[u8]| {
    // First 8 bytes pick the instant and reading, the rest is the plan document
    if data.len() < 8 {
        return;
    }
    let (head, body) = data.split_at(8);
    let secs = i64::from(u32::from_be_bytes([head[0], head[1], head[2], head[3]]));
    let reading = f64::from(u32::from_be_bytes([head[4], head[5], head[6], head[7]]));

    let Ok(plan) = serde_json::from_slice::<RatePlan>(body) else {
        return;
    };
    let Some(at) = Utc.timestamp_opt(secs, 0).single() else {
        return;
    };

    let _ = plan.evaluate(at, chrono_tz::Tz::UTC, None);
    let _ = plan.evaluate(at, chrono_tz::America::New_York, Some(reading));
});
