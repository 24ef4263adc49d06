#![no_main]

use chrono::{TimeZone, Utc};
use libfuzzer_sys::fuzz_target;
use snooze_core::Log;

fuzz_target!(|data: &[u8]| {
    // 재현 가능하도록 고정 시각 사용
    let now = Utc.timestamp_opt(1_700_000_000, 0).single().unwrap_or_default();
    let mut log = Log::decode(data, now);
    log.normalize_timestamps(now, chrono::Duration::seconds(60));

    // 디코딩된 로그는 항상 다시 직렬화 가능해야 함
    let encoded = serde_json::to_vec(&log).expect("decoded log must serialize");
    let again = Log::decode(&encoded, now);
    assert!(again.error.is_none() || log.error.is_some());
});
