#![no_main]

use libfuzzer_sys::fuzz_target;
use snooze_core::Log;
use snooze_processor::lang::Condition;

fuzz_target!(|data: &[u8]| {
    // 조건식은 &str만 받음
    if let Ok(source) = std::str::from_utf8(data) {
        if let Ok(condition) = Condition::compile(source) {
            let _ = condition.matches(&Log::default());
        }
    }
});
