#![no_main]

use libfuzzer_sys::fuzz_target;
use snooze_processor::PipelineConfig;

fuzz_target!(|data: &[u8]| {
    if let Ok(yaml) = std::str::from_utf8(data) {
        let _ = PipelineConfig::parse(yaml, "fuzz-input.yaml");
    }
});
