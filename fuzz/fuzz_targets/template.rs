#![no_main]

use libfuzzer_sys::fuzz_target;
use snooze_core::Log;
use snooze_processor::lang::{Captures, Template};

fuzz_target!(|data: &[u8]| {
    if let Ok(source) = std::str::from_utf8(data) {
        if let Ok(template) = Template::compile(source) {
            let mut captures = Captures::new();
            captures.insert("code".to_owned(), "500".to_owned());
            let _ = template.render(&Log::default(), &captures);
        }
    }
});
