#![no_main]

use cadence::lyrics;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(raw) = std::str::from_utf8(data) else {
        return;
    };
    if let Ok(lines) = lyrics::parse_block(raw) {
        let formatted = lyrics::format_block(&lines);
        let reparsed = lyrics::parse_block(&formatted).expect("formatted lyrics parse");
        assert_eq!(reparsed.len(), lines.len());
    }
});
