#![no_main]
use ignis_http::http1::Parser;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let mut p = Parser::new();
    let _ = p.parse(data);
}); 