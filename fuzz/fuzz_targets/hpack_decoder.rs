#![no_main]
use ignis_http::hpack::HpackDecoder;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let mut dec = HpackDecoder::new();
    let _ = dec.decode(data);
}); 