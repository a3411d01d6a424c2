#[macro_use]
extern crate criterion;

use criterion::{black_box, Criterion};
use ignis_http::hpack::{HpackDecoder, HpackEncoder};

fn encode_decode_request_headers(c: &mut Criterion) {
    let headers = vec![
        (":method".to_string(), "GET".to_string()),
        (":scheme".to_string(), "https".to_string()),
        (":path".to_string(), "/search?q=rust+hpack".to_string()),
        (":authority".to_string(), "www.example.com".to_string()),
        ("user-agent".to_string(), "Mozilla/5.0 (compatible; ignis)".to_string()),
        ("accept".to_string(), "text/html,application/xhtml+xml".to_string()),
        ("cookie".to_string(), "session=abc123; theme=dark".to_string()),
    ];

    c.bench_function("hpack encode+decode repeated request headers", move |b| {
        b.iter_with_setup(
            || (HpackEncoder::new(), HpackDecoder::new()),
            |(mut enc, mut dec)| {
                for _ in 0..8 {
                    let block = enc.encode(black_box(&headers));
                    let decoded = dec.decode(black_box(&block)).unwrap();
                    black_box(decoded);
                }
            },
        )
    });
}

criterion_group!(benches, encode_decode_request_headers);
criterion_main!(benches);
