//! HTTP/1.1 response serialization (spec.md §4.5), grounded on the
//! inline status-line formatting in `selenia_http::lib::handle_request`.

use crate::response::Response;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("streaming an HTTP/1.1 response requires a Content-Length header")]
pub struct MissingContentLength;

/// Serialize the status line and headers. The caller is responsible for
/// then draining `response.next_chunk()` onto the same writer.
pub fn write_head(out: &mut Vec<u8>, response: &Response) -> Result<(), MissingContentLength> {
    if response.content_length().is_none() {
        return Err(MissingContentLength);
    }
    out.extend_from_slice(format!("HTTP/1.1 {}\r\n", response.status).as_bytes());
    for (name, value) in &response.headers {
        out.extend_from_slice(name.as_bytes());
        out.extend_from_slice(b": ");
        out.extend_from_slice(value.as_bytes());
        out.extend_from_slice(b"\r\n");
    }
    out.extend_from_slice(b"\r\n");
    Ok(())
}

/// Drain the response's whole body into `out`, appended after `write_head`.
pub fn write_body(out: &mut Vec<u8>, response: &mut Response) {
    while let Some(chunk) = response.next_chunk() {
        out.extend_from_slice(&chunk.data);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_status_line_headers_and_body() {
        let mut response =
            Response::once(200, vec![("Content-Length".to_string(), "2".to_string())], b"hi".to_vec());
        let mut out = Vec::new();
        write_head(&mut out, &response).unwrap();
        write_body(&mut out, &mut response);
        assert_eq!(out, b"HTTP/1.1 200\r\nContent-Length: 2\r\n\r\nhi");
    }

    #[test]
    fn missing_content_length_is_a_local_error() {
        let (response, _writer) = Response::new(200);
        let mut out = Vec::new();
        assert_eq!(write_head(&mut out, &response), Err(MissingContentLength));
    }
}
