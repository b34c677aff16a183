//! SSE line reader for provider token streams
//!
//! All three vendors stream tokens as server-sent events. This module
//! turns a reqwest byte stream into a stream of `data:` payload strings,
//! handling events split across chunk boundaries.

use futures_util::stream::{BoxStream, Stream, StreamExt};
use reqwest::Response;

use crate::error::ProviderError;

/// Convert an SSE response body into a stream of `data:` payloads.
///
/// Multi-line events are not needed by any supported vendor; each `data:`
/// line is yielded on its own. `[DONE]` sentinels are passed through and
/// filtered by the caller's extractor.
pub fn data_lines(response: Response) -> impl Stream<Item = Result<String, ProviderError>> + Send {
    let bytes: BoxStream<'static, reqwest::Result<bytes::Bytes>> =
        response.bytes_stream().boxed();

    futures_util::stream::unfold(
        (bytes, Vec::<u8>::new(), Vec::<String>::new()),
        |(mut bytes, mut buffer, mut pending)| async move {
            loop {
                // Drain any lines already parsed from a previous chunk
                if let Some(line) = pop_front(&mut pending) {
                    return Some((Ok(line), (bytes, buffer, pending)));
                }

                match bytes.next().await {
                    Some(Ok(chunk)) => {
                        buffer.extend_from_slice(&chunk);

                        // Decode complete lines only: a multi-byte character
                        // split across chunks stays buffered as raw bytes
                        // until its tail arrives.
                        while let Some(pos) = buffer.iter().position(|&b| b == b'\n') {
                            let raw: Vec<u8> = buffer.drain(..=pos).collect();
                            if let Some(data) = parse_data_line(&raw) {
                                pending.push(data);
                            }
                        }
                    }
                    Some(Err(e)) => {
                        return Some((
                            Err(ProviderError::MidStream(e.to_string())),
                            (bytes, buffer, pending),
                        ));
                    }
                    None => {
                        // Flush a trailing data line without newline terminator
                        let raw = std::mem::take(&mut buffer);
                        if let Some(data) = parse_data_line(&raw) {
                            return Some((Ok(data), (bytes, buffer, pending)));
                        }
                        return None;
                    }
                }
            }
        },
    )
}

fn parse_data_line(raw: &[u8]) -> Option<String> {
    // A complete SSE line is whole UTF-8; lossy only triggers on a
    // malformed vendor payload, never on chunk-boundary splits.
    let line = String::from_utf8_lossy(raw);
    let line = line.trim_end_matches(['\n', '\r']);
    line.strip_prefix("data:")
        .map(|data| data.trim_start().to_string())
}

fn pop_front(pending: &mut Vec<String>) -> Option<String> {
    if pending.is_empty() {
        None
    } else {
        Some(pending.remove(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunked_response(chunks: Vec<&'static [u8]>) -> Response {
        let items: Vec<Result<bytes::Bytes, std::io::Error>> = chunks
            .into_iter()
            .map(|c| Ok(bytes::Bytes::from_static(c)))
            .collect();
        let body = reqwest::Body::wrap_stream(futures_util::stream::iter(items));
        Response::from(axum::http::Response::new(body))
    }

    #[tokio::test]
    async fn test_extracts_data_payloads() {
        // Last event has no trailing newline and must still be flushed
        let raw = "event: ping\ndata: {\"a\":1}\n\ndata: hello\n\ndata: [DONE]";
        let response = Response::from(axum::http::Response::new(raw));

        let lines: Vec<String> = data_lines(response)
            .map(|l| l.expect("payload"))
            .collect()
            .await;

        assert_eq!(lines, vec!["{\"a\":1}", "hello", "[DONE]"]);
    }

    #[tokio::test]
    async fn test_multibyte_char_split_across_chunks() {
        // "á" is 0xC3 0xA1; the chunk boundary lands between its bytes
        let response = chunked_response(vec![b"data: Ol\xC3", b"\xA1\ndata: tudo bem\n"]);

        let lines: Vec<String> = data_lines(response)
            .map(|l| l.expect("payload"))
            .collect()
            .await;

        assert_eq!(lines, vec!["Olá", "tudo bem"]);
    }

    #[tokio::test]
    async fn test_line_split_across_chunks() {
        let response = chunked_response(vec![b"data: primeira ", b"parte\n"]);

        let lines: Vec<String> = data_lines(response)
            .map(|l| l.expect("payload"))
            .collect()
            .await;

        assert_eq!(lines, vec!["primeira parte"]);
    }
}
