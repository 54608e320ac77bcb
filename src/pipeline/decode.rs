//! Streaming decoder (Bytes -> JSON Value)
//!
//! Splits a server-sent-events body into frames and yields the JSON payload of each
//! `data:` field. Bytes are buffered raw and only decoded once a full frame is present,
//! so multi-byte characters split across network chunks survive intact.

use crate::BoxStream;
use bytes::Bytes;
use futures::{stream, StreamExt};
use serde_json::Value;

/// A minimal SSE decoder:
/// - splits on a blank line (`\n\n` or `\r\n\r\n`)
/// - joins the `data:` lines of a frame
/// - stops on `done_signal` (default "[DONE]")
pub struct SseDecoder {
    done_signal: String,
}

impl Default for SseDecoder {
    fn default() -> Self {
        Self::new(None)
    }
}

impl SseDecoder {
    pub fn new(done_signal: Option<String>) -> Self {
        Self {
            done_signal: done_signal.unwrap_or_else(|| "[DONE]".to_string()),
        }
    }

    pub fn decode_stream(&self, input: BoxStream<'static, Bytes>) -> BoxStream<'static, Value> {
        let done_signal = self.done_signal.clone();

        let stream = stream::unfold(
            (input, Vec::<u8>::new(), false),
            move |(mut input, mut buf, finished)| {
                let done_signal = done_signal.clone();
                async move {
                    if finished {
                        return None;
                    }
                    loop {
                        if let Some((end, delim_len)) = find_frame_end(&buf) {
                            let frame: Vec<u8> = buf.drain(..end + delim_len).take(end).collect();
                            match parse_frame(&frame, &done_signal) {
                                Frame::Done => return None,
                                Frame::Payload(v) => return Some((Ok(v), (input, buf, false))),
                                Frame::Skip => continue,
                            }
                        }

                        match input.next().await {
                            Some(Ok(bytes)) => buf.extend_from_slice(&bytes),
                            Some(Err(e)) => return Some((Err(e), (input, buf, true))),
                            None => {
                                // EOF: a trailing frame without the final blank line still counts.
                                return match parse_frame(&buf, &done_signal) {
                                    Frame::Payload(v) => {
                                        Some((Ok(v), (input, Vec::new(), true)))
                                    }
                                    _ => None,
                                };
                            }
                        }
                    }
                }
            },
        );

        Box::pin(stream)
    }
}

enum Frame {
    Payload(Value),
    Done,
    Skip,
}

fn find_frame_end(buf: &[u8]) -> Option<(usize, usize)> {
    let lf = buf.windows(2).position(|w| w == b"\n\n").map(|i| (i, 2));
    let crlf = buf.windows(4).position(|w| w == b"\r\n\r\n").map(|i| (i, 4));
    match (lf, crlf) {
        (Some(a), Some(b)) => Some(if a.0 <= b.0 { a } else { b }),
        (a, b) => a.or(b),
    }
}

fn parse_frame(raw: &[u8], done_signal: &str) -> Frame {
    let text = String::from_utf8_lossy(raw);
    let mut data = String::new();
    for line in text.lines() {
        let line = line.trim_end_matches('\r');
        // Comment lines (`: keep-alive`) and non-data fields are ignored.
        if let Some(rest) = line.strip_prefix("data:") {
            if !data.is_empty() {
                data.push('\n');
            }
            data.push_str(rest.strip_prefix(' ').unwrap_or(rest));
        }
    }

    let payload = data.trim();
    if payload.is_empty() {
        return Frame::Skip;
    }
    if payload == done_signal {
        return Frame::Done;
    }
    match serde_json::from_str(payload) {
        Ok(v) => Frame::Payload(v),
        Err(_) => {
            tracing::warn!(len = payload.len(), "skipping non-JSON SSE frame");
            Frame::Skip
        }
    }
}
