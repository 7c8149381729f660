//! `text/event-stream` framing.
//!
//! Lines are fed one at a time; a blank line dispatches the frame built so
//! far. Multiple `data:` lines are joined with `\n`. Comment lines (leading
//! `:`) are skipped. A frame with no `data:` lines is never dispatched.

use std::io::{self, BufRead};

/// One dispatched server-sent event.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SseFrame {
    /// `event:` field, if any.
    pub event: Option<String>,
    /// `id:` field, if any.
    pub id: Option<String>,
    pub data: String,
    /// Reconnection delay requested by the server, in ms.
    pub retry: Option<u64>,
}

/// Incremental line-to-frame decoder.
#[derive(Debug, Default)]
pub struct SseDecoder {
    event: Option<String>,
    id: Option<String>,
    data: Vec<String>,
    retry: Option<u64>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one line (with or without its line terminator).
    ///
    /// Returns a frame when `line` is the blank line that ends one.
    pub fn push_line(&mut self, line: &str) -> Option<SseFrame> {
        let line = line.trim_end_matches(['\n', '\r']);

        if line.is_empty() {
            return self.dispatch();
        }

        if line.starts_with(':') {
            return None;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };

        match field {
            "data" => self.data.push(value.to_string()),
            "event" => self.event = Some(value.to_string()),
            "id" => self.id = Some(value.to_string()),
            "retry" => {
                if let Ok(ms) = value.parse() {
                    self.retry = Some(ms);
                }
            }
            _ => {}
        }

        None
    }

    fn dispatch(&mut self) -> Option<SseFrame> {
        let event = self.event.take();
        let id = self.id.take();
        let retry = self.retry.take();

        if self.data.is_empty() {
            return None;
        }

        let data = std::mem::take(&mut self.data).join("\n");
        Some(SseFrame {
            event,
            id,
            data,
            retry,
        })
    }
}

/// Whether a read error only means the stream was quiet for a while.
pub fn is_idle(error: &io::Error) -> bool {
    matches!(
        error.kind(),
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock
    )
}

/// Iterator over the frames of a readable stream.
///
/// Ends at EOF. An idle read error (see [`is_idle`]) is yielded without
/// ending the iterator or losing a partially read line, so the caller can
/// check for cancellation and keep going. Other read errors are yielded
/// once and then the iterator ends.
pub struct SseFrames<R> {
    reader: R,
    decoder: SseDecoder,
    line: Vec<u8>,
    done: bool,
}

impl<R: BufRead> SseFrames<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            decoder: SseDecoder::new(),
            line: Vec::new(),
            done: false,
        }
    }
}

impl<R: BufRead> Iterator for SseFrames<R> {
    type Item = io::Result<SseFrame>;

    fn next(&mut self) -> Option<Self::Item> {
        while !self.done {
            // read_until keeps whatever it consumed before an error in `line`
            match self.reader.read_until(b'\n', &mut self.line) {
                Ok(0) => self.done = true,
                Ok(_) => {
                    let frame = self
                        .decoder
                        .push_line(&String::from_utf8_lossy(&self.line));
                    self.line.clear();
                    if let Some(frame) = frame {
                        return Some(Ok(frame));
                    }
                }
                Err(e) if is_idle(&e) => return Some(Err(e)),
                Err(e) => {
                    self.done = true;
                    return Some(Err(e));
                }
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::io::{BufReader, Cursor, Read};

    fn frames(text: &str) -> Vec<SseFrame> {
        SseFrames::new(Cursor::new(text.as_bytes()))
            .map(|f| f.unwrap())
            .collect()
    }

    #[test]
    fn single_data_frame() {
        let out = frames("data: {\"a\":1}\n\n");
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].data, "{\"a\":1}");
    }

    #[test]
    fn multiple_data_lines_are_joined() {
        let out = frames("data: one\ndata: two\n\n");
        assert_eq!(out[0].data, "one\ntwo");
    }

    #[test]
    fn event_id_and_retry_fields() {
        let out = frames("event: message\nid: 7\nretry: 3000\ndata: x\n\n");
        assert_eq!(out[0].event.as_deref(), Some("message"));
        assert_eq!(out[0].id.as_deref(), Some("7"));
        assert_eq!(out[0].retry, Some(3000));
    }

    #[test]
    fn comments_and_empty_frames_are_skipped() {
        let out = frames(": keep-alive\n\nevent: ping\n\ndata: real\n\n");
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].data, "real");
        // Fields from the dataless frame do not leak into the next one
        assert_eq!(out[0].event, None);
    }

    #[test]
    fn crlf_line_endings() {
        let out = frames("data: hi\r\n\r\n");
        assert_eq!(out[0].data, "hi");
    }

    #[test]
    fn no_space_after_colon() {
        let out = frames("data:tight\n\n");
        assert_eq!(out[0].data, "tight");
    }

    #[test]
    fn unterminated_trailing_frame_is_dropped() {
        let out = frames("data: first\n\ndata: partial\n");
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].data, "first");
    }

    #[test]
    fn push_line_reports_frame_on_blank_line() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.push_line("data: a").is_none());
        let frame = decoder.push_line("").unwrap();
        assert_eq!(frame.data, "a");
    }

    /// Replays chunks and errors, one per read.
    struct Scripted(VecDeque<io::Result<&'static [u8]>>);

    impl Read for Scripted {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            match self.0.pop_front() {
                Some(Ok(chunk)) => {
                    buf[..chunk.len()].copy_from_slice(chunk);
                    Ok(chunk.len())
                }
                Some(Err(e)) => Err(e),
                None => Ok(0),
            }
        }
    }

    fn timed_out() -> io::Error {
        io::Error::new(io::ErrorKind::TimedOut, "timed out reading response")
    }

    #[test]
    fn idle_read_keeps_partial_line() {
        let script = Scripted(VecDeque::from([
            Ok(&b"data: hel"[..]),
            Err(timed_out()),
            Err(io::Error::new(io::ErrorKind::WouldBlock, "again")),
            Ok(&b"lo\n\n"[..]),
        ]));
        let mut iter = SseFrames::new(BufReader::new(script));

        assert!(is_idle(&iter.next().unwrap().unwrap_err()));
        assert!(is_idle(&iter.next().unwrap().unwrap_err()));
        assert_eq!(iter.next().unwrap().unwrap().data, "hello");
        assert!(iter.next().is_none());
    }

    #[test]
    fn other_read_errors_end_the_stream() {
        let script = Scripted(VecDeque::from([
            Err(io::Error::new(io::ErrorKind::ConnectionReset, "reset")),
            Ok(&b"data: late\n\n"[..]),
        ]));
        let mut iter = SseFrames::new(BufReader::new(script));

        let err = iter.next().unwrap().unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::ConnectionReset);
        assert!(iter.next().is_none());
    }
}
