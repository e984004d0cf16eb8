//! Incremental decoder for `text/event-stream` response bodies.

/// Splits a byte stream into Server-Sent Events and yields each event's
/// `data` payload. Bytes are held only until the event boundary is seen.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    // Last byte seen was a CR, so a following LF belongs to the same terminator
    after_cr: bool,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed raw bytes, returning the data of every event they complete.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        // CRLF, lone CR and lone LF all end a line; store them as LF.
        for &byte in bytes {
            if self.after_cr {
                self.after_cr = false;
                if byte == b'\n' {
                    continue;
                }
            }
            if byte == b'\r' {
                self.after_cr = true;
                self.buffer.push(b'\n');
            } else {
                self.buffer.push(byte);
            }
        }

        let mut events = Vec::new();
        while let Some(pos) = find_boundary(&self.buffer) {
            let block: Vec<u8> = self.buffer.drain(..pos + 2).collect();
            if let Some(data) = event_data(&block[..pos]) {
                events.push(data);
            }
        }
        events
    }

    /// Flush a trailing event that was not followed by a blank line
    /// (e.g. the connection closed early).
    pub fn finish(&mut self) -> Option<String> {
        self.after_cr = false;
        let block = std::mem::take(&mut self.buffer);
        event_data(&block)
    }
}

fn find_boundary(buffer: &[u8]) -> Option<usize> {
    buffer.windows(2).position(|w| w == b"\n\n")
}

fn event_data(block: &[u8]) -> Option<String> {
    let text = String::from_utf8_lossy(block);
    let mut data: Option<String> = None;

    for line in text.lines() {
        if line.is_empty() || line.starts_with(':') {
            continue;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };

        if field != "data" {
            continue;
        }

        match data.as_mut() {
            Some(existing) => {
                existing.push('\n');
                existing.push_str(value);
            }
            None => data = Some(value.to_string()),
        }
    }

    data
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_split_across_chunks() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.push(b"data: {\"a\"").is_empty());
        assert!(decoder.push(b":1}\n").is_empty());
        assert_eq!(decoder.push(b"\ndata: [DONE]\n\n"), vec!["{\"a\":1}", "[DONE]"]);
    }

    #[test]
    fn test_crlf_and_comments() {
        let mut decoder = SseDecoder::new();
        let events = decoder.push(b": keep-alive\r\n\r\nevent: message\r\ndata: hi\r\n\r\n");
        assert_eq!(events, vec!["hi"]);
    }

    #[test]
    fn test_bare_cr_terminates_lines() {
        let mut decoder = SseDecoder::new();
        assert_eq!(decoder.push(b"data: a\r\rdata: b\r\r"), vec!["a", "b"]);
        assert_eq!(decoder.finish(), None);
    }

    #[test]
    fn test_crlf_split_between_chunks() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.push(b"data: a\r").is_empty());
        assert_eq!(decoder.push(b"\n\r"), vec!["a"]);
        assert_eq!(decoder.push(b"\ndata: b\r\n\r\n"), vec!["b"]);
    }

    #[test]
    fn test_multiline_data_is_joined() {
        let mut decoder = SseDecoder::new();
        let events = decoder.push(b"data: one\ndata:two\n\n");
        assert_eq!(events, vec!["one\ntwo"]);
    }

    #[test]
    fn test_multibyte_char_split_between_chunks() {
        let bytes = "data: caf\u{e9}\n\n".as_bytes();
        let (head, tail) = bytes.split_at(bytes.len() - 3);
        let mut decoder = SseDecoder::new();
        assert!(decoder.push(head).is_empty());
        assert_eq!(decoder.push(tail), vec!["caf\u{e9}"]);
    }

    #[test]
    fn test_finish_flushes_unterminated_event() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.push(b"data: tail").is_empty());
        assert_eq!(decoder.finish().as_deref(), Some("tail"));
        assert_eq!(decoder.finish(), None);
    }
}
