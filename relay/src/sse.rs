/// Incremental SSE frame decoder.
///
/// Bytes are accumulated into a buffer and split on the blank-line frame
/// delimiter; the trailing partial frame stays buffered for the next read.
/// Each complete frame yields the payload of its first `data:` line; frames
/// without one (comments, bare event lines) are dropped.
pub struct SseParser {
    buffer: String,
}

impl SseParser {
    pub fn new() -> Self {
        SseParser {
            buffer: String::new(),
        }
    }

    /// Feed a chunk of text and return the payloads of completed frames.
    pub fn feed(&mut self, chunk: &str) -> Vec<String> {
        self.buffer.push_str(chunk);
        let mut payloads = Vec::new();

        while let Some(pos) = self.buffer.find("\n\n") {
            let frame = self.buffer[..pos].to_string();
            self.buffer.drain(..pos + 2);
            if let Some(payload) = extract_data(&frame) {
                payloads.push(payload);
            }
        }

        payloads
    }

    /// Drain a trailing frame not closed by a blank line at end of stream.
    pub fn flush(&mut self) -> Option<String> {
        let rest = std::mem::take(&mut self.buffer);
        extract_data(&rest)
    }
}

fn extract_data(frame: &str) -> Option<String> {
    frame
        .lines()
        .find_map(|line| line.strip_prefix("data:"))
        .map(|payload| payload.trim().to_string())
}
