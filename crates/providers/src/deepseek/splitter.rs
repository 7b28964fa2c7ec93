use bytes::{Buf, Bytes, BytesMut};

/// Incremental splitter for `text/event-stream` bodies.
///
/// Bytes are buffered until a blank line closes an event; the `data:` lines of
/// that event are joined and returned as one frame. Whatever follows the last
/// boundary stays buffered for the next [`EventSplitter::push`].
#[derive(Debug, Default)]
pub struct EventSplitter {
    buf: BytesMut,
}

impl EventSplitter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, chunk: &[u8]) -> Vec<Bytes> {
        self.buf.extend_from_slice(chunk);
        let mut frames = Vec::new();
        while let Some((pos, sep)) = find_event_boundary(&self.buf) {
            let block = self.buf.split_to(pos).freeze();
            self.buf.advance(sep);
            if let Some(data) = extract_data(&block) {
                frames.push(data);
            }
        }
        frames
    }

    /// Drains the unterminated tail, e.g. when the server closes without a final blank line.
    pub fn finish(&mut self) -> Option<Bytes> {
        let rest = self.buf.split().freeze();
        extract_data(&rest)
    }

    pub fn pending(&self) -> usize {
        self.buf.len()
    }

    pub fn clear(&mut self) {
        self.buf.clear();
    }
}

/// Earliest blank line in `buf`, as (offset, separator length).
fn find_event_boundary(buf: &[u8]) -> Option<(usize, usize)> {
    let crlf = twoway::find_bytes(buf, b"\r\n\r\n").map(|p| (p, 4));
    let lf = twoway::find_bytes(buf, b"\n\n").map(|p| (p, 2));
    match (crlf, lf) {
        (Some(a), Some(b)) => Some(if a.0 <= b.0 { a } else { b }),
        (a, b) => a.or(b),
    }
}

fn extract_data(block: &[u8]) -> Option<Bytes> {
    let mut out: Option<BytesMut> = None;
    for line in block.split(|b| *b == b'\n') {
        let line = line.strip_suffix(b"\r").unwrap_or(line);
        let Some(rest) = line.strip_prefix(b"data:") else {
            continue;
        };
        let start = rest
            .iter()
            .position(|b| !b.is_ascii_whitespace())
            .unwrap_or(rest.len());
        match out.as_mut() {
            Some(o) => {
                o.extend_from_slice(b"\n");
                o.extend_from_slice(&rest[start..]);
            }
            None => out = Some(BytesMut::from(&rest[start..])),
        }
    }
    out.filter(|o| !o.is_empty()).map(BytesMut::freeze)
}
