//! Incremental decoding of the server event stream.

use agent_stream_core::StreamEvent;

/// Marker prefix of lines that carry an event record.
const DATA_PREFIX: &str = "data: ";

/// Turns byte chunks into an ordered sequence of [`StreamEvent`]s.
///
/// Records are newline-delimited; a record is only parsed once its full line
/// has arrived, so a trailing partial line (including a split `data: `
/// prefix) is buffered across chunk boundaries. Lines without the marker
/// prefix are ignored; a marked line that fails to parse is dropped with a
/// warning and the stream continues.
///
/// One decoder per physical connection. It holds no reconnection state.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buf: Vec<u8>,
}

impl FrameDecoder {
    /// Create a decoder for a fresh connection.
    #[must_use]
    pub const fn new() -> Self {
        Self { buf: Vec::new() }
    }

    /// Feed a chunk of bytes, returning the events completed by it in order.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<StreamEvent> {
        self.buf.extend_from_slice(chunk);

        let mut events = Vec::new();
        while let Some(pos) = self.buf.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buf.drain(..=pos).collect();
            if let Some(event) = Self::parse_line(&line[..line.len() - 1]) {
                events.push(event);
            }
        }
        events
    }

    /// Bytes of an unfinished trailing line still waiting for more input.
    #[must_use]
    pub fn pending_bytes(&self) -> usize {
        self.buf.len()
    }

    fn parse_line(raw: &[u8]) -> Option<StreamEvent> {
        let line = match std::str::from_utf8(raw) {
            Ok(line) => line.strip_suffix('\r').unwrap_or(line),
            Err(error) => {
                tracing::warn!(%error, "dropping non-UTF-8 stream line");
                return None;
            }
        };

        // Lines without the marker (keepalives, comments) are not ours.
        let payload = line.strip_prefix(DATA_PREFIX)?;

        match serde_json::from_str::<StreamEvent>(payload) {
            Ok(mut event) => {
                event.stamp();
                Some(event)
            }
            Err(error) => {
                tracing::warn!(%error, line = payload, "dropping malformed frame line");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use agent_stream_core::{EventKind, EventPayload};

    use super::*;

    #[test]
    fn test_split_frame_reassembly() {
        let mut decoder = FrameDecoder::new();
        assert!(decoder.feed(b"data: {\"type\":\"te").is_empty());
        let events = decoder.feed(b"xt\",\"content\":\"hi\"}\n");

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind(), EventKind::Text);
        match &events[0].payload {
            EventPayload::Text { content } => assert_eq!(content, "hi"),
            other => panic!("unexpected payload: {other:?}"),
        }
    }

    #[test]
    fn test_prefix_split_across_chunks() {
        let mut decoder = FrameDecoder::new();
        assert!(decoder.feed(b"dat").is_empty());
        let events = decoder.feed(b"a: {\"type\":\"complete\"}\n");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind(), EventKind::Complete);
    }

    #[test]
    fn test_multiple_events_in_one_chunk_stay_ordered() {
        let mut decoder = FrameDecoder::new();
        let events = decoder.feed(
            b"data: {\"type\":\"text\",\"content\":\"a\"}\n\
              data: {\"type\":\"text\",\"content\":\"b\"}\n",
        );
        let contents: Vec<_> = events
            .iter()
            .map(|e| match &e.payload {
                EventPayload::Text { content } => content.as_str(),
                other => panic!("unexpected payload: {other:?}"),
            })
            .collect();
        assert_eq!(contents, ["a", "b"]);
    }

    #[test]
    fn test_unmarked_lines_are_ignored() {
        let mut decoder = FrameDecoder::new();
        let events = decoder.feed(
            b": keepalive\n\
              event: progress\n\
              \n\
              data: {\"type\":\"text\",\"content\":\"hi\"}\n",
        );
        assert_eq!(events.len(), 1);
    }

    #[test]
    fn test_malformed_line_is_dropped_stream_continues() {
        let mut decoder = FrameDecoder::new();
        let events = decoder.feed(
            b"data: {not json}\n\
              data: {\"type\":\"text\",\"content\":\"after\"}\n",
        );
        assert_eq!(events.len(), 1);
        match &events[0].payload {
            EventPayload::Text { content } => assert_eq!(content, "after"),
            other => panic!("unexpected payload: {other:?}"),
        }
    }

    #[test]
    fn test_crlf_line_endings() {
        let mut decoder = FrameDecoder::new();
        let events = decoder.feed(b"data: {\"type\":\"complete\"}\r\n");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind(), EventKind::Complete);
    }

    #[test]
    fn test_trailing_partial_line_is_buffered() {
        let mut decoder = FrameDecoder::new();
        let events = decoder.feed(b"data: {\"type\":\"complete\"}\ndata: {\"ty");
        assert_eq!(events.len(), 1);
        assert!(decoder.pending_bytes() > 0);
        assert_eq!(decoder.feed(b"pe\":\"complete\"}\n").len(), 1);
        assert_eq!(decoder.pending_bytes(), 0);
    }

    #[test]
    fn test_session_id_carried_through() {
        let mut decoder = FrameDecoder::new();
        let events =
            decoder.feed(b"data: {\"type\":\"text\",\"content\":\"x\",\"session_id\":\"s-7\"}\n");
        assert_eq!(events[0].session_id.as_deref(), Some("s-7"));
        assert!(events[0].timestamp > 0);
    }
}
