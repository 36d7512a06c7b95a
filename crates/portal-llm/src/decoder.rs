//! Line-delimited event decoding over an arbitrarily fragmented byte stream.
//!
//! Reads may split anywhere, including inside a line or inside a multi-byte
//! UTF-8 sequence, so bytes are carried over raw until a `\n` arrives.

use std::marker::PhantomData;

use futures::{Stream, StreamExt};
use serde::de::DeserializeOwned;

use crate::error::LLMError;

const DATA_MARKER: &str = "data:";
const DONE_SENTINEL: &str = "[DONE]";

/// One decoded event.
#[derive(Debug)]
pub enum DecodedEvent<T> {
    Payload(T),
    /// Terminal: the decoder yields nothing after this.
    Failed(LLMError),
}

enum Line<'a> {
    Skip,
    Done,
    Payload(&'a str),
}

fn classify(line: &str) -> Line<'_> {
    let line = line.trim();
    if line.is_empty() || line.starts_with(':') {
        return Line::Skip;
    }

    let payload = match line.strip_prefix(DATA_MARKER) {
        Some(rest) => rest.strip_prefix(' ').unwrap_or(rest),
        None if ["event:", "id:", "retry:"]
            .iter()
            .any(|field| line.starts_with(field)) =>
        {
            return Line::Skip;
        }
        None => line,
    };

    if payload.trim_start().starts_with(DONE_SENTINEL) {
        Line::Done
    } else if payload.trim().is_empty() {
        Line::Skip
    } else {
        Line::Payload(payload)
    }
}

pub struct ChunkDecoder<S, T> {
    source: S,
    pending: Vec<u8>,
    /// Bytes of `pending` before this offset belong to lines already taken.
    consumed: usize,
    /// No `\n` occurs in `pending[consumed..scanned]`.
    scanned: usize,
    source_done: bool,
    terminal: bool,
    _payload: PhantomData<fn() -> T>,
}

impl<S, B, E, T> ChunkDecoder<S, T>
where
    S: Stream<Item = Result<B, E>> + Unpin,
    B: AsRef<[u8]>,
    E: Into<LLMError>,
    T: DeserializeOwned,
{
    pub fn new(source: S) -> Self {
        Self {
            source,
            pending: Vec::new(),
            consumed: 0,
            scanned: 0,
            source_done: false,
            terminal: false,
            _payload: PhantomData,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.terminal
    }

    /// Next event, or `None` once the sentinel was seen, the source ended, or
    /// a failure was reported. Never polls the source after that.
    pub async fn next_event(&mut self) -> Option<DecodedEvent<T>> {
        if self.terminal {
            return None;
        }

        loop {
            if let Some(line) = self.take_line() {
                match classify(&line) {
                    Line::Skip => continue,
                    Line::Done => return self.end(),
                    Line::Payload(payload) => return Some(self.parse(payload)),
                }
            }

            if self.source_done {
                let residual = String::from_utf8_lossy(&self.pending[self.consumed..]).into_owned();
                self.pending.clear();
                self.consumed = 0;
                self.scanned = 0;
                let event = match classify(&residual) {
                    Line::Payload(payload) => Some(self.parse(payload)),
                    Line::Skip | Line::Done => None,
                };
                self.terminal = true;
                return event;
            }

            match self.source.next().await {
                Some(Ok(bytes)) => self.push(bytes.as_ref()),
                Some(Err(error)) => {
                    self.terminal = true;
                    return Some(DecodedEvent::Failed(error.into()));
                }
                None => self.source_done = true,
            }
        }
    }

    fn push(&mut self, bytes: &[u8]) {
        if self.consumed > 0 {
            self.pending.drain(..self.consumed);
            self.scanned -= self.consumed;
            self.consumed = 0;
        }
        self.pending.extend_from_slice(bytes);
    }

    fn take_line(&mut self) -> Option<String> {
        let from = self.scanned.max(self.consumed);
        let Some(offset) = self.pending[from..].iter().position(|byte| *byte == b'\n') else {
            self.scanned = self.pending.len();
            return None;
        };
        let end = from + offset;
        let mut line = &self.pending[self.consumed..end];
        if line.last() == Some(&b'\r') {
            line = &line[..line.len() - 1];
        }
        let line = String::from_utf8_lossy(line).into_owned();
        self.consumed = end + 1;
        self.scanned = self.consumed;
        Some(line)
    }

    fn parse(&mut self, payload: &str) -> DecodedEvent<T> {
        match serde_json::from_str::<T>(payload) {
            Ok(value) => DecodedEvent::Payload(value),
            Err(error) => {
                log::warn!("Malformed stream payload: {} ({})", error, payload);
                self.terminal = true;
                DecodedEvent::Failed(LLMError::Decode(format!("{error}: {payload}")))
            }
        }
    }

    fn end(&mut self) -> Option<DecodedEvent<T>> {
        self.terminal = true;
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    type Chunks = stream::Iter<std::vec::IntoIter<Result<Vec<u8>, LLMError>>>;

    fn source(chunks: Vec<&[u8]>) -> Chunks {
        stream::iter(
            chunks
                .into_iter()
                .map(|chunk| Ok(chunk.to_vec()))
                .collect::<Vec<_>>(),
        )
    }

    async fn collect(mut decoder: ChunkDecoder<Chunks, Value>) -> Vec<Result<Value, String>> {
        let mut events = Vec::new();
        while let Some(event) = decoder.next_event().await {
            events.push(match event {
                DecodedEvent::Payload(value) => Ok(value),
                DecodedEvent::Failed(error) => Err(error.to_string()),
            });
        }
        events
    }

    const BODY: &[u8] = b"data: {\"a\":1}\n\ndata: [DONE]\n";

    #[tokio::test]
    async fn whole_body_yields_one_event() {
        let events = collect(ChunkDecoder::new(source(vec![BODY]))).await;
        assert_eq!(events, vec![Ok(json!({"a": 1}))]);
    }

    #[tokio::test]
    async fn byte_at_a_time_matches_whole_body() {
        let whole = collect(ChunkDecoder::new(source(vec![BODY]))).await;
        let split = collect(ChunkDecoder::new(source(BODY.chunks(1).collect()))).await;
        assert_eq!(whole, split);
    }

    #[tokio::test]
    async fn arbitrary_split_points_match_whole_body() {
        let whole = collect(ChunkDecoder::new(source(vec![BODY]))).await;
        for at in 1..BODY.len() {
            let (left, right) = BODY.split_at(at);
            let split = collect(ChunkDecoder::new(source(vec![left, right]))).await;
            assert_eq!(whole, split, "split at {at}");
        }
    }

    #[test]
    fn partial_line_is_not_rescanned() {
        let mut decoder: ChunkDecoder<Chunks, Value> = ChunkDecoder::new(source(vec![]));
        decoder.push(b"data: {\"a\":");
        assert!(decoder.take_line().is_none());
        assert_eq!(decoder.scanned, decoder.pending.len());

        decoder.push(b"1}\r\ndata: {\"b\"");
        assert_eq!(decoder.take_line().as_deref(), Some("data: {\"a\":1}"));
        assert!(decoder.take_line().is_none());

        decoder.push(b":2}\n");
        assert_eq!(decoder.consumed, 0);
        assert_eq!(decoder.take_line().as_deref(), Some("data: {\"b\":2}"));
    }

    #[tokio::test]
    async fn long_line_in_small_reads() {
        let text = "x".repeat(64 * 1024);
        let body = format!("data: {}\n\ndata: [DONE]\n", json!({ "text": text }));
        let events = collect(ChunkDecoder::new(source(body.as_bytes().chunks(7).collect()))).await;
        assert_eq!(events, vec![Ok(json!({ "text": text }))]);
    }

    #[tokio::test]
    async fn multibyte_character_split_across_reads() {
        let body = "data: {\"t\":\"你好\"}\n".as_bytes();
        let events = collect(ChunkDecoder::new(source(body.chunks(1).collect()))).await;
        assert_eq!(events, vec![Ok(json!({"t": "你好"}))]);
    }

    #[tokio::test]
    async fn residual_without_newline_is_parsed_at_end() {
        let events = collect(ChunkDecoder::new(source(vec![
            b"data: {\"a\":1}\r\n",
            b"data: {\"a\":2}",
        ])))
        .await;
        assert_eq!(events, vec![Ok(json!({"a": 1})), Ok(json!({"a": 2}))]);
    }

    #[tokio::test]
    async fn unprefixed_lines_and_sse_fields() {
        let events = collect(ChunkDecoder::new(source(vec![
            b": keep-alive\nevent: message\nid: 7\n{\"a\":3}\n[DONE]\n",
        ])))
        .await;
        assert_eq!(events, vec![Ok(json!({"a": 3}))]);
    }

    #[tokio::test]
    async fn malformed_payload_is_terminal_failure() {
        let events = collect(ChunkDecoder::new(source(vec![
            b"data: {\"a\":1}\ndata: {oops\ndata: {\"a\":2}\n",
        ])))
        .await;
        assert_eq!(events.len(), 2);
        assert_eq!(events[0], Ok(json!({"a": 1})));
        assert!(events[1].as_ref().unwrap_err().contains("Decode error"));
    }

    #[tokio::test]
    async fn transport_error_is_terminal_failure() {
        let chunks: Vec<Result<Vec<u8>, LLMError>> = vec![
            Ok(b"data: {\"a\":1}\n".to_vec()),
            Err(LLMError::Stream("connection reset".into())),
            Ok(b"data: {\"a\":2}\n".to_vec()),
        ];
        let events = collect(ChunkDecoder::new(stream::iter(chunks))).await;
        assert_eq!(events.len(), 2);
        assert_eq!(events[1], Err("Stream error: connection reset".to_string()));
    }

    #[tokio::test]
    async fn source_is_not_polled_after_sentinel() {
        let polls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&polls);
        let chunks = stream::iter(vec![
            Ok::<_, LLMError>(b"data: [DONE]\n".to_vec()),
            Ok(b"data: {\"late\":true}\n".to_vec()),
        ])
        .inspect(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        let mut decoder: ChunkDecoder<_, Value> = ChunkDecoder::new(chunks);

        assert!(decoder.next_event().await.is_none());
        assert!(decoder.is_terminal());
        assert!(decoder.next_event().await.is_none());
        assert!(decoder.next_event().await.is_none());
        assert_eq!(polls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn decodes_on_blocking_runtime() {
        let mut decoder: ChunkDecoder<Chunks, Value> = ChunkDecoder::new(source(vec![BODY]));
        let event = tokio_test::block_on(decoder.next_event());
        assert!(matches!(event, Some(DecodedEvent::Payload(_))));
    }
}
