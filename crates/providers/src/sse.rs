//! SSE (Server-Sent Events) stream handling.
//!
//! Upstream providers frame their streaming responses as newline-delimited
//! `data: ` payloads that can be split arbitrarily across HTTP chunks.
//! [`SseLines`] reassembles complete payload lines; [`SseDeltaStream`]
//! drives a provider-specific [`SseEventParser`] over those lines and
//! guarantees exactly one terminal [`ProviderDelta::Done`] per stream.

use crate::models::{ProviderDelta, UpstreamError};
use bytes::Bytes;
use futures_core::Stream;
use std::collections::VecDeque;
use std::pin::Pin;
use std::task::{Context, Poll};

/// Splits an HTTP byte stream into complete SSE `data: ` payloads,
/// buffering partial lines across chunks. Empty lines and `:` comments
/// are skipped.
pub struct SseLines<S> {
    inner: S,
    buffer: String,
    pending: VecDeque<String>,
    exhausted: bool,
}

impl<S> SseLines<S>
where
    S: Stream<Item = Result<Bytes, reqwest::Error>> + Unpin,
{
    pub fn new(stream: S) -> Self {
        Self {
            inner: stream,
            buffer: String::new(),
            pending: VecDeque::new(),
            exhausted: false,
        }
    }

    fn drain_complete_lines(&mut self) {
        while let Some(newline_pos) = self.buffer.find('\n') {
            let line = self.buffer.drain(..=newline_pos).collect::<String>();
            let line = line.trim();

            if line.is_empty() || line.starts_with(':') {
                continue;
            }

            if let Some(data) = line.strip_prefix("data: ") {
                self.pending.push_back(data.to_string());
            }
        }
    }
}

impl<S> Stream for SseLines<S>
where
    S: Stream<Item = Result<Bytes, reqwest::Error>> + Unpin,
{
    type Item = Result<String, UpstreamError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();

        loop {
            if let Some(data) = this.pending.pop_front() {
                return Poll::Ready(Some(Ok(data)));
            }
            if this.exhausted {
                return Poll::Ready(None);
            }

            match Pin::new(&mut this.inner).poll_next(cx) {
                Poll::Ready(Some(Ok(bytes))) => {
                    this.buffer.push_str(&String::from_utf8_lossy(&bytes));
                    this.drain_complete_lines();
                }
                Poll::Ready(Some(Err(e))) => {
                    this.exhausted = true;
                    return Poll::Ready(Some(Err(e.into())));
                }
                Poll::Ready(None) => {
                    this.exhausted = true;
                    if !this.buffer.trim().is_empty() {
                        tracing::warn!("incomplete SSE data in buffer at stream end");
                    }
                }
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

/// Provider-specific translation of one SSE payload into deltas.
///
/// A parser may emit [`ProviderDelta::Done`] when its provider signals
/// completion (a `[DONE]` sentinel, a finish-reason field). Malformed
/// payloads must be skipped by returning no deltas, never by failing.
pub trait SseEventParser: Send {
    fn parse_event(&mut self, data: &str) -> Vec<ProviderDelta>;
}

/// Adapts an [`SseLines`] stream of payloads into a stream of
/// [`ProviderDelta`]s via a provider-specific parser.
///
/// Exactly one `Done` is yielded per stream: duplicates from the parser
/// are dropped, and one is synthesized if the connection closes without
/// an explicit completion signal.
pub struct SseDeltaStream<S, P> {
    lines: SseLines<S>,
    parser: P,
    pending: VecDeque<ProviderDelta>,
    done_emitted: bool,
    exhausted: bool,
}

impl<S, P> SseDeltaStream<S, P>
where
    S: Stream<Item = Result<Bytes, reqwest::Error>> + Unpin,
    P: SseEventParser + Unpin,
{
    pub fn new(stream: S, parser: P) -> Self {
        Self {
            lines: SseLines::new(stream),
            parser,
            pending: VecDeque::new(),
            done_emitted: false,
            exhausted: false,
        }
    }
}

impl<S, P> Stream for SseDeltaStream<S, P>
where
    S: Stream<Item = Result<Bytes, reqwest::Error>> + Unpin,
    P: SseEventParser + Unpin,
{
    type Item = Result<ProviderDelta, UpstreamError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();

        loop {
            if let Some(delta) = this.pending.pop_front() {
                if matches!(delta, ProviderDelta::Done) {
                    if this.done_emitted {
                        continue;
                    }
                    this.done_emitted = true;
                }
                return Poll::Ready(Some(Ok(delta)));
            }
            if this.exhausted {
                return Poll::Ready(None);
            }

            match Pin::new(&mut this.lines).poll_next(cx) {
                Poll::Ready(Some(Ok(data))) => {
                    this.pending.extend(this.parser.parse_event(&data));
                }
                Poll::Ready(Some(Err(e))) => {
                    this.exhausted = true;
                    return Poll::Ready(Some(Err(e)));
                }
                Poll::Ready(None) => {
                    this.exhausted = true;
                    if !this.done_emitted {
                        this.pending.push_back(ProviderDelta::Done);
                    }
                }
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt;

    fn byte_stream(
        frames: Vec<&'static str>,
    ) -> impl Stream<Item = Result<Bytes, reqwest::Error>> + Unpin {
        futures_util::stream::iter(
            frames
                .into_iter()
                .map(|f| Ok::<_, reqwest::Error>(Bytes::from_static(f.as_bytes()))),
        )
    }

    #[tokio::test]
    async fn test_lines_reassembled_across_chunks() {
        let stream = byte_stream(vec!["data: {\"a\"", ":1}\ndata: {\"b\":2}\n"]);
        let lines: Vec<_> = SseLines::new(stream)
            .map(|r| r.unwrap())
            .collect()
            .await;
        assert_eq!(lines, vec!["{\"a\":1}", "{\"b\":2}"]);
    }

    #[tokio::test]
    async fn test_comments_and_blank_lines_skipped() {
        let stream = byte_stream(vec![": keep-alive\n\ndata: x\n\n"]);
        let lines: Vec<_> = SseLines::new(stream)
            .map(|r| r.unwrap())
            .collect()
            .await;
        assert_eq!(lines, vec!["x"]);
    }

    struct EchoParser;

    impl SseEventParser for EchoParser {
        fn parse_event(&mut self, data: &str) -> Vec<ProviderDelta> {
            if data == "[DONE]" {
                vec![ProviderDelta::Done]
            } else {
                vec![ProviderDelta::Content(data.to_string())]
            }
        }
    }

    #[tokio::test]
    async fn test_exactly_one_done_with_sentinel() {
        let stream = byte_stream(vec!["data: a\ndata: [DONE]\n"]);
        let deltas: Vec<_> = SseDeltaStream::new(stream, EchoParser)
            .map(|r| r.unwrap())
            .collect()
            .await;
        assert_eq!(
            deltas,
            vec![
                ProviderDelta::Content("a".to_string()),
                ProviderDelta::Done
            ]
        );
    }

    #[tokio::test]
    async fn test_done_synthesized_when_connection_closes() {
        let stream = byte_stream(vec!["data: a\n"]);
        let deltas: Vec<_> = SseDeltaStream::new(stream, EchoParser)
            .map(|r| r.unwrap())
            .collect()
            .await;
        assert_eq!(deltas.last(), Some(&ProviderDelta::Done));
        assert_eq!(
            deltas
                .iter()
                .filter(|d| matches!(d, ProviderDelta::Done))
                .count(),
            1
        );
    }
}
