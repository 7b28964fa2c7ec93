use crate::deepseek::frame::{decode_delta, Frame};
use crate::deepseek::splitter::EventSplitter;
use aistudy_core::llm::{ChatDelta, ChatError, SessionResult};
use bytes::Bytes;
use futures::{Stream, StreamExt};
use std::time::Duration;
use tracing::{debug, info, warn};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Requesting,
    Streaming,
    Completed,
    Failed,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SessionEvent {
    Fragment(String),
    Finished(SessionResult),
}

impl SessionEvent {
    pub fn into_item(self) -> Result<ChatDelta, ChatError> {
        match self {
            SessionEvent::Fragment(t) => Ok(ChatDelta::Text(t)),
            SessionEvent::Finished(SessionResult::Completed { finish_reason }) => {
                Ok(ChatDelta::Finish(finish_reason))
            }
            SessionEvent::Finished(SessionResult::Failed(e)) => Err(e),
        }
    }
}

/// State of one streaming exchange. Transport-free: the caller feeds it body
/// chunks and transport outcomes and forwards the events it returns.
///
/// `Completed` and `Failed` are absorbing, so at most one `Finished` event is
/// ever produced and nothing follows it.
#[derive(Debug)]
pub struct StreamSession {
    state: SessionState,
    splitter: EventSplitter,
    finish_reason: Option<String>,
    fragments: usize,
    dropped_frames: usize,
}

impl Default for StreamSession {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamSession {
    pub fn new() -> Self {
        Self {
            state: SessionState::Idle,
            splitter: EventSplitter::new(),
            finish_reason: None,
            fragments: 0,
            dropped_frames: 0,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.state, SessionState::Completed | SessionState::Failed)
    }

    pub fn fragments(&self) -> usize {
        self.fragments
    }

    pub fn dropped_frames(&self) -> usize {
        self.dropped_frames
    }

    pub fn begin(&mut self) {
        if self.state == SessionState::Idle {
            self.state = SessionState::Requesting;
        }
    }

    pub fn on_chunk(&mut self, chunk: &[u8]) -> Vec<SessionEvent> {
        let mut out = Vec::new();
        if self.is_terminal() {
            return out;
        }
        self.state = SessionState::Streaming;
        for frame in self.splitter.push(chunk) {
            self.handle_frame(frame, &mut out);
            if self.is_terminal() {
                break;
            }
        }
        out
    }

    /// Transport reported a clean end of body.
    pub fn on_close(&mut self) -> Vec<SessionEvent> {
        let mut out = Vec::new();
        if self.is_terminal() {
            return out;
        }
        if let Some(tail) = self.splitter.finish() {
            self.handle_frame(tail, &mut out);
        }
        out.extend(self.complete());
        out
    }

    pub fn fail(&mut self, err: ChatError) -> Option<SessionEvent> {
        if self.is_terminal() {
            return None;
        }
        warn!(target: "providers::deepseek", "stream failed after {} fragments: {}", self.fragments, err);
        self.state = SessionState::Failed;
        self.splitter.clear();
        Some(SessionEvent::Finished(SessionResult::Failed(err)))
    }

    fn complete(&mut self) -> Option<SessionEvent> {
        if self.is_terminal() {
            return None;
        }
        info!(
            target: "providers::deepseek",
            "stream completed fragments={} dropped_frames={}", self.fragments, self.dropped_frames
        );
        self.state = SessionState::Completed;
        self.splitter.clear();
        Some(SessionEvent::Finished(SessionResult::Completed {
            finish_reason: self.finish_reason.take(),
        }))
    }

    fn handle_frame(&mut self, payload: Bytes, out: &mut Vec<SessionEvent>) {
        match Frame::classify(payload) {
            Frame::Sentinel => out.extend(self.complete()),
            Frame::Candidate(p) => match decode_delta(&p) {
                Ok(delta) => {
                    if delta.finish_reason.is_some() {
                        self.finish_reason = delta.finish_reason;
                    }
                    if !delta.content.is_empty() {
                        self.fragments += 1;
                        out.push(SessionEvent::Fragment(delta.content));
                    }
                }
                Err(e) => {
                    self.dropped_frames += 1;
                    warn!(target: "providers::deepseek", "dropping frame: {}", e);
                    debug!(target: "providers::deepseek", "dropped frame raw={:?}", String::from_utf8_lossy(&p));
                }
            },
        }
    }
}

/// Runs `session` over a response body and yields its events as chat stream items.
///
/// Ends right after the terminal item. A gap longer than `idle` between two
/// chunks fails the session with [`ChatError::Timeout`]. Dropping the returned
/// stream drops `body`.
pub fn drive<'a, S>(
    mut session: StreamSession,
    body: S,
    idle: Duration,
) -> impl Stream<Item = Result<ChatDelta, ChatError>> + Send + 'a
where
    S: Stream<Item = Result<Bytes, ChatError>> + Send + 'a,
{
    async_stream::stream! {
        let mut body = Box::pin(body);
        loop {
            let events: Vec<SessionEvent> = tokio::select! {
                chunk = body.next() => match chunk {
                    Some(Ok(b)) => session.on_chunk(&b),
                    Some(Err(e)) => session.fail(e).into_iter().collect(),
                    None => session.on_close(),
                },
                _ = tokio::time::sleep(idle) => session
                    .fail(ChatError::Timeout(format!("no data for {}ms", idle.as_millis())))
                    .into_iter()
                    .collect(),
            };
            for ev in events {
                yield ev.into_item();
            }
            if session.is_terminal() {
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;
    use std::pin::Pin;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::task::{Context, Poll};

    fn frame(text: &str) -> String {
        format!(
            "data: {}\n\n",
            serde_json::json!({"choices": [{"index": 0, "delta": {"content": text}}]})
        )
    }

    fn texts(events: &[SessionEvent]) -> Vec<&str> {
        events
            .iter()
            .filter_map(|e| match e {
                SessionEvent::Fragment(t) => Some(t.as_str()),
                _ => None,
            })
            .collect()
    }

    fn body(chunks: Vec<Result<Bytes, ChatError>>) -> impl Stream<Item = Result<Bytes, ChatError>> {
        stream::iter(chunks)
    }

    #[test]
    fn walks_through_states() {
        let mut s = StreamSession::new();
        assert_eq!(s.state(), SessionState::Idle);
        s.begin();
        assert_eq!(s.state(), SessionState::Requesting);
        s.on_chunk(frame("a").as_bytes());
        assert_eq!(s.state(), SessionState::Streaming);
        s.on_chunk(b"data: [DONE]\n\n");
        assert_eq!(s.state(), SessionState::Completed);
    }

    #[test]
    fn n_frames_then_sentinel_gives_n_fragments_and_one_completion() {
        let mut wire = String::new();
        for w in ["The", " sky", " is", " blue"] {
            wire.push_str(&frame(w));
        }
        wire.push_str("data: [DONE]\n\n");

        // Same bytes, cut into 7-byte chunks.
        let mut s = StreamSession::new();
        s.begin();
        let mut events = Vec::new();
        for chunk in wire.as_bytes().chunks(7) {
            events.extend(s.on_chunk(chunk));
        }
        events.extend(s.on_close());

        assert_eq!(texts(&events), vec!["The", " sky", " is", " blue"]);
        assert_eq!(
            events.last(),
            Some(&SessionEvent::Finished(SessionResult::Completed { finish_reason: None }))
        );
        let finished = events
            .iter()
            .filter(|e| matches!(e, SessionEvent::Finished(_)))
            .count();
        assert_eq!(finished, 1);
    }

    #[test]
    fn chunking_does_not_change_output() {
        let frames: Vec<String> = ["1", "2", "3"].iter().map(|t| frame(t)).collect();

        let mut whole = StreamSession::new();
        let a = whole.on_chunk(frames.concat().as_bytes());

        let mut split = StreamSession::new();
        let mut b = Vec::new();
        for f in &frames {
            b.extend(split.on_chunk(f.as_bytes()));
        }
        assert_eq!(a, b);
    }

    #[test]
    fn malformed_frame_is_isolated() {
        let mut s = StreamSession::new();
        let chunk = format!(
            "{}data: {{\"object\":\"chunk\"}}\n\ndata: {{oops\n\n{}",
            frame("before"),
            frame("after")
        );
        let events = s.on_chunk(chunk.as_bytes());
        assert_eq!(texts(&events), vec!["before", "after"]);
        assert_eq!(s.dropped_frames(), 2);
        assert_eq!(s.state(), SessionState::Streaming);
    }

    #[test]
    fn nothing_after_sentinel() {
        let mut s = StreamSession::new();
        let chunk = format!("{}data: [DONE]\n\n{}", frame("x"), frame("late"));
        let events = s.on_chunk(chunk.as_bytes());
        assert_eq!(texts(&events), vec!["x"]);
        assert!(s.on_chunk(frame("later").as_bytes()).is_empty());
        assert!(s.on_close().is_empty());
        assert!(s.fail(ChatError::Network("reset".into())).is_none());
    }

    #[test]
    fn close_flushes_tail_and_completes() {
        let mut s = StreamSession::new();
        let f = frame("tail");
        let events = s.on_chunk(f.trim_end().as_bytes());
        assert!(events.is_empty());
        let events = s.on_close();
        assert_eq!(texts(&events), vec!["tail"]);
        assert_eq!(s.state(), SessionState::Completed);
    }

    #[test]
    fn empty_content_is_not_a_fragment_but_finish_reason_is_kept() {
        let mut s = StreamSession::new();
        let chunk = concat!(
            "data: {\"choices\":[{\"delta\":{\"role\":\"assistant\",\"content\":\"\"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"\"},\"finish_reason\":\"length\"}]}\n\n",
            "data: [DONE]\n\n",
        );
        let events = s.on_chunk(chunk.as_bytes());
        assert_eq!(s.fragments(), 0);
        assert_eq!(
            events,
            vec![SessionEvent::Finished(SessionResult::Completed {
                finish_reason: Some("length".into())
            })]
        );
    }

    #[tokio::test]
    async fn transport_error_mid_stream_fails_once() {
        let chunks = vec![
            Ok(Bytes::from(frame("one"))),
            Err(ChatError::Network("connection reset".into())),
            Ok(Bytes::from(frame("never"))),
        ];
        let items: Vec<_> = drive(StreamSession::new(), body(chunks), Duration::from_secs(5))
            .collect()
            .await;
        assert_eq!(
            items,
            vec![
                Ok(ChatDelta::Text("one".into())),
                Err(ChatError::Network("connection reset".into())),
            ]
        );
    }

    #[tokio::test]
    async fn clean_close_without_sentinel_completes() {
        let chunks = vec![Ok(Bytes::from(frame("a"))), Ok(Bytes::from(frame("b")))];
        let items: Vec<_> = drive(StreamSession::new(), body(chunks), Duration::from_secs(5))
            .collect()
            .await;
        assert_eq!(
            items,
            vec![
                Ok(ChatDelta::Text("a".into())),
                Ok(ChatDelta::Text("b".into())),
                Ok(ChatDelta::Finish(None)),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn idle_body_times_out() {
        let first: Vec<Result<Bytes, ChatError>> = vec![Ok(Bytes::from(frame("a")))];
        let chunks = stream::iter(first).chain(stream::pending());
        let items: Vec<_> = drive(StreamSession::new(), chunks, Duration::from_secs(5))
            .collect()
            .await;
        assert_eq!(items.len(), 2);
        assert_eq!(items[0], Ok(ChatDelta::Text("a".into())));
        assert!(matches!(items[1], Err(ChatError::Timeout(_))));
    }

    struct Tracked<S> {
        inner: S,
        dropped: Arc<AtomicBool>,
    }

    impl<S: Stream + Unpin> Stream for Tracked<S> {
        type Item = S::Item;

        fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<S::Item>> {
            Pin::new(&mut self.inner).poll_next(cx)
        }
    }

    impl<S> Drop for Tracked<S> {
        fn drop(&mut self) {
            self.dropped.store(true, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn dropping_the_stream_releases_the_body() {
        let dropped = Arc::new(AtomicBool::new(false));
        let sent: Vec<Result<Bytes, ChatError>> =
            vec![Ok(Bytes::from(frame("k"))), Ok(Bytes::from(frame("k+1")))];
        let chunks = Tracked {
            inner: stream::iter(sent).chain(stream::pending()),
            dropped: dropped.clone(),
        };
        let mut items = Box::pin(drive(StreamSession::new(), chunks, Duration::from_secs(60)));
        assert_eq!(items.next().await, Some(Ok(ChatDelta::Text("k".into()))));
        assert!(!dropped.load(Ordering::SeqCst));
        drop(items);
        assert!(dropped.load(Ordering::SeqCst));
    }
}
