use crate::deepseek::wire::DeltaPayload;
use bytes::Bytes;
use thiserror::Error;

pub const DONE_SENTINEL: &[u8] = b"[DONE]";

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Frame {
    Sentinel,
    Candidate(Bytes),
}

impl Frame {
    pub fn classify(payload: Bytes) -> Frame {
        if trim_ascii(&payload) == DONE_SENTINEL {
            Frame::Sentinel
        } else {
            Frame::Candidate(payload)
        }
    }
}

#[derive(Error, Debug)]
pub enum FrameError {
    #[error("frame is not valid utf-8: {0}")] Utf8(#[from] std::str::Utf8Error),
    #[error("frame is not valid json: {0}")] Json(#[from] serde_json::Error),
    #[error("frame is missing `{0}`")] MissingField(&'static str),
}

/// Content of the first choice of one streamed frame.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Delta {
    pub content: String,
    pub finish_reason: Option<String>,
}

pub fn decode_delta(payload: &[u8]) -> Result<Delta, FrameError> {
    let text = std::str::from_utf8(payload)?;
    let p: DeltaPayload = serde_json::from_str(text)?;
    let choice = p
        .choices
        .ok_or(FrameError::MissingField("choices"))?
        .into_iter()
        .next()
        .ok_or(FrameError::MissingField("choices[0]"))?;
    let content = choice
        .delta
        .ok_or(FrameError::MissingField("choices[0].delta"))?
        .content
        .ok_or(FrameError::MissingField("choices[0].delta.content"))?;
    Ok(Delta {
        content,
        finish_reason: choice.finish_reason,
    })
}

fn trim_ascii(b: &[u8]) -> &[u8] {
    let start = b.iter().position(|c| !c.is_ascii_whitespace()).unwrap_or(b.len());
    let end = b.iter().rposition(|c| !c.is_ascii_whitespace()).map_or(start, |p| p + 1);
    &b[start..end]
}
