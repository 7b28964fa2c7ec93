pub mod llm {
    use futures::Stream;
    use serde::{Deserialize, Serialize};
    use std::pin::Pin;
    use thiserror::Error;

    #[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
    #[serde(rename_all = "lowercase")]
    pub enum Role {
        System,
        User,
        Assistant,
    }

    #[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
    pub struct Message {
        pub role: Role,
        pub content: String,
    }

    impl Message {
        pub fn system<S: Into<String>>(s: S) -> Self {
            Self {
                role: Role::System,
                content: s.into(),
            }
        }
        pub fn user<S: Into<String>>(s: S) -> Self {
            Self {
                role: Role::User,
                content: s.into(),
            }
        }
        pub fn assistant<S: Into<String>>(s: S) -> Self {
            Self {
                role: Role::Assistant,
                content: s.into(),
            }
        }

        /// An assistant turn with no text yet, i.e. the slot a streaming reply is written into.
        pub fn is_placeholder(&self) -> bool {
            self.role == Role::Assistant && self.content.trim().is_empty()
        }
    }

    /// Structured-output hint sent as `response_format`.
    #[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
    #[serde(tag = "type", rename_all = "snake_case")]
    pub enum ResponseFormat {
        Text,
        JsonObject,
    }

    #[derive(Clone, Debug)]
    pub struct ChatOpts {
        pub model: String,
        pub response_format: Option<ResponseFormat>,
    }

    impl ChatOpts {
        pub fn new<S: Into<String>>(model: S) -> Self {
            Self {
                model: model.into(),
                response_format: None,
            }
        }

        pub fn with_response_format(mut self, format: ResponseFormat) -> Self {
            self.response_format = Some(format);
            self
        }
    }

    /// One item of a chat stream. `Text` is never empty; `Finish` is the last item
    /// of a stream that completed normally.
    #[derive(Clone, Debug, PartialEq, Eq)]
    pub enum ChatDelta {
        Text(String),
        Finish(Option<String>),
    }

    #[derive(Clone, Debug, PartialEq, Eq)]
    pub struct ChatResult {
        pub text: String,
        pub finish_reason: Option<String>,
        pub prompt_tokens: Option<u32>,
        pub completion_tokens: Option<u32>,
    }

    /// Terminal outcome of one streaming session.
    #[derive(Clone, Debug, PartialEq, Eq)]
    pub enum SessionResult {
        Completed { finish_reason: Option<String> },
        Failed(ChatError),
    }

    #[derive(Error, Debug, Clone, PartialEq, Eq)]
    pub enum ChatError {
        #[error("config: {0}")] Config(String),
        #[error("auth error: {0}")] Auth(String),
        #[error("rate limit: {0}")] RateLimit(String),
        #[error("timeout: {0}")] Timeout(String),
        #[error("network: {0}")] Network(String),
        #[error("status: {0}")] Status(String),
        #[error("decode: {0}")] Decode(String),
        #[error("unparseable response: {0}")] ResponseShape(String),
        #[error("canceled")] Canceled,
        #[error("other: {0}")] Other(String),
    }

    impl ChatError {
        /// Errors raised by the connection itself rather than by the content it carried.
        pub fn is_transport(&self) -> bool {
            matches!(
                self,
                ChatError::Auth(_)
                    | ChatError::RateLimit(_)
                    | ChatError::Timeout(_)
                    | ChatError::Network(_)
                    | ChatError::Status(_)
            )
        }
    }

    pub type ChatStream<'a> = Pin<Box<dyn Stream<Item = Result<ChatDelta, ChatError>> + Send + 'a>>;

    #[allow(async_fn_in_trait)]
    pub trait ModelClient: Send + Sync {
        async fn send_chat(&self, msgs: &[Message], opts: &ChatOpts) -> Result<ChatResult, ChatError>;

        /// Lazily opens a streaming completion. The request is issued on first poll;
        /// dropping the stream cancels it.
        fn stream_chat<'a>(&'a self, msgs: Vec<Message>, opts: ChatOpts) -> ChatStream<'a>;
    }

}
