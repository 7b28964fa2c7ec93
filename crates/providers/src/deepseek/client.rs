use crate::deepseek::config::DeepSeekConfig;
use crate::deepseek::session::{drive, StreamSession};
use crate::deepseek::wire::{parse_completion, ChatRequest};
use aistudy_core::llm::{
    ChatError, ChatOpts, ChatResult, ChatStream, Message, ModelClient, ResponseFormat,
};
use futures::StreamExt;
use reqwest::{header, Client, StatusCode};
use serde::de::DeserializeOwned;
use tokio::time::Duration;
use tracing::{debug, error, info};

/// System prompt for structured replies: the model must answer with JSON only.
pub const JSON_GENERATOR_PROMPT: &str = "You are a JSON data generator. Reply only with JSON that matches the requested structure, without any other text or explanation.";

#[derive(Clone)]
pub struct DeepSeekClient {
    http: Client,
    cfg: DeepSeekConfig,
}

impl DeepSeekClient {
    pub fn new(cfg: DeepSeekConfig) -> anyhow::Result<Self> {
        let mut headers = header::HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            header::HeaderValue::from_str(&format!("Bearer {}", cfg.api_key))?,
        );
        headers.insert(
            header::CONTENT_TYPE,
            header::HeaderValue::from_static("application/json"),
        );
        // No whole-request timeout on the client: it would cut long streams.
        // Single-shot calls set `cfg.timeout` per request; streams bound the header wait with it.
        let mut builder = Client::builder()
            .default_headers(headers)
            .use_rustls_tls()
            .pool_idle_timeout(Duration::from_secs(30))
            .pool_max_idle_per_host(2)
            .connect_timeout(cfg.timeout);
        if let Some(p) = &cfg.proxy {
            builder = builder.proxy(reqwest::Proxy::all(p)?);
        }
        let http = builder.build()?;
        Ok(Self { http, cfg })
    }

    /// Options for the configured model.
    pub fn default_opts(&self) -> ChatOpts {
        ChatOpts::new(self.cfg.model.clone())
    }

    /// Asks for a JSON object answering `prompt` and decodes it into `T`.
    pub async fn fetch_structured<T: DeserializeOwned>(&self, prompt: &str) -> Result<T, ChatError> {
        let msgs = [Message::system(JSON_GENERATOR_PROMPT), Message::user(prompt)];
        let opts = self.default_opts().with_response_format(ResponseFormat::JsonObject);
        let res = self.send_chat(&msgs, &opts).await?;
        serde_json::from_str(&res.text).map_err(|e| {
            error!(target: "providers::deepseek", "structured reply does not decode: {}", e);
            ChatError::Decode(e.to_string())
        })
    }
}

#[allow(async_fn_in_trait)]
impl ModelClient for DeepSeekClient {
    async fn send_chat(&self, msgs: &[Message], opts: &ChatOpts) -> Result<ChatResult, ChatError> {
        let url = self.cfg.completions_url();
        info!(target: "providers::deepseek", "send chat model={} url={} messages={}", opts.model, url, msgs.len());
        let body = ChatRequest::new(&opts.model, msgs, false, opts.response_format);
        let resp = self
            .http
            .post(url)
            .timeout(self.cfg.timeout)
            .json(&body)
            .send()
            .await
            .map_err(map_reqwest_err)?;
        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.ok();
            error!(target: "providers::deepseek", "chat non-2xx status={} body={:?}", status, body);
            return Err(map_status_err(status, body));
        }
        let bytes = resp.bytes().await.map_err(map_reqwest_err)?;
        let res = parse_completion(&bytes)?;
        debug!(
            target: "providers::deepseek",
            "chat reply len={} finish={:?} usage={:?}/{:?}",
            res.text.len(), res.finish_reason, res.prompt_tokens, res.completion_tokens
        );
        Ok(res)
    }

    fn stream_chat<'a>(&'a self, msgs: Vec<Message>, opts: ChatOpts) -> ChatStream<'a> {
        let url = self.cfg.completions_url();
        let http = self.http.clone();
        let idle = self.cfg.stream_idle_timeout;
        let timeout = self.cfg.timeout;
        let s = async_stream::stream! {
            let mut session = StreamSession::new();
            session.begin();
            info!(target: "providers::deepseek", "start chat stream model={} url={}", opts.model, url);
            let body = ChatRequest::new(&opts.model, &msgs, true, opts.response_format);
            // Covers the wait for response headers; the body is guarded by the idle timer.
            let sent = tokio::time::timeout(timeout, http.post(&url).json(&body).send()).await;
            let resp = match sent {
                Ok(Ok(r)) => r,
                Ok(Err(e)) => {
                    if let Some(ev) = session.fail(map_reqwest_err(e)) {
                        yield ev.into_item();
                    }
                    return;
                }
                Err(_) => {
                    let err = ChatError::Timeout(format!("no response headers within {}ms", timeout.as_millis()));
                    if let Some(ev) = session.fail(err) {
                        yield ev.into_item();
                    }
                    return;
                }
            };
            if !resp.status().is_success() {
                let status = resp.status();
                let body = resp.text().await.ok();
                error!(target: "providers::deepseek", "chat stream non-2xx status={} body={:?}", status, body);
                if let Some(ev) = session.fail(map_status_err(status, body)) {
                    yield ev.into_item();
                }
                return;
            }
            let chunks = resp.bytes_stream().map(|r| r.map_err(map_reqwest_err));
            let mut items = Box::pin(drive(session, chunks, idle));
            while let Some(item) = items.next().await {
                yield item;
            }
        };
        Box::pin(s)
    }
}

fn map_reqwest_err(e: reqwest::Error) -> ChatError {
    if e.is_timeout() {
        ChatError::Timeout(e.to_string())
    } else if e.is_request() || e.is_connect() || e.is_body() {
        ChatError::Network(e.to_string())
    } else if e.is_decode() {
        ChatError::Decode(e.to_string())
    } else {
        ChatError::Other(e.to_string())
    }
}

fn map_status_err(status: StatusCode, body: Option<String>) -> ChatError {
    let s = format!("{} {}", status.as_u16(), body.unwrap_or_default());
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ChatError::Auth(s),
        StatusCode::TOO_MANY_REQUESTS => ChatError::RateLimit(s),
        StatusCode::INTERNAL_SERVER_ERROR
        | StatusCode::BAD_GATEWAY
        | StatusCode::SERVICE_UNAVAILABLE
        | StatusCode::GATEWAY_TIMEOUT => ChatError::Network(s),
        _ => ChatError::Status(s),
    }
}
