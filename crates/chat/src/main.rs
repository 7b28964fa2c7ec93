mod commands;
mod logging;
mod transcript;

use aistudy_core::llm::{ChatDelta, ChatError, ChatOpts, ModelClient, SessionResult};
use anyhow::{Context, Result};
use commands::Command;
use futures::StreamExt;
use providers::deepseek::{DeepSeekClient, DeepSeekConfig};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Stdout};
use tracing::{error, info};
use transcript::Transcript;

#[tokio::main]
async fn main() -> Result<()> {
    let _log_guard = logging::init()?;
    let cfg = DeepSeekConfig::from_env_and_file()
        .context("set DEEPSEEK_API_KEY or deepseek_api_key in the config file")?;
    let client = DeepSeekClient::new(cfg).context("build http client")?;
    let mut opts = client.default_opts();
    let mut transcript = Transcript::new();
    let mut out = tokio::io::stdout();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    say(&mut out, &format!("aistudy chat ({}). /help for commands.\n", opts.model)).await?;
    loop {
        say(&mut out, "> ").await?;
        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(line) = line else { break };
        let Some(cmd) = commands::parse(&line) else { continue };
        match cmd {
            Command::Send(text) => {
                transcript.push_user(text);
                info!(target: "chat", "submit: model={} history_len={}", opts.model, transcript.len());
                stream_reply(&client, &opts, &mut transcript, &mut out).await?;
            }
            Command::Once(text) => {
                transcript.push_user(text);
                match client.send_chat(&transcript.history(), &opts).await {
                    Ok(res) => {
                        say(&mut out, &format!("{}\n", res.text)).await?;
                        transcript.push_assistant(res.text);
                    }
                    Err(e) => {
                        transcript.discard_unanswered();
                        say(&mut out, &format!("[error] {}\n", e)).await?;
                    }
                }
            }
            Command::Json(prompt) => match client.fetch_structured::<serde_json::Value>(&prompt).await {
                Ok(v) => say(&mut out, &format!("{:#}\n", v)).await?,
                Err(e) => say(&mut out, &format!("[error] {}\n", e)).await?,
            },
            Command::Model(None) => say(&mut out, &format!("[info] model is '{}'\n", opts.model)).await?,
            Command::Model(Some(m)) => {
                opts.model = m;
                info!(target: "chat", "model set to {}", opts.model);
                say(&mut out, &format!("[info] model set to '{}'\n", opts.model)).await?;
            }
            Command::Clear => {
                transcript.clear();
                say(&mut out, "[info] conversation cleared\n").await?;
            }
            Command::Help => say(&mut out, &format!("{}\n", commands::HELP)).await?,
            Command::Quit => break,
            Command::Unknown(s) => say(&mut out, &format!("[info] unknown command '{}'\n", s)).await?,
        }
    }
    Ok(())
}

/// Streams one reply to stdout. Ctrl-C drops the stream, which cancels the request.
async fn stream_reply(
    client: &DeepSeekClient,
    opts: &ChatOpts,
    transcript: &mut Transcript,
    out: &mut Stdout,
) -> Result<()> {
    let mut stream = client.stream_chat(transcript.history(), opts.clone());
    transcript.begin_reply();
    let outcome = loop {
        tokio::select! {
            item = stream.next() => match item {
                Some(Ok(ChatDelta::Text(t))) => {
                    transcript.append_reply(&t);
                    say(out, &t).await?;
                }
                Some(Ok(ChatDelta::Finish(finish_reason))) => break SessionResult::Completed { finish_reason },
                Some(Err(e)) => break SessionResult::Failed(e),
                None => break SessionResult::Completed { finish_reason: None },
            },
            _ = tokio::signal::ctrl_c() => break SessionResult::Failed(ChatError::Canceled),
        }
    };
    drop(stream);
    transcript.finish_reply();
    match outcome {
        SessionResult::Completed { finish_reason: Some(r) } if r == "length" => {
            say(out, "\n[info] reply truncated at the token limit\n").await
        }
        SessionResult::Completed { .. } => say(out, "\n").await,
        SessionResult::Failed(ChatError::Canceled) => say(out, "\n[canceled]\n").await,
        SessionResult::Failed(e) => {
            error!(target: "chat", "reply failed: {}", e);
            say(out, &format!("\n[error] {}\n", e)).await
        }
    }
}

async fn say(out: &mut Stdout, text: &str) -> Result<()> {
    out.write_all(text.as_bytes()).await?;
    out.flush().await?;
    Ok(())
}
