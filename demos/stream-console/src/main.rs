//! Console client for a streaming agent backend.
//!
//! Run with: cargo run -p stream-console -- "your prompt"
//!
//! The backend URL is taken from `AGENT_STREAM_URL` (default
//! `http://localhost:3000`). Questions asked by the agent are answered
//! interactively on stdin.

use std::sync::Arc;

use agent_stream_core::{
    AnswerType, AnswerValue, ConnectionState, EventPayload, Question, SessionMsg, TaskContext,
};
use agent_stream_session::{SessionConfig, SessionHandle, TaskSession};
use agent_stream_transport::HttpTransport;
use anyhow::Context as _;
use futures::StreamExt;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let prompt = std::env::args().skip(1).collect::<Vec<_>>().join(" ");
    anyhow::ensure!(!prompt.is_empty(), "usage: stream-console <prompt>");

    let base_url =
        std::env::var("AGENT_STREAM_URL").unwrap_or_else(|_| "http://localhost:3000".into());
    let transport = Arc::new(HttpTransport::new(&base_url).context("building transport")?);

    let handle = TaskSession::spawn(
        transport,
        TaskContext::new(prompt),
        SessionConfig::default(),
    );
    spawn_status_printer(&handle);

    let mut messages = handle.messages();
    while let Some(msg) = messages.next().await {
        match msg {
            SessionMsg::Event(event) => {
                if handle_event(&handle, event.payload).await? {
                    handle.stop();
                }
            }
            SessionMsg::ProtocolViolation { message } => {
                tracing::warn!(message, "protocol violation");
            }
            SessionMsg::Fatal { message } => {
                anyhow::bail!("{message}");
            }
            SessionMsg::Finished => break,
        }
    }
    Ok(())
}

/// Render one event; returns true once the task is complete.
async fn handle_event(handle: &SessionHandle, payload: EventPayload) -> anyhow::Result<bool> {
    match payload {
        EventPayload::Text { content } => println!("{content}"),
        EventPayload::Thinking { content } => println!("(thinking) {content}"),
        EventPayload::ToolUse { tool_name, tool_input } => {
            println!("[tool] {tool_name} {tool_input}");
        }
        EventPayload::ToolResult { tool_name, content, .. } => {
            let name = tool_name.unwrap_or_else(|| "tool".into());
            println!("[{name}] {}", content.unwrap_or_default());
        }
        EventPayload::Error { content } => eprintln!("task error: {content}"),
        EventPayload::Complete { .. } => {
            println!("-- task complete --");
            return Ok(true);
        }
        EventPayload::AskUserQuestion { question } => {
            let answer = read_answer(&question).await?;
            handle
                .answer(&question.id, answer)
                .await
                .context("submitting answer")?;
        }
    }
    Ok(false)
}

fn spawn_status_printer(handle: &SessionHandle) {
    let mut status = handle.status();
    tokio::spawn(async move {
        while status.changed().await.is_ok() {
            let snapshot = *status.borrow_and_update();
            match (snapshot.state, snapshot.retry) {
                (ConnectionState::Reconnecting, Some(retry)) => {
                    eprintln!(
                        "· reconnecting (attempt {}/{}) in {}s",
                        retry.attempt,
                        retry.max_attempts,
                        retry.delay.as_secs()
                    );
                }
                (state, _) => eprintln!("· {state:?}"),
            }
        }
    });
}

/// Prompt on stdin for an answer matching the question's type.
async fn read_answer(question: &Question) -> anyhow::Result<AnswerValue> {
    println!();
    println!("? {}", question.prompt);
    for option in &question.options {
        let marker = if option.is_default { "*" } else { " " };
        match &option.description {
            Some(desc) => println!("  {marker} {} - {} ({desc})", option.id, option.label),
            None => println!("  {marker} {} - {}", option.id, option.label),
        }
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = lines
            .next_line()
            .await
            .context("reading stdin")?
            .unwrap_or_default();
        let input = line.trim();

        let answer = match question.answer_type {
            AnswerType::Boolean => match input {
                "y" | "yes" | "true" => AnswerValue::Boolean(true),
                "n" | "no" | "false" => AnswerValue::Boolean(false),
                _ => {
                    println!("please answer y/n");
                    continue;
                }
            },
            AnswerType::FreeText => AnswerValue::Text(input.to_string()),
            AnswerType::SingleChoice => {
                if input.is_empty() {
                    match question.default_option() {
                        Some(option) => AnswerValue::Text(option.id.clone()),
                        None => {
                            println!("pick an option id");
                            continue;
                        }
                    }
                } else {
                    AnswerValue::Text(input.to_string())
                }
            }
            AnswerType::MultiChoice => AnswerValue::Options(
                input
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect(),
            ),
        };

        match question.validate_answer(&answer) {
            Ok(()) => return Ok(answer),
            Err(error) => println!("{error}; try again"),
        }
    }
}
