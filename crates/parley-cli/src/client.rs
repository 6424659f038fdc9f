use anyhow::bail;
use futures_util::StreamExt;
use parley_core::{Frame, FrameDecoder, StreamEvent};
use std::io::Write;

/// Streams a query's events from a running gateway to stdout.
pub async fn run_chat(base_url: &str, query: &str) -> anyhow::Result<()> {
    let url = format!("{}/chat", base_url.trim_end_matches('/'));
    let resp = reqwest::Client::new()
        .post(&url)
        .json(&serde_json::json!({ "query": query }))
        .send()
        .await?;

    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        bail!("Server returned {status}: {body}");
    }

    let mut printer = Printer::default();
    let mut decoder = FrameDecoder::new();
    let mut body = resp.bytes_stream();

    while let Some(chunk) = body.next().await {
        for frame in decoder.push(&chunk?) {
            if printer.frame(frame)? {
                return Ok(());
            }
        }
    }
    if let Some(frame) = decoder.finish() {
        if printer.frame(frame)? {
            return Ok(());
        }
    }
    bail!("Stream ended without a terminal marker")
}

/// Prints events as they arrive. Response fragments are joined on one line.
#[derive(Default)]
struct Printer {
    in_response: bool,
}

impl Printer {
    /// Returns `true` once the terminal marker has been seen.
    fn frame(&mut self, frame: Frame) -> anyhow::Result<bool> {
        let mut out = std::io::stdout().lock();
        match frame {
            Frame::Done => {
                if self.in_response {
                    writeln!(out)?;
                }
                Ok(true)
            }
            Frame::Event(StreamEvent::Response { content }) => {
                write!(out, "{content}")?;
                out.flush()?;
                self.in_response = true;
                Ok(false)
            }
            Frame::Event(event) => {
                if std::mem::take(&mut self.in_response) {
                    writeln!(out)?;
                }
                writeln!(out, "{}", render(&event))?;
                Ok(false)
            }
        }
    }
}

fn render(event: &StreamEvent) -> String {
    match event {
        StreamEvent::Reasoning { content } => format!("[reasoning] {content}"),
        StreamEvent::ToolCall {
            tool,
            input,
            output: None,
        } => format!("[tool_call] {tool}({input}) ..."),
        StreamEvent::ToolCall {
            tool,
            output: Some(output),
            ..
        } => format!("[tool_result] {tool}:\n{output}"),
        StreamEvent::Response { content } => content.clone(),
        StreamEvent::Error { content } => format!("[error] {content}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render() {
        assert_eq!(
            render(&StreamEvent::tool_pending("web_search", "weather in Paris")),
            "[tool_call] web_search(weather in Paris) ..."
        );
        assert_eq!(
            render(&StreamEvent::tool_resolved("web_search", "q", "Sunny")),
            "[tool_result] web_search:\nSunny"
        );
        assert_eq!(render(&StreamEvent::error("boom")), "[error] boom");
        assert_eq!(render(&StreamEvent::reasoning("hm")), "[reasoning] hm");
    }
}
