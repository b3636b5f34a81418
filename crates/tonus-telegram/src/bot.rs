use std::time::Duration;

use reqwest::Client;
use serde::de::DeserializeOwned;
use tonus_core::error::{Result, TonusError};

use crate::types::*;

const MAX_MESSAGE_LENGTH: usize = 4096;
/// Upper bound per request. Must stay above the getUpdates long-poll window.
const REQUEST_TIMEOUT_SECS: u64 = 60;

pub struct TelegramBot {
    client: Client,
    token: String,
    base_url: String,
}

impl TelegramBot {
    pub fn new(token: String) -> Self {
        let base_url = format!("https://api.telegram.org/bot{token}");
        Self {
            client: Client::builder()
                .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
                .build()
                .expect("failed to build HTTP client"),
            token,
            base_url,
        }
    }

    /// POST a Bot API method and decode the wrapped result.
    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        body: &serde_json::Value,
    ) -> Result<T> {
        let url = format!("{}/{method}", self.base_url);

        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| TonusError::Telegram(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TonusError::Http {
                status: status.as_u16(),
                body,
            });
        }

        let telegram_response: TelegramResponse<T> = response
            .json()
            .await
            .map_err(|e| TonusError::Telegram(e.to_string()))?;

        if !telegram_response.ok {
            return Err(TonusError::Telegram(
                telegram_response
                    .description
                    .unwrap_or_else(|| "unknown error".to_string()),
            ));
        }

        telegram_response
            .result
            .ok_or_else(|| TonusError::Telegram("missing result in response".to_string()))
    }

    pub async fn get_me(&self) -> Result<User> {
        self.call("getMe", &serde_json::json!({})).await
    }

    pub async fn get_updates(&self, offset: i64, timeout: u32) -> Result<Vec<Update>> {
        let body = serde_json::json!({
            "offset": offset,
            "timeout": timeout,
            "allowed_updates": ["message"],
        });
        self.call("getUpdates", &body).await
    }

    /// Send a formatted message, splitting if it exceeds the Telegram limit.
    pub async fn send_message(&self, chat_id: i64, text: &str) -> Result<()> {
        for chunk in render_chunks(text) {
            let body = serde_json::json!({
                "chat_id": chat_id,
                "text": chunk,
                "parse_mode": "HTML",
            });
            let _: serde_json::Value = self.call("sendMessage", &body).await?;
        }

        Ok(())
    }

    /// Send a plain-text message and return the message_id (for later editing).
    pub async fn send_message_with_id(&self, chat_id: i64, text: &str) -> Result<i64> {
        let body = serde_json::json!({
            "chat_id": chat_id,
            "text": text,
        });

        let result: serde_json::Value = self.call("sendMessage", &body).await?;
        result["message_id"]
            .as_i64()
            .ok_or_else(|| TonusError::Telegram("missing message_id in response".to_string()))
    }

    /// Edit a message as plain text (no formatting).
    pub async fn edit_message(&self, chat_id: i64, message_id: i64, text: &str) -> Result<()> {
        let body = serde_json::json!({
            "chat_id": chat_id,
            "message_id": message_id,
            "text": text,
        });

        match self.call::<serde_json::Value>("editMessageText", &body).await {
            Ok(_) => Ok(()),
            Err(TonusError::Http { status, body }) => {
                if body.contains("message is not modified") {
                    return Ok(());
                }
                Err(TonusError::Http { status, body })
            }
            Err(e) => Err(e),
        }
    }

    /// Edit a message with formatting. Converts Markdown to Telegram HTML.
    /// Falls back to plain text if Telegram rejects the HTML.
    pub async fn edit_message_formatted(
        &self,
        chat_id: i64,
        message_id: i64,
        text: &str,
    ) -> Result<()> {
        let html = markdown_to_html(text);
        let body = serde_json::json!({
            "chat_id": chat_id,
            "message_id": message_id,
            "text": html,
            "parse_mode": "HTML",
        });

        match self.call::<serde_json::Value>("editMessageText", &body).await {
            Ok(_) => Ok(()),
            Err(TonusError::Http { body, .. }) if body.contains("message is not modified") => {
                Ok(())
            }
            // HTML rejected — fall back to plain text
            Err(_) => self.edit_message(chat_id, message_id, text).await,
        }
    }

    pub async fn delete_message(&self, chat_id: i64, message_id: i64) -> Result<()> {
        let body = serde_json::json!({
            "chat_id": chat_id,
            "message_id": message_id,
        });
        let _: serde_json::Value = self.call("deleteMessage", &body).await?;
        Ok(())
    }

    pub async fn send_typing(&self, chat_id: i64) -> Result<()> {
        let body = serde_json::json!({
            "chat_id": chat_id,
            "action": "typing",
        });
        let _: serde_json::Value = self.call("sendChatAction", &body).await?;
        Ok(())
    }

    pub async fn get_file(&self, file_id: &str) -> Result<File> {
        let body = serde_json::json!({
            "file_id": file_id,
        });
        self.call("getFile", &body).await
    }

    pub async fn download_file(&self, file_path: &str) -> Result<Vec<u8>> {
        let url = format!(
            "https://api.telegram.org/file/bot{}/{}",
            self.token, file_path
        );

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| TonusError::Telegram(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TonusError::Http {
                status: status.as_u16(),
                body,
            });
        }

        response
            .bytes()
            .await
            .map(|b| b.to_vec())
            .map_err(|e| TonusError::Telegram(e.to_string()))
    }
}

/// Convert standard Markdown to Telegram-compatible HTML using pulldown-cmark.
///
/// Telegram supports: <b>, <i>, <u>, <s>, <code>, <pre>, <a href="">, <blockquote>.
/// Headers are rendered as bold text. Unsupported elements are passed through as text.
fn markdown_to_html(text: &str) -> String {
    use pulldown_cmark::{CodeBlockKind, Event, Options, Parser, Tag, TagEnd};

    let options = Options::ENABLE_STRIKETHROUGH;
    let parser = Parser::new_ext(text, options);

    let mut html = String::with_capacity(text.len() + 128);

    for event in parser {
        match event {
            Event::Start(tag) => match tag {
                Tag::Heading { .. } => html.push_str("\n<b>"),
                Tag::Paragraph => {}
                Tag::Strong => html.push_str("<b>"),
                Tag::Emphasis => html.push_str("<i>"),
                Tag::Strikethrough => html.push_str("<s>"),
                Tag::BlockQuote(_) => html.push_str("<blockquote>"),
                Tag::CodeBlock(kind) => match kind {
                    CodeBlockKind::Fenced(lang) if !lang.is_empty() => {
                        html.push_str(&format!(
                            "<pre><code class=\"language-{}\">",
                            html_escape(&lang)
                        ));
                    }
                    _ => html.push_str("<pre><code>"),
                },
                Tag::Link { dest_url, .. } => {
                    html.push_str(&format!("<a href=\"{}\">", html_escape(&dest_url)));
                }
                Tag::List(Some(start)) => {
                    html.push_str(&format!("\n{start}. "));
                }
                Tag::List(None) => html.push('\n'),
                Tag::Item => html.push_str("• "),
                _ => {}
            },
            Event::End(tag) => match tag {
                TagEnd::Heading(_) => html.push_str("</b>\n"),
                TagEnd::Paragraph => html.push('\n'),
                TagEnd::Strong => html.push_str("</b>"),
                TagEnd::Emphasis => html.push_str("</i>"),
                TagEnd::Strikethrough => html.push_str("</s>"),
                TagEnd::BlockQuote(_) => html.push_str("</blockquote>"),
                TagEnd::CodeBlock => html.push_str("</code></pre>"),
                TagEnd::Link => html.push_str("</a>"),
                TagEnd::Item => html.push('\n'),
                TagEnd::List(_) => {}
                _ => {}
            },
            Event::Text(text) => html.push_str(&html_escape(&text)),
            Event::Code(code) => {
                html.push_str("<code>");
                html.push_str(&html_escape(&code));
                html.push_str("</code>");
            }
            Event::SoftBreak => html.push('\n'),
            Event::HardBreak => html.push('\n'),
            Event::Rule => html.push_str("\n---\n"),
            _ => {}
        }
    }

    html.trim().to_string()
}

fn html_escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

/// Render Markdown to HTML first, then split: entity escaping grows the
/// text, so measuring before conversion could overflow the limit.
fn render_chunks(text: &str) -> Vec<String> {
    split_message(&markdown_to_html(text))
}

fn split_message(text: &str) -> Vec<String> {
    if text.len() <= MAX_MESSAGE_LENGTH {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut remaining = text;

    while !remaining.is_empty() {
        if remaining.len() <= MAX_MESSAGE_LENGTH {
            chunks.push(remaining.to_string());
            break;
        }

        // last char boundary at or below the limit; the limit is in bytes
        // and Cyrillic text is two bytes per char
        let mut boundary = MAX_MESSAGE_LENGTH;
        while !remaining.is_char_boundary(boundary) {
            boundary -= 1;
        }

        let split_pos = match remaining[..boundary].rfind('\n') {
            Some(pos) => pos + 1,
            None => boundary,
        };

        chunks.push(remaining[..split_pos].to_string());
        remaining = &remaining[split_pos..];
    }

    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_markdown_bold() {
        let result = markdown_to_html("This is **bold** text");
        assert!(result.contains("<b>bold</b>"));
    }

    #[test]
    fn test_markdown_italic() {
        let result = markdown_to_html("This is *italic* text");
        assert!(result.contains("<i>italic</i>"));
    }

    #[test]
    fn test_markdown_code_inline() {
        let result = markdown_to_html("Use `println!` here");
        assert!(result.contains("<code>println!</code>"));
    }

    #[test]
    fn test_markdown_header() {
        let result = markdown_to_html("### Section Title");
        assert!(result.contains("<b>Section Title</b>"));
    }

    #[test]
    fn test_markdown_link() {
        let result = markdown_to_html("[click here](https://example.com)");
        assert!(result.contains("<a href=\"https://example.com\">click here</a>"));
    }

    #[test]
    fn test_html_escape() {
        let result = markdown_to_html("1 < 2 & 3 > 0");
        assert!(result.contains("&lt;"));
        assert!(result.contains("&amp;"));
        assert!(result.contains("&gt;"));
    }

    #[test]
    fn test_markdown_russian_mixed() {
        let input = "### Итоги дня\n**Калории**: осталось *совсем немного*.";
        let result = markdown_to_html(input);
        assert!(result.contains("<b>Итоги дня</b>"));
        assert!(result.contains("<b>Калории</b>"));
        assert!(result.contains("<i>совсем немного</i>"));
    }

    #[test]
    fn test_split_short_message() {
        let chunks = split_message("short");
        assert_eq!(chunks, vec!["short".to_string()]);
    }

    #[test]
    fn test_split_long_message_on_newlines() {
        let line = "x".repeat(100);
        let text = (0..50).map(|_| line.clone()).collect::<Vec<_>>().join("\n");
        let chunks = split_message(&text);
        assert!(chunks.len() > 1);
        assert!(chunks.iter().all(|c| c.len() <= MAX_MESSAGE_LENGTH));
        assert_eq!(chunks.concat(), text);
    }

    #[test]
    fn test_split_cyrillic_without_newlines() {
        // one leading ASCII byte puts every following two-byte char off the
        // 4096 byte mark, so a naive byte slice would land mid-char
        let text = format!("!{}", "о".repeat(2100));
        let chunks = split_message(&text);
        assert!(chunks.len() > 1);
        assert!(chunks.iter().all(|c| c.len() <= MAX_MESSAGE_LENGTH));
        assert_eq!(chunks.concat(), text);
    }

    #[test]
    fn test_split_cyrillic_prefers_newline() {
        let para = "строка текста про еду\n".repeat(200);
        let chunks = split_message(&para);
        assert!(chunks.len() > 1);
        assert!(chunks.iter().all(|c| c.len() <= MAX_MESSAGE_LENGTH));
        assert!(chunks[0].ends_with('\n'));
        assert_eq!(chunks.concat(), para);
    }

    #[test]
    fn test_chunks_measured_after_escaping() {
        // raw text fits in one message, escaped HTML does not
        let text = "каша & мёд\n".repeat(220);
        assert!(text.len() <= MAX_MESSAGE_LENGTH);
        let chunks = render_chunks(&text);
        assert!(chunks.len() > 1);
        assert!(chunks.iter().all(|c| c.len() <= MAX_MESSAGE_LENGTH));
        assert!(chunks[0].contains("&amp;"));
    }
}
