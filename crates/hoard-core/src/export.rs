//! On-disk writers for harvested records.

use std::path::Path;

use chrono::Local;
use serde::Serialize;
use tokio::fs;

use crate::models::Message;

/// Replace characters that are invalid in file names on common platforms.
pub fn sanitize_filename(name: &str) -> String {
    let replaced: String = name
        .chars()
        .map(|c| match c {
            '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    let trimmed = replaced.trim_end_matches(['.', ' ']).trim_start();
    if trimmed.is_empty() {
        "unnamed".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Last path segment of a URL, without query or fragment.
pub fn filename_from_url(raw: &str) -> String {
    let segment = match url::Url::parse(raw) {
        Ok(parsed) => parsed
            .path_segments()
            .and_then(|mut segments| segments.next_back().map(str::to_string))
            .unwrap_or_default(),
        Err(_) => raw
            .split(['?', '#'])
            .next()
            .and_then(|path| path.rsplit('/').next())
            .unwrap_or_default()
            .to_string(),
    };
    if segment.is_empty() {
        "file".to_string()
    } else {
        sanitize_filename(&segment)
    }
}

pub async fn ensure_dir(path: &Path) -> std::io::Result<()> {
    fs::create_dir_all(path).await
}

/// Pretty-printed JSON, parent directories created as needed.
pub async fn write_json<T: Serialize + ?Sized>(value: &T, path: &Path) -> std::io::Result<()> {
    let body = serde_json::to_vec_pretty(value)?;
    write_bytes(path, &body).await
}

pub async fn write_text(text: &str, path: &Path) -> std::io::Result<()> {
    write_bytes(path, text.as_bytes()).await
}

async fn write_bytes(path: &Path, body: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).await?;
        }
    }
    fs::write(path, body).await
}

/// One line per message: `[local time] user#discriminator: content`.
pub fn render_transcript(messages: &[Message]) -> String {
    messages
        .iter()
        .map(|m| {
            format!(
                "[{}] {}#{}: {}",
                m.created_at.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S"),
                m.author.username,
                m.author.discriminator,
                m.content
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Write `messages.json` and `messages.txt` into `dir`.
pub async fn write_channel_exports(messages: &[Message], dir: &Path) -> std::io::Result<()> {
    ensure_dir(dir).await?;
    write_json(messages, &dir.join("messages.json")).await?;
    write_text(&render_transcript(messages), &dir.join("messages.txt")).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::history;

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(sanitize_filename("a/b:c*d?"), "a_b_c_d_");
        assert_eq!(sanitize_filename("notes. "), "notes");
        assert_eq!(sanitize_filename("..."), "unnamed");
        assert_eq!(sanitize_filename("tab\there"), "tab_here");
        assert_eq!(sanitize_filename("공지사항"), "공지사항");
    }

    #[test]
    fn test_filename_from_url() {
        assert_eq!(
            filename_from_url("https://cdn.test/attachments/1/2/pic.png?ex=abc&is=def"),
            "pic.png"
        );
        assert_eq!(filename_from_url("https://cdn.test/a/b.gif#frag"), "b.gif");
        assert_eq!(filename_from_url("https://cdn.test/"), "file");
        assert_eq!(filename_from_url("relative/path/x.txt?y"), "x.txt");
    }

    #[test]
    fn test_transcript_format() {
        let messages = history(2);
        let text = render_transcript(&messages);
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with('['));
        assert!(lines[0].ends_with("] alice#0001: message 2"));
        assert!(!text.ends_with('\n'));
    }

    #[tokio::test]
    async fn test_channel_exports_written() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("general");
        write_channel_exports(&history(3), &target).await.unwrap();

        let json: Vec<serde_json::Value> =
            serde_json::from_slice(&std::fs::read(target.join("messages.json")).unwrap()).unwrap();
        assert_eq!(json.len(), 3);
        assert_eq!(json[0]["id"], "3");
        assert!(json[0].get("createdAt").is_some());
        assert!(json[0].get("threadId").is_none());
        let text = std::fs::read_to_string(target.join("messages.txt")).unwrap();
        assert_eq!(text.lines().count(), 3);
    }
}
