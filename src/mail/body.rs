//! Access to the body of the message being replied to

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use super::parser::{html_from_message, looks_like_message};

#[derive(Debug, thiserror::Error)]
pub enum BodyError {
    #[error("failed to read email body: {0}")]
    Read(String),
    #[error("failed to write email body: {0}")]
    Write(String),
}

/// Read/write contract for the HTML body of the message being composed.
#[async_trait]
pub trait MailBody: Send + Sync {
    async fn get_body(&self) -> Result<String, BodyError>;

    async fn set_body(&self, html: String) -> Result<(), BodyError>;
}

/// Body backed by files: read from `source` (HTML or a raw `.eml` message),
/// written to `destination`.
#[derive(Debug, Clone)]
pub struct FileBody {
    source: PathBuf,
    destination: PathBuf,
}

impl FileBody {
    pub fn new(source: impl Into<PathBuf>, destination: impl Into<PathBuf>) -> Self {
        Self {
            source: source.into(),
            destination: destination.into(),
        }
    }

    /// `<stem>.reply.html` next to `source`.
    pub fn default_destination(source: &Path) -> PathBuf {
        let stem = source
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "body".to_string());
        source.with_file_name(format!("{}.reply.html", stem))
    }

    pub fn destination(&self) -> &Path {
        &self.destination
    }
}

#[async_trait]
impl MailBody for FileBody {
    async fn get_body(&self) -> Result<String, BodyError> {
        let raw = tokio::fs::read(&self.source)
            .await
            .map_err(|e| BodyError::Read(format!("{}: {}", self.source.display(), e)))?;

        if looks_like_message(&raw) {
            return html_from_message(&raw).ok_or_else(|| {
                BodyError::Read(format!("{}: no readable body part", self.source.display()))
            });
        }

        Ok(String::from_utf8_lossy(&raw).into_owned())
    }

    async fn set_body(&self, html: String) -> Result<(), BodyError> {
        tokio::fs::write(&self.destination, html)
            .await
            .map_err(|e| BodyError::Write(format!("{}: {}", self.destination.display(), e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_destination() {
        let dest = FileBody::default_destination(Path::new("/tmp/mail/thread.html"));
        assert_eq!(dest, PathBuf::from("/tmp/mail/thread.reply.html"));
    }

    #[tokio::test]
    async fn test_file_body_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("in.html");
        let dest = dir.path().join("out.html");
        std::fs::write(&source, "<p>Hello</p>").unwrap();

        let body = FileBody::new(&source, &dest);
        assert_eq!(body.get_body().await.unwrap(), "<p>Hello</p>");

        body.set_body("<p>Reply</p>".to_string()).await.unwrap();
        assert_eq!(std::fs::read_to_string(&dest).unwrap(), "<p>Reply</p>");
    }

    #[tokio::test]
    async fn test_file_body_reads_eml() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("in.eml");
        std::fs::write(
            &source,
            "From: a@example.com\r\nSubject: Hi\r\nContent-Type: text/html\r\n\r\n<p>Body</p>",
        )
        .unwrap();

        let body = FileBody::new(&source, dir.path().join("out.html"));
        assert!(body.get_body().await.unwrap().contains("<p>Body</p>"));
    }

    #[tokio::test]
    async fn test_missing_file_is_read_error() {
        let body = FileBody::new("/nonexistent/in.html", "/nonexistent/out.html");
        assert!(matches!(body.get_body().await, Err(BodyError::Read(_))));
        assert!(matches!(
            body.set_body(String::new()).await,
            Err(BodyError::Write(_))
        ));
    }
}
