//! Submission input: pasted text or uploaded file content

use std::path::Path;

use crate::{Error, Result};

/// One batch of IP addresses, one per line
///
/// Address syntax is checked by the remote service, not here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IpInput {
    Text(String),
    File { name: String, content: String },
}

impl IpInput {
    pub fn text(text: impl Into<String>) -> Self {
        IpInput::Text(text.into())
    }

    /// Read a file's text content
    pub async fn from_file(path: &Path) -> Result<Self> {
        let content = tokio::fs::read_to_string(path).await?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| Error::InvalidInput(format!("Not a file path: {:?}", path)))?;
        Ok(IpInput::File { name, content })
    }

    /// Text carried as the request payload
    pub fn payload(&self) -> &str {
        match self {
            IpInput::Text(text) => text,
            IpInput::File { content, .. } => content,
        }
    }

    pub fn is_blank(&self) -> bool {
        self.payload().trim().is_empty()
    }

    /// Non-empty trimmed lines
    pub fn lines(&self) -> impl Iterator<Item = &str> {
        self.payload().lines().map(str::trim).filter(|l| !l.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_detection() {
        assert!(IpInput::text("  \n\t\n").is_blank());
        assert!(!IpInput::text("8.8.8.8").is_blank());
        assert!(IpInput::File {
            name: "ips.txt".to_string(),
            content: String::new()
        }
        .is_blank());
    }

    #[test]
    fn test_lines_skip_blanks() {
        let input = IpInput::text("8.8.8.8\n\n  1.1.1.1  \r\n");
        assert_eq!(input.lines().collect::<Vec<_>>(), vec!["8.8.8.8", "1.1.1.1"]);
    }

    #[tokio::test]
    async fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ips.txt");
        std::fs::write(&path, "8.8.8.8\n1.1.1.1\n").unwrap();

        let input = IpInput::from_file(&path).await.unwrap();
        match &input {
            IpInput::File { name, .. } => assert_eq!(name, "ips.txt"),
            _ => panic!("expected file input"),
        }
        assert_eq!(input.lines().count(), 2);
    }
}
