//! Client-side checks for documents before they are uploaded.
//!
//! A file is accepted when either its extension or its MIME type is on the
//! allow-list, and it is no larger than [`MAX_UPLOAD_BYTES`].  Rejected files
//! never reach the network.

use std::path::Path;

use bytes::Bytes;
use reqwest::multipart::{Form, Part};

use crate::error::{Error, Result};

/// Largest accepted upload, 20 MB.
pub const MAX_UPLOAD_BYTES: u64 = 20 * 1024 * 1024;

/// Accepted file extensions, lower case.
pub const ALLOWED_EXTENSIONS: &[&str] = &[
    "pdf", "doc", "docx", "txt", "md", "markdown", "rtf", "odt",
];

/// Accepted MIME types.
pub const ALLOWED_MIME_TYPES: &[&str] = &[
    "application/pdf",
    "application/msword",
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
    "text/plain",
    "text/markdown",
    "application/rtf",
    "application/vnd.oasis.opendocument.text",
];

const FALLBACK_MIME_TYPE: &str = "application/octet-stream";

/// A document on the local side, not yet uploaded.
#[derive(Debug, Clone)]
pub struct LocalFile {
    name: String,
    mime_type: String,
    content: Bytes,
}

impl LocalFile {
    /// Create a file from a name and its bytes.
    ///
    /// The MIME type is derived from the extension.
    pub fn new(name: impl Into<String>, content: impl Into<Bytes>) -> Self {
        let name = name.into();
        let mime_type = mime_for_name(&name).to_string();
        Self {
            name,
            mime_type,
            content: content.into(),
        }
    }

    /// Override the MIME type.
    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = mime_type.into();
        self
    }

    /// Read a document from disk.
    ///
    /// Type and size are checked against the file's metadata before the
    /// contents are read, so an oversized file is rejected without loading it.
    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let name = path
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| {
                Error::validation(
                    format!("\"{}\" is not a file name", path.display()),
                    Some("path".to_string()),
                )
            })?
            .to_string();
        let metadata = tokio::fs::metadata(path)
            .await
            .map_err(|err| Error::io(format!("cannot stat {}", path.display()), err))?;
        if !metadata.is_file() {
            return Err(Error::validation(
                format!("\"{name}\" is not a regular file"),
                Some(name),
            ));
        }
        check(&name, mime_for_name(&name), metadata.len())?;
        let content = tokio::fs::read(path)
            .await
            .map_err(|err| Error::io(format!("cannot read {}", path.display()), err))?;
        Ok(Self::new(name, content))
    }

    /// File name, without directories.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// MIME type sent with the upload.
    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    /// Size in bytes.
    pub fn size(&self) -> u64 {
        self.content.len() as u64
    }

    /// Raw contents.
    pub fn content(&self) -> &Bytes {
        &self.content
    }

    /// Build the multipart form for `POST /chat/session/{id}/upload`.
    ///
    /// Called once per attempt; a form cannot be replayed.
    pub(crate) fn to_form(&self) -> Result<Form> {
        let part = Part::bytes(self.content.to_vec())
            .file_name(self.name.clone())
            .mime_str(&self.mime_type)
            .map_err(|err| {
                Error::validation(
                    format!("invalid MIME type {:?}: {err}", self.mime_type),
                    Some(self.name.clone()),
                )
            })?;
        Ok(Form::new().part("file", part))
    }
}

/// Check a file against the allow-list and the size limit.
pub fn validate(file: &LocalFile) -> Result<()> {
    check(file.name(), file.mime_type(), file.size())
}

/// Split files into those that may be uploaded and the reasons the rest may not.
pub fn partition(files: Vec<LocalFile>) -> (Vec<LocalFile>, Vec<Error>) {
    let mut accepted = Vec::new();
    let mut rejected = Vec::new();
    for file in files {
        match validate(&file) {
            Ok(()) => accepted.push(file),
            Err(err) => rejected.push(err),
        }
    }
    (accepted, rejected)
}

/// Lower-cased extension of `name`, or the empty string.
pub fn extension(name: &str) -> String {
    match name.rsplit_once('.') {
        Some((_, ext)) => ext.to_lowercase(),
        None => String::new(),
    }
}

/// MIME type for an allowed extension.
pub fn mime_for_extension(ext: &str) -> Option<&'static str> {
    match ext {
        "pdf" => Some("application/pdf"),
        "doc" => Some("application/msword"),
        "docx" => {
            Some("application/vnd.openxmlformats-officedocument.wordprocessingml.document")
        }
        "txt" => Some("text/plain"),
        "md" | "markdown" => Some("text/markdown"),
        "rtf" => Some("application/rtf"),
        "odt" => Some("application/vnd.oasis.opendocument.text"),
        _ => None,
    }
}

/// Human-readable size in megabytes, two decimals.
pub fn format_size(bytes: u64) -> String {
    format!("{:.2} MB", bytes as f64 / 1024.0 / 1024.0)
}

fn mime_for_name(name: &str) -> &'static str {
    mime_for_extension(&extension(name)).unwrap_or(FALLBACK_MIME_TYPE)
}

fn check(name: &str, mime_type: &str, size: u64) -> Result<()> {
    let ext = extension(name);
    if !ALLOWED_MIME_TYPES.contains(&mime_type) && !ALLOWED_EXTENSIONS.contains(&ext.as_str()) {
        return Err(Error::validation(
            format!(
                "File \"{name}\" type not supported. Please choose PDF, DOC/DOCX, TXT, MD, RTF, ODT."
            ),
            Some(name.to_string()),
        ));
    }
    if size > MAX_UPLOAD_BYTES {
        return Err(Error::validation(
            format!(
                "File \"{name}\" is too large ({}). Maximum allowed size is 20 MB.",
                format_size(size)
            ),
            Some(name.to_string()),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_allowed_extensions() {
        for name in ["a.pdf", "b.DOCX", "c.txt", "d.markdown", "e.odt"] {
            assert!(validate(&LocalFile::new(name, "x")).is_ok(), "{name}");
        }
    }

    #[test]
    fn rejects_unknown_type() {
        let err = validate(&LocalFile::new("photo.png", "x")).unwrap_err();
        assert!(err.is_validation());
        assert!(err.message().contains("type not supported"));
    }

    #[test]
    fn mime_type_alone_is_enough() {
        let file = LocalFile::new("README", "x").with_mime_type("text/plain");
        assert!(validate(&file).is_ok());
    }

    #[test]
    fn rejects_oversized_pdf() {
        let content = vec![0u8; 25 * 1024 * 1024];
        let err = validate(&LocalFile::new("handbook.pdf", content)).unwrap_err();
        assert!(err.is_validation());
        assert!(err.message().contains("too large"));
    }

    #[test]
    fn exactly_twenty_megabytes_is_allowed() {
        let content = vec![0u8; MAX_UPLOAD_BYTES as usize];
        assert!(validate(&LocalFile::new("big.txt", content)).is_ok());
    }

    #[test]
    fn partition_keeps_order() {
        let (accepted, rejected) = partition(vec![
            LocalFile::new("one.pdf", "1"),
            LocalFile::new("two.exe", "2"),
            LocalFile::new("three.md", "3"),
        ]);
        let names: Vec<_> = accepted.iter().map(|f| f.name()).collect();
        assert_eq!(names, vec!["one.pdf", "three.md"]);
        assert_eq!(rejected.len(), 1);
    }

    #[test]
    fn mime_guessing() {
        assert_eq!(LocalFile::new("x.md", "").mime_type(), "text/markdown");
        assert_eq!(
            LocalFile::new("x.bin", "").mime_type(),
            "application/octet-stream"
        );
        assert_eq!(extension("archive.tar.gz"), "gz");
        assert_eq!(extension("noext"), "");
    }

    #[test]
    fn size_formatting() {
        assert_eq!(format_size(1024 * 1024), "1.00 MB");
        assert_eq!(format_size(0), "0.00 MB");
    }

    #[tokio::test]
    async fn from_path_reads_file() {
        let dir = std::env::temp_dir().join(format!("docchat-upload-{}", std::process::id()));
        tokio::fs::create_dir_all(&dir).await.unwrap();
        let path = dir.join("notes.txt");
        tokio::fs::write(&path, b"meeting notes").await.unwrap();
        let file = LocalFile::from_path(&path).await.unwrap();
        assert_eq!(file.name(), "notes.txt");
        assert_eq!(file.size(), 13);
        assert_eq!(file.mime_type(), "text/plain");
        tokio::fs::remove_dir_all(&dir).await.unwrap();
    }
}
