//! Export/storage collaborator — renders a generated document to a durable
//! format and writes it somewhere retrievable. The export stage only sees the
//! `Exporter` trait; S3 backs production and an in-memory map backs tests.

use std::collections::HashMap;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::models::generation::DocumentType;

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("storage error: {0}")]
    Storage(String),
}

/// Where an exported document can be retrieved from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportLocation {
    pub key: String,
    pub content_type: String,
    pub size_bytes: u64,
}

#[async_trait]
pub trait Exporter: Send + Sync {
    async fn render_and_store(
        &self,
        generation_id: Uuid,
        document_type: DocumentType,
        content: &str,
    ) -> Result<ExportLocation, ExportError>;
}

/// Renders document content to the stored markdown form. Kept deliberately
/// plain: the content itself is already prose; this adds the byte framing.
pub fn render_markdown(document_type: DocumentType, content: &str) -> String {
    let heading = match document_type {
        DocumentType::Resume => "Resume",
        DocumentType::CoverLetter => "Cover Letter",
    };
    format!("# {heading}\n\n{}\n", content.trim_end())
}

fn object_key(generation_id: Uuid, document_type: DocumentType) -> String {
    format!("generations/{generation_id}/{}.md", document_type.as_str())
}

pub struct S3Exporter {
    client: aws_sdk_s3::Client,
    bucket: String,
}

impl S3Exporter {
    pub fn new(client: aws_sdk_s3::Client, bucket: String) -> Self {
        Self { client, bucket }
    }
}

#[async_trait]
impl Exporter for S3Exporter {
    async fn render_and_store(
        &self,
        generation_id: Uuid,
        document_type: DocumentType,
        content: &str,
    ) -> Result<ExportLocation, ExportError> {
        let rendered = render_markdown(document_type, content);
        let key = object_key(generation_id, document_type);
        let body = Bytes::from(rendered);
        let size_bytes = body.len() as u64;

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(&key)
            .content_type("text/markdown")
            .body(body.into())
            .send()
            .await
            .map_err(|e| ExportError::Storage(e.to_string()))?;

        Ok(ExportLocation {
            key,
            content_type: "text/markdown".to_string(),
            size_bytes,
        })
    }
}

/// In-memory exporter for tests and DB-less local runs.
#[derive(Default)]
pub struct MemoryExporter {
    stored: Mutex<HashMap<String, String>>,
}

impl MemoryExporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stored_count(&self) -> usize {
        self.stored.lock().len()
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.stored.lock().get(key).cloned()
    }
}

#[async_trait]
impl Exporter for MemoryExporter {
    async fn render_and_store(
        &self,
        generation_id: Uuid,
        document_type: DocumentType,
        content: &str,
    ) -> Result<ExportLocation, ExportError> {
        let rendered = render_markdown(document_type, content);
        let key = object_key(generation_id, document_type);
        let size_bytes = rendered.len() as u64;
        self.stored.lock().insert(key.clone(), rendered);
        Ok(ExportLocation {
            key,
            content_type: "text/markdown".to_string(),
            size_bytes,
        })
    }
}

/// Exporter that always fails. Used to exercise export-stage retry and
/// fallback behavior in tests.
#[cfg(test)]
pub struct FailingExporter;

#[cfg(test)]
#[async_trait]
impl Exporter for FailingExporter {
    async fn render_and_store(
        &self,
        _generation_id: Uuid,
        _document_type: DocumentType,
        _content: &str,
    ) -> Result<ExportLocation, ExportError> {
        Err(ExportError::Storage("bucket unavailable".to_string()))
    }
}
