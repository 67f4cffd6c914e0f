//! Export stage — renders each generated document to its durable form and
//! records the retrievable location on the result. Byte-level rendering and
//! the storage write are delegated to the `Exporter` collaborator.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

use crate::export::{ExportLocation, Exporter};
use crate::models::generation::DocumentType;
use crate::pipeline::context::PipelineContext;
use crate::pipeline::error::StageError;
use crate::pipeline::stage::{PipelineStage, StageKind};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportedDocument {
    pub document_type: DocumentType,
    pub location: ExportLocation,
}

/// Published under `export`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportSummary {
    pub exported: Vec<ExportedDocument>,
    /// True when storage was unreachable and documents remain inline-only.
    #[serde(default)]
    pub fallback: bool,
}

pub struct ExportStage {
    exporter: Arc<dyn Exporter>,
}

impl ExportStage {
    pub fn new(exporter: Arc<dyn Exporter>) -> Self {
        Self { exporter }
    }
}

#[async_trait]
impl PipelineStage for ExportStage {
    fn kind(&self) -> StageKind {
        StageKind::Export
    }

    async fn execute(&self, ctx: &mut PipelineContext) -> Result<(), StageError> {
        if ctx.generation.results.is_empty() {
            return Err(StageError::new(self.kind(), "no documents to export"));
        }

        let generation_id = ctx.generation.id;
        let mut exported = Vec::new();

        for result in ctx.generation.results.values_mut() {
            let location = self
                .exporter
                .render_and_store(generation_id, result.document_type, &result.content)
                .await
                .map_err(|e| {
                    let message = format!("{} export failed: {e}", result.document_type);
                    StageError::with_source(self.kind(), message, e)
                })?;

            let location_value = serde_json::to_value(&location).map_err(|e| {
                StageError::with_source(self.kind(), "failed to serialize export location", e)
            })?;
            result
                .metadata
                .insert("export_location".to_string(), location_value);

            exported.push(ExportedDocument {
                document_type: result.document_type,
                location,
            });
        }

        info!(generation_id = %generation_id, documents = exported.len(), "documents exported");

        ctx.publish(
            self.kind(),
            &ExportSummary {
                exported,
                fallback: false,
            },
        )
    }

    fn fallback(&self, ctx: &mut PipelineContext) -> Result<(), StageError> {
        // Storage unavailable: keep content inline on the record and flag the
        // missing location so consumers know there is nothing to download.
        for result in ctx.generation.results.values_mut() {
            result
                .metadata
                .insert("fallback".to_string(), Value::Bool(true));
            result
                .metadata
                .insert("export_location".to_string(), Value::Null);
        }

        ctx.publish(
            self.kind(),
            &ExportSummary {
                exported: vec![],
                fallback: true,
            },
        )
    }
}
