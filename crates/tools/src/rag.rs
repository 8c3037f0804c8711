//! RAG tool server over the retrieval service.
//!
//! Tools: `add_document`, `search_documents`, `delete_documents`,
//! `list_collections`, `get_collection_stats`.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};

use trellis_domain::error::{Error, Result};
use trellis_domain::tool::{ToolDescriptor, ToolResult};
use trellis_retrieval::Retriever;

use crate::server::{CallContext, ToolServer};

const DEFAULT_COLLECTION: &str = "documents";

/// The `rag` tool server.
pub struct RagServer {
    retriever: Arc<Retriever>,
}

impl RagServer {
    pub fn new(retriever: Arc<Retriever>) -> Self {
        Self { retriever }
    }

    fn collection<'a>(args: &'a Value) -> &'a str {
        args["collection"].as_str().unwrap_or(DEFAULT_COLLECTION)
    }

    async fn add_document(&self, args: &Value) -> Result<ToolResult> {
        let source = args["source"].as_str().unwrap_or_default();
        let text = args["text"].as_str().unwrap_or_default();
        let custom = args.get("metadata").cloned().unwrap_or(Value::Null);

        let report = self
            .retriever
            .add_document(Self::collection(args), source, text, custom)
            .await?;

        Ok(
            ToolResult::text(format!(
                "Stored '{}' as {} chunks.",
                report.source, report.chunks_added
            ))
            .with_metadata(json!({
                "source": report.source,
                "chunks_added": report.chunks_added,
            })),
        )
    }

    async fn search_documents(&self, args: &Value) -> Result<ToolResult> {
        let query = args["query"].as_str().unwrap_or_default();
        let top_k = args["topK"].as_u64().map(|k| k as usize);
        let threshold = args["threshold"].as_f64().map(|t| t as f32);
        let merge = args["merge"].as_bool().unwrap_or(true);
        let collection = Self::collection(args);

        if merge {
            let groups = self
                .retriever
                .search_merged(collection, query, top_k, threshold)
                .await?;
            let text = groups
                .iter()
                .map(|g| {
                    format!(
                        "[{} | score {:.3} | {} chunks]\n{}",
                        g.source, g.avg_score, g.merged_chunks, g.text
                    )
                })
                .collect::<Vec<_>>()
                .join("\n\n---\n\n");
            let metadata = json!({
                "group_count": groups.len(),
                "groups": groups.iter().map(|g| json!({
                    "source": g.source,
                    "avgScore": g.avg_score,
                    "mergedChunks": g.merged_chunks,
                })).collect::<Vec<_>>(),
            });
            Ok(ToolResult::text(text).with_metadata(metadata))
        } else {
            let hits = self
                .retriever
                .search(collection, query, top_k, threshold)
                .await?;
            let text = hits
                .iter()
                .map(|h| format!("[{} | score {:.3}]\n{}", h.id, h.score, h.text))
                .collect::<Vec<_>>()
                .join("\n\n---\n\n");
            Ok(ToolResult::text(text).with_metadata(json!({ "hit_count": hits.len() })))
        }
    }

    async fn delete_documents(&self, args: &Value) -> Result<ToolResult> {
        let source = args["source"].as_str().unwrap_or_default();
        let removed = self
            .retriever
            .delete_documents(Self::collection(args), source)
            .await?;
        Ok(ToolResult::text(format!("Removed {removed} chunks of '{source}'."))
            .with_metadata(json!({ "removed": removed })))
    }

    async fn list_collections(&self) -> Result<ToolResult> {
        let collections = self.retriever.list_collections().await?;
        Ok(ToolResult::text(collections.join("\n"))
            .with_metadata(json!({ "collections": collections })))
    }

    async fn collection_stats(&self, args: &Value) -> Result<ToolResult> {
        let stats = self
            .retriever
            .collection_stats(Self::collection(args))
            .await?;
        Ok(ToolResult::text(format!(
            "{}: {} chunks from {} sources",
            stats.name, stats.chunk_count, stats.source_count
        ))
        .with_metadata(json!({
            "name": stats.name,
            "chunk_count": stats.chunk_count,
            "source_count": stats.source_count,
        })))
    }
}

#[async_trait::async_trait]
impl ToolServer for RagServer {
    fn name(&self) -> &str {
        "rag"
    }

    fn descriptors(&self) -> Vec<ToolDescriptor> {
        vec![
            ToolDescriptor {
                name: "add_document".into(),
                description: "Chunk, embed, and store a document.".into(),
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "collection": { "type": "string" },
                        "source": { "type": "string" },
                        "text": { "type": "string" },
                        "metadata": { "type": "object" }
                    },
                    "required": ["source", "text"]
                }),
            },
            ToolDescriptor {
                name: "search_documents".into(),
                description: "Similarity-search stored documents; merged by default.".into(),
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "collection": { "type": "string" },
                        "query": { "type": "string" },
                        "topK": { "type": "integer" },
                        "threshold": { "type": "number" },
                        "merge": { "type": "boolean" }
                    },
                    "required": ["query"]
                }),
            },
            ToolDescriptor {
                name: "delete_documents".into(),
                description: "Delete every chunk stored under a source.".into(),
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "collection": { "type": "string" },
                        "source": { "type": "string" }
                    },
                    "required": ["source"]
                }),
            },
            ToolDescriptor {
                name: "list_collections".into(),
                description: "List vector collections.".into(),
                input_schema: json!({ "type": "object", "properties": {} }),
            },
            ToolDescriptor {
                name: "get_collection_stats".into(),
                description: "Chunk and source counts for a collection.".into(),
                input_schema: json!({
                    "type": "object",
                    "properties": { "collection": { "type": "string" } }
                }),
            },
        ]
    }

    fn call_timeout(&self, tool: &str) -> Duration {
        // Ingestion embeds every chunk; give it headroom.
        if tool == "add_document" {
            Duration::from_secs(120)
        } else {
            Duration::from_secs(30)
        }
    }

    async fn call(&self, tool: &str, args: &Value, _ctx: &CallContext) -> Result<ToolResult> {
        match tool {
            "add_document" => self.add_document(args).await,
            "search_documents" => self.search_documents(args).await,
            "delete_documents" => self.delete_documents(args).await,
            "list_collections" => self.list_collections().await,
            "get_collection_stats" => self.collection_stats(args).await,
            other => Err(Error::Validation(format!("rag server has no tool {other}"))),
        }
    }
}
