//! Read-only project-side queries (spec §6): the document tree, its
//! attached files and results, and full-text search over them. Implemented
//! as a second `impl MetadataStore for PostgresMetadataStore` block so the
//! chat-facing and project-facing halves of the interface stay in separate
//! files without duplicating the struct definition.

use async_trait::async_trait;
use doc_agent_common::DocumentArtifactKind;
use tokio_postgres::Row;
use uuid::Uuid;

use crate::error::{StorageError, StorageResult};
use crate::metadata_store::PostgresMetadataStore;
use crate::models::{artifact_kind_db_str, DocumentCrop, DocumentResult, NodeFile, TreeNode};

#[async_trait]
pub trait ProjectStore: Send + Sync {
    async fn get_tree_nodes(&self, client_id: Option<Uuid>, parent_id: Option<Uuid>, node_type: Option<&str>, all_nodes: bool) -> StorageResult<Vec<TreeNode>>;
    async fn get_node_by_id(&self, node_id: Uuid) -> StorageResult<Option<TreeNode>>;
    async fn get_node_files(&self, node_id: Uuid) -> StorageResult<Vec<NodeFile>>;
    async fn get_document_results(&self, node_id: Uuid, file_type: Option<DocumentArtifactKind>) -> StorageResult<Vec<DocumentResult>>;
    async fn get_document_crops(&self, node_id: Uuid) -> StorageResult<Vec<DocumentCrop>>;
    /// Returns the raw contents of the node's `result_json` artifact, the
    /// block index the renderer and LLM adapter both key off of.
    async fn get_blocks_index_for_node(&self, node_id: Uuid) -> StorageResult<Option<String>>;
    async fn search_documents(&self, client_id: Uuid, query: &str, limit: i64) -> StorageResult<Vec<TreeNode>>;
}

fn row_to_tree_node(row: &Row) -> TreeNode {
    TreeNode { id: row.get(0), client_id: row.get(1), parent_id: row.get(2), node_type: row.get(3), name: row.get(4) }
}

fn row_to_document_result(row: &Row) -> StorageResult<DocumentResult> {
    let file_type: String = row.get(2);
    Ok(DocumentResult { id: row.get(0), node_id: row.get(1), file_type: parse_artifact_kind(&file_type)?, object_key: row.get(3) })
}

fn parse_artifact_kind(raw: &str) -> StorageResult<DocumentArtifactKind> {
    match raw {
        "annotation" => Ok(DocumentArtifactKind::Annotation),
        "ocr_html" => Ok(DocumentArtifactKind::OcrHtml),
        "result_md" => Ok(DocumentArtifactKind::ResultMd),
        "result_json" => Ok(DocumentArtifactKind::ResultJson),
        "crops_folder" => Ok(DocumentArtifactKind::CropsFolder),
        other => Err(StorageError::Metadata(format!("unknown document artifact kind in database: {other}"))),
    }
}

#[async_trait]
impl ProjectStore for PostgresMetadataStore {
    async fn get_tree_nodes(&self, client_id: Option<Uuid>, parent_id: Option<Uuid>, node_type: Option<&str>, all_nodes: bool) -> StorageResult<Vec<TreeNode>> {
        if all_nodes {
            let rows = self.client.query("SELECT id, client_id, parent_id, node_type, name FROM tree_nodes ORDER BY name ASC", &[]).await.map_err(|err| StorageError::Metadata(err.to_string()))?;
            return Ok(rows.iter().map(row_to_tree_node).collect());
        }

        let rows = self
            .client
            .query(
                r"
                SELECT id, client_id, parent_id, node_type, name FROM tree_nodes
                WHERE ($1::uuid IS NULL OR client_id = $1)
                  AND ($2::uuid IS NULL OR parent_id = $2)
                  AND ($3::text IS NULL OR node_type = $3)
                ORDER BY name ASC
                ",
                &[&client_id, &parent_id, &node_type],
            )
            .await
            .map_err(|err| StorageError::Metadata(err.to_string()))?;

        Ok(rows.iter().map(row_to_tree_node).collect())
    }

    async fn get_node_by_id(&self, node_id: Uuid) -> StorageResult<Option<TreeNode>> {
        let row = self.client.query_opt("SELECT id, client_id, parent_id, node_type, name FROM tree_nodes WHERE id = $1", &[&node_id]).await.map_err(|err| StorageError::Metadata(err.to_string()))?;
        Ok(row.as_ref().map(row_to_tree_node))
    }

    async fn get_node_files(&self, node_id: Uuid) -> StorageResult<Vec<NodeFile>> {
        let rows = self
            .client
            .query("SELECT id, node_id, file_name, object_key FROM node_files WHERE node_id = $1", &[&node_id])
            .await
            .map_err(|err| StorageError::Metadata(err.to_string()))?;
        Ok(rows.iter().map(|row| NodeFile { id: row.get(0), node_id: row.get(1), file_name: row.get(2), object_key: row.get(3) }).collect())
    }

    async fn get_document_results(&self, node_id: Uuid, file_type: Option<DocumentArtifactKind>) -> StorageResult<Vec<DocumentResult>> {
        let rows = match file_type {
            Some(kind) => {
                self.client
                    .query("SELECT id, node_id, file_type, object_key FROM document_results WHERE node_id = $1 AND file_type = $2", &[&node_id, &artifact_kind_db_str(kind)])
                    .await
            }
            None => self.client.query("SELECT id, node_id, file_type, object_key FROM document_results WHERE node_id = $1", &[&node_id]).await,
        }
        .map_err(|err| StorageError::Metadata(err.to_string()))?;

        rows.iter().map(row_to_document_result).collect()
    }

    async fn get_document_crops(&self, node_id: Uuid) -> StorageResult<Vec<DocumentCrop>> {
        let rows = self
            .client
            .query("SELECT id, node_id, file_name, object_key FROM document_crops WHERE node_id = $1", &[&node_id])
            .await
            .map_err(|err| StorageError::Metadata(err.to_string()))?;
        Ok(rows.iter().map(|row| DocumentCrop { id: row.get(0), node_id: row.get(1), file_name: row.get(2), object_key: row.get(3) }).collect())
    }

    async fn get_blocks_index_for_node(&self, node_id: Uuid) -> StorageResult<Option<String>> {
        let row = self
            .client
            .query_opt("SELECT object_key FROM document_results WHERE node_id = $1 AND file_type = $2", &[&node_id, &artifact_kind_db_str(DocumentArtifactKind::ResultJson)])
            .await
            .map_err(|err| StorageError::Metadata(err.to_string()))?;
        Ok(row.map(|row| row.get(0)))
    }

    async fn search_documents(&self, client_id: Uuid, query: &str, limit: i64) -> StorageResult<Vec<TreeNode>> {
        let rows = self
            .client
            .query(
                "SELECT id, client_id, parent_id, node_type, name FROM tree_nodes WHERE client_id = $1 AND name ILIKE $2 ORDER BY name ASC LIMIT $3",
                &[&client_id, &format!("%{query}%"), &limit],
            )
            .await
            .map_err(|err| StorageError::Metadata(err.to_string()))?;

        Ok(rows.iter().map(row_to_tree_node).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_artifact_kind_round_trips_through_db_str() {
        for kind in [DocumentArtifactKind::Annotation, DocumentArtifactKind::OcrHtml, DocumentArtifactKind::ResultMd, DocumentArtifactKind::ResultJson, DocumentArtifactKind::CropsFolder] {
            assert_eq!(parse_artifact_kind(artifact_kind_db_str(kind)).unwrap(), kind);
        }
    }

    #[test]
    fn parse_artifact_kind_rejects_unknown_values() {
        assert!(parse_artifact_kind("video_transcript").is_err());
    }
}
