//! `downloads:` source: a stub data model over the `downloads` /
//! `download_files` tables. The slskd HTTP client itself is out of scope
//!; this source only lets the navigator browse
//! whatever progress rows the (external) download coordinator has written.

use async_trait::async_trait;
use sqlx::SqlitePool;

use super::node_id::{self, NodeId};
use super::{IconType, Node, Result, Source};

#[derive(Debug, Clone, PartialEq)]
pub enum DownloadsNode {
    Root,
    Download { id: i64, query: String },
    File { download_id: i64, id: i64, name: String },
}

impl Node for DownloadsNode {
    fn id(&self) -> String {
        match self {
            DownloadsNode::Root => "downloads:root".to_string(),
            DownloadsNode::Download { id, .. } => node_id::format("downloads", &["download", &id.to_string()]),
            DownloadsNode::File { download_id, id, .. } => {
                node_id::format("downloads", &["file", &download_id.to_string(), &id.to_string()])
            }
        }
    }

    fn display_name(&self) -> String {
        match self {
            DownloadsNode::Root => "Downloads".to_string(),
            DownloadsNode::Download { query, .. } => query.clone(),
            DownloadsNode::File { name, .. } => name.clone(),
        }
    }

    fn is_container(&self) -> bool {
        !matches!(self, DownloadsNode::File { .. })
    }

    fn icon_type(&self) -> IconType {
        match self {
            DownloadsNode::Root | DownloadsNode::Download { .. } => IconType::Download,
            DownloadsNode::File { .. } => IconType::File,
        }
    }
}

pub struct DownloadsSource {
    pool: SqlitePool,
}

impl DownloadsSource {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Source<DownloadsNode> for DownloadsSource {
    async fn root(&self) -> Result<DownloadsNode> {
        Ok(DownloadsNode::Root)
    }

    async fn children(&self, parent: &DownloadsNode) -> Result<Vec<DownloadsNode>> {
        match parent {
            DownloadsNode::Root => {
                let rows: Vec<(i64, String)> =
                    sqlx::query_as("SELECT id, query FROM downloads ORDER BY created_at DESC")
                        .fetch_all(&self.pool)
                        .await?;
                Ok(rows.into_iter().map(|(id, query)| DownloadsNode::Download { id, query }).collect())
            }
            DownloadsNode::Download { id, .. } => {
                let rows: Vec<(i64, String)> = sqlx::query_as(
                    "SELECT id, remote_filename FROM download_files WHERE download_id = ?",
                )
                .bind(id)
                .fetch_all(&self.pool)
                .await?;
                Ok(rows
                    .into_iter()
                    .map(|(file_id, name)| DownloadsNode::File { download_id: *id, id: file_id, name })
                    .collect())
            }
            DownloadsNode::File { .. } => Ok(Vec::new()),
        }
    }

    async fn parent(&self, node: &DownloadsNode) -> Result<Option<DownloadsNode>> {
        Ok(match node {
            DownloadsNode::Root => None,
            DownloadsNode::Download { .. } => Some(DownloadsNode::Root),
            DownloadsNode::File { download_id, .. } => {
                let query: (String,) = sqlx::query_as("SELECT query FROM downloads WHERE id = ?")
                    .bind(download_id)
                    .fetch_one(&self.pool)
                    .await?;
                Some(DownloadsNode::Download { id: *download_id, query: query.0 })
            }
        })
    }

    async fn display_path(&self, node: &DownloadsNode) -> Result<String> {
        Ok(format!("/{}", node.display_name()))
    }

    async fn node_from_id(&self, id: &str) -> Result<Option<DownloadsNode>> {
        let Some(NodeId { parts, .. }) = node_id::parse(id) else {
            return Ok(None);
        };
        Ok(match parts.first().map(|s| s.as_str()) {
            Some("root") => Some(DownloadsNode::Root),
            Some("download") => {
                parts.get(1).and_then(|s| s.parse().ok()).map(|id| DownloadsNode::Download {
                    id,
                    query: String::new(),
                })
            }
            _ => None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;

    #[tokio::test]
    async fn empty_downloads_table_has_no_children() {
        let pool = test_pool().await;
        let source = DownloadsSource::new(pool);
        let root = source.root().await.unwrap();
        assert!(source.children(&root).await.unwrap().is_empty());
    }
}
