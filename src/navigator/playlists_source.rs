//! `playlists:` source: folder DAG → playlists → tracks.

use async_trait::async_trait;
use sqlx::SqlitePool;

use super::node_id::{self, NodeId};
use super::{IconType, Node, Result, Source};

#[derive(Debug, Clone, PartialEq)]
pub enum PlaylistsNode {
    Root,
    Folder { id: i64, name: String },
    Playlist { id: i64, name: String },
    Track { playlist_id: i64, position: i64, track_id: i64, title: String },
}

impl Node for PlaylistsNode {
    fn id(&self) -> String {
        match self {
            PlaylistsNode::Root => "playlists:root".to_string(),
            PlaylistsNode::Folder { id, .. } => node_id::format("playlists", &["folder", &id.to_string()]),
            PlaylistsNode::Playlist { id, .. } => {
                node_id::format("playlists", &["playlist", &id.to_string()])
            }
            PlaylistsNode::Track { playlist_id, position, .. } => node_id::format(
                "playlists",
                &["track", &playlist_id.to_string(), &position.to_string()],
            ),
        }
    }

    fn display_name(&self) -> String {
        match self {
            PlaylistsNode::Root => "Playlists".to_string(),
            PlaylistsNode::Folder { name, .. } => name.clone(),
            PlaylistsNode::Playlist { name, .. } => name.clone(),
            PlaylistsNode::Track { title, .. } => title.clone(),
        }
    }

    fn is_container(&self) -> bool {
        !matches!(self, PlaylistsNode::Track { .. })
    }

    fn icon_type(&self) -> IconType {
        match self {
            PlaylistsNode::Root | PlaylistsNode::Folder { .. } => IconType::Folder,
            PlaylistsNode::Playlist { .. } => IconType::Album,
            PlaylistsNode::Track { .. } => IconType::Track,
        }
    }
}

pub struct PlaylistsSource {
    pool: SqlitePool,
}

impl PlaylistsSource {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Source<PlaylistsNode> for PlaylistsSource {
    async fn root(&self) -> Result<PlaylistsNode> {
        Ok(PlaylistsNode::Root)
    }

    async fn children(&self, parent: &PlaylistsNode) -> Result<Vec<PlaylistsNode>> {
        match parent {
            PlaylistsNode::Root => {
                let folders = crate::library::playlists::folders(&self.pool, None).await?;
                let playlists = crate::library::playlists::playlists_in_folder(&self.pool, None).await?;
                let mut out: Vec<PlaylistsNode> = folders
                    .into_iter()
                    .map(|f| PlaylistsNode::Folder { id: f.id, name: f.name })
                    .collect();
                out.extend(playlists.into_iter().map(|p| PlaylistsNode::Playlist { id: p.id, name: p.name }));
                Ok(out)
            }
            PlaylistsNode::Folder { id, .. } => {
                let folders = crate::library::playlists::folders(&self.pool, Some(*id)).await?;
                let playlists =
                    crate::library::playlists::playlists_in_folder(&self.pool, Some(*id)).await?;
                let mut out: Vec<PlaylistsNode> = folders
                    .into_iter()
                    .map(|f| PlaylistsNode::Folder { id: f.id, name: f.name })
                    .collect();
                out.extend(playlists.into_iter().map(|p| PlaylistsNode::Playlist { id: p.id, name: p.name }));
                Ok(out)
            }
            PlaylistsNode::Playlist { id, .. } => {
                let rows: Vec<(i64, i64, String)> = sqlx::query_as(
                    "SELECT pt.position, t.id, t.title FROM playlist_tracks pt \
                     JOIN library_tracks t ON t.id = pt.track_id \
                     WHERE pt.playlist_id = ? ORDER BY pt.position",
                )
                .bind(id)
                .fetch_all(&self.pool)
                .await?;
                Ok(rows
                    .into_iter()
                    .map(|(position, track_id, title)| PlaylistsNode::Track {
                        playlist_id: *id,
                        position,
                        track_id,
                        title,
                    })
                    .collect())
            }
            PlaylistsNode::Track { .. } => Ok(Vec::new()),
        }
    }

    async fn parent(&self, node: &PlaylistsNode) -> Result<Option<PlaylistsNode>> {
        Ok(match node {
            PlaylistsNode::Root => None,
            PlaylistsNode::Folder { id, .. } => {
                let folder: Option<(Option<i64>,)> =
                    sqlx::query_as("SELECT parent_id FROM playlist_folders WHERE id = ?")
                        .bind(id)
                        .fetch_optional(&self.pool)
                        .await?;
                match folder.and_then(|(p,)| p) {
                    Some(parent_id) => {
                        let name: (String,) =
                            sqlx::query_as("SELECT name FROM playlist_folders WHERE id = ?")
                                .bind(parent_id)
                                .fetch_one(&self.pool)
                                .await?;
                        Some(PlaylistsNode::Folder { id: parent_id, name: name.0 })
                    }
                    None => Some(PlaylistsNode::Root),
                }
            }
            PlaylistsNode::Playlist { id, .. } => {
                let row: (Option<i64>,) =
                    sqlx::query_as("SELECT folder_id FROM playlists WHERE id = ?")
                        .bind(id)
                        .fetch_one(&self.pool)
                        .await?;
                match row.0 {
                    Some(folder_id) => {
                        let name: (String,) =
                            sqlx::query_as("SELECT name FROM playlist_folders WHERE id = ?")
                                .bind(folder_id)
                                .fetch_one(&self.pool)
                                .await?;
                        Some(PlaylistsNode::Folder { id: folder_id, name: name.0 })
                    }
                    None => Some(PlaylistsNode::Root),
                }
            }
            PlaylistsNode::Track { playlist_id, .. } => {
                let name: (String,) = sqlx::query_as("SELECT name FROM playlists WHERE id = ?")
                    .bind(playlist_id)
                    .fetch_one(&self.pool)
                    .await?;
                Some(PlaylistsNode::Playlist { id: *playlist_id, name: name.0 })
            }
        })
    }

    async fn display_path(&self, node: &PlaylistsNode) -> Result<String> {
        Ok(format!("/{}", node.display_name()))
    }

    async fn node_from_id(&self, id: &str) -> Result<Option<PlaylistsNode>> {
        let Some(NodeId { parts, .. }) = node_id::parse(id) else {
            return Ok(None);
        };
        Ok(match parts.first().map(|s| s.as_str()) {
            Some("root") => Some(PlaylistsNode::Root),
            Some("folder") => parts.get(1).and_then(|s| s.parse().ok()).map(|id| PlaylistsNode::Folder {
                id,
                name: String::new(),
            }),
            Some("playlist") => {
                parts.get(1).and_then(|s| s.parse().ok()).map(|id| PlaylistsNode::Playlist {
                    id,
                    name: String::new(),
                })
            }
            Some("track") => match (parts.get(1), parts.get(2)) {
                (Some(playlist_id), Some(position)) => {
                    match (playlist_id.parse(), position.parse()) {
                        (Ok(playlist_id), Ok(position)) => Some(PlaylistsNode::Track {
                            playlist_id,
                            position,
                            track_id: 0,
                            title: String::new(),
                        }),
                        _ => None,
                    }
                }
                _ => None,
            },
            _ => None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;

    #[tokio::test]
    async fn root_includes_the_seeded_favorites_playlist() {
        let pool = test_pool().await;
        let source = PlaylistsSource::new(pool);
        let root = source.root().await.unwrap();
        let children = source.children(&root).await.unwrap();
        assert!(children.iter().any(|n| n.display_name() == "Favorites"));
    }
}
