//! `library:` source: artists → albums → tracks, backed by indexed reads
//! over `library_tracks`.

use async_trait::async_trait;
use sqlx::SqlitePool;

use super::node_id::{self, NodeId};
use super::{IconType, Node, Result, Source, SourceError};

#[derive(Debug, Clone, PartialEq)]
pub enum LibraryNode {
    Root,
    Artist { name: String },
    Album { artist: String, album: String },
    Track { artist: String, album: String, track_id: i64, title: String },
}

impl Node for LibraryNode {
    fn id(&self) -> String {
        match self {
            LibraryNode::Root => "library:root".to_string(),
            LibraryNode::Artist { name } => node_id::format("library", &["artist", name]),
            LibraryNode::Album { artist, album } => {
                node_id::format("library", &["album", artist, album])
            }
            LibraryNode::Track { artist, album, track_id, .. } => {
                node_id::format("library", &["track", artist, album, &track_id.to_string()])
            }
        }
    }

    fn display_name(&self) -> String {
        match self {
            LibraryNode::Root => "Library".to_string(),
            LibraryNode::Artist { name } => name.clone(),
            LibraryNode::Album { album, .. } => album.clone(),
            LibraryNode::Track { title, .. } => title.clone(),
        }
    }

    fn is_container(&self) -> bool {
        !matches!(self, LibraryNode::Track { .. })
    }

    fn icon_type(&self) -> IconType {
        match self {
            LibraryNode::Root => IconType::Folder,
            LibraryNode::Artist { .. } => IconType::Artist,
            LibraryNode::Album { .. } => IconType::Album,
            LibraryNode::Track { .. } => IconType::Track,
        }
    }
}

pub struct LibrarySource {
    pool: SqlitePool,
}

impl LibrarySource {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn node_from_parts(parts: &[String]) -> Option<LibraryNode> {
    match parts.first().map(|s| s.as_str()) {
        Some("root") => Some(LibraryNode::Root),
        Some("artist") => parts.get(1).map(|name| LibraryNode::Artist { name: name.clone() }),
        Some("album") => match (parts.get(1), parts.get(2)) {
            (Some(artist), Some(album)) => {
                Some(LibraryNode::Album { artist: artist.clone(), album: album.clone() })
            }
            _ => None,
        },
        Some("track") => match (parts.get(1), parts.get(2), parts.get(3)) {
            (Some(artist), Some(album), Some(id)) => id.parse().ok().map(|track_id| LibraryNode::Track {
                artist: artist.clone(),
                album: album.clone(),
                track_id,
                title: String::new(),
            }),
            _ => None,
        },
        _ => None,
    }
}

#[async_trait]
impl Source<LibraryNode> for LibrarySource {
    async fn root(&self) -> Result<LibraryNode> {
        Ok(LibraryNode::Root)
    }

    async fn children(&self, parent: &LibraryNode) -> Result<Vec<LibraryNode>> {
        match parent {
            LibraryNode::Root => {
                let artists = crate::library::artists(&self.pool).await.map_err(to_source_err)?;
                Ok(artists.into_iter().map(|name| LibraryNode::Artist { name }).collect())
            }
            LibraryNode::Artist { name } => {
                let albums = crate::library::artist_albums(&self.pool, name)
                    .await
                    .map_err(to_source_err)?;
                Ok(albums
                    .into_iter()
                    .map(|(album, _year)| LibraryNode::Album { artist: name.clone(), album })
                    .collect())
            }
            LibraryNode::Album { artist, album } => {
                let tracks = crate::library::album_tracks(&self.pool, artist, album)
                    .await
                    .map_err(to_source_err)?;
                Ok(tracks
                    .into_iter()
                    .map(|t| LibraryNode::Track {
                        artist: artist.clone(),
                        album: album.clone(),
                        track_id: t.id,
                        title: t.title,
                    })
                    .collect())
            }
            LibraryNode::Track { .. } => Ok(Vec::new()),
        }
    }

    async fn parent(&self, node: &LibraryNode) -> Result<Option<LibraryNode>> {
        Ok(match node {
            LibraryNode::Root => None,
            LibraryNode::Artist { .. } => Some(LibraryNode::Root),
            LibraryNode::Album { artist, .. } => Some(LibraryNode::Artist { name: artist.clone() }),
            LibraryNode::Track { artist, album, .. } => {
                Some(LibraryNode::Album { artist: artist.clone(), album: album.clone() })
            }
        })
    }

    async fn display_path(&self, node: &LibraryNode) -> Result<String> {
        Ok(match node {
            LibraryNode::Root => "/".to_string(),
            LibraryNode::Artist { name } => format!("/{name}"),
            LibraryNode::Album { artist, album } => format!("/{artist}/{album}"),
            LibraryNode::Track { artist, album, title, .. } => format!("/{artist}/{album}/{title}"),
        })
    }

    async fn node_from_id(&self, id: &str) -> Result<Option<LibraryNode>> {
        let Some(NodeId { parts, .. }) = node_id::parse(id) else {
            return Ok(None);
        };
        Ok(node_from_parts(&parts))
    }
}

fn to_source_err(e: crate::library::LibraryError) -> SourceError {
    match e {
        crate::library::LibraryError::Database(err) => SourceError::Database(err),
        crate::library::LibraryError::TagRead { .. } => {
            SourceError::NotFound("tag read error".to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;

    #[tokio::test]
    async fn root_children_are_artists() {
        let pool = test_pool().await;
        sqlx::query(
            "INSERT INTO library_tracks (path, mtime, album_artist, album, title, added_at, updated_at) \
             VALUES ('/a.mp3', 0, 'Artist', 'Album', 'Title', 0, 0)",
        )
        .execute(&pool)
        .await
        .unwrap();

        let source = LibrarySource::new(pool);
        let root = source.root().await.unwrap();
        let children = source.children(&root).await.unwrap();
        assert_eq!(children.len(), 1);
        assert_eq!(children[0].display_name(), "Artist");
    }

    #[test]
    fn node_ids_round_trip_through_node_from_id_parts() {
        let node = LibraryNode::Album { artist: "A".into(), album: "B".into() };
        let parsed = node_from_parts(&node_id::parse(&node.id()).unwrap().parts).unwrap();
        assert_eq!(parsed, node);
    }
}
