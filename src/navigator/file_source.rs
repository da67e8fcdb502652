//! `file:` source: a plain filesystem browser rooted at a configured
//! directory.

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use super::node_id::{self, NodeId};
use super::{IconType, Node, Result, Source};

#[derive(Debug, Clone, PartialEq)]
pub struct FileNode {
    pub path: PathBuf,
    pub is_dir: bool,
}

impl Node for FileNode {
    fn id(&self) -> String {
        node_id::format("file", &[&self.path.to_string_lossy()])
    }

    fn display_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| self.path.to_string_lossy().to_string())
    }

    fn is_container(&self) -> bool {
        self.is_dir
    }

    fn icon_type(&self) -> IconType {
        if self.is_dir {
            IconType::Folder
        } else {
            IconType::File
        }
    }
}

pub struct FileSource {
    root: PathBuf,
}

impl FileSource {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    fn node_for(&self, path: &Path) -> FileNode {
        FileNode { path: path.to_path_buf(), is_dir: path.is_dir() }
    }
}

#[async_trait]
impl Source<FileNode> for FileSource {
    async fn root(&self) -> Result<FileNode> {
        Ok(self.node_for(&self.root))
    }

    async fn children(&self, parent: &FileNode) -> Result<Vec<FileNode>> {
        if !parent.is_dir {
            return Ok(Vec::new());
        }
        let mut entries: Vec<FileNode> = std::fs::read_dir(&parent.path)?
            .filter_map(|e| e.ok())
            .map(|e| self.node_for(&e.path()))
            .filter(|n| {
                n.is_dir
                    || n.path
                        .extension()
                        .and_then(|e| e.to_str())
                        .map(|e| matches!(e.to_lowercase().as_str(), "mp3" | "flac"))
                        .unwrap_or(false)
            })
            .collect();
        entries.sort_by(|a, b| (!a.is_dir, a.display_name()).cmp(&(!b.is_dir, b.display_name())));
        Ok(entries)
    }

    async fn parent(&self, node: &FileNode) -> Result<Option<FileNode>> {
        if node.path == self.root {
            return Ok(None);
        }
        Ok(node.path.parent().map(|p| self.node_for(p)))
    }

    async fn display_path(&self, node: &FileNode) -> Result<String> {
        Ok(node.path.to_string_lossy().to_string())
    }

    async fn node_from_id(&self, id: &str) -> Result<Option<FileNode>> {
        let Some(NodeId { parts, .. }) = node_id::parse(id) else {
            return Ok(None);
        };
        let Some(raw) = parts.first() else {
            return Ok(None);
        };
        let path = PathBuf::from(raw);
        if !path.exists() {
            return Ok(None);
        }
        Ok(Some(self.node_for(&path)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn children_lists_subdirs_and_audio_files_only() {
        let dir = tempdir().unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        std::fs::write(dir.path().join("song.mp3"), b"").unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"").unwrap();

        let source = FileSource::new(dir.path().to_path_buf());
        let root = source.root().await.unwrap();
        let children = source.children(&root).await.unwrap();

        let names: Vec<String> = children.iter().map(|n| n.display_name()).collect();
        assert!(names.contains(&"sub".to_string()));
        assert!(names.contains(&"song.mp3".to_string()));
        assert!(!names.contains(&"notes.txt".to_string()));
    }

    #[tokio::test]
    async fn parent_of_root_is_none() {
        let dir = tempdir().unwrap();
        let source = FileSource::new(dir.path().to_path_buf());
        let root = source.root().await.unwrap();
        assert!(source.parent(&root).await.unwrap().is_none());
    }
}
