//! Miller-columns navigator: a generic hierarchical browser over a
//! [`Source`], used for the library, playlists, filesystem,
//! and downloads views.
//!
//! Built the same way as this codebase's other "generic over a capability"
//! traits (trait objects per-provider); here the capability is a source of
//! tree nodes rather than a metadata provider.

pub mod deep_scan;
pub mod downloads_source;
pub mod file_source;
pub mod library_source;
pub mod node_id;
pub mod persist;
pub mod playlists_source;

use std::collections::HashMap;

use async_trait::async_trait;

#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error(transparent)]
    Database(#[from] sqlx::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("no node for id {0}")]
    NotFound(String),
}

pub type Result<T> = std::result::Result<T, SourceError>;

impl From<crate::library::LibraryError> for SourceError {
    fn from(e: crate::library::LibraryError) -> Self {
        match e {
            crate::library::LibraryError::Database(err) => SourceError::Database(err),
            crate::library::LibraryError::TagRead { path, .. } => SourceError::NotFound(path),
        }
    }
}

/// Icon glyph category, resolved to an actual glyph by `ui::icons`
/// according to the configured [`crate::config::IconSet`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IconType {
    Folder,
    Artist,
    Album,
    Track,
    File,
    Download,
}

/// Capability every navigable node must answer.
pub trait Node: Clone + std::fmt::Debug + PartialEq {
    fn id(&self) -> String;
    fn display_name(&self) -> String;
    fn is_container(&self) -> bool;
    fn icon_type(&self) -> IconType;
}

/// A source of tree nodes, parametric over its node type. Implementations must be cheap: expensive
/// enumeration belongs in an external scan, not
/// here.
#[async_trait]
pub trait Source<N: Node>: Send + Sync {
    async fn root(&self) -> Result<N>;
    async fn children(&self, parent: &N) -> Result<Vec<N>>;
    async fn parent(&self, node: &N) -> Result<Option<N>>;
    async fn display_path(&self, node: &N) -> Result<String>;
    async fn node_from_id(&self, id: &str) -> Result<Option<N>>;
}

/// Emitted on any cursor or drill move; debounced 500 ms before being
/// written to the persistence store.
#[derive(Debug, Clone, PartialEq)]
pub struct NavigationChanged {
    pub current_path: String,
    pub selected_name: String,
    pub view_mode: crate::model::ViewMode,
    pub selected_id: Option<String>,
}

/// The three-column Miller state over one [`Source`]: a stack of ancestor
/// "parent" nodes, the current parent, its children, and a focused index.
/// Cursor position per visited parent is remembered so drilling back up
/// restores it.
pub struct Columns<N: Node> {
    current_parent: N,
    children: Vec<N>,
    focused: usize,
    /// Cursor position remembered per parent id, across drill-down/up.
    cursor_memory: HashMap<String, usize>,
    /// The current parent's siblings (its own parent's children), for the
    /// left-hand column; `parent_focused` is `current_parent`'s index
    /// within it.
    parent_items: Vec<N>,
    parent_focused: usize,
    /// The focused child's own children, for the right-hand preview
    /// column. Empty when the focused node is a leaf.
    preview: Vec<N>,
}

impl<N: Node> Columns<N> {
    pub async fn new<S: Source<N> + ?Sized>(source: &S) -> Result<Self> {
        let root = source.root().await?;
        let children = source.children(&root).await?;
        let mut columns = Self {
            current_parent: root,
            children,
            focused: 0,
            cursor_memory: HashMap::new(),
            parent_items: Vec::new(),
            parent_focused: 0,
            preview: Vec::new(),
        };
        columns.refresh_context(source).await?;
        Ok(columns)
    }

    /// Recomputes the parent (left) and preview (right) columns from the
    /// current parent/focused state. Called after every cursor move and
    /// drill, per spec.md §4.5 ("preview of the focused child's children").
    pub async fn refresh_context<S: Source<N> + ?Sized>(&mut self, source: &S) -> Result<()> {
        match source.parent(&self.current_parent).await? {
            Some(grandparent) => {
                self.parent_items = source.children(&grandparent).await?;
                self.parent_focused =
                    self.parent_items.iter().position(|n| n.id() == self.current_parent.id()).unwrap_or(0);
            }
            None => {
                self.parent_items = vec![self.current_parent.clone()];
                self.parent_focused = 0;
            }
        }
        self.preview = match self.focused() {
            Some(focused) if focused.is_container() => source.children(focused).await?,
            _ => Vec::new(),
        };
        Ok(())
    }

    pub fn parent_items(&self) -> &[N] {
        &self.parent_items
    }

    pub fn parent_focused_index(&self) -> usize {
        self.parent_focused
    }

    pub fn preview(&self) -> &[N] {
        &self.preview
    }

    pub fn current_parent(&self) -> &N {
        &self.current_parent
    }

    pub fn children(&self) -> &[N] {
        &self.children
    }

    pub fn focused(&self) -> Option<&N> {
        self.children.get(self.focused)
    }

    pub fn focused_index(&self) -> usize {
        self.focused
    }

    pub fn move_cursor(&mut self, delta: i64) {
        if self.children.is_empty() {
            return;
        }
        let len = self.children.len() as i64;
        let next = (self.focused as i64 + delta).clamp(0, len - 1);
        self.focused = next as usize;
    }

    /// `move_cursor` followed by a preview-column refresh; the caller
    /// should prefer this over the bare sync `move_cursor` whenever a
    /// source is at hand, so the preview column never shows a stale child.
    pub async fn move_cursor_and_refresh<S: Source<N> + ?Sized>(&mut self, source: &S, delta: i64) -> Result<()> {
        self.move_cursor(delta);
        self.refresh_context(source).await
    }

    /// `NavigateTo(node)`: replaces the current parent, remembering the
    /// cursor we leave behind and restoring any cursor we've seen for the
    /// new parent.
    pub async fn navigate_to<S: Source<N> + ?Sized>(&mut self, source: &S, node: N) -> Result<()> {
        self.cursor_memory.insert(self.current_parent.id(), self.focused);
        let children = source.children(&node).await?;
        self.focused = self.cursor_memory.get(&node.id()).copied().unwrap_or(0).min(children.len().saturating_sub(1));
        self.current_parent = node;
        self.children = children;
        self.refresh_context(source).await
    }

    /// Drill into the focused child, if it's a container.
    pub async fn drill_down<S: Source<N> + ?Sized>(&mut self, source: &S) -> Result<bool> {
        let Some(focused) = self.focused().cloned() else {
            return Ok(false);
        };
        if !focused.is_container() {
            return Ok(false);
        }
        self.navigate_to(source, focused).await?;
        Ok(true)
    }

    /// Drill up to the parent of the current parent, restoring its cursor.
    pub async fn drill_up<S: Source<N> + ?Sized>(&mut self, source: &S) -> Result<bool> {
        let Some(parent) = source.parent(&self.current_parent).await? else {
            return Ok(false);
        };
        self.navigate_to(source, parent).await?;
        Ok(true)
    }

    /// `FocusByID(id)`: locates and scrolls a node into view among the
    /// current children.
    pub fn focus_by_id(&mut self, id: &str) -> bool {
        if let Some(pos) = self.children.iter().position(|n| n.id() == id) {
            self.focused = pos;
            true
        } else {
            false
        }
    }

    /// `FocusByName(name)`: resolves by display name.
    pub fn focus_by_name(&mut self, name: &str) -> bool {
        if let Some(pos) = self.children.iter().position(|n| n.display_name() == name) {
            self.focused = pos;
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct TestNode(String, bool);

    impl Node for TestNode {
        fn id(&self) -> String {
            self.0.clone()
        }
        fn display_name(&self) -> String {
            self.0.clone()
        }
        fn is_container(&self) -> bool {
            self.1
        }
        fn icon_type(&self) -> IconType {
            IconType::Folder
        }
    }

    struct TestSource;

    #[async_trait]
    impl Source<TestNode> for TestSource {
        async fn root(&self) -> Result<TestNode> {
            Ok(TestNode("root".into(), true))
        }
        async fn children(&self, parent: &TestNode) -> Result<Vec<TestNode>> {
            Ok(match parent.0.as_str() {
                "root" => vec![TestNode("a".into(), true), TestNode("b".into(), false)],
                "a" => vec![TestNode("a1".into(), false)],
                _ => vec![],
            })
        }
        async fn parent(&self, node: &TestNode) -> Result<Option<TestNode>> {
            Ok(match node.0.as_str() {
                "a" | "b" => Some(TestNode("root".into(), true)),
                "a1" => Some(TestNode("a".into(), true)),
                _ => None,
            })
        }
        async fn display_path(&self, node: &TestNode) -> Result<String> {
            Ok(node.0.clone())
        }
        async fn node_from_id(&self, id: &str) -> Result<Option<TestNode>> {
            Ok(Some(TestNode(id.to_string(), false)))
        }
    }

    #[tokio::test]
    async fn drill_down_then_up_restores_cursor() {
        let source = TestSource;
        let mut columns = Columns::new(&source).await.unwrap();
        columns.move_cursor(1); // focus "b"
        assert_eq!(columns.focused().unwrap().0, "b");

        columns.move_cursor(-1); // back to "a"
        assert!(columns.drill_down(&source).await.unwrap());
        assert_eq!(columns.current_parent().0, "a");

        assert!(columns.drill_up(&source).await.unwrap());
        assert_eq!(columns.current_parent().0, "root");
        assert_eq!(columns.focused().unwrap().0, "a");
    }

    #[tokio::test]
    async fn drill_down_on_a_leaf_does_nothing() {
        let source = TestSource;
        let mut columns = Columns::new(&source).await.unwrap();
        columns.move_cursor(1); // "b" is not a container
        assert!(!columns.drill_down(&source).await.unwrap());
        assert_eq!(columns.current_parent().0, "root");
    }

    #[tokio::test]
    async fn focus_by_name_finds_the_matching_child() {
        let source = TestSource;
        let mut columns = Columns::new(&source).await.unwrap();
        assert!(columns.focus_by_name("b"));
        assert_eq!(columns.focused_index(), 1);
        assert!(!columns.focus_by_name("nonexistent"));
    }

    #[tokio::test]
    async fn preview_shows_focused_containers_children_and_empties_for_a_leaf() {
        let source = TestSource;
        let mut columns = Columns::new(&source).await.unwrap();
        // Cursor starts on "a", a container with child "a1".
        assert_eq!(columns.preview().len(), 1);
        assert_eq!(columns.preview()[0].0, "a1");

        columns.move_cursor_and_refresh(&source, 1).await.unwrap(); // "b", a leaf
        assert!(columns.preview().is_empty());
    }

    #[tokio::test]
    async fn parent_column_lists_siblings_with_current_parent_highlighted() {
        let source = TestSource;
        let mut columns = Columns::new(&source).await.unwrap();
        columns.drill_down(&source).await.unwrap(); // into "a"
        assert_eq!(columns.parent_items().len(), 2); // root's children: a, b
        assert_eq!(columns.parent_items()[columns.parent_focused_index()].0, "a");
    }
}
