//! Link shelf domain library: a tree of named categories holding bookmarks,
//! persisted as a single JSON document.
//! The core is pure data plus one storage seam; front-ends (the line shell, the
//! one-shot CLI) only talk to `shelf::Shelf` and never mutate the tree directly.

pub mod model {
    use indexmap::IndexMap;
    use serde::de::{MapAccess, Visitor};
    use serde::ser::SerializeMap;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::fmt;

    /// Reserved key under which a node keeps its link collection.
    pub const LINKS_KEY: &str = "_links";

    /// Deepest category level a shelf accepts (top-level categories are level 1).
    /// Each level is one JSON object and a level's links add two more arrays,
    /// which keeps saved documents under serde_json's 128-level read limit.
    pub const MAX_DEPTH: usize = 100;

    /* -------------------------------- Links -------------------------------- */

    /// A bookmark as stored on disk.
    ///
    /// Older documents hold bare URL strings; everything written by this crate
    /// uses the `[url, description]` pair. Callers read both shapes through
    /// [`Link::url`] and [`Link::description`].
    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    #[serde(untagged)]
    pub enum Link {
        Url(String),
        UrlWithDescription(String, String),
    }

    impl Link {
        pub fn new(url: impl Into<String>, description: impl Into<String>) -> Self {
            Self::UrlWithDescription(url.into(), description.into())
        }

        pub fn url(&self) -> &str {
            match self {
                Link::Url(url) | Link::UrlWithDescription(url, _) => url,
            }
        }

        /// Empty for bare-URL links.
        pub fn description(&self) -> &str {
            match self {
                Link::Url(_) => "",
                Link::UrlWithDescription(_, description) => description,
            }
        }

        /// Text shown in listings: the description, or the URL when the
        /// description is blank.
        pub fn label(&self) -> &str {
            let description = self.description();
            if description.trim().is_empty() {
                self.url()
            } else {
                description
            }
        }
    }

    /* -------------------------------- Nodes -------------------------------- */

    /// One category's contents: named subcategories (in insertion order) and an
    /// optional link collection.
    ///
    /// `links` stays `None` until the first link is added so that documents
    /// without a `_links` key round-trip without gaining one.
    #[derive(Debug, Clone, Default, PartialEq, Eq)]
    pub struct Node {
        categories: IndexMap<String, Node>,
        links: Option<Vec<Link>>,
    }

    impl Node {
        pub fn new() -> Self {
            Self::default()
        }

        /// True when there is nothing to list: no subcategories and no links.
        pub fn is_empty(&self) -> bool {
            self.categories.is_empty() && self.links().is_empty()
        }

        pub fn category_count(&self) -> usize {
            self.categories.len()
        }

        pub fn category_names(&self) -> impl Iterator<Item = &str> {
            self.categories.keys().map(String::as_str)
        }

        pub fn categories(&self) -> impl Iterator<Item = (&str, &Node)> {
            self.categories
                .iter()
                .map(|(name, node)| (name.as_str(), node))
        }

        pub fn category(&self, name: &str) -> Option<&Node> {
            self.categories.get(name)
        }

        pub fn category_at(&self, position: usize) -> Option<(&str, &Node)> {
            self.categories
                .get_index(position)
                .map(|(name, node)| (name.as_str(), node))
        }

        pub fn contains_category(&self, name: &str) -> bool {
            self.categories.contains_key(name)
        }

        pub fn links(&self) -> &[Link] {
            self.links.as_deref().unwrap_or(&[])
        }

        pub fn link_count(&self) -> usize {
            self.links().len()
        }

        pub(crate) fn category_mut(&mut self, name: &str) -> Option<&mut Node> {
            self.categories.get_mut(name)
        }

        pub(crate) fn categories_mut(&mut self) -> &mut IndexMap<String, Node> {
            &mut self.categories
        }

        /// Link collection, created on first use.
        pub(crate) fn links_mut(&mut self) -> &mut Vec<Link> {
            self.links.get_or_insert_with(Vec::new)
        }
    }

    /* ----------------------------- Wire format ----------------------------- */

    // A node is a JSON object whose keys are category names, plus the reserved
    // `_links` key holding an array. Both share one map, so serde derive can't
    // express it directly.

    impl Serialize for Node {
        fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
            let len = self.categories.len() + usize::from(self.links.is_some());
            let mut map = serializer.serialize_map(Some(len))?;
            for (name, child) in &self.categories {
                map.serialize_entry(name, child)?;
            }
            if let Some(links) = &self.links {
                map.serialize_entry(LINKS_KEY, links)?;
            }
            map.end()
        }
    }

    impl<'de> Deserialize<'de> for Node {
        fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
            struct NodeVisitor;

            impl<'de> Visitor<'de> for NodeVisitor {
                type Value = Node;

                fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                    f.write_str("a category object")
                }

                fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Node, A::Error> {
                    let mut node = Node::default();
                    while let Some(key) = access.next_key::<String>()? {
                        if key == LINKS_KEY {
                            node.links = Some(access.next_value()?);
                        } else {
                            let child = access.next_value()?;
                            node.categories.insert(key, child);
                        }
                    }
                    Ok(node)
                }
            }

            deserializer.deserialize_map(NodeVisitor)
        }
    }

}

pub mod naming {
    //! Category-name rules shared by add and rename.

    use crate::model::LINKS_KEY;

    pub const MAX_NAME_LEN: usize = 50;

    /// Characters that are never allowed in a category name.
    pub const FORBIDDEN_CHARS: &[char] = &['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

    #[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
    pub enum NameError {
        #[error("name cannot be empty")]
        Empty,
        #[error("name is {len} characters long (max {max})")]
        TooLong { len: usize, max: usize },
        #[error("name cannot contain '{0}'")]
        ForbiddenChar(char),
        #[error("'_links' is reserved")]
        Reserved,
    }

    /// Checks a proposed category name and returns it with surrounding
    /// whitespace removed. Sibling uniqueness is checked by the caller.
    pub fn validate_category_name(raw: &str) -> Result<&str, NameError> {
        let name = raw.trim();
        if name.is_empty() {
            return Err(NameError::Empty);
        }
        let len = name.chars().count();
        if len > MAX_NAME_LEN {
            return Err(NameError::TooLong {
                len,
                max: MAX_NAME_LEN,
            });
        }
        if let Some(bad) = name.chars().find(|c| FORBIDDEN_CHARS.contains(c)) {
            return Err(NameError::ForbiddenChar(bad));
        }
        if name == LINKS_KEY {
            return Err(NameError::Reserved);
        }
        Ok(name)
    }

}

pub mod error {
    use crate::naming::NameError;
    use crate::store::StoreError;

    /// Everything a shelf operation can report back to a front-end.
    #[derive(Debug, thiserror::Error)]
    pub enum ShelfError {
        #[error("URL cannot be empty")]
        EmptyUrl,
        #[error("invalid category name: {0}")]
        InvalidName(#[from] NameError),
        #[error("a category named '{0}' already exists")]
        AlreadyExists(String),
        #[error("no changes: the new name is the same as the current one")]
        NoChange,
        #[error("no item at position {0}")]
        InvalidIndex(usize),
        #[error("category '{0}' not found")]
        NotFound(String),
        #[error("categories can be nested at most {max} levels deep")]
        TooDeep { max: usize },
        #[error("changes were not saved: {0}")]
        StorageWrite(#[from] StoreError),
    }

    impl ShelfError {
        /// Soft failures leave nothing to fix; front-ends show them as notices.
        pub fn is_soft(&self) -> bool {
            matches!(self, ShelfError::NoChange)
        }
    }
}

pub mod store {
    //! Storage gateway: the whole tree is read and written as one JSON file.

    use crate::model::Node;
    use log::{debug, info, warn};
    use std::{
        fs, io,
        path::{Path, PathBuf},
    };

    #[derive(Debug, thiserror::Error)]
    pub enum StoreError {
        #[error("reading {path:?}: {source}")]
        Read {
            path: PathBuf,
            #[source]
            source: io::Error,
        },
        #[error("parsing {path:?}: {source}")]
        Parse {
            path: PathBuf,
            #[source]
            source: serde_json::Error,
        },
        #[error("serializing shelf: {0}")]
        Serialize(#[source] serde_json::Error),
        #[error("writing {path:?}: {source}")]
        Write {
            path: PathBuf,
            #[source]
            source: io::Error,
        },
    }

    /// Result of reading the backing document. Every variant yields a usable
    /// tree; the distinction exists for logging and tests.
    #[derive(Debug)]
    pub enum LoadOutcome {
        Loaded(Node),
        Missing,
        Corrupt(StoreError),
    }

    impl LoadOutcome {
        pub fn into_tree(self) -> Node {
            match self {
                LoadOutcome::Loaded(tree) => tree,
                LoadOutcome::Missing | LoadOutcome::Corrupt(_) => Node::new(),
            }
        }
    }

    pub trait TreeStore {
        /// Never fails: missing or unreadable documents load as an empty tree.
        fn load(&self) -> LoadOutcome;

        /// Persist the whole tree, replacing what was there.
        fn save(&self, tree: &Node) -> Result<(), StoreError>;
    }

    #[derive(Debug, Clone)]
    pub struct JsonFileStore {
        path: PathBuf,
    }

    impl JsonFileStore {
        pub fn new(path: impl Into<PathBuf>) -> Self {
            Self { path: path.into() }
        }

        pub fn path(&self) -> &Path {
            &self.path
        }
    }

    impl TreeStore for JsonFileStore {
        fn load(&self) -> LoadOutcome {
            if !self.path.exists() {
                info!("{:?} does not exist; starting with an empty shelf", self.path);
                return LoadOutcome::Missing;
            }

            let text = match fs::read_to_string(&self.path) {
                Ok(text) => text,
                Err(source) => {
                    let err = StoreError::Read {
                        path: self.path.clone(),
                        source,
                    };
                    warn!("{err}; starting with an empty shelf");
                    return LoadOutcome::Corrupt(err);
                }
            };

            match serde_json::from_str::<Node>(&text) {
                Ok(tree) => {
                    info!(
                        "loaded {:?} ({} top-level categories)",
                        self.path,
                        tree.category_count()
                    );
                    LoadOutcome::Loaded(tree)
                }
                Err(source) => {
                    let err = StoreError::Parse {
                        path: self.path.clone(),
                        source,
                    };
                    warn!("{err}; starting with an empty shelf");
                    LoadOutcome::Corrupt(err)
                }
            }
        }

        fn save(&self, tree: &Node) -> Result<(), StoreError> {
            let mut text = serde_json::to_string_pretty(tree).map_err(StoreError::Serialize)?;
            text.push('\n');
            fs::write(&self.path, text.as_bytes()).map_err(|source| StoreError::Write {
                path: self.path.clone(),
                source,
            })?;
            debug!("saved shelf to {:?}", self.path);
            Ok(())
        }
    }

}

pub mod resolve {
    //! Path resolution from the root. Paths are caller-owned lists of category
    //! names, re-resolved on every access.

    use crate::error::ShelfError;
    use crate::model::Node;
    use std::sync::LazyLock;

    static EMPTY: LazyLock<Node> = LazyLock::new(Node::new);

    /// Follows `path` from `root`. A segment that doesn't exist makes the rest
    /// of the walk an empty view instead of an error.
    pub fn resolve<'a>(root: &'a Node, path: &[String]) -> &'a Node {
        try_resolve(root, path).unwrap_or(&*EMPTY)
    }

    pub fn try_resolve<'a>(root: &'a Node, path: &[String]) -> Option<&'a Node> {
        path.iter()
            .try_fold(root, |node, segment| node.category(segment))
    }

    /// Mutable lookup for operations; a stale path is `NotFound` here because
    /// writing into an empty view would silently drop the change.
    pub fn resolve_mut<'a>(root: &'a mut Node, path: &[String]) -> Result<&'a mut Node, ShelfError> {
        let mut node = root;
        for segment in path {
            node = node
                .category_mut(segment)
                .ok_or_else(|| ShelfError::NotFound(segment.clone()))?;
        }
        Ok(node)
    }

    /// `a/b/c`, or `root` for the empty path.
    pub fn display_path(path: &[String]) -> String {
        if path.is_empty() {
            "root".to_string()
        } else {
            path.join("/")
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;
        use crate::ops;

        fn path(segments: &[&str]) -> Vec<String> {
            segments.iter().map(|s| s.to_string()).collect()
        }

        fn tree() -> Node {
            let mut root = Node::new();
            ops::add_category(&mut root, "A").expect("A");
            let a = root.category_mut("A").expect("A");
            ops::add_category(a, "B").expect("B");
            ops::add_link(a.category_mut("B").expect("B"), "http://deep", "deep").expect("link");
            root
        }

        #[test]
        fn walks_nested_categories() {
            let root = tree();
            let b = resolve(&root, &path(&["A", "B"]));
            assert_eq!(b.links()[0].url(), "http://deep");
            assert!(std::ptr::eq(resolve(&root, &[]), &root));
        }

        #[test]
        fn resolving_twice_gives_the_same_node() {
            let root = tree();
            let p = path(&["A", "B"]);
            assert!(std::ptr::eq(resolve(&root, &p), resolve(&root, &p)));
        }

        #[test]
        fn missing_segment_degrades_to_empty_view() {
            let root = tree();
            assert!(resolve(&root, &path(&["A", "nope", "B"])).is_empty());
            assert!(resolve(&root, &path(&["_links"])).is_empty());
            assert!(try_resolve(&root, &path(&["nope"])).is_none());
        }

        #[test]
        fn mutable_lookup_reports_missing_segment() {
            let mut root = tree();
            match resolve_mut(&mut root, &path(&["A", "gone"])) {
                Err(ShelfError::NotFound(name)) => assert_eq!(name, "gone"),
                other => panic!("expected NotFound, got {:?}", other.map(|_| ())),
            }
            assert!(resolve_mut(&mut root, &path(&["A", "B"])).is_ok());
        }

        #[test]
        fn display_path_names_root() {
            assert_eq!(display_path(&[]), "root");
            assert_eq!(display_path(&path(&["A", "B"])), "A/B");
        }
    }
}

pub mod entries {
    //! Flattened listing of a node: categories first, then links. This module
    //! is the only place that knows how a flat index splits into the two
    //! collections.

    use crate::error::ShelfError;
    use crate::model::{Link, Node};
    use serde::Serialize;
    use std::fmt::Write;

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
    #[serde(rename_all = "lowercase")]
    pub enum EntryKind {
        Category,
        Link,
    }

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum Entry<'a> {
        Category(&'a str),
        Link { label: &'a str, link: &'a Link },
    }

    impl Entry<'_> {
        pub fn kind(&self) -> EntryKind {
            match self {
                Entry::Category(_) => EntryKind::Category,
                Entry::Link { .. } => EntryKind::Link,
            }
        }

        pub fn label(&self) -> &str {
            match self {
                Entry::Category(name) => *name,
                Entry::Link { label, .. } => *label,
            }
        }
    }

    /// Owned row for renderers and JSON output.
    #[derive(Debug, Clone, PartialEq, Eq, Serialize)]
    pub struct DisplayItem {
        pub kind: EntryKind,
        pub label: String,
    }

    /// A flat index resolved to a position inside one of the node's collections.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum Slot {
        Category(usize),
        Link(usize),
    }

    pub fn list_items(node: &Node) -> Vec<Entry<'_>> {
        node.category_names()
            .map(Entry::Category)
            .chain(node.links().iter().map(|link| Entry::Link {
                label: link.label(),
                link,
            }))
            .collect()
    }

    pub fn display_list(node: &Node) -> Vec<DisplayItem> {
        list_items(node)
            .iter()
            .map(|entry| DisplayItem {
                kind: entry.kind(),
                label: entry.label().to_string(),
            })
            .collect()
    }

    /// Splits `flat` using the node's current category count.
    pub fn locate(node: &Node, flat: usize) -> Option<Slot> {
        let categories = node.category_count();
        if flat < categories {
            Some(Slot::Category(flat))
        } else if flat - categories < node.link_count() {
            Some(Slot::Link(flat - categories))
        } else {
            None
        }
    }

    pub fn link_position(node: &Node, flat: usize) -> Result<usize, ShelfError> {
        match locate(node, flat) {
            Some(Slot::Link(position)) => Ok(position),
            _ => Err(ShelfError::InvalidIndex(flat)),
        }
    }

    pub fn category_position(node: &Node, flat: usize) -> Result<usize, ShelfError> {
        match locate(node, flat) {
            Some(Slot::Category(position)) => Ok(position),
            _ => Err(ShelfError::InvalidIndex(flat)),
        }
    }

    /// Links addressed by the inclusive flat range `first..=last`. Every index
    /// in the range has to address a link.
    pub fn links_in_range(node: &Node, first: usize, last: usize) -> Result<&[Link], ShelfError> {
        if first > last {
            return Err(ShelfError::InvalidIndex(first));
        }
        let start = link_position(node, first)?;
        let end = link_position(node, last)?;
        Ok(&node.links()[start..=end])
    }

    /// Indented outline of the whole subtree, one entry per line.
    pub fn outline(node: &Node) -> String {
        fn rec(node: &Node, depth: usize, out: &mut String) {
            let indent = "  ".repeat(depth);
            for (name, child) in node.categories() {
                let _ = writeln!(out, "{indent}{name}/");
                rec(child, depth + 1, out);
            }
            for link in node.links() {
                if link.description().trim().is_empty() {
                    let _ = writeln!(out, "{indent}- {}", link.url());
                } else {
                    let _ = writeln!(out, "{indent}- {} <{}>", link.description(), link.url());
                }
            }
        }

        let mut out = String::new();
        rec(node, 0, &mut out);
        out
    }

    #[cfg(test)]
    mod tests {
        use super::*;
        use crate::ops;
        use proptest::prelude::*;

        fn mixed() -> Node {
            let mut node = Node::new();
            ops::add_category(&mut node, "Zeta").expect("Zeta");
            ops::add_category(&mut node, "Alpha").expect("Alpha");
            ops::add_link(&mut node, "http://one", "One").expect("one");
            ops::add_link(&mut node, "http://two", " ").expect("two");
            node
        }

        #[test]
        fn categories_come_first_in_insertion_order() {
            let node = mixed();
            let items = display_list(&node);
            let rows: Vec<(EntryKind, &str)> =
                items.iter().map(|i| (i.kind, i.label.as_str())).collect();
            assert_eq!(
                rows,
                vec![
                    (EntryKind::Category, "Zeta"),
                    (EntryKind::Category, "Alpha"),
                    (EntryKind::Link, "One"),
                    (EntryKind::Link, "http://two"),
                ]
            );
        }

        #[test]
        fn locate_applies_category_offset() {
            let node = mixed();
            assert_eq!(locate(&node, 0), Some(Slot::Category(0)));
            assert_eq!(locate(&node, 1), Some(Slot::Category(1)));
            assert_eq!(locate(&node, 2), Some(Slot::Link(0)));
            assert_eq!(locate(&node, 3), Some(Slot::Link(1)));
            assert_eq!(locate(&node, 4), None);
            assert!(matches!(
                link_position(&node, 1),
                Err(ShelfError::InvalidIndex(1))
            ));
            assert!(matches!(
                category_position(&node, 2),
                Err(ShelfError::InvalidIndex(2))
            ));
        }

        #[test]
        fn range_must_cover_only_links() {
            let node = mixed();
            let links = links_in_range(&node, 2, 3).expect("both links");
            assert_eq!(links.len(), 2);
            assert!(links_in_range(&node, 1, 3).is_err());
            assert!(links_in_range(&node, 3, 2).is_err());
            assert!(links_in_range(&node, 2, 9).is_err());
        }

        #[test]
        fn json_rows_use_lowercase_kinds() {
            let json = serde_json::to_string(&display_list(&mixed())[2]).expect("json");
            assert_eq!(json, r#"{"kind":"link","label":"One"}"#);
        }

        #[test]
        fn outline_indents_children() {
            let mut root = Node::new();
            ops::add_category(&mut root, "A").expect("A");
            let a = root.category_mut("A").expect("A");
            ops::add_category(a, "B").expect("B");
            ops::add_link(a, "http://a", "Shop A").expect("link");
            ops::add_link(&mut root, "http://top", "").expect("top");

            assert_eq!(outline(&root), "A/\n  B/\n  - Shop A <http://a>\n- http://top\n");
        }

        proptest! {
            #[test]
            fn every_entry_maps_back_to_its_collection(
                categories in 0usize..8,
                links in 0usize..8,
            ) {
                let mut node = Node::new();
                for i in 0..categories {
                    ops::add_category(&mut node, &format!("cat {i}")).expect("category");
                }
                for i in 0..links {
                    ops::add_link(&mut node, &format!("http://l{i}"), "").expect("link");
                }

                let items = list_items(&node);
                prop_assert_eq!(items.len(), categories + links);
                for (i, entry) in items.iter().enumerate() {
                    if i < categories {
                        prop_assert_eq!(entry.kind(), EntryKind::Category);
                        prop_assert_eq!(locate(&node, i), Some(Slot::Category(i)));
                    } else {
                        prop_assert_eq!(entry.kind(), EntryKind::Link);
                        prop_assert_eq!(locate(&node, i), Some(Slot::Link(i - categories)));
                        prop_assert_eq!(entry.label(), node.links()[i - categories].url());
                    }
                }
                prop_assert_eq!(locate(&node, categories + links), None);
            }
        }
    }
}

pub mod ops {
    //! Mutation operations on a single node. Each one validates everything it
    //! needs before touching the node, so a returned error means nothing
    //! changed. Persisting is the caller's job (see `shelf::Shelf::execute`).

    use crate::entries;
    use crate::error::ShelfError;
    use crate::model::{Link, Node};
    use crate::naming::validate_category_name;
    use std::fmt;

    /// How an operation names an existing sibling category.
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum CategoryRef {
        Name(String),
        /// Flat display index (categories-then-links listing).
        Index(usize),
    }

    /// What a successful operation did, for status lines and logs.
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum Applied {
        LinkAdded(Link),
        LinkEdited { previous: Link, current: Link },
        LinkRemoved(Link),
        CategoryAdded(String),
        CategoryRenamed { from: String, to: String },
        CategoryDeleted(String),
    }

    impl fmt::Display for Applied {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            match self {
                Applied::LinkAdded(link) => {
                    write!(f, "Added: {}  →  \"{}\"", link.url(), link.description())
                }
                Applied::LinkEdited { previous, current } => write!(
                    f,
                    "Replaced {} → {}  \"{}\"",
                    previous.url(),
                    current.url(),
                    current.description()
                ),
                Applied::LinkRemoved(link) => write!(f, "Removed: {}", link.url()),
                Applied::CategoryAdded(name) => write!(f, "Created category: '{name}'"),
                Applied::CategoryRenamed { from, to } => write!(f, "Renamed '{from}' → '{to}'"),
                Applied::CategoryDeleted(name) => write!(f, "Deleted category '{name}'"),
            }
        }
    }

    fn non_empty_url(url: &str) -> Result<&str, ShelfError> {
        let url = url.trim();
        if url.is_empty() {
            Err(ShelfError::EmptyUrl)
        } else {
            Ok(url)
        }
    }

    /// Name of the sibling category `target` points at.
    pub fn category_name(node: &Node, target: &CategoryRef) -> Result<String, ShelfError> {
        match target {
            CategoryRef::Name(name) if node.contains_category(name) => Ok(name.clone()),
            CategoryRef::Name(name) => Err(ShelfError::NotFound(name.clone())),
            CategoryRef::Index(flat) => {
                let position = entries::category_position(node, *flat)?;
                node.category_at(position)
                    .map(|(name, _)| name.to_string())
                    .ok_or(ShelfError::InvalidIndex(*flat))
            }
        }
    }

    pub fn add_link(node: &mut Node, url: &str, description: &str) -> Result<Applied, ShelfError> {
        let url = non_empty_url(url)?;
        let link = Link::new(url, description.trim());
        node.links_mut().push(link.clone());
        Ok(Applied::LinkAdded(link))
    }

    pub fn edit_link(
        node: &mut Node,
        flat: usize,
        url: &str,
        description: &str,
    ) -> Result<Applied, ShelfError> {
        let position = entries::link_position(node, flat)?;
        let url = non_empty_url(url)?;
        let current = Link::new(url, description.trim());
        let previous = std::mem::replace(&mut node.links_mut()[position], current.clone());
        Ok(Applied::LinkEdited { previous, current })
    }

    /// Later links move up by one position.
    pub fn remove_link(node: &mut Node, flat: usize) -> Result<Applied, ShelfError> {
        let position = entries::link_position(node, flat)?;
        let removed = node.links_mut().remove(position);
        Ok(Applied::LinkRemoved(removed))
    }

    pub fn add_category(node: &mut Node, name: &str) -> Result<Applied, ShelfError> {
        let name = validate_category_name(name)?;
        if node.contains_category(name) {
            return Err(ShelfError::AlreadyExists(name.to_string()));
        }
        node.categories_mut().insert(name.to_string(), Node::new());
        Ok(Applied::CategoryAdded(name.to_string()))
    }

    /// Moves the subtree to a new key, keeping its place among its siblings.
    pub fn rename_category(
        node: &mut Node,
        target: &CategoryRef,
        new_name: &str,
    ) -> Result<Applied, ShelfError> {
        let from = category_name(node, target)?;
        let to = validate_category_name(new_name)?;
        if to == from {
            return Err(ShelfError::NoChange);
        }
        if node.contains_category(to) {
            return Err(ShelfError::AlreadyExists(to.to_string()));
        }

        let categories = node.categories_mut();
        let (position, _, subtree) = categories
            .shift_remove_full(from.as_str())
            .ok_or_else(|| ShelfError::NotFound(from.clone()))?;
        let (last, _) = categories.insert_full(to.to_string(), subtree);
        categories.move_index(last, position);

        Ok(Applied::CategoryRenamed {
            from,
            to: to.to_string(),
        })
    }

    /// Removes the category and everything below it.
    pub fn delete_category(node: &mut Node, target: &CategoryRef) -> Result<Applied, ShelfError> {
        let name = category_name(node, target)?;
        node.categories_mut().shift_remove(name.as_str());
        Ok(Applied::CategoryDeleted(name))
    }

}

pub mod shelf {
    //! The store object front-ends hold: the in-memory tree plus the storage
    //! gateway it is written through after every change.

    use crate::entries::{self, DisplayItem, Slot};
    use crate::error::ShelfError;
    use crate::model::{Link, MAX_DEPTH, Node};
    use crate::ops::{self, Applied, CategoryRef};
    use crate::resolve::{self, display_path};
    use crate::store::TreeStore;
    use log::{debug, warn};

    /// A mutation request, addressed relative to the node at the caller's path.
    /// Link indices are flat display indices.
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum Operation {
        AddLink {
            url: String,
            description: String,
        },
        EditLink {
            index: usize,
            url: String,
            description: String,
        },
        RemoveLink {
            index: usize,
        },
        AddCategory {
            name: String,
        },
        RenameCategory {
            target: CategoryRef,
            new_name: String,
        },
        DeleteCategory {
            target: CategoryRef,
        },
        DeleteLink {
            index: usize,
        },
    }

    impl Operation {
        fn apply(&self, node: &mut Node) -> Result<Applied, ShelfError> {
            match self {
                Operation::AddLink { url, description } => ops::add_link(node, url, description),
                Operation::EditLink {
                    index,
                    url,
                    description,
                } => ops::edit_link(node, *index, url, description),
                Operation::RemoveLink { index } | Operation::DeleteLink { index } => {
                    ops::remove_link(node, *index)
                }
                Operation::AddCategory { name } => ops::add_category(node, name),
                Operation::RenameCategory { target, new_name } => {
                    ops::rename_category(node, target, new_name)
                }
                Operation::DeleteCategory { target } => ops::delete_category(node, target),
            }
        }
    }

    /// Result of selecting an entry.
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum Navigation {
        /// A category was chosen; this is the path to it.
        Enter(Vec<String>),
        /// A link was chosen; the front-end opens it.
        Open(String),
    }

    pub struct Shelf<S: TreeStore> {
        store: S,
        tree: Node,
    }

    impl<S: TreeStore> Shelf<S> {
        /// Loads the tree once; a missing or corrupt document gives an empty shelf.
        pub fn open(store: S) -> Self {
            let tree = store.load().into_tree();
            Self { store, tree }
        }

        pub fn tree(&self) -> &Node {
            &self.tree
        }

        pub fn store(&self) -> &S {
            &self.store
        }

        pub fn node(&self, path: &[String]) -> &Node {
            resolve::resolve(&self.tree, path)
        }

        pub fn display_list(&self, path: &[String]) -> Vec<DisplayItem> {
            entries::display_list(self.node(path))
        }

        pub fn navigate(&self, path: &[String], index: usize) -> Result<Navigation, ShelfError> {
            let node = self.node(path);
            match entries::locate(node, index) {
                Some(Slot::Category(position)) => {
                    let (name, _) = node
                        .category_at(position)
                        .ok_or(ShelfError::InvalidIndex(index))?;
                    let mut next = path.to_vec();
                    next.push(name.to_string());
                    debug!("entering {}", display_path(&next));
                    Ok(Navigation::Enter(next))
                }
                Some(Slot::Link(position)) => Ok(Navigation::Open(node.links()[position].url().to_string())),
                None => Err(ShelfError::InvalidIndex(index)),
            }
        }

        /// Links for the inclusive flat range `first..=last`.
        pub fn links_in_range(
            &self,
            path: &[String],
            first: usize,
            last: usize,
        ) -> Result<Vec<Link>, ShelfError> {
            entries::links_in_range(self.node(path), first, last).map(<[Link]>::to_vec)
        }

        /// Applies `op` at `path` and writes the whole tree before returning.
        /// On any error the in-memory tree is left as it was before the call.
        pub fn execute(&mut self, path: &[String], op: Operation) -> Result<Applied, ShelfError> {
            if matches!(op, Operation::AddCategory { .. }) && path.len() >= MAX_DEPTH {
                return Err(ShelfError::TooDeep { max: MAX_DEPTH });
            }
            let snapshot = self.tree.clone();
            let node = resolve::resolve_mut(&mut self.tree, path)?;
            let applied = op.apply(node)?;

            if let Err(err) = self.store.save(&self.tree) {
                warn!("{err}; rolling back '{applied}'");
                self.tree = snapshot;
                return Err(ShelfError::StorageWrite(err));
            }
            debug!("{} at {}", applied, display_path(path));
            Ok(applied)
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;
        use crate::entries::EntryKind;
        use crate::store::{JsonFileStore, LoadOutcome};
        use proptest::prelude::*;
        use std::fs;

        fn path(segments: &[&str]) -> Vec<String> {
            segments.iter().map(|s| s.to_string()).collect()
        }

        fn add_category(name: &str) -> Operation {
            Operation::AddCategory { name: name.into() }
        }

        fn add_link(url: &str, description: &str) -> Operation {
            Operation::AddLink {
                url: url.into(),
                description: description.into(),
            }
        }

        fn on_disk(store: &JsonFileStore) -> Node {
            match store.load() {
                LoadOutcome::Loaded(tree) => tree,
                other => panic!("expected saved document, got {:?}", other),
            }
        }

        #[test]
        fn every_change_is_on_disk_when_execute_returns() {
            let tmp = tempfile::tempdir().expect("tempdir");
            let mut shelf = Shelf::open(JsonFileStore::new(tmp.path().join("shelf.json")));

            shelf.execute(&[], add_category("Electronics")).expect("category");
            assert_eq!(&on_disk(shelf.store()), shelf.tree());

            let electronics = path(&["Electronics"]);
            shelf
                .execute(&electronics, add_link("http://example.com", ""))
                .expect("link");
            assert_eq!(&on_disk(shelf.store()), shelf.tree());

            let items = shelf.display_list(&electronics);
            assert_eq!(items.len(), 1);
            assert_eq!(items[0].kind, EntryKind::Link);
            assert_eq!(items[0].label, "http://example.com");
        }

        #[test]
        fn reopening_sees_previous_session() {
            let tmp = tempfile::tempdir().expect("tempdir");
            let file = tmp.path().join("shelf.json");
            {
                let mut shelf = Shelf::open(JsonFileStore::new(&file));
                shelf.execute(&[], add_category("Books")).expect("Books");
                shelf
                    .execute(&path(&["Books"]), add_link("http://b", "B"))
                    .expect("link");
            }
            let shelf = Shelf::open(JsonFileStore::new(&file));
            assert_eq!(shelf.node(&path(&["Books"])).links()[0].label(), "B");
        }

        #[test]
        fn deep_nesting_stops_at_a_depth_that_reloads() {
            let tmp = tempfile::tempdir().expect("tempdir");
            let file = tmp.path().join("shelf.json");
            let mut shelf = Shelf::open(JsonFileStore::new(&file));

            let mut at: Vec<String> = Vec::new();
            for level in 1..=130 {
                let name = format!("L{level}");
                match shelf.execute(&at, add_category(&name)) {
                    Ok(_) => at.push(name),
                    Err(ShelfError::TooDeep { max }) => {
                        assert_eq!(max, MAX_DEPTH);
                        assert_eq!(level, MAX_DEPTH + 1);
                        break;
                    }
                    Err(err) => panic!("level {level}: {err}"),
                }
            }
            assert_eq!(at.len(), MAX_DEPTH);
            shelf
                .execute(&at, add_link("https://deep.example", "bottom"))
                .expect("link at the deepest level");
            assert!(matches!(
                shelf.execute(&at, add_category("L131")),
                Err(ShelfError::TooDeep { .. })
            ));

            let reopened = Shelf::open(JsonFileStore::new(&file));
            assert_eq!(reopened.tree(), shelf.tree());
            assert_eq!(reopened.node(&at).links()[0].label(), "bottom");
        }

        #[test]
        fn validation_failure_writes_nothing() {
            let tmp = tempfile::tempdir().expect("tempdir");
            let file = tmp.path().join("shelf.json");
            let mut shelf = Shelf::open(JsonFileStore::new(&file));

            assert!(shelf.execute(&[], add_category("_links")).is_err());
            assert!(!file.exists());
        }

        #[test]
        fn write_failure_rolls_back() {
            let tmp = tempfile::tempdir().expect("tempdir");
            let file = tmp.path().join("shelf.json");
            let mut shelf = Shelf::open(JsonFileStore::new(&file));
            shelf.execute(&[], add_category("Books")).expect("Books");

            // Swap the file for a directory so the next write fails.
            fs::remove_file(&file).expect("remove");
            fs::create_dir(&file).expect("mkdir");

            let before = shelf.tree().clone();
            let err = shelf
                .execute(&path(&["Books"]), add_link("http://lost", ""))
                .expect_err("write should fail");
            assert!(matches!(err, ShelfError::StorageWrite(_)));
            assert_eq!(shelf.tree(), &before);
        }

        #[test]
        fn stale_path_is_not_found() {
            let tmp = tempfile::tempdir().expect("tempdir");
            let mut shelf = Shelf::open(JsonFileStore::new(tmp.path().join("shelf.json")));
            shelf.execute(&[], add_category("A")).expect("A");
            let stale = path(&["A"]);
            shelf
                .execute(
                    &[],
                    Operation::DeleteCategory {
                        target: CategoryRef::Name("A".into()),
                    },
                )
                .expect("delete A");

            assert!(shelf.display_list(&stale).is_empty());
            assert!(matches!(
                shelf.execute(&stale, add_link("http://x", "")),
                Err(ShelfError::NotFound(name)) if name == "A"
            ));
        }

        #[test]
        fn navigate_enters_categories_and_opens_links() {
            let tmp = tempfile::tempdir().expect("tempdir");
            let mut shelf = Shelf::open(JsonFileStore::new(tmp.path().join("shelf.json")));
            shelf.execute(&[], add_category("Sub")).expect("Sub");
            shelf.execute(&[], add_link("http://a", "A")).expect("link");

            assert_eq!(
                shelf.navigate(&[], 0).expect("enter"),
                Navigation::Enter(path(&["Sub"]))
            );
            assert_eq!(
                shelf.navigate(&[], 1).expect("open"),
                Navigation::Open("http://a".into())
            );
            assert!(matches!(shelf.navigate(&[], 2), Err(ShelfError::InvalidIndex(2))));
        }

        #[test]
        fn rename_then_resolve_new_path() {
            let tmp = tempfile::tempdir().expect("tempdir");
            let mut shelf = Shelf::open(JsonFileStore::new(tmp.path().join("shelf.json")));
            shelf.execute(&[], add_category("Parent")).expect("Parent");
            let parent = path(&["Parent"]);
            shelf.execute(&parent, add_category("Old")).expect("Old");
            shelf
                .execute(&path(&["Parent", "Old"]), add_link("http://x", "x"))
                .expect("link");
            let before = shelf.node(&path(&["Parent", "Old"])).clone();

            let err = shelf
                .execute(
                    &parent,
                    Operation::RenameCategory {
                        target: CategoryRef::Index(0),
                        new_name: "Old".into(),
                    },
                )
                .expect_err("same name");
            assert!(err.is_soft());

            shelf
                .execute(
                    &parent,
                    Operation::RenameCategory {
                        target: CategoryRef::Index(0),
                        new_name: "New".into(),
                    },
                )
                .expect("rename");
            assert_eq!(shelf.node(&path(&["Parent", "New"])), &before);
            assert!(shelf.node(&path(&["Parent", "Old"])).is_empty());
        }

        #[test]
        fn delete_link_and_remove_link_agree() {
            let tmp = tempfile::tempdir().expect("tempdir");
            let mut shelf = Shelf::open(JsonFileStore::new(tmp.path().join("shelf.json")));
            for url in ["http://1", "http://2", "http://3"] {
                shelf.execute(&[], add_link(url, "")).expect("link");
            }
            shelf
                .execute(&[], Operation::DeleteLink { index: 0 })
                .expect("delete");
            shelf
                .execute(&[], Operation::RemoveLink { index: 1 })
                .expect("remove");
            let urls: Vec<_> = shelf.tree().links().iter().map(|l| l.url().to_string()).collect();
            assert_eq!(urls, vec!["http://2"]);
        }

        proptest! {
            #![proptest_config(ProptestConfig::with_cases(32))]

            #[test]
            fn trees_built_from_operations_round_trip(
                groups in prop::collection::vec(
                    (
                        "[A-Za-z][A-Za-z0-9 ]{0,12}",
                        prop::collection::vec(("https?://[a-z]{1,8}\\.com", "[a-z ]{0,10}"), 0..4),
                    ),
                    0..5,
                ),
                root_links in prop::collection::vec("https://[a-z]{1,8}\\.org", 0..3),
            ) {
                let tmp = tempfile::tempdir().expect("tempdir");
                let file = tmp.path().join("shelf.json");
                let mut shelf = Shelf::open(JsonFileStore::new(&file));

                for (name, links) in &groups {
                    if shelf.execute(&[], add_category(name)).is_err() {
                        continue;
                    }
                    let at = vec![name.trim().to_string()];
                    for (url, description) in links {
                        shelf.execute(&at, add_link(url, description)).expect("link");
                    }
                }
                for url in &root_links {
                    shelf.execute(&[], add_link(url, "")).expect("root link");
                }

                let reopened = Shelf::open(JsonFileStore::new(&file));
                prop_assert_eq!(reopened.tree(), shelf.tree());
                prop_assert_eq!(
                    reopened.tree().category_names().collect::<Vec<_>>(),
                    shelf.tree().category_names().collect::<Vec<_>>()
                );
            }
        }
    }
}

pub mod paste {
    //! Clipboard text clean-up. Reading the clipboard itself is up to the
    //! front-end.

    use crate::naming::FORBIDDEN_CHARS;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum FieldKind {
        CategoryName,
        Url,
        Description,
    }

    /// Category names: forbidden characters removed and whitespace runs
    /// collapsed to single spaces. URL and description fields keep their text
    /// but lose line breaks (surrounding ones dropped, inner ones joined by a
    /// space).
    pub fn sanitize_paste(raw: &str, kind: FieldKind) -> String {
        match kind {
            FieldKind::CategoryName => {
                let kept: String = raw.chars().filter(|c| !FORBIDDEN_CHARS.contains(c)).collect();
                kept.split_whitespace().collect::<Vec<_>>().join(" ")
            }
            FieldKind::Url | FieldKind::Description => raw
                .split(['\r', '\n'])
                .filter(|line| !line.is_empty())
                .collect::<Vec<_>>()
                .join(" "),
        }
    }

    /// New field contents after pasting `raw` into a field holding `current`.
    /// A pasted http(s) URL replaces a URL field; anything else is appended.
    pub fn merge_paste(kind: FieldKind, current: &str, raw: &str) -> String {
        let cleaned = sanitize_paste(raw, kind);
        let trimmed = cleaned.trim();
        let is_url = trimmed.starts_with("http://") || trimmed.starts_with("https://");
        if kind == FieldKind::Url && is_url {
            trimmed.to_string()
        } else {
            format!("{current}{cleaned}")
        }
    }

}

pub mod opener {
    //! Launching URLs in the desktop browser.

    use log::warn;
    use std::io;
    use std::process::{Command, Stdio};
    use std::thread::{self, JoinHandle};

    pub trait Opener {
        fn open(&mut self, url: &str) -> io::Result<()>;
    }

    /// Hands URLs to the platform's default handler without waiting for it.
    #[derive(Debug, Default, Clone, Copy)]
    pub struct SystemOpener;

    impl Opener for SystemOpener {
        fn open(&mut self, url: &str) -> io::Result<()> {
            spawn_detached(command_for(url)).map(drop)
        }
    }

    /// Starts `command` and reaps it from a background thread once it exits.
    fn spawn_detached(mut command: Command) -> io::Result<JoinHandle<()>> {
        let mut child = command
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()?;
        Ok(thread::spawn(move || {
            if let Err(err) = child.wait() {
                warn!("waiting for browser launcher: {err}");
            }
        }))
    }

    #[cfg(target_os = "macos")]
    fn command_for(url: &str) -> Command {
        let mut command = Command::new("open");
        command.arg(url);
        command
    }

    #[cfg(target_os = "windows")]
    fn command_for(url: &str) -> Command {
        let mut command = Command::new("cmd");
        command.args(["/c", "start", "", url]);
        command
    }

    #[cfg(not(any(target_os = "macos", target_os = "windows")))]
    fn command_for(url: &str) -> Command {
        let mut command = Command::new("xdg-open");
        command.arg(url);
        command
    }

}

pub mod shell;

pub use entries::{DisplayItem, Entry, EntryKind, list_items};
pub use error::ShelfError;
pub use model::{LINKS_KEY, Link, Node};
pub use ops::{Applied, CategoryRef};
pub use shelf::{Navigation, Operation, Shelf};
pub use store::{JsonFileStore, LoadOutcome, StoreError, TreeStore};
