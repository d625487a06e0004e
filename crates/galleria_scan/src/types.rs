//! Identifiers and collection model types shared with collaborators

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Database id of an image item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ItemId(pub i64);

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Database id of a physical album (a directory inside a collection root)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AlbumId(pub i32);

impl fmt::Display for AlbumId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Database id of a collection root
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AlbumRootId(pub i32);

impl fmt::Display for AlbumRootId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An item as known to the database
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemInfo {
    pub id: ItemId,
    pub file_path: PathBuf,
}

impl ItemInfo {
    pub fn new(id: ItemId, file_path: impl Into<PathBuf>) -> Self {
        Self {
            id,
            file_path: file_path.into(),
        }
    }
}

/// A physical album and its sub-albums.
///
/// `relative_path` is rooted at the collection root: `/` is the root album,
/// `/Trips/2019` a nested one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhysicalAlbum {
    pub id: AlbumId,
    pub root_id: AlbumRootId,
    pub relative_path: String,
    pub title: String,
    pub children: Vec<PhysicalAlbum>,
}

impl PhysicalAlbum {
    pub fn new(
        id: AlbumId,
        root_id: AlbumRootId,
        relative_path: impl Into<String>,
        title: impl Into<String>,
    ) -> Self {
        Self {
            id,
            root_id,
            relative_path: relative_path.into(),
            title: title.into(),
            children: Vec::new(),
        }
    }

    pub fn with_child(mut self, child: PhysicalAlbum) -> Self {
        self.children.push(child);
        self
    }

    /// All sub-albums at any depth, parents before their children.
    pub fn descendants(&self) -> Vec<&PhysicalAlbum> {
        let mut out = Vec::new();
        for child in &self.children {
            out.push(child);
            out.extend(child.descendants());
        }
        out
    }
}

/// A collection root on disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionLocation {
    pub id: AlbumRootId,
    pub root_path: PathBuf,
}

impl CollectionLocation {
    pub fn new(id: AlbumRootId, root_path: impl Into<PathBuf>) -> Self {
        Self {
            id,
            root_path: root_path.into(),
        }
    }

    /// Album path of `path` relative to this root, or `None` if it lies outside.
    ///
    /// The root itself maps to `/`. Components are joined with forward slashes
    /// regardless of platform.
    pub fn album_path_for(&self, path: &Path) -> Option<String> {
        let relative = path.strip_prefix(&self.root_path).ok()?;
        let parts: Vec<String> = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();
        Some(format!("/{}", parts.join("/")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_album_path_for_root_and_nested() {
        let location = CollectionLocation::new(AlbumRootId(1), "/photos");
        assert_eq!(
            location.album_path_for(Path::new("/photos")),
            Some("/".to_string())
        );
        assert_eq!(
            location.album_path_for(Path::new("/photos/Trips/2019")),
            Some("/Trips/2019".to_string())
        );
        assert_eq!(location.album_path_for(Path::new("/elsewhere/Trips")), None);
    }

    #[test]
    fn test_descendants_are_depth_first() {
        let album = PhysicalAlbum::new(AlbumId(1), AlbumRootId(1), "/Trips", "Trips")
            .with_child(
                PhysicalAlbum::new(AlbumId(2), AlbumRootId(1), "/Trips/2019", "2019").with_child(
                    PhysicalAlbum::new(AlbumId(3), AlbumRootId(1), "/Trips/2019/Rome", "Rome"),
                ),
            )
            .with_child(PhysicalAlbum::new(
                AlbumId(4),
                AlbumRootId(1),
                "/Trips/2020",
                "2020",
            ));

        let ids: Vec<AlbumId> = album.descendants().iter().map(|a| a.id).collect();
        assert_eq!(ids, vec![AlbumId(2), AlbumId(3), AlbumId(4)]);
    }
}
