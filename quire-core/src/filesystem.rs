use serde::Serialize;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::Path;

use crate::util::{compare_names, is_hidden_name, parent_dir, path_to_string};

/// One entry of a depth-limited directory snapshot.
///
/// `children` is `None` for files and for directories beyond the requested
/// depth ("not expanded"), and `Some(vec![])` for an expanded directory that
/// turned out empty or unreadable.
#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct FileTreeNode {
    pub path: String,
    pub name: String,
    #[serde(rename = "isDir")]
    pub is_dir: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub children: Option<Vec<FileTreeNode>>,
}

/// Snapshot the children of `path`, expanding subdirectories `depth` levels deep.
///
/// Listing is best-effort: a directory that cannot be read contributes an
/// empty list instead of an error. Hidden entries are skipped at every level
/// and siblings are ordered case-insensitively by name. Symlinked directories
/// are followed; the depth bound is the only guard against link cycles.
pub fn build_tree(path: &Path, depth: u32) -> Vec<FileTreeNode> {
    let read_dir = match fs::read_dir(path) {
        Ok(rd) => rd,
        Err(e) => {
            log::debug!("Skipping unreadable directory {}: {}", path.display(), e);
            return Vec::new();
        }
    };

    let mut entries: Vec<(String, std::path::PathBuf)> = read_dir
        .filter_map(|entry| entry.ok())
        .filter_map(|entry| {
            let name = entry.file_name().to_string_lossy().to_string();
            if is_hidden_name(&name) {
                None
            } else {
                Some((name, entry.path()))
            }
        })
        .collect();
    entries.sort_by(|a, b| compare_names(&a.0, &b.0));

    entries
        .into_iter()
        .map(|(name, child)| {
            let is_dir = child.is_dir();
            let children = if is_dir && depth > 0 {
                Some(build_tree(&child, depth - 1))
            } else {
                None
            };
            FileTreeNode {
                path: path_to_string(&child),
                name,
                is_dir,
                children,
            }
        })
        .collect()
}

/// Read a file as UTF-8 text. Bytes that do not decode yield an empty string
/// rather than an error; only I/O failures are reported.
pub fn read_text_lenient(path: &Path) -> Result<String, String> {
    let bytes =
        fs::read(path).map_err(|e| format!("Failed to read '{}': {}", path.display(), e))?;
    match String::from_utf8(bytes) {
        Ok(text) => Ok(text),
        Err(_) => {
            log::debug!("{} is not valid UTF-8, returning empty content", path.display());
            Ok(String::new())
        }
    }
}

/// Read a file as UTF-8 text, treating undecodable bytes as a failure.
pub fn read_text_strict(path: &Path) -> Result<String, String> {
    let bytes =
        fs::read(path).map_err(|e| format!("Failed to read '{}': {}", path.display(), e))?;
    String::from_utf8(bytes)
        .map_err(|e| format!("Failed to decode '{}' as UTF-8: {}", path.display(), e))
}

/// Replace the contents of `path` with `content` atomically.
pub fn write_text_atomic(path: &Path, content: &str) -> Result<(), String> {
    write_atomic(path, |file| file.write_all(content.as_bytes()))
}

/// Write a file through `body` without ever exposing a partial file.
///
/// `body` fills a temporary file created next to `path`; only after it
/// succeeds and the data is synced is the temporary renamed over `path`. If
/// anything fails the temporary is removed and `path` keeps its previous
/// contents. Permissions of an existing file are carried over.
pub fn write_atomic<F>(path: &Path, body: F) -> Result<(), String>
where
    F: FnOnce(&mut File) -> io::Result<()>,
{
    let dir = parent_dir(path);
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "file".to_string());

    let mut tmp = tempfile::Builder::new()
        .prefix(&format!(".{}.", file_name))
        .suffix(".quire-tmp")
        .tempfile_in(dir)
        .map_err(|e| format!("Failed to create temp file in '{}': {}", dir.display(), e))?;

    body(tmp.as_file_mut())
        .map_err(|e| format!("Failed to write '{}': {}", path.display(), e))?;
    tmp.as_file()
        .sync_all()
        .map_err(|e| format!("Failed to sync '{}': {}", path.display(), e))?;

    if let Ok(metadata) = fs::metadata(path) {
        fs::set_permissions(tmp.path(), metadata.permissions())
            .map_err(|e| format!("Failed to set permissions on temp file: {}", e))?;
    }

    tmp.persist(path)
        .map_err(|e| format!("Failed to replace '{}': {}", path.display(), e.error))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn touch(path: &Path) {
        fs::write(path, "x").unwrap();
    }

    /// root/
    ///   a/
    ///     b/
    ///       c/
    ///         deep.txt
    ///       b.txt
    ///     a.txt
    ///   .hidden/
    ///   Banana.txt
    ///   cherry.txt
    fn fixture() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("a/b/c")).unwrap();
        fs::create_dir_all(root.join(".hidden/inner")).unwrap();
        touch(&root.join("a/a.txt"));
        touch(&root.join("a/b/b.txt"));
        touch(&root.join("a/b/.secret"));
        touch(&root.join("a/b/c/deep.txt"));
        touch(&root.join("Banana.txt"));
        touch(&root.join("cherry.txt"));
        dir
    }

    fn all_paths(nodes: &[FileTreeNode], out: &mut Vec<String>) {
        for node in nodes {
            out.push(node.path.clone());
            if let Some(children) = &node.children {
                all_paths(children, out);
            }
        }
    }

    #[test]
    fn build_tree_orders_case_insensitively() {
        let dir = fixture();
        let tree = build_tree(dir.path(), 0);
        let names: Vec<&str> = tree.iter().map(|n| n.name.as_str()).collect();
        assert_eq!(names, vec!["a", "Banana.txt", "cherry.txt"]);
    }

    #[test]
    fn build_tree_depth_zero_leaves_directories_unexpanded() {
        let dir = fixture();
        let tree = build_tree(dir.path(), 0);
        let a = &tree[0];
        assert!(a.is_dir);
        assert!(a.children.is_none());
        assert!(tree[1].children.is_none());
    }

    #[test]
    fn build_tree_stops_at_requested_depth() {
        let dir = fixture();
        let tree = build_tree(dir.path(), 1);

        let a = &tree[0];
        let a_children = a.children.as_ref().unwrap();
        let b = a_children.iter().find(|n| n.name == "b").unwrap();
        assert!(b.is_dir);
        assert!(b.children.is_none(), "b is beyond depth and must not be expanded");

        let mut paths = Vec::new();
        all_paths(&tree, &mut paths);
        let b_txt: PathBuf = dir.path().join("a/b/b.txt");
        assert!(!paths.contains(&path_to_string(&b_txt)));
    }

    #[test]
    fn build_tree_depth_two_never_visits_great_grandchildren() {
        let dir = fixture();
        let tree = build_tree(dir.path(), 2);

        let a = &tree[0];
        let b = a
            .children
            .as_ref()
            .unwrap()
            .iter()
            .find(|n| n.name == "b")
            .unwrap();
        let b_children = b.children.as_ref().unwrap();
        let c = b_children.iter().find(|n| n.name == "c").unwrap();
        assert!(c.is_dir);
        assert!(c.children.is_none());

        let mut paths = Vec::new();
        all_paths(&tree, &mut paths);
        assert!(!paths.iter().any(|p| p.ends_with("deep.txt")));
    }

    #[test]
    fn build_tree_skips_hidden_entries_at_every_level() {
        let dir = fixture();
        let tree = build_tree(dir.path(), 3);
        let mut paths = Vec::new();
        all_paths(&tree, &mut paths);
        assert!(!paths.iter().any(|p| p.contains(".hidden")));
        assert!(!paths.iter().any(|p| p.ends_with(".secret")));
        assert!(paths.iter().any(|p| p.ends_with("deep.txt")));
    }

    #[test]
    fn build_tree_on_missing_directory_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        assert!(build_tree(&dir.path().join("nope"), 2).is_empty());
    }

    #[test]
    fn build_tree_on_empty_directory_expands_to_empty_children() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("empty")).unwrap();
        let tree = build_tree(dir.path(), 1);
        assert_eq!(tree[0].children, Some(Vec::new()));
    }

    #[test]
    fn tree_node_serializes_with_is_dir_and_without_absent_children() {
        let node = FileTreeNode {
            path: "/w/readme.md".to_string(),
            name: "readme.md".to_string(),
            is_dir: false,
            children: None,
        };
        let json = serde_json::to_value(&node).unwrap();
        assert_eq!(json["isDir"], false);
        assert!(json.get("children").is_none());
    }

    #[test]
    fn read_text_lenient_returns_empty_for_invalid_utf8() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bin.dat");
        fs::write(&path, b"\xff\xfe\x00\x80").unwrap();
        assert_eq!(read_text_lenient(&path).unwrap(), "");
        assert!(read_text_strict(&path).is_err());
    }

    #[test]
    fn read_text_reports_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = read_text_lenient(&dir.path().join("missing.txt")).unwrap_err();
        assert!(err.starts_with("Failed to read"));
    }

    #[test]
    fn write_text_atomic_replaces_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("note.md");
        fs::write(&path, "old").unwrap();
        write_text_atomic(&path, "new \"quoted\" content").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "new \"quoted\" content");
    }

    #[test]
    fn write_text_atomic_creates_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fresh.txt");
        write_text_atomic(&path, "hello").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "hello");
    }

    #[test]
    fn interrupted_write_keeps_previous_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doc.txt");
        fs::write(&path, "previous content").unwrap();

        let result = write_atomic(&path, |file| {
            file.write_all(b"half of the new")?;
            Err(io::Error::new(io::ErrorKind::Other, "simulated fault"))
        });

        assert!(result.is_err());
        assert_eq!(fs::read_to_string(&path).unwrap(), "previous content");
        let leftovers: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".quire-tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn write_text_atomic_preserves_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("script.sh");
        fs::write(&path, "#!/bin/sh\n").unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();

        write_text_atomic(&path, "#!/bin/sh\necho hi\n").unwrap();
        let mode = fs::metadata(&path).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o755);
    }

    #[test]
    fn write_into_missing_directory_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("no/such/dir/file.txt");
        assert!(write_text_atomic(&path, "x").is_err());
    }
}
