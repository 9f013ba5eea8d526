use std::cmp::Ordering;
use std::path::Path;

/// Render a path the way it travels over the bridge.
pub fn path_to_string(path: &Path) -> String {
    path.to_string_lossy().to_string()
}

/// Dot-prefixed entries are hidden from every listing.
pub fn is_hidden_name(name: &str) -> bool {
    name.starts_with('.')
}

/// Case-insensitive name ordering. Names equal ignoring case fall back to
/// byte order so the result is stable across platforms.
pub fn compare_names(a: &str, b: &str) -> Ordering {
    a.to_lowercase()
        .cmp(&b.to_lowercase())
        .then_with(|| a.cmp(b))
}

/// Directory that holds `path`. A bare file name resolves to `"."`.
pub fn parent_dir(path: &Path) -> &Path {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    }
}
