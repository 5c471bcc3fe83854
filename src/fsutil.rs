//! Small filesystem and text helpers shared by the runner and the controller.

use once_cell::sync::Lazy;
use regex::Regex;
use std::path::{Path, PathBuf};

/// Longest file stem we will produce, in characters.
pub const MAX_FILENAME_CHARS: usize = 200;

static ILLEGAL_CHARS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"[\x00-\x1f<>:"/\\|?*]"#).expect("valid regex"));
static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid regex"));
static ANSI_ESCAPE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\x1B\[[0-?]*[ -/]*[@-~]").expect("valid regex"));

/// Makes `name` safe to use as a file name on any of the supported hosts.
///
/// Illegal characters become `_`, runs of whitespace collapse to one space,
/// the result is trimmed and cut to [`MAX_FILENAME_CHARS`]. Never returns an
/// empty string, and applying it twice changes nothing.
pub fn sanitize_filename(name: &str) -> String {
    let replaced = ILLEGAL_CHARS.replace_all(name, "_");
    let collapsed = WHITESPACE.replace_all(&replaced, " ");
    let mut out = collapsed.trim().to_string();

    if out.chars().count() > MAX_FILENAME_CHARS {
        out = out.chars().take(MAX_FILENAME_CHARS).collect::<String>();
        out.truncate(out.trim_end().len());
    }

    if out.is_empty() {
        "unnamed".to_string()
    } else {
        out
    }
}

/// Returns `path`, or the first of `stem (1).ext`, `stem (2).ext`, ... that
/// does not exist on disk.
pub fn unique_path(path: &Path) -> PathBuf {
    unique_path_with(path, |p| p.exists())
}

/// Same as [`unique_path`] but with a caller-supplied existence check.
pub fn unique_path_with(path: &Path, exists: impl Fn(&Path) -> bool) -> PathBuf {
    if !exists(path) {
        return path.to_path_buf();
    }

    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let ext = path.extension().map(|e| e.to_string_lossy().into_owned());
    let parent = path.parent().unwrap_or_else(|| Path::new(""));

    let mut counter = 1u32;
    loop {
        let name = match &ext {
            Some(ext) => format!("{stem} ({counter}).{ext}"),
            None => format!("{stem} ({counter})"),
        };
        let candidate = parent.join(name);
        if !exists(&candidate) {
            return candidate;
        }
        counter += 1;
    }
}

/// Creates `path` and its parents. Returns whether the directory exists
/// afterwards.
pub fn ensure_dir(path: &Path) -> bool {
    match std::fs::create_dir_all(path) {
        Ok(()) => true,
        Err(e) => {
            log::warn!("could not create {}: {}", path.display(), e);
            false
        }
    }
}

/// Cheap check that the input looks like a web URL.
pub fn is_url(text: &str) -> bool {
    text.starts_with("http://") || text.starts_with("https://")
}

/// Removes terminal color codes from tool output.
pub fn strip_ansi_codes(text: &str) -> String {
    ANSI_ESCAPE.replace_all(text, "").into_owned()
}

/// Free bytes on the volume holding `path`. A path that does not exist yet
/// is measured at its nearest existing ancestor.
pub fn bytes_free(path: &Path) -> Option<u64> {
    let existing = path
        .ancestors()
        .find(|p| !p.as_os_str().is_empty() && p.exists())
        .unwrap_or(Path::new("."));
    match fs2::available_space(existing) {
        Ok(free) => Some(free),
        Err(e) => {
            log::debug!("no free-space figure for {}: {}", existing.display(), e);
            None
        }
    }
}

/// `123456` -> `"120.56 KiB"`
pub fn format_bytes(bytes: u64) -> String {
    humansize::format_size(bytes, humansize::BINARY)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn free_space_of_missing_folder_uses_its_parent() {
        let dir = tempfile::tempdir().unwrap();
        assert!(bytes_free(dir.path()).is_some_and(|n| n > 0));
        assert!(bytes_free(&dir.path().join("not/yet/made")).is_some());
    }

    #[test]
    fn byte_counts_use_binary_units() {
        assert_eq!(format_bytes(0), "0 B");
        assert!(format_bytes(1536).ends_with("KiB"));
        assert!(format_bytes(5 * 1024 * 1024).starts_with('5'));
        assert!(format_bytes(5 * 1024 * 1024).ends_with("MiB"));
    }

    #[test]
    fn sanitize_replaces_illegal_characters() {
        assert_eq!(sanitize_filename("AC/DC: Live?"), "AC_DC_ Live_");
        assert_eq!(sanitize_filename("a\tb\nc"), "a_b_c");
    }

    #[test]
    fn sanitize_collapses_whitespace_and_trims() {
        assert_eq!(sanitize_filename("  lots   of \u{a0} space  "), "lots of space");
    }

    #[test]
    fn sanitize_never_returns_empty() {
        assert_eq!(sanitize_filename(""), "unnamed");
        assert_eq!(sanitize_filename("   "), "unnamed");
        assert_eq!(sanitize_filename("???"), "___");
    }

    #[test]
    fn sanitize_truncates_on_char_boundaries() {
        let long = "é".repeat(450);
        let out = sanitize_filename(&long);
        assert_eq!(out.chars().count(), MAX_FILENAME_CHARS);

        let spaced = format!("{} tail", "x".repeat(MAX_FILENAME_CHARS - 1));
        let out = sanitize_filename(&spaced);
        assert!(!out.ends_with(' '));
    }

    #[test]
    fn sanitize_is_idempotent() {
        let inputs = [
            "",
            "plain",
            "  a  b  ",
            "weird<>:\"/\\|?*name",
            "\u{1}\u{2}ctrl",
            "\u{3000}ideographic\u{3000}space",
            &format!("{} end", "y".repeat(199)),
            &"ß ".repeat(300),
        ];
        for input in inputs {
            let once = sanitize_filename(input);
            assert_eq!(sanitize_filename(&once), once, "input: {input:?}");
            assert!(!once.is_empty());
        }
    }

    #[test]
    fn unique_path_skips_taken_names() {
        let taken: HashSet<PathBuf> = ["/out/song.mp3", "/out/song (1).mp3"]
            .iter()
            .map(PathBuf::from)
            .collect();
        let exists = |p: &Path| taken.contains(p);

        let got = unique_path_with(Path::new("/out/song.mp3"), exists);
        assert_eq!(got, PathBuf::from("/out/song (2).mp3"));
        assert!(!taken.contains(&got));
        assert_eq!(unique_path_with(&got, exists), got);
    }

    #[test]
    fn unique_path_without_extension() {
        let taken: HashSet<PathBuf> = [PathBuf::from("/out/README")].into_iter().collect();
        let got = unique_path_with(Path::new("/out/README"), |p| taken.contains(p));
        assert_eq!(got, PathBuf::from("/out/README (1)"));
    }

    #[test]
    fn unique_path_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let first = dir.path().join("clip.mp4");
        assert_eq!(unique_path(&first), first);

        std::fs::write(&first, b"x").unwrap();
        let second = unique_path(&first);
        assert_eq!(second, dir.path().join("clip (1).mp4"));
        assert_eq!(unique_path(&second), second);
    }

    #[test]
    fn ensure_dir_creates_nested() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("a").join("b");
        assert!(ensure_dir(&nested));
        assert!(nested.is_dir());
    }

    #[test]
    fn url_heuristic() {
        assert!(is_url("https://example.com/watch?v=1"));
        assert!(!is_url("example.com"));
    }

    #[test]
    fn strips_color_codes() {
        assert_eq!(strip_ansi_codes("\x1b[0;31mERROR:\x1b[0m boom"), "ERROR: boom");
    }
}
