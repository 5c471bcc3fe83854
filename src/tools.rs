//! Locating the external binaries on the host.

use std::path::{Path, PathBuf};

pub const TRANSCODER: &str = "ffmpeg";
pub const EXTRACTOR: &str = "yt-dlp";

/// Install locations checked after `PATH`.
const FALLBACK_DIRS: &[&str] = &[
    "/usr/bin",
    "/usr/local/bin",
    "/opt/homebrew/bin",
    r"C:\ffmpeg\bin",
    r"C:\Program Files\FFmpeg\bin",
    r"C:\Program Files\ffmpeg\bin",
];

/// Finds `tool_name` on `PATH`, then in the usual install folders.
pub fn locate(tool_name: &str) -> Option<PathBuf> {
    if let Ok(found) = which::which(tool_name) {
        return Some(found);
    }
    locate_in(tool_name, FALLBACK_DIRS.iter().map(Path::new))
}

/// Looks for `tool_name` (and `tool_name.exe`) in each of `dirs`, in order.
pub fn locate_in<'a>(
    tool_name: &str,
    dirs: impl IntoIterator<Item = &'a Path>,
) -> Option<PathBuf> {
    let exe = format!("{tool_name}.exe");
    dirs.into_iter()
        .flat_map(|dir| [dir.join(tool_name), dir.join(&exe)])
        .find(|candidate| is_executable(candidate))
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata()
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

/// Result of the single startup lookup.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolSet {
    pub extractor: Option<PathBuf>,
    pub transcoder: Option<PathBuf>,
}

impl ToolSet {
    pub fn discover() -> Self {
        let tools = Self {
            extractor: locate(EXTRACTOR),
            transcoder: locate(TRANSCODER),
        };
        match &tools.extractor {
            Some(p) => log::info!("{} found at {}", EXTRACTOR, p.display()),
            None => log::warn!("{} not found", EXTRACTOR),
        }
        match &tools.transcoder {
            Some(p) => log::info!("{} found at {}", TRANSCODER, p.display()),
            None => log::warn!("{} not found; conversions are disabled", TRANSCODER),
        }
        tools
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_tool_is_none() {
        assert_eq!(locate("definitely-not-a-real-tool-5f2c1"), None);
    }

    #[cfg(unix)]
    #[test]
    fn finds_executables_in_fallback_dirs_in_order() {
        use std::os::unix::fs::PermissionsExt;

        let first = tempfile::tempdir().unwrap();
        let second = tempfile::tempdir().unwrap();

        // Not executable: skipped.
        std::fs::write(first.path().join("fake-ff"), b"").unwrap();

        let bin = second.path().join("fake-ff");
        std::fs::write(&bin, b"#!/bin/sh\n").unwrap();
        std::fs::set_permissions(&bin, std::fs::Permissions::from_mode(0o755)).unwrap();

        let found = locate_in("fake-ff", [first.path(), second.path()]);
        assert_eq!(found, Some(bin));
    }

    #[test]
    fn directories_are_not_tools() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("fake-ff")).unwrap();
        assert_eq!(locate_in("fake-ff", [dir.path()]), None);
    }
}
