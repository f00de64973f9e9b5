//! Collision-safe markdown writes into a user's vault.
//!
//! Files are only ever created, never replaced: each candidate name is opened
//! with `create_new`, and an existing file moves the probe on to the next
//! numbered sibling (`stem-1.md`, `stem-2.md`, ...).

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Component, Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;

/// Maximum filename stem length, in characters.
pub const MAX_STEM_CHARS: usize = 100;

/// Anything that is not an ASCII word character, ASCII whitespace or '-'.
static UNSAFE_FILENAME_CHARS: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"[^[:word:][:space:]-]").ok());

#[derive(Error, Debug)]
pub enum VaultError {
    #[error("No vault configured for user")]
    MissingRoot,

    #[error("Folder must be a relative path inside the vault: {0}")]
    InvalidFolder(String),

    #[error("Failed to create directory {path}: {source}")]
    CreateDir { path: PathBuf, source: io::Error },

    #[error("Failed to write {path}: {source}")]
    Write { path: PathBuf, source: io::Error },
}

#[derive(Debug, Clone)]
pub struct VaultWriter {
    root: PathBuf,
}

impl VaultWriter {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Build a writer from a stored vault path, expanding a leading `~`.
    pub fn from_config_path(path: &str) -> Self {
        Self::new(shellexpand::tilde(path).into_owned())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Write `content` under `folder` (relative, may be multi-segment) and
    /// return the vault-relative path of the new file.
    pub fn write(&self, content: &str, title: &str, folder: Option<&str>) -> Result<String, VaultError> {
        let relative_dir = match folder {
            Some(folder) => validate_folder(folder)?,
            None => PathBuf::new(),
        };

        let dir = self.root.join(&relative_dir);
        fs::create_dir_all(&dir).map_err(|source| VaultError::CreateDir {
            path: dir.clone(),
            source,
        })?;

        let stem = sanitize_filename(title);
        let file_name = create_unique(&dir, &stem, content)?;

        let relative = relative_dir.join(file_name);
        tracing::debug!(path = %relative.display(), "Wrote vault file");

        Ok(relative.to_string_lossy().replace('\\', "/"))
    }
}

/// Keep ASCII word characters, ASCII whitespace and hyphens, then cut to
/// [`MAX_STEM_CHARS`] characters.
pub fn sanitize_filename(title: &str) -> String {
    let cleaned = match UNSAFE_FILENAME_CHARS.as_ref() {
        Some(re) => re.replace_all(title, ""),
        None => title.into(),
    };
    cleaned.chars().take(MAX_STEM_CHARS).collect()
}

/// Candidate file name for the given probe number: `0` is the bare stem.
fn candidate_name(stem: &str, counter: usize) -> String {
    if counter == 0 {
        format!("{}.md", stem)
    } else {
        format!("{}-{}.md", stem, counter)
    }
}

/// Create the first free candidate in `dir` and write `content` into it.
fn create_unique(dir: &Path, stem: &str, content: &str) -> Result<String, VaultError> {
    let mut counter = 0;
    loop {
        let name = candidate_name(stem, counter);
        let path = dir.join(&name);

        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => {
                write_or_discard(&path, file, content.as_bytes())?;
                return Ok(name);
            }
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => counter += 1,
            Err(source) => return Err(VaultError::Write { path, source }),
        }
    }
}

/// Write into a freshly created file; on failure remove it so the name stays
/// free for the next attempt.
fn write_or_discard(path: &Path, mut file: impl Write, content: &[u8]) -> Result<(), VaultError> {
    if let Err(source) = file.write_all(content) {
        drop(file);
        if let Err(e) = fs::remove_file(path) {
            tracing::warn!(path = %path.display(), error = %e, "Could not remove partial vault file");
        }
        return Err(VaultError::Write {
            path: path.to_path_buf(),
            source,
        });
    }
    Ok(())
}

fn validate_folder(folder: &str) -> Result<PathBuf, VaultError> {
    let path = Path::new(folder);
    let escapes = path
        .components()
        .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));

    if escapes {
        return Err(VaultError::InvalidFolder(folder.to_string()));
    }
    Ok(path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn writer() -> (TempDir, VaultWriter) {
        let dir = TempDir::new().expect("tempdir");
        let writer = VaultWriter::new(dir.path());
        (dir, writer)
    }

    #[test]
    fn test_sanitize_removes_special_characters() {
        assert_eq!(
            sanitize_filename("Test/Title:With*Special?Characters"),
            "TestTitleWithSpecialCharacters"
        );
    }

    #[test]
    fn test_sanitize_keeps_spaces_hyphens_underscores() {
        assert_eq!(sanitize_filename("my note - draft_2"), "my note - draft_2");
    }

    #[test]
    fn test_sanitize_truncates_after_removal() {
        let title = "a".repeat(150);
        assert_eq!(sanitize_filename(&title).chars().count(), 100);

        // 100 removable characters up front do not eat into the budget.
        let title = format!("{}{}", "?".repeat(100), "b".repeat(120));
        assert_eq!(sanitize_filename(&title), "b".repeat(100));
    }

    #[test]
    fn test_sanitize_keeps_all_ascii_whitespace() {
        assert_eq!(sanitize_filename("a\u{b}b\tc"), "a\u{b}b\tc");
        assert_eq!(sanitize_filename("no\u{a0}break"), "nobreak");
    }

    #[test]
    fn test_sanitize_drops_non_ascii() {
        assert_eq!(sanitize_filename("Café ☕ notes"), "Caf  notes");
    }

    #[test]
    fn test_write_returns_relative_path() {
        let (dir, writer) = writer();
        let path = writer.write("body", "My Note", Some("Captures")).unwrap();

        assert_eq!(path, "Captures/My Note.md");
        let on_disk = fs::read_to_string(dir.path().join("Captures/My Note.md")).unwrap();
        assert_eq!(on_disk, "body");
    }

    #[test]
    fn test_write_without_folder_uses_root() {
        let (dir, writer) = writer();
        let path = writer.write("x", "Root Note", None).unwrap();

        assert_eq!(path, "Root Note.md");
        assert!(dir.path().join("Root Note.md").exists());
    }

    #[test]
    fn test_write_creates_nested_folders() {
        let (dir, writer) = writer();
        let path = writer.write("x", "Deep", Some("a/b/c")).unwrap();

        assert_eq!(path, "a/b/c/Deep.md");
        assert!(dir.path().join("a/b/c/Deep.md").is_file());
    }

    #[test]
    fn test_repeated_titles_get_numbered_siblings() {
        let (dir, writer) = writer();

        assert_eq!(writer.write("one", "title", Some("Captures")).unwrap(), "Captures/title.md");
        assert_eq!(writer.write("two", "title", Some("Captures")).unwrap(), "Captures/title-1.md");
        assert_eq!(writer.write("three", "title", Some("Captures")).unwrap(), "Captures/title-2.md");

        let first = fs::read_to_string(dir.path().join("Captures/title.md")).unwrap();
        assert_eq!(first, "one", "existing file must never be overwritten");
    }

    #[test]
    fn test_probe_fills_first_gap() {
        let (dir, writer) = writer();
        fs::write(dir.path().join("gap.md"), "taken").unwrap();
        fs::write(dir.path().join("gap-2.md"), "taken").unwrap();

        assert_eq!(writer.write("new", "gap", None).unwrap(), "gap-1.md");
    }

    #[test]
    fn test_truncated_title_path_length() {
        let (_dir, writer) = writer();
        let path = writer.write("x", &"t".repeat(150), None).unwrap();
        assert_eq!(path, format!("{}.md", "t".repeat(100)));
    }

    #[test]
    fn test_empty_stem_still_writes() {
        let (dir, writer) = writer();

        assert_eq!(writer.write("x", "???", None).unwrap(), ".md");
        assert_eq!(writer.write("y", "", Some("foldered")).unwrap(), "foldered/.md");
        assert_eq!(writer.write("z", "!!!", None).unwrap(), "-1.md");
        assert!(dir.path().join("foldered/.md").is_file());
    }

    #[test]
    fn test_folder_cannot_escape_vault() {
        let (_dir, writer) = writer();

        for folder in ["../outside", "/etc", "a/../../b"] {
            match writer.write("x", "t", Some(folder)) {
                Err(VaultError::InvalidFolder(f)) => assert_eq!(f, folder),
                other => panic!("expected InvalidFolder for {}, got {:?}", folder, other),
            }
        }
    }

    struct FailingWriter;

    impl Write for FailingWriter {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::Other, "disk full"))
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_failed_write_frees_the_name() {
        let (dir, writer) = writer();
        let path = dir.path().join("partial.md");
        fs::write(&path, "").unwrap();

        match write_or_discard(&path, FailingWriter, b"body") {
            Err(VaultError::Write { path: p, .. }) => assert_eq!(p, path),
            other => panic!("expected Write error, got {:?}", other),
        }
        assert!(!path.exists());
        assert_eq!(writer.write("body", "partial", None).unwrap(), "partial.md");
    }

    #[test]
    fn test_tilde_root_is_expanded() {
        let writer = VaultWriter::from_config_path("~/vault");
        assert!(!writer.root().to_string_lossy().starts_with('~'));
        assert!(writer.root().ends_with("vault"));
    }
}
