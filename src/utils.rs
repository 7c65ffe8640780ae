//! Filesystem helpers shared by the sync and move stages.

use std::path::Path;

use crate::{Error, Result};

/// Size of the file at `path`, or `None` when it does not exist or is not a
/// regular file.
pub async fn file_size(path: &Path) -> Option<u64> {
    match tokio::fs::metadata(path).await {
        Ok(meta) if meta.is_file() => Some(meta.len()),
        _ => None,
    }
}

/// Whether a regular file exists at `path` with exactly `expected` bytes
pub async fn file_matches_size(path: &Path, expected: i64) -> bool {
    match file_size(path).await {
        Some(len) => i64::try_from(len).map(|l| l == expected).unwrap_or(false),
        None => false,
    }
}

/// Move a file, preferring an atomic rename and falling back to copy +
/// unlink when source and destination are on different filesystems.
pub async fn move_file(src: &Path, dest: &Path) -> Result<()> {
    match tokio::fs::rename(src, dest).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::CrossesDevices => {
            tokio::fs::copy(src, dest).await.map_err(|copy_err| {
                Error::Io(std::io::Error::new(
                    copy_err.kind(),
                    format!(
                        "cross-device copy {} -> {} failed: {}",
                        src.display(),
                        dest.display(),
                        copy_err
                    ),
                ))
            })?;
            tokio::fs::remove_file(src).await.map_err(|rm_err| {
                Error::Io(std::io::Error::new(
                    rm_err.kind(),
                    format!(
                        "failed to remove source {} after copy: {}",
                        src.display(),
                        rm_err
                    ),
                ))
            })?;
            Ok(())
        }
        Err(e) => Err(Error::Io(std::io::Error::new(
            e.kind(),
            format!("rename {} -> {} failed: {}", src.display(), dest.display(), e),
        ))),
    }
}

/// Move a file or directory, preferring an atomic rename.
///
/// On a cross-device rename failure, files are copied and unlinked and
/// directories are copied recursively then removed.
pub async fn move_entry(src: &Path, dest: &Path) -> Result<()> {
    match tokio::fs::rename(src, dest).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::CrossesDevices => {
            let meta = tokio::fs::metadata(src).await.map_err(Error::Io)?;
            if meta.is_dir() {
                copy_tree(src, dest).await?;
                remove_tree(src).await
            } else {
                move_file(src, dest).await
            }
        }
        Err(e) => Err(Error::Io(std::io::Error::new(
            e.kind(),
            format!("rename {} -> {} failed: {}", src.display(), dest.display(), e),
        ))),
    }
}

/// Recursively copy a directory tree (iterative, no async recursion)
async fn copy_tree(src: &Path, dest: &Path) -> Result<()> {
    let mut pending = vec![(src.to_path_buf(), dest.to_path_buf())];
    while let Some((from, to)) = pending.pop() {
        tokio::fs::create_dir_all(&to).await?;
        let mut entries = tokio::fs::read_dir(&from).await?;
        while let Some(entry) = entries.next_entry().await? {
            let target = to.join(entry.file_name());
            let kind = entry.file_type().await?;
            if kind.is_dir() {
                pending.push((entry.path(), target));
            } else {
                tokio::fs::copy(entry.path(), target).await?;
            }
        }
    }
    Ok(())
}

/// Remove a file or directory tree if present
pub async fn remove_entry(path: &Path) -> Result<()> {
    match tokio::fs::metadata(path).await {
        Ok(meta) if meta.is_dir() => remove_tree(path).await,
        Ok(_) => remove_file_quiet(path).await,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(Error::Io(e)),
    }
}

/// Remove a directory tree if it exists; missing trees are not an error
pub async fn remove_tree(path: &Path) -> Result<()> {
    match tokio::fs::remove_dir_all(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(Error::Io(e)),
    }
}

/// Remove a single file if it exists; missing files are not an error
pub async fn remove_file_quiet(path: &Path) -> Result<()> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(Error::Io(e)),
    }
}

/// First path component of a relative path, as a string.
///
/// Used to locate the download's top-level folder under a final base when
/// cleaning up or migrating.
pub fn top_component(relative_path: &str) -> Option<&str> {
    Path::new(relative_path)
        .components()
        .next()
        .and_then(|c| c.as_os_str().to_str())
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn file_matches_size_checks_existence_and_exact_size() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.bin");
        tokio::fs::write(&path, vec![0u8; 64]).await.unwrap();

        assert!(file_matches_size(&path, 64).await);
        assert!(!file_matches_size(&path, 63).await);
        assert!(!file_matches_size(&dir.path().join("missing"), 0).await);
        // A directory never matches, whatever the expected size
        assert!(!file_matches_size(dir.path(), 0).await);
    }

    #[tokio::test]
    async fn move_file_renames_within_a_filesystem() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("src.bin");
        let dest = dir.path().join("sub").join("dest.bin");
        tokio::fs::write(&src, b"payload").await.unwrap();
        tokio::fs::create_dir_all(dest.parent().unwrap())
            .await
            .unwrap();

        move_file(&src, &dest).await.unwrap();

        assert!(!src.exists());
        assert_eq!(tokio::fs::read(&dest).await.unwrap(), b"payload");
    }

    #[tokio::test]
    async fn remove_tree_tolerates_missing_paths() {
        let dir = tempfile::tempdir().unwrap();
        remove_tree(&dir.path().join("never-created")).await.unwrap();

        let tree = dir.path().join("tree");
        tokio::fs::create_dir_all(tree.join("nested")).await.unwrap();
        tokio::fs::write(tree.join("nested/file"), b"x").await.unwrap();
        remove_tree(&tree).await.unwrap();
        assert!(!tree.exists());
    }

    #[tokio::test]
    async fn move_entry_relocates_whole_directories() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("Movie.2024");
        tokio::fs::create_dir_all(src.join("extras")).await.unwrap();
        tokio::fs::write(src.join("movie.mkv"), b"feature").await.unwrap();
        tokio::fs::write(src.join("extras/clip.mkv"), b"extra").await.unwrap();

        let dest = dir.path().join("library").join("Movie.2024");
        tokio::fs::create_dir_all(dest.parent().unwrap()).await.unwrap();
        move_entry(&src, &dest).await.unwrap();

        assert!(!src.exists());
        assert_eq!(tokio::fs::read(dest.join("movie.mkv")).await.unwrap(), b"feature");
        assert_eq!(
            tokio::fs::read(dest.join("extras/clip.mkv")).await.unwrap(),
            b"extra"
        );
    }

    #[tokio::test]
    async fn remove_entry_handles_files_directories_and_absence() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("a.bin");
        tokio::fs::write(&file, b"x").await.unwrap();
        remove_entry(&file).await.unwrap();
        assert!(!file.exists());

        let tree = dir.path().join("tree");
        tokio::fs::create_dir_all(tree.join("deep")).await.unwrap();
        remove_entry(&tree).await.unwrap();
        assert!(!tree.exists());

        remove_entry(&dir.path().join("missing")).await.unwrap();
    }

    #[test]
    fn top_component_extracts_the_download_folder() {
        assert_eq!(top_component("Movie.2024/movie.mkv"), Some("Movie.2024"));
        assert_eq!(top_component("single.mkv"), Some("single.mkv"));
        assert_eq!(top_component(""), None);
    }
}
