//! Artifact copying (spec §4.7 step 3, SPEC_FULL §2): screenshots and
//! other per-item files referenced from `<msg>` bodies live under each
//! item's own output directory and would be orphaned once the merged
//! report moves to `pabot_results/output.xml`. Before merging, every
//! file under `results_dir` whose extension is in `extensions` is
//! copied up to `results_dir` (or mirrored into a matching subfolder
//! when `include_subfolders` is set), renamed `<process-prefix>-<name>`
//! so collisions between items don't clobber each other.

use std::path::{Path, PathBuf};

/// Copies every matching artifact found under `results_dir` into
/// `results_dir` itself (or a subfolder mirroring its own relative
/// position, when `include_subfolders`), returning the bare filenames
/// that were copied — these feed `rewrite_references`'s copied-artifact
/// match list (spec §4.7 step 3).
pub fn copy_output_artifacts(results_dir: &Path, extensions: &[String], include_subfolders: bool) -> std::io::Result<Vec<String>> {
    let mut found = Vec::new();
    collect_artifact_files(results_dir, results_dir, extensions, &mut found)?;

    let mut copied = Vec::new();
    for (path, prefix, remainder) in found {
        if !remainder.as_os_str().is_empty() && !include_subfolders {
            continue;
        }
        let dst_dir = if remainder.as_os_str().is_empty() { results_dir.to_path_buf() } else { results_dir.join(&remainder) };
        std::fs::create_dir_all(&dst_dir)?;
        let Some(file_name) = path.file_name().and_then(|f| f.to_str()) else { continue };
        std::fs::copy(&path, dst_dir.join(format!("{prefix}-{file_name}")))?;
        copied.push(file_name.to_string());
    }
    Ok(copied)
}

/// Recursively gathers `(file_path, first_path_component_under_root,
/// remaining_components)` for every file under `dir` whose extension
/// matches, without mutating the tree — a full scan has to finish
/// before any copying starts, since copies land back under `root` and
/// would otherwise be picked up by the same walk.
fn collect_artifact_files(
    root: &Path,
    dir: &Path,
    extensions: &[String],
    out: &mut Vec<(PathBuf, String, PathBuf)>,
) -> std::io::Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if path.is_dir() {
            collect_artifact_files(root, &path, extensions, out)?;
            continue;
        }
        let Some(file_name) = path.file_name().and_then(|f| f.to_str()) else { continue };
        let ext = file_name.rsplit('.').next().unwrap_or_default();
        if !extensions.iter().any(|e| e == ext) {
            continue;
        }
        let parent = path.parent().unwrap_or(root);
        let Ok(rel) = parent.strip_prefix(root) else { continue };
        let mut components = rel.components();
        let Some(prefix_component) = components.next() else { continue };
        let prefix = prefix_component.as_os_str().to_string_lossy().to_string();
        let remainder: PathBuf = components.collect();
        out.push((path, prefix, remainder));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn copies_matching_files_with_process_prefix() {
        let dir = tempfile::tempdir().unwrap();
        let item_dir = dir.path().join("3");
        std::fs::create_dir_all(&item_dir).unwrap();
        std::fs::write(item_dir.join("screenshot.png"), b"x").unwrap();
        std::fs::write(item_dir.join("output.xml"), b"<suite/>").unwrap();

        let copied = copy_output_artifacts(dir.path(), &["png".to_string()], false).unwrap();
        assert_eq!(copied, vec!["screenshot.png".to_string()]);
        assert!(dir.path().join("3-screenshot.png").exists());
        assert!(!dir.path().join("3-output.xml").exists());
    }

    #[test]
    fn skips_nested_files_unless_subfolders_are_included() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("3").join("sub");
        std::fs::create_dir_all(&nested).unwrap();
        std::fs::write(nested.join("shot.png"), b"x").unwrap();

        let copied = copy_output_artifacts(dir.path(), &["png".to_string()], false).unwrap();
        assert!(copied.is_empty());

        let copied = copy_output_artifacts(dir.path(), &["png".to_string()], true).unwrap();
        assert_eq!(copied, vec!["shot.png".to_string()]);
        assert!(dir.path().join("sub").join("3-shot.png").exists());
    }
}
