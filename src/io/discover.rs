use std::path::{Path, PathBuf};

use glob::Pattern;
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::error::{Result, ReportError};

/// Finds files matching `pattern`.
///
/// The directory part of the pattern is taken literally and only the file
/// name is a glob (`*`, `?`, `[...]`). Matches directly inside that directory win;
/// when there are none the directory is searched recursively. The result is
/// sorted and never empty.
pub fn find_source_files(pattern: &str) -> Result<Vec<PathBuf>> {
    let pattern_path = Path::new(pattern);
    let name = pattern_path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name_pattern = Pattern::new(&name).map_err(|source| ReportError::InvalidPattern {
        pattern: pattern.to_string(),
        source,
    })?;
    let root = match pattern_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };

    let mut files = collect(&root, &name_pattern, 1);
    if files.is_empty() {
        debug!(root = %root.display(), "no direct matches, searching recursively");
        files = collect(&root, &name_pattern, usize::MAX);
    }

    if files.is_empty() {
        return Err(ReportError::NoSourceFiles {
            pattern: pattern.to_string(),
        });
    }

    info!(count = files.len(), "found source files");
    for (index, file) in files.iter().take(5).enumerate() {
        info!("  {}. {}", index + 1, file.display());
    }
    if files.len() > 5 {
        info!("  ... and {} more", files.len() - 5);
    }
    Ok(files)
}

fn collect(root: &Path, name_pattern: &Pattern, max_depth: usize) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = WalkDir::new(root)
        .min_depth(1)
        .max_depth(max_depth)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| {
            entry.file_type().is_file()
                && name_pattern.matches(&entry.file_name().to_string_lossy())
        })
        .map(|entry| entry.into_path())
        .collect();
    files.sort();
    files
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn character_classes_select_files() {
        let dir = tempfile::tempdir().expect("temporary directory");
        for name in ["Report1.xlsx", "Report2.xlsx", "Report3.xlsx", "Report.xls"] {
            std::fs::write(dir.path().join(name), b"").expect("source file");
        }

        let pattern = dir.path().join("Report[12].xlsx");
        let files = find_source_files(&pattern.to_string_lossy()).expect("files found");

        assert_eq!(
            files,
            vec![dir.path().join("Report1.xlsx"), dir.path().join("Report2.xlsx")]
        );
    }

    #[test]
    fn malformed_pattern_is_rejected() {
        let dir = tempfile::tempdir().expect("temporary directory");
        let pattern = dir.path().join("Report[.xlsx");
        let error = find_source_files(&pattern.to_string_lossy()).expect_err("bad pattern");
        assert!(matches!(error, ReportError::InvalidPattern { .. }));
    }

    #[test]
    fn falls_back_to_recursive_search() {
        let dir = tempfile::tempdir().expect("temporary directory");
        let nested = dir.path().join("exports").join("2024");
        std::fs::create_dir_all(&nested).expect("nested dir");
        std::fs::write(nested.join("Report_b.xlsx"), b"").expect("file b");
        std::fs::write(nested.join("Report_a.xlsx"), b"").expect("file a");
        std::fs::write(nested.join("notes.txt"), b"").expect("other file");

        let pattern = dir.path().join("Report*.xlsx");
        let files = find_source_files(&pattern.to_string_lossy()).expect("files found");

        assert_eq!(
            files,
            vec![nested.join("Report_a.xlsx"), nested.join("Report_b.xlsx")]
        );
    }

    #[test]
    fn direct_matches_take_precedence() {
        let dir = tempfile::tempdir().expect("temporary directory");
        std::fs::create_dir_all(dir.path().join("sub")).expect("sub dir");
        std::fs::write(dir.path().join("Report1.xlsx"), b"").expect("top file");
        std::fs::write(dir.path().join("sub").join("Report2.xlsx"), b"").expect("nested file");

        let pattern = dir.path().join("Report*.xlsx");
        let files = find_source_files(&pattern.to_string_lossy()).expect("files found");

        assert_eq!(files, vec![dir.path().join("Report1.xlsx")]);
    }

    #[test]
    fn no_match_is_an_error() {
        let dir = tempfile::tempdir().expect("temporary directory");
        let pattern = dir.path().join("Report*.xlsx");
        let error = find_source_files(&pattern.to_string_lossy()).expect_err("nothing found");
        assert!(matches!(error, ReportError::NoSourceFiles { .. }));
    }
}
