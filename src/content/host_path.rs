use path_absolutize::Absolutize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::Result;

/// Normalize a host path to an absolute path without resolving symlinks.
pub fn normalize_abs_path(p: &Path) -> Result<PathBuf> {
    Ok(p.absolutize()?.to_path_buf())
}

/// Check a host path against a ';' or ',' separated allowlist of absolute prefixes.
/// Symlinks are always denied.
pub fn is_host_path_allowed(candidate: &Path, allowlist: &str) -> Result<bool> {
    if is_symlink(candidate) {
        return Ok(false);
    }
    let cand_abs = normalize_abs_path(candidate)?;
    let parts = allowlist
        .split(|c| c == ';' || c == ',')
        .map(str::trim)
        .filter(|s| !s.is_empty());
    for prefix in parts {
        let pref_abs = normalize_abs_path(Path::new(prefix))?;
        // component-wise, so /data2 is not under /data
        if cand_abs.starts_with(&pref_abs) {
            return Ok(true);
        }
    }
    Ok(false)
}

fn is_symlink(p: &Path) -> bool {
    fs::symlink_metadata(p).map(|m| m.file_type().is_symlink()).unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allowlist_is_component_wise() {
        let tmp = tempfile::tempdir().unwrap();
        let inbox = tmp.path().join("inbox");
        let other = tmp.path().join("inbox2");
        fs::create_dir_all(&inbox).unwrap();
        fs::create_dir_all(&other).unwrap();
        let f = other.join("x.pdf");
        fs::write(&f, b"x").unwrap();

        let list = format!(" {} ;", inbox.display());
        assert!(is_host_path_allowed(&inbox.join("y.pdf"), &list).unwrap());
        assert!(!is_host_path_allowed(&f, &list).unwrap());
        assert!(!is_host_path_allowed(&f, "").unwrap());
    }

    #[cfg(unix)]
    #[test]
    fn symlinks_are_denied() {
        let tmp = tempfile::tempdir().unwrap();
        let target = tmp.path().join("real.txt");
        fs::write(&target, b"x").unwrap();
        let link = tmp.path().join("link.txt");
        std::os::unix::fs::symlink(&target, &link).unwrap();
        let list = tmp.path().display().to_string();
        assert!(is_host_path_allowed(&target, &list).unwrap());
        assert!(!is_host_path_allowed(&link, &list).unwrap());
    }
}
