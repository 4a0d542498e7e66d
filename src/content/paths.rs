use std::path::{Path, PathBuf};

use unicode_normalization::UnicodeNormalization;

use crate::error::{PodaciError, Result};

/// Number of two-character directory levels taken from the front of the hash.
pub const HASH_DIR_LEVELS: usize = 3;

/// Normalize a UTF-8 string to NFC.
pub fn normalize_nfc(input: &str) -> String {
    input.nfc().collect::<String>()
}

/// Validate a stored filename and return its NFC form.
/// A filename is a single path segment:
/// - not empty, not "." or ".."
/// - no NUL, '/' or '\\'
pub fn validate_filename(name: &str) -> Result<String> {
    let n = normalize_nfc(name);
    if n.trim().is_empty() {
        return Err(PodaciError::InvalidFilename("filename cannot be empty".into()));
    }
    if n == "." || n == ".." {
        return Err(PodaciError::InvalidFilename(format!("'{n}' is not a filename")));
    }
    if n.chars().any(|c| c == '\u{0000}' || c == '/' || c == '\\') {
        return Err(PodaciError::InvalidFilename(format!("'{}' must be a single path segment", n.escape_debug())));
    }
    Ok(n)
}

/// Check that `hash` looks like a lowercase hex digest long enough to shard on.
pub fn validate_hash(hash: &str) -> Result<()> {
    if hash.is_empty() {
        return Err(PodaciError::MissingField("hash"));
    }
    if hash.len() < HASH_DIR_LEVELS * 2 || !hash.chars().all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c)) {
        return Err(PodaciError::InvalidHash(hash.to_string()));
    }
    Ok(())
}

/// Directory holding the bytes for `hash`: `<root>/ab/cd/ef/<hash>`.
pub fn hash_dir(root: &Path, hash: &str) -> Result<PathBuf> {
    validate_hash(hash)?;
    let mut dir = root.to_path_buf();
    for level in 0..HASH_DIR_LEVELS {
        dir.push(&hash[level * 2..level * 2 + 2]);
    }
    dir.push(hash);
    Ok(dir)
}

/// Final location of a resident file: the hash directory plus the validated filename.
pub fn resident_path(root: &Path, hash: &str, filename: &str) -> Result<PathBuf> {
    if filename.is_empty() {
        return Err(PodaciError::MissingField("filename"));
    }
    let name = validate_filename(filename)?;
    Ok(hash_dir(root, hash)?.join(name))
}

#[cfg(test)]
mod tests {
    use super::*;

    const HELLO: &str = "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824";

    #[test]
    fn normalizes_combining_marks() {
        let s = "Cafe\u{0301}.txt";
        assert_eq!(validate_filename(s).unwrap(), "Caf\u{e9}.txt");
    }

    #[test]
    fn rejects_traversal_and_separators() {
        assert!(validate_filename("").is_err());
        assert!(validate_filename("..").is_err());
        assert!(validate_filename("a/b.txt").is_err());
        assert!(validate_filename("a\\b.txt").is_err());
        assert!(validate_filename("a\u{0000}b").is_err());
        assert!(validate_filename("report 2014 (final).pdf").is_ok());
    }

    #[test]
    fn path_is_sharded_by_hash_prefix() {
        let p = resident_path(Path::new("/data"), HELLO, "a.txt").unwrap();
        let expected = Path::new("/data").join("2c").join("f2").join("4d").join(HELLO).join("a.txt");
        assert_eq!(p, expected);
    }

    #[test]
    fn missing_parts_are_reported() {
        assert!(matches!(resident_path(Path::new("/d"), "", "a.txt"), Err(PodaciError::MissingField("hash"))));
        assert!(matches!(resident_path(Path::new("/d"), HELLO, ""), Err(PodaciError::MissingField("filename"))));
        assert!(matches!(hash_dir(Path::new("/d"), "xyz123"), Err(PodaciError::InvalidHash(_))));
        assert!(matches!(hash_dir(Path::new("/d"), "abc"), Err(PodaciError::InvalidHash(_))));
    }
}
