use super::*;
use std::io::Cursor;
use tempfile::tempdir;

const HELLO_SHA: &str = "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824";

fn store(root: &Path) -> ContentStore {
    // tiny block size so multi-block streaming is exercised
    ContentStore::new(root, 4, 8).unwrap()
}

#[test]
fn hash_is_sha256_hex() {
    assert_eq!(sha256_hex(b"hello"), HELLO_SHA);
    let (h, n) = sha256_reader(Cursor::new(b"hello".to_vec()), 2).unwrap();
    assert_eq!(h, HELLO_SHA);
    assert_eq!(n, 5);
}

#[test]
fn put_places_bytes_at_hash_path() {
    let tmp = tempdir().unwrap();
    let cs = store(tmp.path());
    let blob = cs.put(Cursor::new(b"hello".to_vec()), "a.txt").unwrap();
    assert_eq!(blob.hash, HELLO_SHA);
    assert_eq!(blob.size, 5);
    assert_eq!(blob.path, cs.location(HELLO_SHA, "a.txt").unwrap());
    assert_eq!(fs::read(&blob.path).unwrap(), b"hello");
    assert!(cs.exists(HELLO_SHA));
}

#[test]
fn identical_content_shares_path() {
    let tmp = tempdir().unwrap();
    let cs = store(tmp.path());
    let a = cs.put(Cursor::new(b"hello".to_vec()), "a.txt").unwrap();
    let b = cs.put(Cursor::new(b"hello".to_vec()), "a.txt").unwrap();
    assert_eq!(a, b);
    let dir = cs.location(HELLO_SHA, "a.txt").unwrap().parent().unwrap().to_path_buf();
    assert_eq!(fs::read_dir(dir).unwrap().count(), 1);
    // staging area is left empty
    assert_eq!(fs::read_dir(tmp.path().join(".staging")).unwrap().count(), 0);
}

#[test]
fn stage_keeps_sniff_head_only() {
    let tmp = tempdir().unwrap();
    let cs = store(tmp.path());
    let staged = cs.stage(Cursor::new(b"0123456789abcdef".to_vec())).unwrap();
    assert_eq!(staged.head, b"01234567");
    assert_eq!(staged.size, 16);
}

#[test]
fn dropped_stage_is_cleaned_up() {
    let tmp = tempdir().unwrap();
    let cs = store(tmp.path());
    {
        let _staged = cs.stage(Cursor::new(b"discard me".to_vec())).unwrap();
        assert_eq!(fs::read_dir(tmp.path().join(".staging")).unwrap().count(), 1);
    }
    assert_eq!(fs::read_dir(tmp.path().join(".staging")).unwrap().count(), 0);
}

#[test]
fn delete_is_best_effort() {
    let tmp = tempdir().unwrap();
    let cs = store(tmp.path());
    cs.put(Cursor::new(b"hello".to_vec()), "a.txt").unwrap();
    assert!(cs.delete(HELLO_SHA, "a.txt").unwrap());
    assert!(!cs.exists(HELLO_SHA));
    // second delete finds nothing and is not an error
    assert!(!cs.delete(HELLO_SHA, "a.txt").unwrap());
}

#[test]
fn open_missing_reports_file_not_found() {
    let tmp = tempdir().unwrap();
    let cs = store(tmp.path());
    assert!(matches!(cs.open(HELLO_SHA, "a.txt"), Err(PodaciError::FileNotFound(_))));
}

#[test]
fn read_errors_propagate() {
    struct Failing;
    impl Read for Failing {
        fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "gone"))
        }
    }
    let tmp = tempdir().unwrap();
    let cs = store(tmp.path());
    assert!(matches!(cs.put(Failing, "a.txt"), Err(PodaciError::Io(_))));
    assert_eq!(fs::read_dir(tmp.path().join(".staging")).unwrap().count(), 0);
}
