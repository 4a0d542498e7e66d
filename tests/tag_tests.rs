//! Tag graph, listings, bundle building and name search.

use std::collections::BTreeMap;
use std::io::{Cursor, Read};
use std::sync::Arc;

use anyhow::Result;
use tempfile::{tempdir, TempDir};

use podaci::{
    BundleOutcome, DocKind, EffectiveConfig, FileSystem, MemoryIndex, PodaciError, Principal, SyncableDocument, TagScope,
};

fn user(id: &str) -> Principal { Principal::new(id, id) }

fn open_with(tmp: &TempDir, user_id: &str, tweak: impl FnOnce(&mut EffectiveConfig)) -> Result<FileSystem> {
    let mut cfg = EffectiveConfig::with_data_root(tmp.path().join("data"));
    tweak(&mut cfg);
    Ok(FileSystem::connect(cfg, Arc::new(MemoryIndex::new()), Some(user(user_id)))?)
}

fn open_fs(tmp: &TempDir, user_id: &str) -> Result<FileSystem> { open_with(tmp, user_id, |_| {}) }

fn tagged_file(fs: &FileSystem, name: &str, bytes: &[u8], tag_id: &str) -> Result<String> {
    let out = fs.create_file_from_bytes(name, Cursor::new(bytes.to_vec()))?;
    let mut file = out.file.expect("file");
    file.add_tag(tag_id)?;
    Ok(file.id().expect("id").to_string())
}

fn unzip(bytes: Vec<u8>) -> Result<BTreeMap<String, Vec<u8>>> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes))?;
    let mut out = BTreeMap::new();
    for i in 0..archive.len() {
        let mut entry = archive.by_index(i)?;
        let mut buf = Vec::new();
        entry.read_to_end(&mut buf)?;
        out.insert(entry.name().to_string(), buf);
    }
    Ok(out)
}

#[test]
fn tag_membership_is_not_inherited() -> Result<()> {
    let tmp = tempdir()?;
    let fs = open_fs(&tmp, "u1")?;
    let press = fs.create_tag("press")?;
    let mut europe = fs.create_tag("press/europe")?;
    let press_id = press.id().unwrap().to_string();
    let europe_id = europe.id().unwrap().to_string();
    europe.add_parent(&press_id)?;

    let only_europe = tagged_file(&fs, "eu.txt", b"europe story", &europe_id)?;
    let only_press = tagged_file(&fs, "front.txt", b"front page", &press_id)?;

    let (total, files) = press.list_files()?;
    assert_eq!(total, 1);
    assert_eq!(files[0].id(), Some(only_press.as_str()));

    let (total, files) = europe.list_files()?;
    assert_eq!(total, 1);
    assert_eq!(files[0].id(), Some(only_europe.as_str()));
    Ok(())
}

#[test]
fn parents_form_a_set() -> Result<()> {
    let tmp = tempdir()?;
    let fs = open_fs(&tmp, "u1")?;
    let a = fs.create_tag("a")?;
    let b = fs.create_tag("b")?;
    let mut c = fs.create_tag("c")?;
    let (a_id, b_id) = (a.id().unwrap().to_string(), b.id().unwrap().to_string());

    c.add_parent(&a_id)?;
    c.add_parent(&a_id)?;
    c.add_parent(&b_id)?;
    assert_eq!(c.meta().parents, vec![a_id.clone(), b_id.clone()]);

    c.remove_parent(&a_id)?;
    assert!(matches!(c.remove_parent(&a_id), Err(PodaciError::Absent { .. })));
    let stored = fs.get_tag(c.id().unwrap())?;
    assert_eq!(stored.meta().parents, vec![b_id]);
    assert_eq!(stored.meta().icon, "default");
    Ok(())
}

#[test]
fn user_tag_scopes() -> Result<()> {
    let tmp = tempdir()?;
    let fs = open_fs(&tmp, "u1")?;
    let press = fs.create_tag("press")?;
    let press_id = press.id().unwrap().to_string();
    let mut europe = fs.create_tag("europe")?;
    europe.add_parent(&press_id)?;
    fs.with_user(user("u2")).create_tag("elsewhere")?;

    let names = |scope| -> Result<Vec<String>> {
        let (_, tags) = fs.list_user_tags(&user("u1"), scope, 0, 100)?;
        Ok(tags.iter().map(|t| t.name().to_string()).collect())
    };
    assert_eq!(names(TagScope::All)?, vec!["press", "europe"]);
    assert_eq!(names(TagScope::TopLevel)?, vec!["press"]);
    assert_eq!(names(TagScope::Under(press_id))?, vec!["europe"]);

    let (total, _) = fs.list_user_tags(&user("u2"), TagScope::All, 0, 100)?;
    assert_eq!(total, 1);
    Ok(())
}

#[test]
fn user_file_listing() -> Result<()> {
    let tmp = tempdir()?;
    let fs = open_fs(&tmp, "u1")?;
    let t = fs.create_tag("t")?;
    let t_id = t.id().unwrap().to_string();
    tagged_file(&fs, "a.txt", b"a", &t_id)?;
    fs.create_file_from_bytes("b.txt", Cursor::new(b"b".to_vec()))?;
    fs.with_user(user("u2")).create_file_from_bytes("c.txt", Cursor::new(b"c".to_vec()))?;

    let (total, _) = fs.list_user_files(&user("u1"), None, 0, 100)?;
    assert_eq!(total, 2);
    let (total, files) = fs.list_user_files(&user("u1"), Some(&t_id), 0, 100)?;
    assert_eq!(total, 1);
    assert_eq!(files[0].meta().filename, "a.txt");
    let (total, files) = fs.list_user_files(&user("u1"), None, 1, 100)?;
    assert_eq!((total, files.len()), (2, 1));
    Ok(())
}

#[test]
fn list_cap_bounds_results_not_totals() -> Result<()> {
    let tmp = tempdir()?;
    let fs = open_with(&tmp, "u1", |c| c.list_cap = 2)?;
    let t = fs.create_tag("t")?;
    let t_id = t.id().unwrap().to_string();
    for i in 0..3 {
        tagged_file(&fs, &format!("f{i}.txt"), format!("body {i}").as_bytes(), &t_id)?;
    }
    let (total, files) = t.list_files()?;
    assert_eq!(total, 3);
    assert_eq!(files.len(), 2);
    Ok(())
}

#[test]
fn bundle_has_one_entry_per_file() -> Result<()> {
    let tmp = tempdir()?;
    // exactly the combined size is still allowed
    let fs = open_with(&tmp, "u1", |c| c.bundle_max_bytes = 11)?;
    let t = fs.create_tag("bundle")?;
    let t_id = t.id().unwrap().to_string();
    tagged_file(&fs, "a.txt", b"hello", &t_id)?;
    tagged_file(&fs, "b.txt", b"world!", &t_id)?;

    let BundleOutcome::Archive(bytes) = t.build_zip_bundle()? else { panic!("expected an archive") };
    let entries = unzip(bytes)?;
    assert_eq!(entries.len(), 2);
    assert_eq!(entries["a.txt"], b"hello");
    assert_eq!(entries["b.txt"], b"world!");
    Ok(())
}

#[test]
fn bundle_over_budget_is_refused() -> Result<()> {
    let tmp = tempdir()?;
    let fs = open_with(&tmp, "u1", |c| c.bundle_max_bytes = 10)?;
    let t = fs.create_tag("bundle")?;
    let t_id = t.id().unwrap().to_string();
    tagged_file(&fs, "a.txt", b"hello", &t_id)?;
    tagged_file(&fs, "b.txt", b"world!", &t_id)?;
    assert_eq!(t.build_zip_bundle()?, BundleOutcome::TooLarge { total_bytes: 11, limit_bytes: 10 });
    Ok(())
}

#[test]
fn bundle_refuses_sizes_that_overflow() -> Result<()> {
    let tmp = tempdir()?;
    let fs = open_fs(&tmp, "u1")?;
    let t = fs.create_tag("huge")?;
    let t_id = t.id().unwrap().to_string();
    for (name, body) in [("a.txt", b"aa"), ("b.txt", b"bb")] {
        let id = tagged_file(&fs, name, body, &t_id)?;
        fs.get_file_by_id(&id)?.update_meta(|m| m.size = u64::MAX / 2 + 1)?;
    }
    let limit = fs.config().bundle_max_bytes;
    assert_eq!(t.build_zip_bundle()?, BundleOutcome::TooLarge { total_bytes: u64::MAX, limit_bytes: limit });
    Ok(())
}

#[test]
fn bundle_renames_clashing_filenames() -> Result<()> {
    let tmp = tempdir()?;
    let fs = open_fs(&tmp, "u1")?;
    let t = fs.create_tag("clash")?;
    let t_id = t.id().unwrap().to_string();
    tagged_file(&fs, "a.txt", b"first", &t_id)?;
    tagged_file(&fs, "a.txt", b"second", &t_id)?;
    let BundleOutcome::Archive(bytes) = t.build_zip_bundle()? else { panic!("expected an archive") };
    let entries = unzip(bytes)?;
    assert_eq!(entries["a.txt"], b"first");
    assert_eq!(entries["a (2).txt"], b"second");
    Ok(())
}

#[test]
fn bundle_stops_at_unreadable_member() -> Result<()> {
    let tmp = tempdir()?;
    let fs1 = open_fs(&tmp, "u1")?;
    let t = fs1.create_tag("shared")?;
    let t_id = t.id().unwrap().to_string();
    tagged_file(&fs1, "mine.txt", b"mine", &t_id)?;
    // u2 tags their own file with u1's tag; u1 cannot read it
    tagged_file(&fs1.with_user(user("u2")), "theirs.txt", b"theirs", &t_id)?;
    assert!(matches!(t.build_zip_bundle(), Err(PodaciError::PermissionDenied { .. })));
    Ok(())
}

#[test]
fn tag_access_and_deletion() -> Result<()> {
    let tmp = tempdir()?;
    let fs = open_fs(&tmp, "u1")?;
    let mut t = fs.create_tag("private")?;
    let id = t.id().unwrap().to_string();

    let as_u2 = fs.with_user(user("u2")).get_tag(&id)?;
    assert!(matches!(as_u2.list_files(), Err(PodaciError::PermissionDenied { .. })));

    assert!(matches!(t.delete(false), Err(PodaciError::ConfirmationRequired(_))));
    assert!(fs.get_tag(&id).is_ok());
    t.delete(true)?;
    assert!(matches!(fs.get_tag(&id), Err(PodaciError::NotFound { .. })));
    assert!(matches!(fs.create_tag("  "), Err(PodaciError::MissingField("name"))));
    Ok(())
}

#[test]
fn fuzzy_name_search_spans_files_and_tags() -> Result<()> {
    let tmp = tempdir()?;
    let fs = open_fs(&tmp, "u1")?;
    fs.create_tag("press")?;
    let out = fs.create_file_from_bytes("quarterly-report.pdf", Cursor::new(b"%PDF-1.4 body".to_vec()))?;
    assert_eq!(out.meta().unwrap().mimetype, "application/pdf");
    fs.create_file_from_bytes("budget.xlsx", Cursor::new(b"numbers".to_vec()))?;

    let hits = fs.search_all_by_name("reprt", 0, 10)?;
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].kind, DocKind::File);
    // no name set, so the filename is shown
    assert_eq!(hits[0].name, "quarterly-report.pdf");
    assert_eq!(Some(hits[0].id.as_str()), out.id());

    let hits = fs.search_all_by_name("pres", 0, 10)?;
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].kind, DocKind::Tag);
    assert_eq!(hits[0].name, "press");

    assert!(fs.search_all_by_name("zebra", 0, 10)?.is_empty());
    Ok(())
}
