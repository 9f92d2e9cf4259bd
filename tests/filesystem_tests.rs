//! Integration tests for the filesystem steps
//!
//! These tests verify:
//! - Reconciling a server folder keeps only `cluster_token.txt`
//! - World merges are idempotent and non-destructive
//! - Mod mirroring rebuilds the destination even from an empty source
//! - Archive extraction preserves relative paths

use camino::{Utf8Path, Utf8PathBuf};
use dstsetup::InstallLayout;
use dstsetup::services::{MissingSourcePolicy, archive, mods, reconcile, tree_copy};
use std::fs;
use std::io::Write;
use tempfile::TempDir;
use walkdir::WalkDir;
use zip::write::SimpleFileOptions;

fn create_test_dir() -> (TempDir, Utf8PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let path = Utf8PathBuf::try_from(temp_dir.path().to_path_buf()).unwrap();
    (temp_dir, path)
}

/// Relative path and contents of every file under `root`, sorted
fn snapshot(root: &Utf8Path) -> Vec<(String, Vec<u8>)> {
    let mut files: Vec<(String, Vec<u8>)> = WalkDir::new(root)
        .into_iter()
        .map(|e| e.unwrap())
        .filter(|e| e.file_type().is_file())
        .map(|e| {
            let relative = e.path().strip_prefix(root.as_std_path()).unwrap();
            (
                relative.to_string_lossy().replace('\\', "/"),
                fs::read(e.path()).unwrap(),
            )
        })
        .collect();
    files.sort();
    files
}

#[test]
fn test_reconcile_token_with_three_subdirectories() {
    let (_temp_dir, root) = create_test_dir();
    let server = root.join("MyDediServer");
    let token = b"pds-g^KU_token^bytes\r\n\x00\xff";

    fs::create_dir_all(&server).unwrap();
    fs::write(server.join("cluster_token.txt"), token).unwrap();
    for shard in ["Master", "Caves", "mods"] {
        fs::create_dir_all(server.join(shard).join("save")).unwrap();
        fs::write(server.join(shard).join("save/session"), shard).unwrap();
    }

    let summary = reconcile::reconcile(&server, Utf8Path::new("cluster_token.txt")).unwrap();

    assert!(summary.preserved);
    assert_eq!(summary.removed, 3);
    let entries: Vec<String> = server
        .read_dir_utf8()
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string())
        .collect();
    assert_eq!(entries, vec!["cluster_token.txt"]);
    assert_eq!(fs::read(server.join("cluster_token.txt")).unwrap(), token);
}

#[test]
fn test_reconcile_missing_directory_creates_it() {
    let (_temp_dir, root) = create_test_dir();
    let server = root.join("Klei/DoNotStarveTogether/MyDediServer");

    let summary = reconcile::reconcile(&server, Utf8Path::new("cluster_token.txt")).unwrap();

    assert!(summary.created);
    assert_eq!(summary.removed, 0);
    assert!(server.is_dir());
    assert_eq!(server.read_dir_utf8().unwrap().count(), 0);
}

#[test]
fn test_reconcile_removes_stale_backup_without_token() {
    let (_temp_dir, root) = create_test_dir();
    let server = root.join("MyDediServer");
    fs::create_dir_all(&server).unwrap();
    fs::write(server.join("cluster_token.txt.bak"), "left over").unwrap();

    let summary = reconcile::reconcile(&server, Utf8Path::new("cluster_token.txt")).unwrap();

    assert!(!summary.preserved);
    assert_eq!(server.read_dir_utf8().unwrap().count(), 0);
}

#[test]
fn test_merge_is_idempotent() {
    let (_temp_dir, root) = create_test_dir();
    let world = root.join("Cluster_1");
    let server = root.join("MyDediServer");

    fs::create_dir_all(world.join("Master/save/session/A1B2")).unwrap();
    fs::create_dir_all(world.join("Caves")).unwrap();
    fs::write(world.join("cluster.ini"), "[GAMEPLAY]").unwrap();
    fs::write(world.join("Master/save/session/A1B2/0000000002"), "day 2").unwrap();
    fs::write(world.join("Caves/server.ini"), "[SHARD]").unwrap();

    fs::create_dir_all(&server).unwrap();
    fs::write(server.join("cluster_token.txt"), "token").unwrap();
    fs::write(server.join("cluster.ini"), "stale").unwrap();

    let first = tree_copy::merge_into(&world, &server).unwrap();
    let after_first = snapshot(&server);
    let second = tree_copy::merge_into(&world, &server).unwrap();
    let after_second = snapshot(&server);

    assert_eq!(first, second);
    assert_eq!(first.files, 3);
    assert_eq!(after_first, after_second);

    // Conflicts overwritten, unrelated destination files kept
    assert_eq!(fs::read_to_string(server.join("cluster.ini")).unwrap(), "[GAMEPLAY]");
    assert_eq!(fs::read_to_string(server.join("cluster_token.txt")).unwrap(), "token");
}

#[test]
fn test_merge_missing_source_is_not_found() {
    let (_temp_dir, root) = create_test_dir();

    let err = tree_copy::merge_into(&root.join("Cluster_9"), &root.join("MyDediServer")).unwrap_err();

    assert!(err.is_not_found());
    assert!(!root.join("MyDediServer").exists());
}

#[test]
fn test_mirror_with_empty_source_rebuilds_destination() {
    let (_temp_dir, root) = create_test_dir();
    let layout = InstallLayout::new(root.join("Klei"));
    let steam = root.join("Steam");
    let steamcmd = root.join("steamcmd");
    fs::create_dir_all(layout.workshop_source(&steam)).unwrap();

    let dest = layout.mods_destination(&steamcmd);
    fs::create_dir_all(dest.join("workshop-12345")).unwrap();
    fs::write(dest.join("workshop-12345/modinfo.lua"), "old").unwrap();

    let summary = mods::mirror(&layout, &steam, &steamcmd, MissingSourcePolicy::Tolerant).unwrap();

    assert_eq!(summary.total(), 0);
    assert!(!summary.source_missing);
    assert!(dest.is_dir());
    assert_eq!(dest.read_dir_utf8().unwrap().count(), 0);
}

#[test]
fn test_extract_preserves_relative_paths() {
    let (_temp_dir, root) = create_test_dir();
    let zip_path = root.join("MyDediServer.zip");

    let mut writer = zip::ZipWriter::new(fs::File::create(&zip_path).unwrap());
    writer
        .add_directory("MyDediServer/", SimpleFileOptions::default())
        .unwrap();
    for (name, contents) in [
        ("MyDediServer/cluster.ini", "[NETWORK]"),
        ("MyDediServer/Master/server.ini", "[SHARD]"),
        ("../escape.txt", "nope"),
    ] {
        writer.start_file(name, SimpleFileOptions::default()).unwrap();
        writer.write_all(contents.as_bytes()).unwrap();
    }
    writer.finish().unwrap();

    let target = root.join("Documents/Klei/DoNotStarveTogether");
    let count = archive::extract(&zip_path, &target).unwrap();

    assert_eq!(count, 2);
    assert_eq!(
        snapshot(&target),
        vec![
            ("MyDediServer/Master/server.ini".to_string(), b"[SHARD]".to_vec()),
            ("MyDediServer/cluster.ini".to_string(), b"[NETWORK]".to_vec()),
        ]
    );
    assert!(!root.join("Documents/Klei/escape.txt").exists());
}

#[test]
fn test_extract_corrupt_archive() {
    let (_temp_dir, root) = create_test_dir();
    let zip_path = root.join("broken.zip");
    fs::write(&zip_path, "this is not a zip file").unwrap();

    let err = archive::extract(&zip_path, &root.join("out")).unwrap_err();

    assert!(!err.is_not_found());
    assert!(err.to_string().contains("Invalid archive"));
}
