// SPDX-License-Identifier: MIT
//! End-to-end tests against real files on disk

use std::fs;
use std::path::Path;

use binfs::{Checksum, Config, Container, ContainerError};
use tempfile::TempDir;

const HOST: &[u8] = b"\x7fELF\x02\x01\x01\x00 pretend this is machine code";

fn host_file(dir: &TempDir) -> std::path::PathBuf {
    let path = dir.path().join("app");
    fs::write(&path, HOST).unwrap();
    path
}

fn load(path: &Path) -> Container {
    Container::load(path, fs::read(path).unwrap()).unwrap()
}

#[test]
fn test_example_scenario() {
    let dir = tempfile::tempdir().unwrap();
    let path = host_file(&dir);

    let mut container = load(&path);
    container.stage("x", vec![1u8, 2, 3]).unwrap();
    container.save().unwrap();

    let reloaded = load(&path);
    assert_eq!(reloaded.list_files(), vec!["x".to_string()]);
    assert_eq!(reloaded.read_file("x"), Some(&[1u8, 2, 3][..]));
}

#[test]
fn test_growth_hello() {
    let dir = tempfile::tempdir().unwrap();
    let path = host_file(&dir);

    let mut container = Container::open(&path).unwrap();
    container.stage("a.txt", "hello").unwrap();
    container.save().unwrap();

    let reloaded = Container::open(&path).unwrap();
    assert_eq!(reloaded.read_file("a.txt"), Some(&b"hello"[..]));
    assert!(reloaded.filename_exists("a.txt"));

    let on_disk = fs::read(&path).unwrap();
    assert!(on_disk.starts_with(HOST));
    assert_eq!(&on_disk[HOST.len()..HOST.len() + 3], b"BHS");
    assert!(on_disk.ends_with(b"BFShello"));
}

#[test]
fn test_save_without_pending_leaves_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = host_file(&dir);

    let mut container = Container::open(&path).unwrap();
    container.save().unwrap();
    assert_eq!(fs::read(&path).unwrap(), HOST);

    container.stage("a", "alpha").unwrap();
    container.save().unwrap();
    let saved = fs::read(&path).unwrap();

    let mut reloaded = Container::open(&path).unwrap();
    reloaded.save().unwrap();
    assert_eq!(fs::read(&path).unwrap(), saved);
}

#[test]
fn test_shrinking_rewrite_truncates() {
    let dir = tempfile::tempdir().unwrap();
    let path = host_file(&dir);

    let mut container = Container::open(&path).unwrap();
    container.stage("big", vec![7u8; 4096]).unwrap();
    container.save().unwrap();

    container.stage("big", vec![8u8; 16]).unwrap();
    container.save().unwrap();

    let on_disk = fs::read(&path).unwrap();
    assert_eq!(on_disk.len(), HOST.len() + 3 + 64 + 3 + 16);

    let reloaded = Container::open(&path).unwrap();
    assert_eq!(reloaded.read_file("big"), Some(&[8u8; 16][..]));
}

#[test]
fn test_bit_flip_excludes_only_that_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = host_file(&dir);

    let mut container = Container::open(&path).unwrap();
    container.stage("a", "alpha").unwrap();
    container.stage("b", "beta").unwrap();
    container.stage("c", "gamma").unwrap();
    container.save().unwrap();

    let b = container
        .entries()
        .iter()
        .find(|record| record.filename == "b")
        .unwrap()
        .clone();

    let mut image = fs::read(&path).unwrap();
    image[b.offset as usize + 2] ^= 0x04;
    fs::write(&path, &image).unwrap();

    let reloaded = Container::open(&path).unwrap();
    assert_eq!(reloaded.read_file("a"), Some(&b"alpha"[..]));
    assert_eq!(reloaded.read_file("b"), None);
    assert_eq!(reloaded.read_file("c"), Some(&b"gamma"[..]));
    assert_eq!(reloaded.entries().len(), 3);
    assert!(matches!(
        reloaded.verify(),
        Err(ContainerError::ChecksumMismatch { .. })
    ));
}

#[test]
fn test_content_addressed_staging() {
    let dir = tempfile::tempdir().unwrap();
    let path = host_file(&dir);

    let mut container = Container::open(&path).unwrap();
    assert!(container.stage("first", "payload").unwrap());
    assert!(!container.stage("second", "payload").unwrap());
    assert!(container.exists(&Checksum::of(b"payload")));
    container.save().unwrap();

    let reloaded = Container::open(&path).unwrap();
    assert_eq!(reloaded.entries().len(), 1);
    assert!(reloaded.exists(&Checksum::of(b"payload")));
}

#[test]
fn test_corrupt_header_region_on_disk() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("app");
    let mut image = HOST.to_vec();
    image.extend_from_slice(b"BHS");
    image.extend_from_slice(&[0xAA; 65]);
    image.extend_from_slice(b"BFS");
    fs::write(&path, &image).unwrap();

    let err = Container::open(&path).unwrap_err();
    assert!(matches!(err, ContainerError::CorruptHeaderRegion(_)));

    let config = Config {
        init_on_unrecognized: true,
        ..Config::default()
    };
    let mut container = Container::open_with_config(&path, &config).unwrap();
    container.stage("a", "alpha").unwrap();
    container.save().unwrap();

    let reloaded = Container::open(&path).unwrap();
    assert_eq!(reloaded.read_file("a"), Some(&b"alpha"[..]));
}

#[test]
fn test_missing_target_is_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = Container::open(dir.path().join("nope")).unwrap_err();
    assert!(matches!(err, ContainerError::Io(_)));
}

#[test]
fn test_current_executable_loads() {
    // The test binary carries marker bytes in its constants but no container
    let container = Container::current().unwrap();
    assert!(container.list_files().is_empty());
    assert!(container.image().ends_with(b"BHSBFS"));
}
