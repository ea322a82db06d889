// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 emberlink.dev

//! End-to-end merger scenarios against the real binary.

use std::path::Path;
use std::process::Command;

fn bin() -> Command {
    Command::new(env!("CARGO_BIN_EXE_cachemerge"))
}

fn seed(dir: &Path, class: &str, name: &str, contents: &[u8]) {
    let class_dir = dir.join(class);
    std::fs::create_dir_all(&class_dir).unwrap();
    std::fs::write(class_dir.join(name), contents).unwrap();
}

#[test]
fn merge_then_exec_child() {
    let root = tempfile::tempdir().unwrap();
    let cache_a = root.path().join("cache_a");
    let cache_b = root.path().join("cache_b");
    let out = root.path().join("out");
    seed(&cache_a, "z", "deadbeef", &[0x01]);
    seed(&cache_b, "z", "deadbeef", &[0x01]);
    seed(&cache_a, "o", "cafe", &[0x02]);

    let output = bin()
        .arg(&out)
        .arg(&cache_a)
        .arg(&cache_b)
        .arg("--")
        .arg("echo")
        .arg("hello")
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(0));
    assert_eq!(String::from_utf8_lossy(&output.stdout), "hello\n");
    assert_eq!(std::fs::read(out.join("z/deadbeef")).unwrap(), [0x01]);
    assert_eq!(std::fs::read(out.join("o/cafe")).unwrap(), [0x02]);
}

#[test]
fn child_receives_cache_dir_flags() {
    let root = tempfile::tempdir().unwrap();
    let out = root.path().join("out");

    let output = bin().arg(&out).arg("--").arg("echo").output().unwrap();

    assert_eq!(output.status.code(), Some(0));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("--cache-dir"));
    assert!(stdout.contains("--global-cache-dir"));
    // Both flags point at the output cache.
    assert_eq!(stdout.matches(out.to_str().unwrap()).count(), 2);
}

#[test]
fn child_exit_code_is_propagated() {
    let root = tempfile::tempdir().unwrap();
    let out = root.path().join("out");

    let output = bin()
        .arg(&out)
        .arg("--")
        .arg("sh")
        .arg("-c")
        .arg("exit 7")
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(7));
}

#[test]
fn missing_separator_is_usage_error() {
    let root = tempfile::tempdir().unwrap();
    let out = root.path().join("out");

    let output = bin().arg(&out).arg("dep1").output().unwrap();

    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("usage"));
}

#[test]
fn empty_command_after_separator_is_usage_error() {
    let root = tempfile::tempdir().unwrap();
    let out = root.path().join("out");

    let output = bin().arg(&out).arg("--").output().unwrap();

    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("usage"));
}

#[test]
fn partial_dep_caches_still_merge() {
    let root = tempfile::tempdir().unwrap();
    let d1 = root.path().join("d1");
    let d2 = root.path().join("d2");
    let out = root.path().join("out");
    // d1 lacks h/ entirely.
    seed(&d1, "z", "aa", &[1]);
    seed(&d1, "b", "bb", &[2]);
    seed(&d1, "o", "cc", &[3]);
    seed(&d2, "h", "dd", &[4]);

    let status = bin()
        .arg(&out)
        .arg(&d1)
        .arg(&d2)
        .arg("--")
        .arg("true")
        .status()
        .unwrap();

    assert_eq!(status.code(), Some(0));
    assert_eq!(std::fs::read(out.join("z/aa")).unwrap(), [1]);
    assert_eq!(std::fs::read(out.join("b/bb")).unwrap(), [2]);
    assert_eq!(std::fs::read(out.join("o/cc")).unwrap(), [3]);
    assert_eq!(std::fs::read(out.join("h/dd")).unwrap(), [4]);
}
