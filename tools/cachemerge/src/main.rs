// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 emberlink.dev

//! Build-cache merger.
//!
//! Invoked as `cachemerge <out_cache> [dep_cache...] -- <compiler>
//! <args...>`: materializes the union of all dependency caches in the
//! output directory, then execs the compiler with `--cache-dir` /
//! `--global-cache-dir` pointing at it.
//!
//! Cache entries are content-addressed (filename = hex digest of the
//! contents), so a name present in several caches has identical bytes
//! everywhere and overwriting during the union is safe. A dependency
//! missing one of the class subdirectories is normal and skipped; any
//! other filesystem error is fatal.
//!
//! Exit codes: the child's code on normal child exit, 1 on usage or
//! filesystem errors and on child death by signal.

use std::io;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

/// The four cache classes: compilation units, builtins, C-header
/// dependency manifests, object files.
const CACHE_CLASSES: [&str; 4] = ["z", "b", "h", "o"];

fn main() {
    let args: Vec<String> = std::env::args().skip(1).collect();
    std::process::exit(run(&args));
}

fn run(args: &[String]) -> i32 {
    let Some(invocation) = Invocation::parse(args) else {
        usage();
        return 1;
    };

    if let Err(e) = merge(&invocation.out_cache, &invocation.dep_caches) {
        eprintln!("cachemerge: merge failed: {}", e);
        return 1;
    }

    let mut command = Command::new(&invocation.child[0]);
    command
        .args(&invocation.child[1..])
        .arg("--cache-dir")
        .arg(&invocation.out_cache)
        .arg("--global-cache-dir")
        .arg(&invocation.out_cache)
        .stdin(Stdio::inherit())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit());

    match command.status() {
        Ok(status) => match status.code() {
            Some(code) => code,
            // Killed by a signal.
            None => 1,
        },
        Err(e) => {
            eprintln!("cachemerge: failed to spawn {}: {}", invocation.child[0], e);
            1
        }
    }
}

struct Invocation {
    out_cache: PathBuf,
    dep_caches: Vec<PathBuf>,
    child: Vec<String>,
}

impl Invocation {
    /// `<out_cache> [dep_cache...] -- <compiler> <args...>`; the `--`
    /// separator is mandatory and a command must follow it.
    fn parse(args: &[String]) -> Option<Self> {
        let sep = args.iter().position(|a| a == "--")?;
        let (caches, rest) = args.split_at(sep);
        let child: Vec<String> = rest[1..].to_vec();
        let (out_cache, dep_caches) = caches.split_first()?;
        if child.is_empty() {
            return None;
        }
        Some(Self {
            out_cache: PathBuf::from(out_cache),
            dep_caches: dep_caches.iter().map(PathBuf::from).collect(),
            child,
        })
    }
}

fn usage() {
    eprintln!("usage: cachemerge <out_cache> [dep_cache...] -- <compiler> <args...>");
}

/// Union all dependency caches into `out`.
fn merge(out: &Path, deps: &[PathBuf]) -> io::Result<()> {
    for class in CACHE_CLASSES {
        std::fs::create_dir_all(out.join(class))?;
    }
    for dep in deps {
        for class in CACHE_CLASSES {
            let src = dep.join(class);
            // Absent class subdirectory: a normal condition. Errors on
            // entries inside a present one are fatal.
            if !src.is_dir() {
                continue;
            }
            copy_tree(&src, &out.join(class))?;
        }
    }
    Ok(())
}

/// Recursively copy `src` into `dst`, overwriting existing files
/// (content-addressing makes the overwrite a no-op byte-wise).
fn copy_tree(src: &Path, dst: &Path) -> io::Result<()> {
    for entry in std::fs::read_dir(src)? {
        let entry = entry?;
        let target = dst.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            std::fs::create_dir_all(&target)?;
            copy_tree(&entry.path(), &target)?;
        } else {
            std::fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seed(dir: &Path, class: &str, name: &str, contents: &[u8]) {
        let class_dir = dir.join(class);
        std::fs::create_dir_all(&class_dir).unwrap();
        std::fs::write(class_dir.join(name), contents).unwrap();
    }

    #[test]
    fn parse_requires_separator_and_command() {
        let to_args = |v: &[&str]| v.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        assert!(Invocation::parse(&to_args(&["out", "dep"])).is_none());
        assert!(Invocation::parse(&to_args(&["out", "--"])).is_none());
        assert!(Invocation::parse(&to_args(&["--", "cc"])).is_none());
        let inv = Invocation::parse(&to_args(&["out", "d1", "d2", "--", "cc", "-O2"])).unwrap();
        assert_eq!(inv.out_cache, PathBuf::from("out"));
        assert_eq!(inv.dep_caches.len(), 2);
        assert_eq!(inv.child, vec!["cc".to_string(), "-O2".to_string()]);
    }

    #[test]
    fn merge_unions_all_classes() {
        let root = tempfile::tempdir().unwrap();
        let d1 = root.path().join("d1");
        let d2 = root.path().join("d2");
        let out = root.path().join("out");
        seed(&d1, "z", "deadbeef", &[0x01]);
        seed(&d1, "o", "cafe", &[0x02]);
        seed(&d2, "z", "f00d", &[0x03]);
        seed(&d2, "h", "beef", &[0x04]);

        merge(&out, &[d1, d2]).unwrap();

        assert_eq!(std::fs::read(out.join("z/deadbeef")).unwrap(), [0x01]);
        assert_eq!(std::fs::read(out.join("o/cafe")).unwrap(), [0x02]);
        assert_eq!(std::fs::read(out.join("z/f00d")).unwrap(), [0x03]);
        assert_eq!(std::fs::read(out.join("h/beef")).unwrap(), [0x04]);
        // All four class dirs exist even when no dep populated them.
        assert!(out.join("b").is_dir());
    }

    #[test]
    fn same_digest_in_both_deps_is_not_a_conflict() {
        let root = tempfile::tempdir().unwrap();
        let d1 = root.path().join("d1");
        let d2 = root.path().join("d2");
        let out = root.path().join("out");
        seed(&d1, "z", "deadbeef", &[0x01]);
        seed(&d2, "z", "deadbeef", &[0x01]);

        merge(&out, &[d1, d2]).unwrap();
        assert_eq!(std::fs::read(out.join("z/deadbeef")).unwrap(), [0x01]);
    }

    #[test]
    fn missing_class_subdir_is_skipped() {
        let root = tempfile::tempdir().unwrap();
        let d1 = root.path().join("d1");
        let d2 = root.path().join("d2");
        let out = root.path().join("out");
        // d1 has no h/ at all; d2 is complete.
        seed(&d1, "z", "aa", &[1]);
        for class in CACHE_CLASSES {
            seed(&d2, class, "bb", &[2]);
        }

        merge(&out, &[d1, d2]).unwrap();
        assert_eq!(std::fs::read(out.join("z/aa")).unwrap(), [1]);
        for class in CACHE_CLASSES {
            assert_eq!(std::fs::read(out.join(class).join("bb")).unwrap(), [2]);
        }
    }

    #[test]
    fn nested_entries_are_copied_recursively() {
        let root = tempfile::tempdir().unwrap();
        let d1 = root.path().join("d1");
        let out = root.path().join("out");
        let nested = d1.join("z").join("ab");
        std::fs::create_dir_all(&nested).unwrap();
        std::fs::write(nested.join("cdef"), [9]).unwrap();

        merge(&out, std::slice::from_ref(&d1)).unwrap();
        assert_eq!(std::fs::read(out.join("z/ab/cdef")).unwrap(), [9]);
    }

    #[test]
    fn run_reports_usage_error() {
        assert_eq!(run(&["out".to_string()]), 1);
    }
}
