#![allow(dead_code)]

pub mod file;

use assert_cmd::Command;
use assert_fs::TempDir;
use rstest::fixture;
use std::path::Path;

const TMPDIR: &str = "../playground";

pub fn redirect_temp_dir() {
    unsafe {
        std::env::set_var("TMPDIR", TMPDIR);
    }

    // Ensure the TMPDIR exists
    if !std::path::Path::new(TMPDIR).exists() {
        std::fs::create_dir_all(TMPDIR).expect("Failed to create TMPDIR");
    }
}

pub fn run_dircache_command(dir: &Path, args: &[&str]) -> Command {
    let mut cmd = Command::cargo_bin("dircache").expect("Failed to find dircache binary");
    cmd.current_dir(dir).args(args);
    cmd
}

pub fn run_git_command(dir: &Path, args: &[&str]) -> Command {
    let mut cmd = Command::new("git");
    cmd.current_dir(dir).args(args);
    cmd
}

/// Whether a `git` binary is on the PATH to compare against
pub fn git_available() -> bool {
    std::process::Command::new("git")
        .arg("--version")
        .output()
        .map(|output| output.status.success())
        .unwrap_or(false)
}

#[fixture]
pub fn repository_dir() -> TempDir {
    redirect_temp_dir();
    TempDir::new().expect("Failed to create temp dir")
}

#[fixture]
pub fn init_repository_dir(repository_dir: TempDir) -> TempDir {
    run_dircache_command(repository_dir.path(), &["init"])
        .assert()
        .success();

    repository_dir
}

// Helper function to create hexdump representation
pub fn to_hexdump(data: &[u8]) -> String {
    let mut result = String::new();
    for (i, chunk) in data.chunks(16).enumerate() {
        result.push_str(&format!("{:08x}: ", i * 16));

        // Hex representation
        for (j, byte) in chunk.iter().enumerate() {
            if j == 8 {
                result.push(' ');
            }
            result.push_str(&format!("{:02x} ", byte));
        }

        // Pad if less than 16 bytes
        for j in chunk.len()..16 {
            if j == 8 {
                result.push(' ');
            }
            result.push_str("   ");
        }

        result.push_str(" |");

        // ASCII representation
        for byte in chunk {
            if byte.is_ascii_graphic() {
                result.push(*byte as char);
            } else {
                result.push('.');
            }
        }

        result.push_str("|\n");
    }
    result
}

// Macro to compare index contents with hexdump output on failure
#[macro_export]
macro_rules! assert_index_eq {
    ($ours:expr, $git:expr) => {
        if $ours != $git {
            pretty_assertions::assert_eq!(
                common::to_hexdump($ours),
                common::to_hexdump($git),
                "\n=== INDEX CONTENTS DIFFER ===\ndircache index ({} bytes) vs git index ({} bytes)",
                $ours.len(),
                $git.len()
            );
        }
    };
}
