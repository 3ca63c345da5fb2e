//! Integration tests for rivulet-cli.
//!
//! Tests run the `rivulet` binary against node descriptions written to a
//! temporary directory.

use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use tempfile::TempDir;

const MONO: &str = r#"
name = "mono"
buffer_size = 64
flags = ["output_has_own_recycling"]
audio_channels = 1
output_pads = 1

[[templates]]
recall = "render"

[[templates]]
recall = "gain"
params = { gain = "50%" }
"#;

const KIT: &str = r#"
name = "kit"
description = "two channel kit"
flags = ["async", "input_has_own_recycling", "has_score_track"]
audio_channels = 2
input_pads = 4
output_pads = 1

[[templates]]
recall = "render"

[[notes]]
audio_channel = 1
x0 = 0
x1 = 4
y = 2

[[automation]]
audio_channel = 0
control = "gain"
points = [{ x = 0, value = 0.0 }, { x = 8, value = 1.0 }]
"#;

fn rivulet_bin() -> Command {
    Command::new(env!("CARGO_BIN_EXE_rivulet"))
}

fn write_node(dir: &TempDir, name: &str, content: &str) -> PathBuf {
    let path = dir.path().join(name);
    std::fs::write(&path, content).expect("failed to write node description");
    path
}

fn run(args: &[&str], file: &Path) -> Output {
    rivulet_bin()
        .args(args)
        .arg(file)
        .output()
        .expect("failed to run rivulet")
}

// ---------------------------------------------------------------------------
// `rivulet recalls`
// ---------------------------------------------------------------------------

#[test]
fn cli_recalls_lists_builtins() {
    let output = rivulet_bin()
        .args(["recalls", "--verbose"])
        .output()
        .expect("failed to run rivulet recalls");
    assert!(output.status.success());

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Available recalls"));
    for recall in ["render", "gain", "count-ticks"] {
        assert!(stdout.contains(recall), "listing should contain '{recall}'");
    }
    assert!(stdout.contains("limit"), "verbose listing shows parameters");
}

// ---------------------------------------------------------------------------
// `rivulet inspect`
// ---------------------------------------------------------------------------

#[test]
fn cli_inspect_shows_topology() {
    let dir = TempDir::new().unwrap();
    let path = write_node(&dir, "kit.toml", KIT);

    let output = run(&["inspect", "--lines"], &path);
    assert!(
        output.status.success(),
        "inspect failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Name:           kit"));
    assert!(stdout.contains("two channel kit"));
    assert!(stdout.contains("input (8 lines)"));
    assert!(stdout.contains("output (2 lines)"));
    assert!(stdout.contains("Recyclings:     8"));
    assert!(stdout.contains("Templates (1)"));
    assert!(stdout.contains("channel 1: x 0..4 pad 2"));
    assert!(stdout.contains("channel 0: gain (2 points)"));
}

#[test]
fn cli_inspect_rejects_invalid_description() {
    let dir = TempDir::new().unwrap();
    let path = write_node(&dir, "bad.toml", "name = \"bad\"\nflags = [\"sync\", \"async\"]\n");

    let output = run(&["inspect"], &path);
    assert!(!output.status.success());
}

#[test]
fn cli_inspect_missing_file() {
    let dir = TempDir::new().unwrap();
    let output = run(&["inspect"], &dir.path().join("nope.toml"));
    assert!(!output.status.success());
}

// ---------------------------------------------------------------------------
// `rivulet play`
// ---------------------------------------------------------------------------

#[test]
fn cli_play_renders_level() {
    let dir = TempDir::new().unwrap();
    let path = write_node(&dir, "mono.toml", MONO);

    let output = run(&["play", "--ticks", "3", "--level", "1.0"], &path);
    assert!(
        output.status.success(),
        "play failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Played 'mono' (3 ticks, playback)"));
    assert!(stdout.contains("ticks    3"));
    assert!(stdout.contains("peak 0.500"));
    assert!(stdout.contains("recalls [render, gain]"));
}

#[test]
fn cli_play_silence_by_default() {
    let dir = TempDir::new().unwrap();
    let path = write_node(&dir, "mono.toml", MONO);

    let output = run(&["play"], &path);
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("peak 0.000"));
}

#[test]
fn cli_play_rejects_unknown_kind() {
    let dir = TempDir::new().unwrap();
    let path = write_node(&dir, "mono.toml", MONO);

    let output = run(&["play", "--kind", "karaoke"], &path);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("unknown kind"));
}
