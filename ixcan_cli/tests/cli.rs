use std::fs;
use std::path::Path;
use std::process::{Command, Output};

fn can(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_can"))
        .args(args)
        .output()
        .expect("run failed")
}

fn p(path: &Path) -> &str {
    path.to_str().unwrap()
}

/// Data in the first and last of 96 blocks, like a freshly seeded MRF index.
fn sample_index() -> Vec<u8> {
    let mut data_block = Vec::new();
    for _ in 0..32 {
        data_block.extend_from_slice(&123u64.to_be_bytes());
        data_block.extend_from_slice(&456u64.to_be_bytes());
    }
    let mut raw = data_block.clone();
    raw.resize(512 * 95, 0);
    raw.extend_from_slice(&data_block);
    raw
}

#[test]
fn compact_restore_cycle() {
    let dir = tempfile::tempdir().unwrap();
    let idx = dir.path().join("test.idx");
    let ix = dir.path().join("test.ix");
    let out = dir.path().join("test.out.idx");
    fs::write(&idx, sample_index()).unwrap();

    let o = can(&["-q", "compact", p(&idx), p(&ix)]);
    assert!(o.status.success(), "{}", String::from_utf8_lossy(&o.stderr));
    assert!(fs::metadata(&ix).unwrap().len() < fs::metadata(&idx).unwrap().len());
    assert!(!dir.path().join("test.ix.tmp").exists());

    let o = can(&["-q", "restore", p(&ix), p(&out)]);
    assert!(o.status.success(), "{}", String::from_utf8_lossy(&o.stderr));
    assert_eq!(fs::read(&out).unwrap(), sample_index());
}

#[test]
fn restore_to_stdout() {
    let dir = tempfile::tempdir().unwrap();
    let idx = dir.path().join("a.idx");
    let ix = dir.path().join("a.ix");
    fs::write(&idx, sample_index()).unwrap();
    assert!(can(&["-q", "compact", p(&idx), p(&ix)]).status.success());

    let o = can(&["-q", "restore", p(&ix), "-"]);
    assert!(o.status.success());
    assert_eq!(o.stdout, sample_index());
}

#[test]
fn wrong_extension_is_usage_error() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("input.bin");
    fs::write(&input, sample_index()).unwrap();
    let out = dir.path().join("out.ix");

    let o = can(&["compact", p(&input), p(&out)]);
    assert_eq!(o.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&o.stderr).contains(".idx extension"));
    assert!(!out.exists());

    // -g skips the naming convention
    let o = can(&["-g", "-q", "compact", p(&input), p(&out)]);
    assert!(o.status.success(), "{}", String::from_utf8_lossy(&o.stderr));
}

#[test]
fn unaligned_index_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let idx = dir.path().join("odd.idx");
    fs::write(&idx, [1u8; 100]).unwrap();
    let o = can(&["compact", p(&idx), p(&dir.path().join("odd.ix"))]);
    assert_eq!(o.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&o.stderr).contains("not a multiple of 16"));
}

#[test]
fn bad_magic_leaves_no_output() {
    let dir = tempfile::tempdir().unwrap();
    let ix = dir.path().join("bad.ix");
    let out = dir.path().join("bad.idx");
    fs::write(&ix, b"NOPE\0\0\0\x01\0\0\0\0\0\0\0\0").unwrap();

    let o = can(&["restore", p(&ix), p(&out)]);
    assert_eq!(o.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&o.stderr).contains("wrong magic"));
    assert!(!out.exists());
    assert!(!dir.path().join("bad.idx.tmp").exists());
}

#[test]
fn missing_input_is_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let o = can(&[
        "compact",
        p(&dir.path().join("nothere.idx")),
        p(&dir.path().join("nothere.ix")),
    ]);
    assert_eq!(o.status.code(), Some(2));
}

#[test]
fn inspect_locate_and_verify() {
    let dir = tempfile::tempdir().unwrap();
    let idx = dir.path().join("s.idx");
    let ix = dir.path().join("s.ix");
    fs::write(&idx, sample_index()).unwrap();
    assert!(can(&["-q", "compact", p(&idx), p(&ix)]).status.success());

    let o = can(&["inspect", p(&ix), "--segments"]);
    assert!(o.status.success());
    let text = String::from_utf8_lossy(&o.stdout);
    assert!(text.contains("stored blocks  : 2"), "{text}");

    let o = can(&["locate", p(&ix), "--record", "1"]);
    assert!(o.status.success());
    assert!(String::from_utf8_lossy(&o.stdout).contains("offset 123 size 456"));

    let o = can(&["locate", p(&ix), "--block", "40"]);
    assert!(o.status.success());
    assert!(String::from_utf8_lossy(&o.stderr).contains("block 40 is empty"));

    let o = can(&["locate", p(&ix), "--block", "96"]);
    assert_eq!(o.status.code(), Some(1));
    let err = String::from_utf8_lossy(&o.stderr);
    assert!(err.contains("out of range"), "{err}");
    assert!(!err.contains("is empty"), "{err}");

    let o = can(&["verify", p(&idx)]);
    assert!(o.status.success(), "{}", String::from_utf8_lossy(&o.stderr));
}
