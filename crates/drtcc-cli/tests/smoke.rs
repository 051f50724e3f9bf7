//! Exercises the compiled `drtcc` binary end-to-end as a subprocess.

use std::process::Command;

fn write_source(name: &str, contents: &str) -> std::path::PathBuf {
    let path = std::env::temp_dir().join(name);
    std::fs::write(&path, contents).expect("write temp source file");
    path
}

#[test]
fn exit_status_matches_mains_return_value() {
    let path = write_source("drtcc_cli_smoke_exit.c", "int main(){ return 41 + 1; }");
    let status = Command::new(env!("CARGO_BIN_EXE_drtcc"))
        .arg(&path)
        .status()
        .expect("spawn drtcc");
    assert_eq!(status.code(), Some(42));
}

#[test]
fn lexical_errors_are_reported_and_exit_nonzero() {
    let path = write_source("drtcc_cli_smoke_lex_error.c", "int main(){ return 0 @ 1; }");
    let output = Command::new(env!("CARGO_BIN_EXE_drtcc"))
        .arg(&path)
        .output()
        .expect("spawn drtcc");
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("ERROR"));
}

#[test]
fn guest_argv_is_forwarded_after_the_source_path() {
    let path = write_source("drtcc_cli_smoke_argv.c", "int main(){ return 0; }");
    let status = Command::new(env!("CARGO_BIN_EXE_drtcc"))
        .arg(&path)
        .arg("ignored")
        .arg("also-ignored")
        .status()
        .expect("spawn drtcc");
    assert!(status.success());
}
