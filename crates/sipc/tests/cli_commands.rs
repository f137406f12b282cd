#![cfg(all(unix, feature = "cli"))]

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use sipc_peer::connect;

fn unique_temp_dir(tag: &str) -> PathBuf {
    let dir = PathBuf::from(format!(
        "/tmp/sipc-cli-{tag}-{}-{}",
        std::process::id(),
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .expect("time should be after epoch")
            .as_nanos()
    ));
    std::fs::create_dir_all(&dir).expect("temp dir should be creatable");
    dir
}

fn wait_for_connect(path: &Path, timeout: Duration) {
    let name = path.to_str().expect("temp path should be utf-8");
    let start = Instant::now();
    loop {
        if connect(name).is_ok() {
            return;
        }
        if start.elapsed() >= timeout {
            panic!("connect timeout");
        }
        thread::sleep(Duration::from_millis(25));
    }
}

fn sipc() -> Command {
    let mut command = Command::new(env!("CARGO_BIN_EXE_sipc"));
    command.arg("--log-level").arg("error");
    command
}

#[test]
fn encode_prints_canonical_wire_bytes() {
    let output = sipc()
        .arg("encode")
        .arg("mycmd 3 0.5 [1 2 3] {foo: bar} true |616263")
        .output()
        .expect("encode should run");

    assert!(output.status.success());
    assert_eq!(
        output.stdout,
        b"R 5:mycmd 3 1p-1 [ 1 2 3 ] { 3:foo 3:bar } T 3|abc\n"
    );
}

#[test]
fn decode_reads_stdin_and_prints_json() {
    let mut child = sipc()
        .arg("--format")
        .arg("json")
        .arg("decode")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .spawn()
        .expect("decode should start");

    child
        .stdin
        .take()
        .expect("stdin should be piped")
        .write_all(b"R 4:open -1 1p8\nE 6:denied\n")
        .expect("stdin should accept input");
    let output = child.wait_with_output().expect("decode should finish");

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    let lines: Vec<serde_json::Value> = stdout
        .lines()
        .map(|line| serde_json::from_str(line).expect("each line should be json"))
        .collect();
    assert_eq!(lines.len(), 2);
    assert_eq!(lines[0]["kind"], "request");
    assert_eq!(lines[0]["values"], serde_json::json!(["open", -1, 256]));
    assert_eq!(lines[1]["kind"], "error");
    assert_eq!(lines[1]["values"], serde_json::json!(["denied"]));
}

#[test]
fn decode_of_malformed_input_exits_60() {
    let dir = unique_temp_dir("decode-bad");
    let path = dir.join("bad.wire");
    std::fs::write(&path, b"R 9:abc\n").expect("wire file should be writable");

    let output = sipc()
        .arg("decode")
        .arg(&path)
        .output()
        .expect("decode should run");

    assert_eq!(output.status.code(), Some(60));
    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn send_attaches_files_and_prints_reply() {
    let dir = unique_temp_dir("serve-send");
    let sock_path = dir.join("serve.sock");
    let attachment = dir.join("note.txt");

    let mut child = sipc()
        .arg("--format")
        .arg("json")
        .arg("serve")
        .arg(&sock_path)
        .arg("--greeting")
        .arg("hello from serve\n")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .expect("serve command should start");

    wait_for_connect(&sock_path, Duration::from_secs(3));

    let output = sipc()
        .arg("--format")
        .arg("json")
        .arg("send")
        .arg(&sock_path)
        .arg("open \"note.txt\" 1")
        .arg("--attach")
        .arg(&attachment)
        .arg("--wait")
        .output()
        .expect("send should run");

    let _ = child.kill();
    let _ = child.wait();

    assert!(
        output.status.success(),
        "send failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    let reply: serde_json::Value = serde_json::from_slice(&output.stdout)
        .expect("reply should be one json line");
    assert_eq!(reply["kind"], "success");
    assert_eq!(reply["values"], serde_json::json!(["open", "note.txt", 1]));
    assert_eq!(
        std::fs::read_to_string(&attachment).expect("attachment should exist"),
        "hello from serve\n"
    );

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn send_to_missing_endpoint_exits_3() {
    let dir = unique_temp_dir("send-missing");
    let output = sipc()
        .arg("send")
        .arg(dir.join("nobody.sock"))
        .arg("ping")
        .output()
        .expect("send should run");

    assert_eq!(output.status.code(), Some(3));
    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn version_reports_package_version() {
    let output = sipc().arg("version").output().expect("version should run");

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_eq!(stdout.trim(), format!("sipc {}", env!("CARGO_PKG_VERSION")));
}

#[test]
fn extended_version_names_the_platform_transport() {
    let output = sipc()
        .arg("version")
        .arg("--extended")
        .output()
        .expect("version should run");

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("transport: unix-seqpacket"), "{stdout}");
}
