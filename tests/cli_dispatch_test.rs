// tests/cli_dispatch_test.rs

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs::File;
use std::io::Write;
use tempfile::tempdir;

// 辅助函数，避免重复；测试中关闭文件日志
fn main_command() -> Command {
    let mut cmd = Command::cargo_bin(env!("CARGO_PKG_NAME")).unwrap();
    cmd.args(["--log-level", "off"]);
    cmd
}

// --- 测试基本 CLI 行为 ---

#[test]
fn test_help_flag() {
    let mut cmd = main_command();
    cmd.arg("--help");
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("显示此帮助信息并退出"))
        .stdout(predicate::str::contains("--create-config"));
}

#[test]
fn test_missing_mode_fails() {
    let mut cmd = Command::cargo_bin(env!("CARGO_PKG_NAME")).unwrap();
    cmd.assert().failure().stderr(predicate::str::contains("Usage:"));
}

#[test]
fn test_conflicting_modes_fail() {
    let mut cmd = main_command();
    cmd.args(["--url", "https://a.com/1.mp4", "--show-config"]);
    cmd.assert().failure();
}

// --- 分析模式 ---

#[test]
fn test_analyze_json_output() {
    let mut cmd = main_command();
    cmd.args([
        "--analyze",
        "https://cdn.example.com/clip.mp4",
        "https://www.youtube.com/watch?v=abc",
        "https://unknown-site.org/page",
        "--json",
    ]);
    let output = cmd.assert().success().get_output().stdout.clone();
    let json: serde_json::Value = serde_json::from_slice(&output).expect("输出应为合法 JSON");

    let urls = json["urls"].as_array().unwrap();
    assert_eq!(urls.len(), 3);
    assert_eq!(urls[0]["strategy"], "direct");
    assert_eq!(urls[1]["strategy"], "extractor");
    assert_eq!(urls[2]["strategy"], "browser_automation");

    let report = &json["report"];
    assert_eq!(report["total_urls"], 3);
    assert_eq!(report["direct_videos"], 1);
    assert_eq!(report["streaming_platforms"], 1);
    let probability = report["success_probability"].as_f64().unwrap();
    assert!((probability - 0.8).abs() < 1e-9);
}

#[test]
fn test_analyze_table_output() {
    let mut cmd = main_command();
    cmd.args(["--analyze", "https://cdn.example.com/clip.mp4"]);
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("cdn.example.com"));
}

// --- 配置文件 ---

#[test]
fn test_create_config_writes_example() {
    let dir = tempdir().unwrap();
    let config_path = dir.path().join("config.json");

    let mut cmd = main_command();
    cmd.arg("--create-config").arg("--config").arg(&config_path);
    cmd.assert().success();

    let content = std::fs::read_to_string(&config_path).unwrap();
    let json: serde_json::Value = serde_json::from_str(&content).unwrap();
    assert!(json["sites"].as_object().is_some_and(|sites| !sites.is_empty()));
    assert!(json["concurrent_downloads"].is_number());
}

#[test]
fn test_show_config_masks_password() {
    let dir = tempdir().unwrap();
    let config_path = dir.path().join("config.json");
    let mut file = File::create(&config_path).unwrap();
    writeln!(
        file,
        r#"{{"sites": {{"example.com": {{"login_username": "bob", "login_password": "hunter2"}}}}}}"#
    )
    .unwrap();

    let mut cmd = main_command();
    cmd.arg("--show-config").arg("--config").arg(&config_path);
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("********"))
        .stdout(predicate::str::contains("hunter2").not());
}

// --- 批量模式 ---

#[test]
fn test_batch_file_without_urls_fails() {
    let dir = tempdir().unwrap();
    let batch_path = dir.path().join("links.txt");
    let mut file = File::create(&batch_path).unwrap();
    writeln!(file, "# 只有注释").unwrap();
    writeln!(file).unwrap();

    let mut cmd = main_command();
    cmd.arg("-b")
        .arg(&batch_path)
        .arg("--config")
        .arg(dir.path().join("config.json"));
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("没有有效的链接"));
}

#[test]
fn test_batch_file_not_found() {
    let dir = tempdir().unwrap();
    let mut cmd = main_command();
    cmd.arg("-b").arg(dir.path().join("missing.txt"));
    cmd.assert().failure().stderr(predicate::str::contains("程序执行出错"));
}
