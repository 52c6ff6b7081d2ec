//! End-to-end tests against a running blob endpoint
//!
//! Defaults to a local Azurite with its well-known development account.
//! Point `CDRIVE_TEST_CONNECTION` at another account to run elsewhere.
//!
//! Run with: `cargo test -p cdrive-cli --features integration`

#![cfg(feature = "integration")]

use std::process::{Command, Output};
use std::time::{SystemTime, UNIX_EPOCH};

use tempfile::TempDir;

const AZURITE: &str = "http://127.0.0.1:10000/devstoreaccount1?account=devstoreaccount1&key=Eby8vdM02xNOcqFlqUwJPLlmEtlCDXJ1OUzFT50uSRZ6IFsuFq2UVErCz4I6tq/K1SZFPTOtr/KBHBeksoGMGw==";

struct Env {
    config: TempDir,
    container: String,
}

impl Env {
    fn new() -> Self {
        let config = TempDir::new().unwrap();
        let connection = std::env::var("CDRIVE_TEST_CONNECTION").unwrap_or_else(|_| AZURITE.to_string());
        let nanos = SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_nanos();
        let env = Self {
            config,
            container: format!("cdrive-it-{}-{nanos}", std::process::id()),
        };
        let out = env.run(&["drive", "set", "it", &connection]);
        assert!(out.status.success(), "drive set failed: {}", String::from_utf8_lossy(&out.stderr));
        env
    }

    fn path(&self, rest: &str) -> String {
        if rest.is_empty() {
            format!("it/{}", self.container)
        } else {
            format!("it/{}/{rest}", self.container)
        }
    }

    fn run(&self, args: &[&str]) -> Output {
        Command::new(env!("CARGO_BIN_EXE_cdrive"))
            .args(args)
            .env("CDRIVE_CONFIG_DIR", self.config.path())
            .output()
            .expect("Failed to execute cdrive")
    }

    fn json(&self, args: &[&str]) -> serde_json::Value {
        let mut args = args.to_vec();
        args.push("--json");
        let out = self.run(&args);
        assert!(out.status.success(), "{args:?} failed: {}", String::from_utf8_lossy(&out.stderr));
        serde_json::from_slice(&out.stdout).expect("stdout should be valid JSON")
    }
}

impl Drop for Env {
    fn drop(&mut self) {
        let _ = self.run(&["rm", &self.path("")]);
    }
}

#[test]
fn test_block_blob_lifecycle() {
    let env = Env::new();

    let created = env.json(&["mb", &env.path("")]);
    assert_eq!(created["created"], true);

    env.json(&["put", &env.path("docs/a.txt"), "--content", "hello"]);
    env.json(&["put", &env.path("docs/b.txt"), "--content", "world"]);
    env.json(&["put", &env.path("other/c.txt"), "--content", "!"]);

    let listed = env.json(&["ls", &env.path("docs")]);
    let names: Vec<&str> = listed["items"]
        .as_array()
        .unwrap()
        .iter()
        .map(|i| i["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["docs/a.txt", "docs/b.txt"]);

    let capped = env.json(&["ls", &format!("{}?max=1", env.path("docs"))]);
    assert_eq!(capped["items"].as_array().unwrap().len(), 1);

    let out = env.run(&["cat", &env.path("docs/a.txt")]);
    assert_eq!(out.stdout, b"hello");

    let removed = env.json(&["rm", &env.path("docs")]);
    assert_eq!(removed["blobs_deleted"], 2);

    let rest = env.json(&["ls", &env.path("")]);
    assert_eq!(rest["items"].as_array().unwrap().len(), 1);
}

#[test]
fn test_append_blob_grows() {
    let env = Env::new();

    env.json(&["append", &env.path("log.txt"), "--content", "one\n"]);
    env.json(&["append", &env.path("log.txt"), "--content", "two\n"]);

    let out = env.run(&["cat", &env.path("log.txt")]);
    assert_eq!(out.stdout, b"one\ntwo\n");
}

#[test]
fn test_page_blob_fill_and_scan() {
    let env = Env::new();

    env.json(&["page", "create", &env.path("disk.vhd"), "1048576"]);
    let fill = env.json(&["page", "fill", &env.path("disk.vhd"), "16", "--seed", "7"]);
    assert_eq!(fill["writes"], 16);

    let ranges = env.json(&["page", "ls", &env.path("disk.vhd")]);
    let occupied = ranges["occupied_bytes"].as_u64().unwrap();
    let distinct = fill["distinct_pages"].as_u64().unwrap();
    assert_eq!(occupied, distinct * 512);
}

#[test]
fn test_missing_container_lists_empty() {
    let env = Env::new();
    let listed = env.json(&["ls", &env.path("nothing/here")]);
    assert!(listed["items"].as_array().unwrap().is_empty());
}

#[test]
fn test_policy_and_tokens() {
    let env = Env::new();
    env.json(&["mb", &env.path("")]);

    let added = env.json(&["policy", "set", &env.path("readers"), "start=0;expiry=1;p=rl"]);
    assert_eq!(added["outcome"], "added");

    // Non-interactive without --force declines the overwrite.
    let declined = env.json(&["policy", "set", &env.path("readers"), "expiry=2;p=r"]);
    assert_eq!(declined["outcome"], "cancelled");

    let updated = env.json(&["policy", "set", &env.path("readers"), "expiry=2;p=r", "--force"]);
    assert_eq!(updated["outcome"], "updated");

    let policies = env.json(&["policy", "ls", &env.path("")]);
    assert_eq!(policies["policies"]["readers"]["permissions"], "r");

    let token = env.json(&["sas", "container", &env.path(""), "policy=readers"]);
    let token = token["token"].as_str().unwrap();
    assert!(token.starts_with("?sv="));
    assert!(token.contains("si=readers"));
}
