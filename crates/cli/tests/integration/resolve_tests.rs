//! `kiln resolve` integration tests.

use predicates::prelude::*;

use super::common::TestEnv;

#[test]
fn resolve_lists_exports() {
  let env = TestEnv::project(r#"{ "dir": "target" }"#);

  env
    .kiln_cmd()
    .args(["resolve", "alpha"])
    .assert()
    .success()
    .stdout(predicate::str::contains("Resolved alpha"))
    .stdout(predicate::str::contains("greet"))
    .stdout(predicate::str::contains("function"));
}

#[test]
fn resolve_calls_function_with_arguments() {
  let env = TestEnv::project(r#"{ "dir": "target" }"#);

  env
    .kiln_cmd()
    .args(["resolve", "alpha", "--call", "greet", "--arg", "kiln"])
    .assert()
    .success()
    .stdout(predicate::str::diff("hello kiln\n"));
}

#[test]
fn resolve_call_returning_number() {
  let env = TestEnv::project(r#"{ "dir": "target" }"#);

  env
    .kiln_cmd()
    .args(["resolve", "alpha", "--call", "answer"])
    .assert()
    .success()
    .stdout(predicate::str::diff("42\n"));
}

#[test]
fn resolve_call_json_output() {
  let env = TestEnv::project(r#"{ "dir": "target", "store": "memory" }"#);

  let output = env
    .kiln_cmd()
    .args(["resolve", "alpha", "--call", "info", "-o", "json"])
    .output()
    .unwrap();
  assert!(output.status.success());

  let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
  assert_eq!(json["function"], "info");
  assert_eq!(json["result"]["name"], "alpha");
  assert_eq!(json["result"]["tags"], serde_json::json!(["a", "b"]));
  assert!(!env.path("target").exists());
}

#[test]
fn resolve_from_combined_bundle() {
  let env = TestEnv::project(r#"{ "dir": "target", "mode": "combined" }"#);

  let output = env.kiln_cmd().args(["resolve", "beta", "-o", "json"]).output().unwrap();
  assert!(output.status.success());

  let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
  assert_eq!(json["exports"]["name"], "string");
}

#[test]
fn resolve_unknown_entry_fails() {
  let env = TestEnv::project(r#"{ "dir": "target" }"#);

  env
    .kiln_cmd()
    .args(["resolve", "gamma"])
    .assert()
    .failure()
    .stderr(predicate::str::contains("unknown artifact: gamma"));
}

#[test]
fn resolve_runtime_error_fails() {
  let env = TestEnv::project(r#"{ "dir": "target" }"#);
  env.write_file("src/alpha.lua", "error('kaboom')");

  env
    .kiln_cmd()
    .args(["resolve", "alpha"])
    .assert()
    .failure()
    .stderr(predicate::str::contains("kaboom"));
}
