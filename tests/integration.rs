use predicates::prelude::*;
use std::process::Command;
use tempfile::TempDir;

fn cmd() -> assert_cmd::Command {
    assert_cmd::Command::from(Command::new(env!("CARGO_BIN_EXE_csyms")))
}

fn fixture_path(name: &str) -> String {
    format!("{}/tests/fixtures/{}", env!("CARGO_MANIFEST_DIR"), name)
}

fn run_yaml(args: &[&str]) -> serde_yaml::Value {
    let assert = cmd().args(args).assert().success();
    serde_yaml::from_slice(&assert.get_output().stdout).unwrap()
}

fn keys(table: &serde_yaml::Value) -> Vec<String> {
    table
        .as_mapping()
        .unwrap()
        .keys()
        .map(|k| k.as_str().unwrap().to_string())
        .collect()
}

fn strings(seq: &serde_yaml::Value) -> Vec<String> {
    seq.as_sequence()
        .unwrap()
        .iter()
        .map(|v| v.as_str().unwrap().to_string())
        .collect()
}

// -- usage and errors --

#[test]
fn no_file_prints_usage() {
    cmd()
        .assert()
        .success()
        .stdout(predicate::str::contains("Usage"))
        .stdout(predicate::str::contains("--file"));
}

#[test]
fn missing_options_file_fails() {
    cmd()
        .args(["-f", &fixture_path("math.c"), "-o", "/nonexistent/flags.txt"])
        .assert()
        .failure()
        .code(1)
        .stdout(predicate::str::is_empty())
        .stderr(predicate::str::contains("couldn't open options file"));
}

#[test]
fn missing_target_fails() {
    cmd()
        .args(["-f", "/nonexistent/module.c"])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("could not read file"));
}

#[test]
fn unknown_format_fails() {
    cmd()
        .args(["-f", &fixture_path("math.c"), "--format", "xml"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown format"));
}

// -- default extraction --

#[test]
fn document_name_and_reserved_headers() {
    let doc = run_yaml(&["-f", &fixture_path("math.c")]);
    assert_eq!(doc["name"].as_str(), Some("math.c"));
    assert!(doc["headers"].as_sequence().unwrap().is_empty());
}

#[test]
fn functions_with_bodies_only() {
    let doc = run_yaml(&["-f", &fixture_path("math.c")]);
    assert_eq!(keys(&doc["functions"]), vec!["helper", "add", "run"]);

    let add = &doc["functions"]["add"];
    assert_eq!(add["class"].as_str(), Some("normal"));
    assert_eq!(add["returns"].as_str(), Some("int"));
    let args = add["args"].as_sequence().unwrap();
    assert_eq!(args.len(), 2);
    assert_eq!(args[0]["name"].as_str(), Some("a"));
    assert_eq!(args[0]["type"].as_str(), Some("int"));
    assert_eq!(args[0]["size"].as_i64(), Some(4));
    assert_eq!(args[1]["name"].as_str(), Some("b"));
    assert!(add["calls"].as_sequence().unwrap().is_empty());
    assert!(add["docs"].as_mapping().unwrap().is_empty());

    assert_eq!(doc["functions"]["helper"]["class"].as_str(), Some("static"));
    assert!(doc["functions"]["helper"]["args"].as_sequence().unwrap().is_empty());
}

#[test]
fn variables_from_target_only() {
    let doc = run_yaml(&["-f", &fixture_path("math.c")]);
    let vars = &doc["variables"];
    assert_eq!(keys(vars), vec!["counter", "shared", "ratio"]);
    assert_eq!(vars["counter"]["class"].as_str(), Some("static"));
    assert_eq!(vars["counter"]["type"].as_str(), Some("int"));
    assert_eq!(vars["shared"]["class"].as_str(), Some("extern"));
    assert_eq!(vars["ratio"]["class"].as_str(), Some("global"));
    assert_eq!(vars["ratio"]["type"].as_str(), Some("double"));
}

#[test]
fn typedefs_by_kind() {
    let doc = run_yaml(&["-f", &fixture_path("math.c")]);
    let types = &doc["types"];
    assert_eq!(keys(types), vec!["Color", "point_t", "ulong"]);

    assert_eq!(types["Color"]["type"].as_str(), Some("enum"));
    assert_eq!(types["Color"]["values"]["RED"].as_i64(), Some(0));
    assert_eq!(types["Color"]["values"]["GREEN"].as_i64(), Some(5));
    assert_eq!(types["Color"]["values"]["BLUE"].as_i64(), Some(6));

    assert_eq!(types["point_t"]["type"].as_str(), Some("struct"));
    let members = types["point_t"]["members"].as_sequence().unwrap();
    assert_eq!(members.len(), 2);
    assert_eq!(members[0]["name"].as_str(), Some("x"));
    assert_eq!(members[1]["name"].as_str(), Some("y"));
    assert_eq!(members[1]["type"].as_str(), Some("int"));

    assert_eq!(types["ulong"]["type"].as_str(), Some("unsigned long"));
    for name in ["Color", "point_t", "ulong"] {
        assert!(types[name]["invariants"].as_mapping().unwrap().is_empty());
    }
    assert!(types["ulong"].get("docs").is_none());
}

// -- flags --

#[test]
fn calls_in_encounter_order() {
    let doc = run_yaml(&["-f", &fixture_path("math.c"), "-c"]);
    assert_eq!(
        strings(&doc["functions"]["run"]["calls"]),
        vec!["add", "helper", "util_max", "helper"]
    );
    assert!(doc["functions"]["add"]["calls"].as_sequence().unwrap().is_empty());
}

#[test]
fn header_mode_keeps_prototypes() {
    let doc = run_yaml(&["-f", &fixture_path("math.c"), "-H"]);
    let proto = &doc["functions"]["prototype_only"];
    let args = proto["args"].as_sequence().unwrap();
    assert_eq!(args[0]["type"].as_str(), Some("const char *"));
    assert_eq!(args[0]["size"].as_i64(), Some(8));
    assert_eq!(args[1]["type"].as_str(), Some("point_t"));
    assert_eq!(args[1]["size"].as_i64(), Some(8));
    assert_eq!(args[2]["type"].as_str(), Some("struct opaque *"));
    // util_max is declared in an included header
    assert!(doc["functions"].get("util_max").is_none());
}

#[test]
fn all_files_mode_includes_headers() {
    let doc = run_yaml(&["-f", &fixture_path("math.c"), "-a", "-H"]);
    assert!(doc["functions"].get("util_max").is_some());
    assert_eq!(doc["variables"]["util_level"]["class"].as_str(), Some("global"));
    assert_eq!(doc["types"]["util_id"]["type"].as_str(), Some("int"));
}

#[test]
fn docs_attached_when_enabled() {
    let doc = run_yaml(&["-f", &fixture_path("math.c"), "-d"]);
    assert_eq!(doc["functions"]["add"]["docs"]["raw"].as_str(), Some("Add two integers."));
    assert!(doc["functions"]["run"]["docs"].as_mapping().unwrap().is_empty());
    assert_eq!(doc["types"]["Color"]["docs"]["raw"].as_str(), Some("Color channels."));
    assert_eq!(doc["types"]["point_t"]["docs"]["raw"].as_str(), Some("A point in the plane."));
}

#[test]
fn includes_flag_has_no_effect() {
    let plain = cmd().args(["-f", &fixture_path("math.c")]).assert().success();
    let with_flag = cmd().args(["-f", &fixture_path("math.c"), "-i"]).assert().success();
    assert_eq!(plain.get_output().stdout, with_flag.get_output().stdout);
}

#[test]
fn options_file_defines_macros() {
    let doc = run_yaml(&["-f", &fixture_path("feature.c"), "-o", &fixture_path("flags.txt")]);
    assert_eq!(keys(&doc["functions"]), vec!["feature_two"]);

    let doc = run_yaml(&["-f", &fixture_path("feature.c")]);
    assert_eq!(keys(&doc["functions"]), vec!["feature_none"]);
}

#[test]
fn output_file_creates_directories() {
    let dir = TempDir::new().unwrap();
    let out = dir.path().join("nested/deeper/math.yaml");

    cmd()
        .args(["-f", &fixture_path("math.c"), "-O", out.to_str().unwrap()])
        .assert()
        .success()
        .stdout(predicate::str::is_empty());

    let content = std::fs::read_to_string(&out).unwrap();
    assert!(content.starts_with("name: math.c\n"));
}

#[test]
fn json_format() {
    let assert = cmd()
        .args(["-f", &fixture_path("math.c"), "--format", "json"])
        .assert()
        .success();
    let doc: serde_json::Value = serde_json::from_slice(&assert.get_output().stdout).unwrap();
    assert_eq!(doc["name"], "math.c");
    assert_eq!(doc["functions"]["add"]["args"][1]["size"], 4);
    assert_eq!(doc["variables"]["counter"]["class"], "static");
    assert_eq!(doc["headers"], serde_json::json!([]));
}

#[test]
fn macros_in_enumerators_and_callees() {
    let doc = run_yaml(&["-f", &fixture_path("macros.c"), "-c"]);
    let values = &doc["types"]["Flags"]["values"];
    assert_eq!(keys(values), vec!["A", "B", "C"]);
    assert_eq!(values["A"].as_i64(), Some(8));
    assert_eq!(values["B"].as_i64(), Some(4));
    assert_eq!(values["C"].as_i64(), Some(5));
    assert_eq!(strings(&doc["functions"]["f"]["calls"]), vec!["log_write", "malloc"]);
}

#[test]
fn latin1_sources_are_read() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("legacy.h"), b"/* r\xe9glage */\nint legacy_level;\n").unwrap();
    let target = dir.path().join("legacy.c");
    std::fs::write(
        &target,
        b"#include \"legacy.h\"\n/* caf\xe9 */\nint answer(void) { return 42; }\n",
    )
    .unwrap();

    let doc = run_yaml(&["-f", target.to_str().unwrap(), "-a"]);
    assert_eq!(keys(&doc["functions"]), vec!["answer"]);
    assert_eq!(doc["variables"]["legacy_level"]["class"].as_str(), Some("global"));
}

// -- C++ --

#[test]
fn cpp_methods_and_templates() {
    let doc = run_yaml(&["-f", &fixture_path("shapes.cpp"), "-c"]);
    let functions = &doc["functions"];
    assert_eq!(keys(functions), vec!["scaled", "area", "twice", "main"]);
    assert_eq!(strings(&functions["scaled"]["calls"]), vec!["area"]);
    assert_eq!(strings(&functions["area"]["calls"]), vec!["compute"]);
    assert_eq!(strings(&functions["main"]["calls"]), vec!["area"]);

    let twice = &functions["twice"];
    assert_eq!(twice["returns"].as_str(), Some("T"));
    assert_eq!(twice["args"][0]["size"].as_i64(), Some(-1));

    let instances = &doc["variables"]["instances"];
    assert_eq!(instances["type"].as_str(), Some("int"));
    assert!(instances.get("class").is_none());
}
