//! CLI integration tests against a real on-disk corpus in a temp
//! directory.

use std::fs;
use std::path::{Path, PathBuf};

use assert_cmd::Command;
use predicates::prelude::*;

/// Lay out a minimal corpus under `<tmp>/MathHub` and return its root.
fn write_corpus(tmp: &Path) -> PathBuf {
    let root = tmp.join("MathHub");
    let repo = root.join("smglom").join("numbers");
    fs::create_dir_all(repo.join(".git")).unwrap();
    fs::create_dir_all(repo.join("META-INF")).unwrap();
    fs::create_dir_all(repo.join("source")).unwrap();
    fs::write(
        repo.join("META-INF").join("MANIFEST.MF"),
        "id: smglom/numbers\n",
    )
    .unwrap();
    fs::write(
        repo.join("source").join("sig.tex"),
        "\\begin{modsig}{sig}\n\\symi{foo}\n\\end{modsig}\n",
    )
    .unwrap();
    fs::write(
        repo.join("source").join("sig.en.tex"),
        "\\begin{mhmodnl}{sig}{en}\n\\defi{foo}\n\\end{mhmodnl}\n",
    )
    .unwrap();
    fs::write(
        repo.join("source").join("root.tex"),
        "\\begin{omgroup}{Ch1}\n\\mhinputref{doc}\n\\end{omgroup}\n",
    )
    .unwrap();
    fs::write(
        repo.join("source").join("doc.tex"),
        "\\begin{module}[id=doc]\n\\importmhmodule{sig}\n\\mtrefi[sig?foo]{foo}\n\\end{module}\n",
    )
    .unwrap();
    root
}

#[test]
fn harvest_prints_a_summary() {
    let tmp = tempfile::tempdir().unwrap();
    let root = write_corpus(tmp.path());

    Command::cargo_bin("stexmap")
        .unwrap()
        .arg("harvest")
        .arg(&root)
        .assert()
        .success()
        .stdout(predicate::str::contains("1 repositories"))
        .stdout(predicate::str::contains("4 files"))
        .stdout(predicate::str::contains("0 unresolved references"));
}

#[test]
fn harvest_json_lists_symbols() {
    let tmp = tempfile::tempdir().unwrap();
    let root = write_corpus(tmp.path());

    let output = Command::cargo_bin("stexmap")
        .unwrap()
        .arg("--output")
        .arg("json")
        .arg("harvest")
        .arg(&root)
        .output()
        .unwrap();
    assert!(output.status.success());

    let value: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let symbols = value["symbols"].as_array().unwrap();
    assert_eq!(symbols.len(), 1);
    assert_eq!(symbols[0]["name"], "foo");
    assert_eq!(symbols[0]["module"], "sig");
    assert_eq!(symbols[0]["repo"], "smglom/numbers");
    // the defi verbalization and the trefi reference
    assert_eq!(symbols[0]["used"], 2);
}

#[test]
fn graph_emits_schema_shaped_json() {
    let tmp = tempfile::tempdir().unwrap();
    let root = write_corpus(tmp.path());
    let root_doc = root
        .join("smglom")
        .join("numbers")
        .join("source")
        .join("root.tex");

    let output = Command::cargo_bin("stexmap")
        .unwrap()
        .arg("graph")
        .arg(&root_doc)
        .output()
        .unwrap();
    assert!(output.status.success());

    let value: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let nodes = value["nodes"].as_array().unwrap();
    assert!(!nodes.is_empty());
    for node in nodes {
        assert!(node["id"].is_string());
        assert!(node["color"].is_string());
        assert!(node["label"].is_string());
    }
    let labels: Vec<&str> = nodes.iter().map(|n| n["label"].as_str().unwrap()).collect();
    assert!(labels.contains(&"Ch1"));
}

#[test]
fn graph_writes_to_out_file() {
    let tmp = tempfile::tempdir().unwrap();
    let root = write_corpus(tmp.path());
    let root_doc = root
        .join("smglom")
        .join("numbers")
        .join("source")
        .join("root.tex");
    let out = tmp.path().join("graph.json");

    Command::cargo_bin("stexmap")
        .unwrap()
        .arg("graph")
        .arg(&root_doc)
        .arg("--out")
        .arg(&out)
        .assert()
        .success();

    let value: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&out).unwrap()).unwrap();
    assert!(value["edges"].is_array());
}

#[test]
fn missing_corpus_root_fails() {
    let tmp = tempfile::tempdir().unwrap();
    Command::cargo_bin("stexmap")
        .unwrap()
        .arg("harvest")
        .arg(tmp.path().join("does-not-exist"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("not a directory"));
}

#[test]
fn graph_outside_a_corpus_fails() {
    let tmp = tempfile::tempdir().unwrap();
    let doc = tmp.path().join("doc.tex");
    fs::write(&doc, "\\begin{module}[id=doc]\\end{module}\n").unwrap();

    Command::cargo_bin("stexmap")
        .unwrap()
        .arg("graph")
        .arg(&doc)
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to infer corpus root"));
}
