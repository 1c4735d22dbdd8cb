use std::fs;
use std::path::Path;
use std::process::Command;

const EDGES: &str = r#"{
    "labels": { "1": "F2V_INST_alloca", "2": "F2V_INST_load", "3": "F2V_GEP_buf", "4": "F2V_INST_ret" },
    "edges": [
        { "source": "main.0", "target": "main.1" },
        { "source": "main.1", "target": "main.2", "label_ids": [1, 3] },
        { "source": "main.2", "target": "read_buf.0", "label": "call", "location": "main.c:4" },
        { "source": "main.2", "target": "main.3", "label": "ret" },
        { "source": "main.3", "target": "main.4", "label_ids": [4] },
        { "source": "read_buf.0", "target": "read_buf.1", "label_ids": [2] },
        { "source": "read_buf.1", "target": "read_buf.2", "label_ids": [3, 4] },
        { "source": "read_buf.2", "target": "main.3", "label": "may_ret" }
    ]
}"#;

fn pdwalk(dir: &Path, args: &[&str]) -> String {
    let graph = dir.join("edges.json");
    fs::write(&graph, EDGES).unwrap();
    let out = Command::new(env!("CARGO_BIN_EXE_pdwalk"))
        .args(args)
        .arg("--graph")
        .arg(&graph)
        .env("RUST_LOG", "off")
        .output()
        .unwrap();
    assert!(
        out.status.success(),
        "pdwalk failed: {}",
        String::from_utf8_lossy(&out.stderr)
    );
    String::from_utf8(out.stdout).unwrap()
}

#[test]
fn walk_writes_one_walk_per_line() {
    let dir = tempfile::tempdir().unwrap();
    let text = pdwalk(dir.path(), &["walk", "--walks", "3", "--length", "20", "--seed", "4"]);
    let lines: Vec<&str> = text.lines().collect();
    assert!(!lines.is_empty());
    for line in &lines {
        assert!(line.split(' ').count() >= 2, "degenerate walk written: {line:?}");
        assert!(!line.contains("  "));
    }
    // Same seed, same corpus.
    assert_eq!(
        text,
        pdwalk(dir.path(), &["walk", "--walks", "3", "--length", "20", "--seed", "4"])
    );
}

#[test]
fn removed_label_groups_never_appear() {
    let dir = tempfile::tempdir().unwrap();
    let text = pdwalk(dir.path(), &["walk", "--walks", "5", "--no-types"]);
    assert!(!text.contains("F2V_GEP"));
    assert!(text.contains("F2V_INST"));
}

#[test]
fn distances_file_has_one_value_per_walk() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("walks.txt");
    let dist = dir.path().join("distances.csv");
    pdwalk(
        dir.path(),
        &[
            "walk",
            "--walks",
            "2",
            "--output",
            out.to_str().unwrap(),
            "--distances",
            dist.to_str().unwrap(),
        ],
    );
    let row = fs::read_to_string(&dist).unwrap();
    let values: Vec<usize> = row.trim().split(',').map(|v| v.parse().unwrap()).collect();
    let walks = fs::read_to_string(&out).unwrap().lines().count();
    assert!(values.len() >= walks);
    assert!(values.iter().all(|&d| d <= 1));
}

#[test]
fn flat_emits_function_sentences() {
    let dir = tempfile::tempdir().unwrap();
    let text = pdwalk(dir.path(), &["flat", "--rounds", "2"]);
    let lines: Vec<&str> = text.lines().collect();
    // main and read_buf, twice each.
    assert_eq!(lines.len(), 4);
    assert!(lines.contains(&"F2V_INST_alloca read_buf F2V_INST_ret"));
    assert!(lines.contains(&"F2V_INST_load F2V_GEP_buf"));
}
