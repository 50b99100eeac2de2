//! Integration tests for merging per-sample files into bundles.

use serde_json::json;
use sheaf::collect::{CollectOptions, Collector, chunk_path, concat_json};
use sheaf::io::{Codec, SaveOptions};
use sheaf::partition::{WorkerRank, group_files, write_partitions};
use sheaf::tree::{Leaf, Value};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

fn write_json(dir: &Path, name: &str, value: serde_json::Value) -> anyhow::Result<PathBuf> {
    let path = dir.join(name);
    fs::write(&path, serde_json::to_string(&value)?)?;
    Ok(path)
}

fn sample_files(dir: &Path, n: usize) -> anyhow::Result<Vec<PathBuf>> {
    (0..n)
        .map(|i| write_json(dir, &format!("run_{i}.json"), json!({ format!("s{i}"): {"x": i, "y": [i, i + 1]} })))
        .collect()
}

fn collector(options: CollectOptions) -> Collector {
    Collector::new(Codec::new(), options)
}

#[test]
fn test_collect_merges_top_level_names() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    let inputs = sample_files(dir.path(), 3)?;
    let out = dir.path().join("bundle.cbin");

    let report = collector(CollectOptions::default()).collect(&inputs, &out)?;
    assert!(report.is_success());
    assert_eq!(report.groups.len(), 1);
    assert_eq!(report.groups[0].merged.len(), 3);
    assert_eq!(report.groups[0].children, 3);
    assert_eq!(report.groups[0].options_skipped, Some(false));

    let bundle = Codec::new().load_node(&out)?;
    assert_eq!(bundle.child_names(), ["s0", "s1", "s2"]);
    assert_eq!(bundle.get("s2/x").and_then(Value::as_leaf), Some(&Leaf::Int64(2)));
    Ok(())
}

#[test]
fn test_collect_renames_collisions() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    let a = write_json(dir.path(), "a.json", json!({"x": {"v": 1}, "y": {"v": 2}}))?;
    let b = write_json(dir.path(), "b.json", json!({"x": {"v": 3}}))?;
    let out = dir.path().join("bundle.json");

    let report = collector(CollectOptions::default()).collect(&[a, b], &out)?;
    let group = &report.groups[0];
    assert_eq!(group.renamed.len(), 1);
    let (original, renamed) = &group.renamed[0];
    assert_eq!(original, "x");
    assert!(renamed.starts_with("x-"));
    assert_eq!(renamed.len(), "x-".len() + 36);

    let bundle = Codec::new().load_node(&out)?;
    assert_eq!(bundle.child_names(), ["x", "y", renamed.as_str()]);
    assert_eq!(bundle.get("x/v").and_then(Value::as_leaf), Some(&Leaf::Int64(1)));
    assert_eq!(
        bundle.get(&format!("{renamed}/v")).and_then(Value::as_leaf),
        Some(&Leaf::Int64(3))
    );
    Ok(())
}

#[test]
fn test_collect_skips_bad_inputs() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    let good = write_json(dir.path(), "good.json", json!({"s": {"x": 1}}))?;
    let broken = dir.path().join("broken.json");
    fs::write(&broken, "{ not json")?;
    let missing = dir.path().join("missing.json");
    let out = dir.path().join("bundle.json");

    let report = collector(CollectOptions::default()).collect(&[good, broken, missing, PathBuf::new()], &out)?;
    assert!(report.is_success());
    assert_eq!(report.groups[0].merged.len(), 1);
    assert_eq!(report.skipped_count(), 2);
    assert_eq!(Codec::new().load_node(&out)?.child_names(), ["s"]);
    Ok(())
}

#[test]
fn test_collect_in_chunks() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    let inputs = sample_files(dir.path(), 5)?;
    let out = dir.path().join("out/bundle.json");

    let options = CollectOptions {
        chunk_size: Some(2),
        ..CollectOptions::default()
    };
    let report = collector(options).collect(&inputs, &out)?;
    let outputs: Vec<PathBuf> = report.outputs().cloned().collect();
    assert_eq!(outputs, [chunk_path(&out, 0), chunk_path(&out, 1), chunk_path(&out, 2)]);
    assert!(dir.path().join("out/bundle_002.json").is_file());
    assert!(!out.exists());

    let codec = Codec::new();
    assert_eq!(codec.load_node(&outputs[0])?.child_names(), ["s0", "s1"]);
    assert_eq!(codec.load_node(&outputs[2])?.child_names(), ["s4"]);
    Ok(())
}

#[test]
fn test_collect_with_uuid_keys() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    let a = write_json(dir.path(), "a.json", json!({"x": 1}))?;
    let b = write_json(dir.path(), "b.json", json!({"x": 2}))?;
    let out = dir.path().join("bundle.json");

    let options = CollectOptions {
        add_uuid: true,
        ..CollectOptions::default()
    };
    let report = collector(options).collect(&[a, b], &out)?;
    assert!(report.groups[0].renamed.is_empty());

    let bundle = Codec::new().load_node(&out)?;
    let names = bundle.child_names();
    assert_eq!(names.len(), 2);
    assert_ne!(names[0], names[1]);
    for name in &names {
        assert_eq!(name.len(), 36);
        assert!(bundle.has_path(&format!("{name}/x")));
    }
    Ok(())
}

#[test]
fn test_collect_rejects_unknown_output_format() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    let inputs = sample_files(dir.path(), 1)?;
    assert!(collector(CollectOptions::default()).collect(&inputs, dir.path().join("bundle")).is_err());
    Ok(())
}

#[test]
fn test_collect_reports_save_failures() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    let inputs = sample_files(dir.path(), 1)?;
    let report = collector(CollectOptions::default()).collect(&inputs, dir.path().join("bundle.silo"))?;
    assert!(!report.is_success());
    assert!(report.groups[0].error.is_some());
    Ok(())
}

#[test]
fn test_collect_partition() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    let inputs = sample_files(dir.path(), 5)?;
    let side = dir.path().join("partitions.json");
    write_partitions(&side, &group_files(&inputs, 2))?;
    let out = dir.path().join("part.cbin");

    let options = CollectOptions {
        save: SaveOptions::plain(),
        ..CollectOptions::default()
    };
    let collector = collector(options);
    let first = collector.collect_partition(&side, &out, WorkerRank::new(0, 2)?)?;
    let second = collector.collect_partition(&side, &out, WorkerRank::new(1, 2)?)?;
    assert_eq!(first.output, chunk_path(&out, 0));
    assert_eq!(second.output, chunk_path(&out, 1));
    assert_eq!(first.merged.len() + second.merged.len(), 5);

    let codec = Codec::new();
    let mut names = codec.load_node(&first.output)?.child_names();
    names.extend(codec.load_node(&second.output)?.child_names());
    assert_eq!(names, ["s0", "s1", "s2", "s3", "s4"]);

    assert!(collector.collect_partition(&side, &out, WorkerRank::new(2, 3)?).is_err());
    Ok(())
}

#[test]
fn test_concat_json_keeps_documents_whole() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    let a = write_json(dir.path(), "a.json", json!({"x": 1, "ok": true}))?;
    let b = write_json(dir.path(), "b.json", json!([1, 2]))?;
    let out = dir.path().join("nested/all.json");

    assert_eq!(concat_json(&[&a, &b], &out)?, 2);
    let written: serde_json::Value = serde_json::from_str(&fs::read_to_string(&out)?)?;
    assert_eq!(written, json!([{"x": 1, "ok": true}, [1, 2]]));
    Ok(())
}

#[test]
fn test_concat_json_fails_on_bad_input() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    let good = write_json(dir.path(), "good.json", json!({"x": 1}))?;
    let bad = dir.path().join("bad.json");
    fs::write(&bad, "{not json")?;
    let out = dir.path().join("all.json");

    assert!(concat_json(&[good, bad], &out).is_err());
    assert!(!out.exists());
    Ok(())
}
