//! Integration tests for flattening bundles into columns.

use serde_json::json;
use sheaf::collect::{CollectOptions, Collector};
use sheaf::columns::Column;
use sheaf::io::{Codec, SaveOptions};
use sheaf::translate::{Schema, TranslateOptions, Translator};
use sheaf::tree::pack;
use sheaf::SheafError;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

fn translator() -> Translator {
    Translator::new(Codec::new(), TranslateOptions::default())
}

fn write_bundle(path: &Path, value: serde_json::Value) -> anyhow::Result<()> {
    Codec::new().save(&pack(&value).into_node(), path, &SaveOptions::default())?;
    Ok(())
}

fn column(shape: &[usize], data: &[f64]) -> Column {
    Column::new(shape.to_vec(), data.to_vec()).expect("shape covers data")
}

fn assert_nan_aware_eq(actual: &Column, expected: &Column) {
    assert_eq!(actual.shape(), expected.shape());
    for (a, e) in actual.data().iter().zip(expected.data()) {
        assert!((a.is_nan() && e.is_nan()) || a == e, "{:?} != {:?}", actual, expected);
    }
}

#[test]
fn test_auto_schema_uses_first_sample() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    let bundle = dir.path().join("bundle.cbin");
    write_bundle(&bundle, json!({"s1": {"x": 1, "y": 2}, "s2": {"x": 3, "y": 4}}))?;

    let table = translator().translate_table(&bundle, &Schema::Auto)?;
    assert_eq!(table.keys().collect::<Vec<_>>(), ["x", "y"]);
    assert_eq!(table.get("x"), Some(&column(&[2, 1], &[1.0, 3.0])));
    assert_eq!(table.get("y"), Some(&column(&[2, 1], &[2.0, 4.0])));
    Ok(())
}

#[test]
fn test_missing_values_become_nan_rows() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    let bundle = dir.path().join("bundle.json");
    write_bundle(
        &bundle,
        json!({
            "s1": {"x": 1, "y": [1, 2, 3], "tag": "a"},
            "s2": {"y": [4, 5]},
            "s3": {"x": 7, "y": [6], "tag": "c"}
        }),
    )?;
    let out = dir.path().join("columns.json");

    let report = translator().translate(&bundle, &out, &Schema::Auto)?;
    assert_eq!(report.samples, 3);
    assert_eq!(report.output, out);
    assert_eq!(report.columns, ["x", "y/data", "tag"]);
    // s2 lacks x and tag; every tag is a string.
    assert_eq!(report.missing_count(), 4);

    let table = translator().translate_table(&bundle, &Schema::Auto)?;
    let nan = f64::NAN;
    assert_nan_aware_eq(table.get("x").expect("x"), &column(&[3, 1], &[1.0, nan, 7.0]));
    assert_nan_aware_eq(
        table.get("y/data").expect("y"),
        &column(&[3, 3], &[1.0, 2.0, 3.0, 4.0, 5.0, nan, 6.0, nan, nan]),
    );
    assert_eq!(table.get("tag").map(Column::rows), Some(3));

    let written = Codec::new().load_node(&out)?;
    assert!(written.has_path("x/data"));
    assert!(written.has_path("y/data/metadata/shape"));
    Ok(())
}

#[test]
fn test_slashed_keys_are_nested_paths() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    let raw = dir.path().join("raw.json");
    fs::write(
        &raw,
        r#"{"s1": {"outputs/y": 5, "x": 1}, "s2": {"outputs/y": 6, "x": 2}}"#,
    )?;

    let table = translator().translate_table(&raw, &Schema::Auto)?;
    assert_eq!(table.keys().collect::<Vec<_>>(), ["outputs/y", "x"]);
    assert_eq!(table.get("outputs/y"), Some(&column(&[2, 1], &[5.0, 6.0])));

    let codec = Codec::new();
    let bundle = dir.path().join("bundle.cbin");
    let tree = codec.load_node(&raw)?;
    codec.save(&tree, &bundle, &SaveOptions::default())?;
    let back = codec.load_node(&bundle)?;
    assert_eq!(back, tree);
    assert_eq!(back.get_node("s1").map(|n| n.child_names()), Some(vec!["outputs".to_string(), "x".to_string()]));

    let report = translator().translate(&bundle, dir.path().join("cols.cbin"), &Schema::Auto)?;
    assert_eq!(report.missing_count(), 0);
    Ok(())
}

#[test]
fn test_path_list_schema() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    let bundle = dir.path().join("bundle.cbin");
    write_bundle(
        &bundle,
        json!({
            "s1": {"inputs": {"a": 1, "b": 2}, "outputs": {"y": 3}, "extra": 9},
            "s2": {"inputs": {"a": 4, "b": 5}, "outputs": {"y": 6}, "extra": 9}
        }),
    )?;
    let out = dir.path().join("cols.json");
    let report = translator().translate(&bundle, &out, &Schema::parse("inputs, outputs/y, nowhere"))?;
    assert_eq!(report.columns, ["inputs/a", "inputs/b", "outputs/y"]);
    assert_eq!(report.unmatched, ["nowhere"]);
    assert_eq!(report.missing_count(), 0);
    Ok(())
}

#[test]
fn test_schema_file() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    let bundle = dir.path().join("bundle.json");
    write_bundle(&bundle, json!({"s1": {"x": 1, "y": 2}, "s2": {"x": 3, "z": 4}}))?;
    let schema = dir.path().join("schema.json");
    fs::write(&schema, r#"{"z": 0, "x": 0}"#)?;

    let table = translator().translate_table(&bundle, &Schema::parse(&schema.to_string_lossy()))?;
    assert_eq!(table.keys().collect::<Vec<_>>(), ["z", "x"]);
    assert_nan_aware_eq(table.get("z").expect("z"), &column(&[2, 1], &[f64::NAN, 4.0]));
    Ok(())
}

#[test]
fn test_empty_bundle_is_an_error() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    let bundle = dir.path().join("empty.json");
    fs::write(&bundle, "{}")?;
    let err = translator()
        .translate(&bundle, dir.path().join("out.json"), &Schema::Auto)
        .err()
        .expect("empty bundle");
    assert!(matches!(err.downcast_ref::<SheafError>(), Some(SheafError::EmptyBundle(_))));
    Ok(())
}

#[cfg(feature = "io-npz")]
#[test]
fn test_translate_to_npz() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    let bundle = dir.path().join("bundle.cbin");
    write_bundle(&bundle, json!({"s1": {"v": [1.5, 2.5]}, "s2": {"v": [3.5, 4.5]}}))?;
    let out = dir.path().join("cols.npz");

    translator().translate(&bundle, &out, &Schema::Auto)?;
    let table = sheaf::io::npz::load_npz(&out)?;
    assert_eq!(table.get("v/data"), Some(&column(&[2, 2], &[1.5, 2.5, 3.5, 4.5])));
    Ok(())
}

#[test]
fn test_translate_chunks_from_collected_bundles() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    let runs = dir.path().join("runs");
    fs::create_dir_all(&runs)?;
    let inputs = (0..5)
        .map(|i| {
            let path = runs.join(format!("run{i}.json"));
            fs::write(&path, serde_json::to_string(&json!({ format!("s{i}"): {"x": i} }))?)?;
            Ok(path)
        })
        .collect::<anyhow::Result<Vec<PathBuf>>>()?;

    let bundle = dir.path().join("bundle.json");
    let options = CollectOptions {
        chunk_size: Some(2),
        ..CollectOptions::default()
    };
    Collector::new(Codec::new(), options).collect(&inputs, &bundle)?;

    let out = dir.path().join("flat.json");
    let report = translator().translate_chunks(&bundle, &out, &Schema::Auto, Some(2))?;
    assert!(report.is_success());
    assert_eq!(report.chunks.len(), 3);

    let mut outputs: Vec<PathBuf> = report.chunks.iter().filter_map(|c| c.output.clone()).collect();
    outputs.sort();
    assert_eq!(
        outputs,
        ["flat_000.json", "flat_001.json", "flat_002.json"].map(|n| dir.path().join(n))
    );
    let rows: usize = report
        .chunks
        .iter()
        .filter_map(|c| c.report.as_ref())
        .map(|r| r.samples)
        .sum();
    assert_eq!(rows, 5);
    Ok(())
}

#[test]
fn test_chunk_without_id_is_reported() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    let bundle = dir.path().join("b.json");
    write_bundle(&dir.path().join("b_001.json"), json!({"s": {"x": 1}}))?;
    write_bundle(&dir.path().join("bextra.json"), json!({"s": {"x": 2}}))?;

    let report = translator().translate_chunks(&bundle, dir.path().join("o.json"), &Schema::Auto, None)?;
    assert_eq!(report.chunks.len(), 2);
    assert!(!report.is_success());
    let failed: Vec<_> = report.failures().collect();
    assert_eq!(failed.len(), 1);
    assert!(failed[0].input.ends_with("bextra.json"));
    assert!(dir.path().join("o_001.json").is_file());
    Ok(())
}
