//! End-to-end: per-run files to one stacked column archive.

#[cfg(feature = "io-npz")]
#[test]
fn test_collect_translate_stack() -> anyhow::Result<()> {
    use serde_json::json;
    use sheaf::collect::{CollectOptions, Collector};
    use sheaf::io::npz::load_npz;
    use sheaf::io::{Codec, SaveOptions};
    use sheaf::stack::Stacker;
    use sheaf::translate::{Schema, TranslateOptions, Translator};
    use std::fs;
    use std::path::PathBuf;
    use tempfile::TempDir;

    let dir = TempDir::new()?;
    let mut inputs = Vec::new();
    for i in 0..7u32 {
        let path = dir.path().join(format!("sample{i}.json"));
        let trace: Vec<f64> = (0..=i).map(f64::from).collect();
        let doc = json!({ format!("s{i}"): {"inputs": {"seed": i}, "outputs": {"trace": trace}} });
        fs::write(&path, serde_json::to_string(&doc)?)?;
        inputs.push(path);
    }

    let codec = Codec::new();
    let bundle = dir.path().join("bundle.cbin");
    let collect = Collector::new(
        codec.clone(),
        CollectOptions {
            chunk_size: Some(3),
            add_uuid: false,
            save: SaveOptions::default(),
        },
    )
    .collect(&inputs, &bundle)?;
    assert_eq!(collect.outputs().count(), 3);

    let flat = dir.path().join("flat.npz");
    let translated = Translator::new(codec, TranslateOptions::default()).translate_chunks(
        &bundle,
        &flat,
        &Schema::parse("inputs/seed,outputs/trace"),
        None,
    )?;
    assert!(translated.is_success());

    let mut parts: Vec<PathBuf> = translated.chunks.iter().filter_map(|c| c.output.clone()).collect();
    parts.sort();
    let target = dir.path().join("all.npz");
    let report = Stacker::new(false).run(&target, &parts)?;
    assert!(report.is_success());

    let table = load_npz(&target)?;
    let seeds = table.get("inputs/seed").expect("seed column");
    assert_eq!(seeds.shape(), [7, 1]);
    assert_eq!(seeds.data(), [0.0, 1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);

    let traces = table.get("outputs/trace").expect("trace column");
    assert_eq!(traces.shape(), [7, 7]);
    let last_row = &traces.data()[42..];
    assert_eq!(last_row, [0.0, 1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
    assert!(traces.data()[1].is_nan());
    Ok(())
}
