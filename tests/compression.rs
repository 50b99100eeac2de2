//! Leaf compression in `.cbin` bundles, one test per built-in codec.

#[cfg(any(
    feature = "compression-gzip",
    feature = "compression-zstd",
    feature = "compression-bzip2",
    feature = "compression-xz"
))]
mod compression_tests {
    use sheaf::io::cbin::sidecar_path;
    use sheaf::io::compression::CompressionRegistry;
    use sheaf::io::{Codec, SaveOptions};
    use sheaf::tree::{Leaf, Node, Value};
    use std::fs;
    use tempfile::TempDir;

    fn repetitive_tree() -> Node {
        let mut node = Node::new();
        let ramp: Vec<f64> = (0..4096).map(|i| f64::from(i % 16)).collect();
        node.insert_path("run_0/outputs/ramp", ramp);
        node.insert_path("run_0/inputs/label", "repetitive");
        node
    }

    fn round_trip(codec_name: &str) -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let plain = dir.path().join("plain.cbin");
        let packed = dir.path().join(format!("{codec_name}.cbin"));
        let codec = Codec::new();
        let tree = repetitive_tree();

        codec.save(&tree, &plain, &SaveOptions::plain())?;
        let options = SaveOptions {
            compression: Some(codec_name.to_string()),
            ..SaveOptions::default()
        };
        codec.save(&tree, &packed, &options)?;

        assert!(fs::metadata(&packed)?.len() < fs::metadata(&plain)?.len() / 4);
        let layout = fs::read_to_string(sidecar_path(&packed))?;
        assert!(layout.contains(&format!("\"{codec_name}\"")));

        let back = codec.load_node(&packed)?;
        assert_eq!(back, tree);
        assert_eq!(
            back.get("run_0/inputs/label").and_then(Value::as_leaf),
            Some(&Leaf::from("repetitive"))
        );
        Ok(())
    }

    #[test]
    fn test_builtin_names() {
        let registry = CompressionRegistry::builtin();
        for name in registry.names() {
            assert!(registry.get(name).is_some());
        }
        assert!(registry.get("lz4").is_none());
    }

    #[cfg(feature = "compression-gzip")]
    #[test]
    fn test_gzip_leaves() -> anyhow::Result<()> {
        round_trip("gzip")
    }

    #[cfg(feature = "compression-zstd")]
    #[test]
    fn test_zstd_leaves() -> anyhow::Result<()> {
        round_trip("zstd")
    }

    #[cfg(feature = "compression-bzip2")]
    #[test]
    fn test_bzip2_leaves() -> anyhow::Result<()> {
        round_trip("bzip2")
    }

    #[cfg(feature = "compression-xz")]
    #[test]
    fn test_xz_leaves() -> anyhow::Result<()> {
        round_trip("xz")
    }

    #[test]
    fn test_unknown_codec_stores_raw() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let path = dir.path().join("raw.cbin");
        let codec = Codec::new();
        let options = SaveOptions {
            compression: Some("lz4".to_string()),
            ..SaveOptions::default()
        };
        codec.save(&repetitive_tree(), &path, &options)?;
        assert_eq!(codec.load_node(&path)?, repetitive_tree());
        Ok(())
    }
}
