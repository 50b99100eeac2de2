//! Writing small parameter files from `key=value` assignments.
//!
//! ```
//! use sheaf::serialize::nested_from_assignments;
//! use serde_json::json;
//!
//! let doc = nested_from_assignments(&["run/n=3", "run/rate=0.5", "name=baseline"], "/", "=").unwrap();
//! assert_eq!(doc, json!({"run": {"n": 3, "rate": 0.5}, "name": "baseline"}));
//! ```

use anyhow::{Context, Result, bail};
use serde::Serialize;
use serde_json::{Map, Number, Value as Json};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// `true`/`false` (any case) → bool, all digits → integer, anything `f64`
/// parses with a JSON spelling → number, otherwise the string itself.
pub fn parse_scalar(raw: &str) -> Json {
    if raw.eq_ignore_ascii_case("true") {
        return Json::Bool(true);
    }
    if raw.eq_ignore_ascii_case("false") {
        return Json::Bool(false);
    }
    if !raw.is_empty() && raw.bytes().all(|b| b.is_ascii_digit()) {
        if let Ok(n) = raw.parse::<u64>() {
            return Json::Number(n.into());
        }
    }
    raw.parse::<f64>()
        .ok()
        .and_then(Number::from_f64)
        .map(Json::Number)
        .unwrap_or_else(|| Json::String(raw.to_string()))
}

/// Build a nested object from assignments like `a/b=1`. Later assignments
/// win; an assignment below a path that holds a scalar replaces the scalar
/// with an object.
///
/// # Errors
///
/// Fails when an assignment has no `delimiter` or an empty key.
pub fn nested_from_assignments<S: AsRef<str>>(vars: &[S], splitter: &str, delimiter: &str) -> Result<Json> {
    let mut root = Map::new();
    for var in vars {
        let var = var.as_ref();
        let Some((keys, raw)) = var.split_once(delimiter) else {
            bail!("'{var}' is not a {delimiter}-separated assignment");
        };
        let keys: Vec<&str> = keys.split(splitter).collect();
        let Some((last, parents)) = keys.split_last().filter(|(last, _)| !last.is_empty()) else {
            bail!("'{var}' has an empty key");
        };
        let mut cur = &mut root;
        for key in parents {
            let slot = cur
                .entry(key.to_string())
                .or_insert_with(|| Json::Object(Map::new()));
            if !slot.is_object() {
                tracing::warn!(key, assignment = var, "replacing scalar with nested values");
                *slot = Json::Object(Map::new());
            }
            cur = match slot {
                Json::Object(map) => map,
                _ => unreachable!("slot was just made an object"),
            };
        }
        cur.insert(last.to_string(), parse_scalar(raw));
    }
    Ok(Json::Object(root))
}

fn sorted(value: Json) -> Json {
    match value {
        Json::Object(map) => {
            let mut entries: Vec<(String, Json)> = map.into_iter().collect();
            entries.sort_by(|a, b| a.0.cmp(&b.0));
            Json::Object(entries.into_iter().map(|(k, v)| (k, sorted(v))).collect())
        }
        Json::Array(items) => Json::Array(items.into_iter().map(sorted).collect()),
        other => other,
    }
}

/// Write `value` as JSON with keys sorted; `indent` pretty-prints with four
/// spaces.
pub fn write_serialized(path: impl AsRef<Path>, value: &Json, indent: bool) -> Result<()> {
    let path = path.as_ref();
    let value = sorted(value.clone());
    let file = File::create(path).with_context(|| format!("create {}", path.display()))?;
    let mut w = BufWriter::new(file);
    let written = if indent {
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
        let mut ser = serde_json::Serializer::with_formatter(&mut w, formatter);
        value.serialize(&mut ser)
    } else {
        serde_json::to_writer(&mut w, &value)
    };
    written.with_context(|| format!("write {}", path.display()))?;
    w.flush().with_context(|| format!("flush {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn scalars_are_typed() {
        assert_eq!(parse_scalar("TRUE"), json!(true));
        assert_eq!(parse_scalar("false"), json!(false));
        assert_eq!(parse_scalar("42"), json!(42));
        assert_eq!(parse_scalar("-1.5e3"), json!(-1500.0));
        assert_eq!(parse_scalar("nan"), json!("nan"));
        assert_eq!(parse_scalar("cheese"), json!("cheese"));
    }

    #[test]
    fn custom_splitter_and_delimiter() {
        let doc = nested_from_assignments(&["a.b:1", "a.c:x"], ".", ":").unwrap();
        assert_eq!(doc, json!({"a": {"b": 1, "c": "x"}}));
        assert!(nested_from_assignments(&["novalue"], "/", "=").is_err());
        assert!(nested_from_assignments(&["a/=1"], "/", "=").is_err());
    }

    #[test]
    fn written_keys_are_sorted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.json");
        let doc = nested_from_assignments(&["spam=cheese", "monkey=nugget"], "/", "=").unwrap();
        write_serialized(&path, &doc, false).unwrap();
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            r#"{"monkey":"nugget","spam":"cheese"}"#
        );
    }
}
