use crate::error::Result;
use serde::Serialize;
use std::fs;
use std::path::Path;

/// Write records as a pretty-printed JSON array, creating parent directories
pub fn write_json<T: Serialize>(path: &Path, records: &[T]) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let contents = serde_json::to_string_pretty(records)?;
    fs::write(path, contents)?;
    tracing::debug!(path = %path.display(), records = records.len(), "Wrote JSON");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Serialize)]
    struct Row {
        name: &'static str,
        count: u32,
    }

    #[test]
    fn test_write_json_array() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("rows.json");

        write_json(&path, &[Row { name: "a", count: 1 }, Row { name: "b", count: 2 }]).unwrap();

        let value: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value.as_array().unwrap().len(), 2);
        assert_eq!(value[1]["name"], "b");
    }

    #[test]
    fn test_write_empty_array() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.json");
        write_json::<Row>(&path, &[]).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "[]");
    }
}
