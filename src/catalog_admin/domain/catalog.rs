use super::error::DomainError;
use serde::Serialize;
use serde_json::ser::PrettyFormatter;
use serde_json::Value;

const NAME_FIELD: &str = "name";
const IMAGE_FIELD: &str = "image";

/// 商品データベース (db.json) の中身
///
/// Records are opaque JSON objects; only `name` and `image` are interpreted.
#[derive(Debug, Clone, PartialEq)]
pub struct CatalogDocument {
    root: Value,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageMerge {
    Updated {
        records: usize,
        previous_image: Option<String>,
    },
    NoMatch,
}

impl CatalogDocument {
    pub fn parse(raw: &[u8]) -> Result<Self, DomainError> {
        let root: Value = serde_json::from_slice(raw)
            .map_err(|e| DomainError::InvalidInput(format!("Invalid JSON data received: {}", e)))?;
        Ok(Self { root })
    }

    /// Replaces `image` on every record whose `name` equals `name` exactly.
    pub fn apply_image(&mut self, name: &str, image_path: &str) -> ImageMerge {
        let Some(records) = self.root.as_array_mut() else {
            return ImageMerge::NoMatch;
        };

        let mut updated = 0;
        let mut previous_image = None;
        for record in records.iter_mut().filter_map(Value::as_object_mut) {
            if record.get(NAME_FIELD).and_then(Value::as_str) != Some(name) {
                continue;
            }
            let previous = record.insert(IMAGE_FIELD.to_string(), Value::String(image_path.to_string()));
            if updated == 0 {
                previous_image = previous.and_then(|v| v.as_str().map(str::to_string));
            }
            updated += 1;
        }

        if updated == 0 {
            ImageMerge::NoMatch
        } else {
            ImageMerge::Updated {
                records: updated,
                previous_image,
            }
        }
    }

    /// Replaces each record's `image` with `rewrite(image)` when it returns a new path.
    pub fn rewrite_image_paths(&mut self, mut rewrite: impl FnMut(&str) -> Option<String>) -> usize {
        let Some(records) = self.root.as_array_mut() else {
            return 0;
        };

        let mut updated = 0;
        for record in records.iter_mut().filter_map(Value::as_object_mut) {
            let replacement = record.get(IMAGE_FIELD).and_then(Value::as_str).and_then(|image| rewrite(image));
            if let Some(path) = replacement {
                record.insert(IMAGE_FIELD.to_string(), Value::String(path));
                updated += 1;
            }
        }
        updated
    }

    /// 4-space pretty JSON. serde_json never escapes `/`, so image paths stay readable.
    pub fn to_pretty_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        let mut buffer = Vec::new();
        let formatter = PrettyFormatter::with_indent(b"    ");
        let mut serializer = serde_json::Serializer::with_formatter(&mut buffer, formatter);
        self.root.serialize(&mut serializer)?;
        Ok(buffer)
    }

    #[cfg(test)]
    pub fn as_value(&self) -> &Value {
        &self.root
    }
}
