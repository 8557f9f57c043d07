use std::path::{Path, PathBuf};

/// Image types the batch normalizer re-encodes. JPEG is already the output encoding.
pub const CONVERTIBLE_EXTENSIONS: [&str; 3] = ["png", "gif", "webp"];
pub const NORMALIZED_EXTENSION: &str = "jpg";

pub fn is_convertible(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| CONVERTIBLE_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}

/// `Sofa/a.png` -> `Sofa/a.jpg`
pub fn normalized_path(path: &Path) -> PathBuf {
    path.with_extension(NORMALIZED_EXTENSION)
}

/// 元ファイルの退避先 (`a.png` -> `a.png.backup`)
pub fn backup_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|name| name.to_os_string()).unwrap_or_default();
    name.push(".backup");
    path.with_file_name(name)
}

/// Catalog image paths always use `/`, whatever the host separator is.
pub fn catalog_path(relative: &Path) -> Option<String> {
    let parts = relative
        .components()
        .map(|component| component.as_os_str().to_str())
        .collect::<Option<Vec<_>>>()?;
    if parts.is_empty() {
        None
    } else {
        Some(parts.join("/"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_convertible() {
        assert!(is_convertible(Path::new("Sofa/a.PNG")));
        assert!(is_convertible(Path::new("b.gif")));
        assert!(is_convertible(Path::new("c.webp")));
        assert!(!is_convertible(Path::new("d.jpg")));
        assert!(!is_convertible(Path::new("e.png.backup")));
        assert!(!is_convertible(Path::new("README")));
    }

    #[test]
    fn test_derived_paths() {
        assert_eq!(normalized_path(Path::new("Sofa/a.b.png")), PathBuf::from("Sofa/a.b.jpg"));
        assert_eq!(backup_path(Path::new("Sofa/a.png")), PathBuf::from("Sofa/a.png.backup"));
        assert_eq!(catalog_path(Path::new("Sofa/Set/a.jpg")).as_deref(), Some("Sofa/Set/a.jpg"));
        assert_eq!(catalog_path(Path::new("")), None);
    }
}
