use super::error::DomainError;
use std::path::{Path, PathBuf};

/// アップロードディレクトリと、db.json に保存する公開パス (`uploaded/Widget.jpg`) との対応
///
/// Paths that come back from clients are only accepted as `<prefix>/<single file name>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadLocation {
    dir: PathBuf,
    url_prefix: String,
}

impl UploadLocation {
    pub fn new(dir: impl Into<PathBuf>, url_prefix: &str) -> Self {
        Self {
            dir: dir.into(),
            url_prefix: url_prefix.trim_matches('/').to_string(),
        }
    }

    pub fn file_path(&self, file_name: &str) -> PathBuf {
        self.dir.join(file_name)
    }

    pub fn web_path(&self, file_name: &str) -> String {
        if self.url_prefix.is_empty() {
            file_name.to_string()
        } else {
            format!("{}/{}", self.url_prefix, file_name)
        }
    }

    pub fn web_path_of(&self, path: &Path) -> Option<String> {
        path.file_name()
            .and_then(|name| name.to_str())
            .map(|name| self.web_path(name))
    }

    pub fn resolve(&self, web_path: &str) -> Result<PathBuf, DomainError> {
        let rejected = || DomainError::InvalidInput(format!("Path {:?} is outside the uploads directory", web_path));

        let relative = web_path.trim().trim_start_matches('/');
        let file_name = if self.url_prefix.is_empty() {
            relative
        } else {
            relative
                .strip_prefix(self.url_prefix.as_str())
                .and_then(|rest| rest.strip_prefix('/'))
                .ok_or_else(rejected)?
        };

        let traversal = matches!(file_name, "" | "." | "..")
            || file_name.contains(&['/', '\\', '\0', ':'][..]);
        if traversal {
            return Err(rejected());
        }
        Ok(self.dir.join(file_name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn location() -> UploadLocation {
        UploadLocation::new("/srv/site/uploaded", "/uploaded/")
    }

    #[test]
    fn test_web_paths() {
        let location = location();
        assert_eq!(location.web_path("Widget.jpg"), "uploaded/Widget.jpg");
        assert_eq!(
            location.web_path_of(Path::new("/srv/site/uploaded/temp_1_ab_Widget.jpg")).as_deref(),
            Some("uploaded/temp_1_ab_Widget.jpg")
        );
        assert_eq!(UploadLocation::new("u", "").web_path("a.jpg"), "a.jpg");
    }

    #[test]
    fn test_resolve_accepts_single_file_under_prefix() {
        let location = location();
        assert_eq!(
            location.resolve("uploaded/Widget.jpg").unwrap(),
            PathBuf::from("/srv/site/uploaded/Widget.jpg")
        );
        assert_eq!(
            location.resolve("/uploaded/Widget.jpg").unwrap(),
            PathBuf::from("/srv/site/uploaded/Widget.jpg")
        );
    }

    #[test]
    fn test_resolve_rejects_traversal_and_foreign_paths() {
        let location = location();
        for bad in [
            "uploaded/../db.json",
            "uploaded/..",
            "uploaded/",
            "uploaded/a/b.jpg",
            "uploaded\\..\\db.json",
            "db.json",
            "Sofa/a.jpg",
            "uploadedx/a.jpg",
            "",
        ] {
            assert!(
                matches!(location.resolve(bad), Err(DomainError::InvalidInput(_))),
                "{:?} should be rejected",
                bad
            );
        }
    }
}
