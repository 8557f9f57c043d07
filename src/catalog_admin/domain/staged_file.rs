use std::path::{Path, PathBuf};

pub const STAGED_EXTENSION: &str = "jpg";
const FALLBACK_NAME: &str = "image";
const TEMP_PREFIX: &str = "temp_";

/// 一時ファイルとして書き込まれ、commit か discard を待つアップロード
///
/// `commit` は値を消費するので、同じ StagedFile を二度 commit することはできない。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedFile {
    temp_path: PathBuf,
    final_path: PathBuf,
    original_path: Option<PathBuf>,
}

impl StagedFile {
    pub fn new(temp_path: PathBuf, final_path: PathBuf, original_path: Option<PathBuf>) -> Self {
        Self {
            temp_path,
            final_path,
            original_path,
        }
    }

    pub fn with_final_path(mut self, final_path: PathBuf) -> Self {
        self.final_path = final_path;
        self
    }

    pub fn with_original_path(mut self, original_path: Option<PathBuf>) -> Self {
        self.original_path = original_path;
        self
    }

    pub fn temp_path(&self) -> &Path {
        &self.temp_path
    }

    pub fn final_path(&self) -> &Path {
        &self.final_path
    }

    /// The superseded file to delete on commit, if it is not the destination itself.
    pub fn superseded_original(&self) -> Option<&Path> {
        self.original_path
            .as_deref()
            .filter(|original| *original != self.final_path.as_path())
    }
}

/// Keeps `[A-Za-z0-9_-]`, turns spaces into underscores and drops everything else.
pub fn sanitize_name(raw: &str) -> String {
    raw.chars()
        .filter_map(|c| match c {
            ' ' => Some('_'),
            c if c.is_ascii_alphanumeric() || c == '_' || c == '-' => Some(c),
            _ => None,
        })
        .collect()
}

/// `<sanitized>.jpg`, or `None` when nothing usable survives sanitization.
pub fn final_file_name(name_hint: &str) -> Option<String> {
    let sanitized = sanitize_name(name_hint);
    if sanitized.is_empty() {
        None
    } else {
        Some(format!("{}.{}", sanitized, STAGED_EXTENSION))
    }
}

pub fn is_temp_file_name(file_name: &str) -> bool {
    file_name.starts_with(TEMP_PREFIX)
}

pub fn temp_file_name(timestamp: &str, token: u32, name_hint: &str) -> String {
    let mut sanitized = sanitize_name(name_hint);
    if sanitized.is_empty() {
        sanitized = FALLBACK_NAME.to_string();
    }
    format!("{}{}_{:08x}_{}.{}", TEMP_PREFIX, timestamp, token, sanitized, STAGED_EXTENSION)
}
