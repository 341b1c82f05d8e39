use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RenameError {
    #[error("ファイル名が空です")]
    EmptyName,
    #[error("画像の変換に失敗しました: {0}")]
    Conversion(String),
    #[error("リネームに失敗しました: {} -> {}", from.display(), to.display())]
    Rename {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("アクティブなノートがありません")]
    NoActiveDocument,
    #[error("正規表現が不正です: {pattern}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

impl RenameError {
    pub(crate) fn rename(from: PathBuf, to: PathBuf, source: std::io::Error) -> Self {
        Self::Rename { from, to, source }
    }
}
