use crate::config::RenameSettings;
use crate::convert::ConvertTarget;
use crate::vault::is_markdown_path;
use serde::Serialize;
use std::path::Path;

pub const PASTED_IMAGE_PREFIX: &str = "Pasted image ";

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "bmp", "svg", "webp", "avif"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    Markdown,
    NotPastedImage,
    ExcludedExtension,
}

pub fn is_markdown(path: &Path) -> bool {
    is_markdown_path(path)
}

pub fn is_image(path: &Path) -> bool {
    let ext = extension_of(path);
    IMAGE_EXTENSIONS.contains(&ext.as_str())
}

/// 貼り付け時にエディタが付ける既定のファイル名かどうか。
pub fn is_pasted_image(path: &Path) -> bool {
    path.file_name()
        .map(|name| name.to_string_lossy().starts_with(PASTED_IMAGE_PREFIX))
        .unwrap_or(false)
}

/// 作成されたファイルをリネーム対象にするか判定する。対象外なら理由を返す。
pub fn should_handle(path: &Path, settings: &RenameSettings) -> Option<SkipReason> {
    if is_markdown(path) {
        return Some(SkipReason::Markdown);
    }
    if !settings.handle_all_attachments && !is_pasted_image(path) {
        return Some(SkipReason::NotPastedImage);
    }
    if let Some(exclude) = &settings.exclude_extension {
        if exclude.is_match(&extension_of(path)) {
            return Some(SkipReason::ExcludedExtension);
        }
    }
    None
}

pub fn conversion_for(path: &Path, settings: &RenameSettings) -> Option<ConvertTarget> {
    if extension_of(path) == "png" {
        settings.convert_to
    } else {
        None
    }
}

/// リネーム後の拡張子。PNG は変換設定があれば変換先の拡張子になる。
pub fn target_extension(path: &Path, settings: &RenameSettings) -> String {
    match conversion_for(path, settings) {
        Some(target) => target.extension().to_string(),
        None => extension_of(path),
    }
}

pub(crate) fn extension_of(path: &Path) -> String {
    path.extension()
        .map(|ext| ext.to_string_lossy().to_lowercase())
        .unwrap_or_default()
}
