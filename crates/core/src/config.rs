use crate::convert::{parse_quality, ConvertTarget};
use crate::dedup::DuplicatePolicy;
use crate::error::RenameError;
use crate::DEFAULT_PATTERN;
use anyhow::{Context, Result};
use directories::ProjectDirs;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

/// 永続化される設定。値はユーザー入力のままなので、使う前に `settings()` で検証する。
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub image_name_pattern: String,
    pub dup_number_at_start: bool,
    pub dup_number_delimiter: String,
    pub dup_number_always: bool,
    pub auto_rename: bool,
    pub handle_all_attachments: bool,
    pub exclude_extension_pattern: String,
    pub disable_rename_notice: bool,
    pub convert_to_jpeg: bool,
    pub convert_to_webp: bool,
    pub quality: String,
    pub max_filename_len: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            image_name_pattern: DEFAULT_PATTERN.to_string(),
            dup_number_at_start: false,
            dup_number_delimiter: "-".to_string(),
            dup_number_always: false,
            auto_rename: false,
            handle_all_attachments: false,
            exclude_extension_pattern: String::new(),
            disable_rename_notice: false,
            convert_to_jpeg: false,
            convert_to_webp: false,
            quality: "0.8".to_string(),
            max_filename_len: 240,
        }
    }
}

/// 1 回のリネーム処理で使う不変の設定スナップショット。
#[derive(Debug, Clone)]
pub struct RenameSettings {
    pub pattern: String,
    pub policy: DuplicatePolicy,
    pub auto_rename: bool,
    pub handle_all_attachments: bool,
    pub exclude_extension: Option<Regex>,
    pub disable_rename_notice: bool,
    pub convert_to: Option<ConvertTarget>,
    pub quality: f32,
    pub max_filename_len: usize,
}

impl AppConfig {
    pub fn settings(&self) -> Result<RenameSettings, RenameError> {
        let exclude_extension = match self.exclude_extension_pattern.trim() {
            "" => None,
            pattern => Some(Regex::new(pattern).map_err(|source| RenameError::InvalidPattern {
                pattern: pattern.to_string(),
                source,
            })?),
        };

        let convert_to = match (self.convert_to_jpeg, self.convert_to_webp) {
            (true, true) => {
                warn!("convert_to_jpeg と convert_to_webp が両方有効です。JPEG を使います");
                Some(ConvertTarget::Jpeg)
            }
            (true, false) => Some(ConvertTarget::Jpeg),
            (false, true) => Some(ConvertTarget::Webp),
            (false, false) => None,
        };

        Ok(RenameSettings {
            pattern: self.image_name_pattern.clone(),
            policy: DuplicatePolicy::new(
                self.dup_number_at_start,
                &self.dup_number_delimiter,
                self.dup_number_always,
            ),
            auto_rename: self.auto_rename,
            handle_all_attachments: self.handle_all_attachments,
            exclude_extension,
            disable_rename_notice: self.disable_rename_notice,
            convert_to,
            quality: parse_quality(&self.quality),
            max_filename_len: self.max_filename_len.max(16),
        })
    }
}

impl Default for RenameSettings {
    fn default() -> Self {
        Self {
            pattern: DEFAULT_PATTERN.to_string(),
            policy: DuplicatePolicy::default(),
            auto_rename: false,
            handle_all_attachments: false,
            exclude_extension: None,
            disable_rename_notice: false,
            convert_to: None,
            quality: crate::convert::DEFAULT_QUALITY,
            max_filename_len: 240,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppPaths {
    pub config_dir: PathBuf,
    pub config_path: PathBuf,
}

pub fn app_paths() -> Result<AppPaths> {
    let proj = ProjectDirs::from("com", "kelly", "paste-image-renamer")
        .context("OS標準設定ディレクトリを取得できませんでした")?;
    let config_dir = proj.config_dir().to_path_buf();
    Ok(AppPaths {
        config_path: config_dir.join("config.toml"),
        config_dir,
    })
}

pub fn load_config() -> Result<AppConfig> {
    let paths = app_paths()?;
    load_config_from(&paths.config_path)
}

pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    if !path.exists() {
        return Ok(AppConfig::default());
    }

    let raw = fs::read_to_string(path)
        .with_context(|| format!("設定ファイルを読めませんでした: {}", path.display()))?;

    let config = toml::from_str::<AppConfig>(&raw).context("設定ファイルのパースに失敗しました")?;
    Ok(config)
}

pub fn save_config(config: &AppConfig) -> Result<()> {
    let paths = app_paths()?;
    save_config_to(config, &paths.config_path)
}

pub fn save_config_to(config: &AppConfig, path: &Path) -> Result<()> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir).with_context(|| {
            format!("設定ディレクトリを作成できませんでした: {}", dir.display())
        })?;
    }
    let body = toml::to_string_pretty(config).context("設定のシリアライズに失敗しました")?;
    fs::write(path, body)
        .with_context(|| format!("設定ファイルを書き込めませんでした: {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn missing_file_yields_defaults() {
        let temp = tempdir().expect("tempdir");
        let config = load_config_from(&temp.path().join("none.toml")).expect("load");
        assert_eq!(config.image_name_pattern, "{{fileName}}");
        assert_eq!(config.quality, "0.8");
    }

    #[test]
    fn partial_file_fills_defaults() {
        let temp = tempdir().expect("tempdir");
        let path = temp.path().join("config.toml");
        fs::write(&path, "auto_rename = true\ndup_number_delimiter = \"_\"\n").expect("write");
        let config = load_config_from(&path).expect("load");
        assert!(config.auto_rename);
        assert_eq!(config.dup_number_delimiter, "_");
        assert_eq!(config.max_filename_len, 240);
    }

    #[test]
    fn save_then_load_keeps_values() {
        let temp = tempdir().expect("tempdir");
        let path = temp.path().join("nested").join("config.toml");
        let config = AppConfig {
            image_name_pattern: "{{imageNameKey}}-{{DATE:YYYYMMDD}}".to_string(),
            convert_to_webp: true,
            ..AppConfig::default()
        };
        save_config_to(&config, &path).expect("save");
        let loaded = load_config_from(&path).expect("load");
        assert_eq!(loaded.image_name_pattern, config.image_name_pattern);
        assert!(loaded.convert_to_webp);
    }

    #[test]
    fn settings_normalize_loose_values() {
        let config = AppConfig {
            dup_number_delimiter: String::new(),
            quality: "high".to_string(),
            convert_to_jpeg: true,
            convert_to_webp: true,
            ..AppConfig::default()
        };
        let settings = config.settings().expect("settings");
        assert_eq!(settings.policy.delimiter(), "-");
        assert_eq!(settings.quality, crate::convert::DEFAULT_QUALITY);
        assert_eq!(settings.convert_to, Some(ConvertTarget::Jpeg));
    }

    #[test]
    fn invalid_exclude_pattern_is_reported() {
        let config = AppConfig {
            exclude_extension_pattern: "(".to_string(),
            ..AppConfig::default()
        };
        let err = config.settings().expect_err("must fail");
        assert!(matches!(err, RenameError::InvalidPattern { .. }));
    }
}
