use crate::note::{encode_link_path, LinkKind};
use anyhow::{bail, Context, Result};
use rayon::prelude::*;
use std::collections::BTreeSet;
use std::fs;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

#[derive(Debug, Clone)]
pub struct Vault {
    root: PathBuf,
}

impl Vault {
    pub fn open(root: &Path) -> Result<Self> {
        let root = fs::canonicalize(root)
            .with_context(|| format!("vault を解決できませんでした: {}", root.display()))?;
        if !root.is_dir() {
            bail!("vault がディレクトリではありません: {}", root.display());
        }
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// 存在するパスは正規化し、存在しない場合は親だけ正規化する。
    pub fn canonical(&self, path: &Path) -> PathBuf {
        let absolute = if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        };
        if let Ok(resolved) = fs::canonicalize(&absolute) {
            return resolved;
        }
        match (absolute.parent(), absolute.file_name()) {
            (Some(parent), Some(name)) => fs::canonicalize(parent)
                .map(|p| p.join(name))
                .unwrap_or(absolute),
            _ => absolute,
        }
    }

    /// vault からの相対パス (`/` 区切り)。vault 外ならファイル名のみ。
    pub fn rel_path(&self, path: &Path) -> String {
        let path = self.canonical(path);
        match path.strip_prefix(&self.root) {
            Ok(relative) => to_slash(relative),
            Err(_) => path
                .file_name()
                .map(|v| v.to_string_lossy().to_string())
                .unwrap_or_default(),
        }
    }

    /// 重複判定用のフラットなファイル名一覧。呼び出しごとに読み直す。
    pub fn sibling_names(&self, dir: &Path) -> Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in fs::read_dir(dir)
            .with_context(|| format!("フォルダを読めませんでした: {}", dir.display()))?
        {
            let entry = entry.with_context(|| format!("エントリ読み取り失敗: {}", dir.display()))?;
            if entry.path().is_dir() {
                continue;
            }
            names.push(entry.file_name().to_string_lossy().to_string());
        }
        names.sort();
        Ok(names)
    }

    pub fn markdown_notes(&self) -> Vec<PathBuf> {
        WalkDir::new(&self.root)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| entry.depth() == 0 || !is_hidden(entry.path()))
            .filter_map(|entry| match entry {
                Ok(entry) => Some(entry),
                Err(err) => {
                    warn!("vault 走査中にエラー: {err}");
                    None
                }
            })
            .filter(|entry| entry.file_type().is_file() && is_markdown_path(entry.path()))
            .map(|entry| entry.into_path())
            .collect()
    }

    /// ノート内のリンク先をファイルに解決する。
    pub fn resolve_link(&self, note_path: &Path, target: &str, kind: LinkKind) -> Option<PathBuf> {
        let target = target.trim();
        if target.is_empty() {
            return None;
        }
        let note_dir = self.canonical(note_path).parent()?.to_path_buf();

        let candidates = match kind {
            LinkKind::Markdown => vec![note_dir.join(target), self.root.join(target)],
            LinkKind::Wiki if target.contains('/') => vec![self.root.join(target)],
            LinkKind::Wiki => vec![note_dir.join(target)],
        };
        if let Some(found) = candidates.into_iter().find(|path| path.is_file()) {
            return Some(self.canonical(&found));
        }

        if kind == LinkKind::Wiki && !target.contains('/') {
            return self.find_by_name(target);
        }
        None
    }

    fn find_by_name(&self, name: &str) -> Option<PathBuf> {
        WalkDir::new(&self.root)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| entry.depth() == 0 || !is_hidden(entry.path()))
            .flatten()
            .find(|entry| entry.file_type().is_file() && entry.file_name().to_string_lossy() == name)
            .map(|entry| entry.into_path())
    }

    /// リネーム前に呼び、リンク張り替えに必要な解決結果を記録する。
    pub fn prepare_link_update(&self, old_path: &Path) -> LinkUpdate {
        let old_path = self.canonical(old_path);
        let old_rel = self.rel_path(&old_path);
        let old_dir = old_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.root.clone());
        let first_match_is_old = self
            .find_by_name(file_name_of(&old_rel))
            .map(|found| self.canonical(&found))
            .as_deref()
            == Some(old_path.as_path());
        LinkUpdate {
            old_rel,
            old_dir,
            first_match_is_old,
        }
    }

    /// `note` の中で張り替える旧リンクと新リンクの組。
    pub fn link_replacements_for(
        &self,
        update: &LinkUpdate,
        new_path: &Path,
        note: &Path,
    ) -> Vec<(String, String)> {
        let note = self.canonical(note);
        let note_dir = note.parent().unwrap_or(self.root.as_path());
        link_replacements(
            &update.old_rel,
            &self.rel_path(new_path),
            &self.rel_path(note_dir),
            self.bare_name_points_to_old(update, note_dir),
        )
    }

    /// ファイル名だけのウィキリンクが、このフォルダのノートから旧ファイルを指していたか。
    fn bare_name_points_to_old(&self, update: &LinkUpdate, note_dir: &Path) -> bool {
        if note_dir == update.old_dir.as_path() {
            return true;
        }
        if note_dir.join(file_name_of(&update.old_rel)).is_file() {
            return false;
        }
        update.first_match_is_old
    }

    /// リネーム後に vault 全体のリンクを張り替える。
    ///
    /// ノートごとに独立しているので rayon で並列に処理する。
    pub fn update_links(&self, update: &LinkUpdate, new_path: &Path) -> Result<usize> {
        let notes = self.markdown_notes();

        let changed = notes
            .par_iter()
            .map(|note| -> Result<bool> {
                let replacements = self.link_replacements_for(update, new_path, note);
                let content = fs::read_to_string(note)
                    .with_context(|| format!("ノートを読めませんでした: {}", note.display()))?;
                let mut updated = content.clone();
                for (old, new) in &replacements {
                    if updated.contains(old.as_str()) {
                        updated = updated.replace(old.as_str(), new);
                    }
                }
                if updated == content {
                    return Ok(false);
                }
                fs::write(note, updated)
                    .with_context(|| format!("ノートを書き込めませんでした: {}", note.display()))?;
                debug!(note = %note.display(), "リンクを更新しました");
                Ok(true)
            })
            .collect::<Result<Vec<bool>>>()?;

        Ok(changed.into_iter().filter(|c| *c).count())
    }
}

/// リネーム前に取った旧ファイルの位置と、名前検索での解決結果。
#[derive(Debug, Clone)]
pub struct LinkUpdate {
    old_rel: String,
    old_dir: PathBuf,
    first_match_is_old: bool,
}

/// 旧リンク文字列と新リンク文字列の組を、ウィキリンクとマークダウンリンクの両形式で返す。
///
/// `note_dir` はノートのあるフォルダの vault 相対パス (直下なら空文字)。
/// ファイル名だけのウィキリンクは `bare_names` が真のときだけ含める。
fn link_replacements(
    old_rel: &str,
    new_rel: &str,
    note_dir: &str,
    bare_names: bool,
) -> Vec<(String, String)> {
    let mut pairs = Vec::<(String, String)>::new();
    let mut seen = BTreeSet::<String>::new();
    let mut push = |old: String, new: String| {
        if old != new && seen.insert(old.clone()) {
            pairs.push((old, new));
        }
    };

    let old_name = file_name_of(old_rel);
    let new_name = file_name_of(new_rel);
    let mut wiki = Vec::new();
    if old_rel != old_name {
        wiki.push((old_rel, new_rel));
    }
    if bare_names {
        wiki.push((old_name, new_name));
    }
    for (old, new) in wiki {
        for closer in ["]]", "|", "#"] {
            push(format!("[[{old}{closer}"), format!("[[{new}{closer}"));
        }
    }

    let old_relative = relative_to(note_dir, old_rel);
    let new_relative = relative_to(note_dir, new_rel);
    for (old, new) in [(old_relative.as_str(), new_relative.as_str()), (old_rel, new_rel)] {
        let (old_enc, new_enc) = (encode_link_path(old), encode_link_path(new));
        push(format!("]({old_enc})"), format!("]({new_enc})"));
        push(format!("]({old_enc} "), format!("]({new_enc} "));
        push(format!("]({old})"), format!("]({new})"));
        push(format!("]({old} "), format!("]({new} "));
        push(format!("](<{old}>)"), format!("](<{new}>)"));
    }

    pairs
}

/// `from_dir` から `to` への相対パス。どちらも vault 相対の `/` 区切り。
pub fn relative_to(from_dir: &str, to: &str) -> String {
    let from: Vec<&str> = from_dir.split('/').filter(|s| !s.is_empty()).collect();
    let to_parts: Vec<&str> = to.split('/').filter(|s| !s.is_empty()).collect();
    let common = from
        .iter()
        .zip(to_parts.iter())
        .take_while(|(a, b)| a == b)
        .count();
    let mut parts: Vec<&str> = vec![".."; from.len() - common];
    parts.extend(&to_parts[common..]);
    parts.join("/")
}

pub(crate) fn is_markdown_path(path: &Path) -> bool {
    path.extension()
        .map(|ext| ext.to_string_lossy().eq_ignore_ascii_case("md"))
        .unwrap_or(false)
}

fn file_name_of(rel: &str) -> &str {
    rel.rsplit('/').next().unwrap_or(rel)
}

fn to_slash(path: &Path) -> String {
    path.components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().to_string()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .map(|name| name.to_string_lossy().starts_with('.'))
        .unwrap_or(false)
}
