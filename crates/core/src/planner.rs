use crate::apply::{commit_rename, DirLocks, RenameReport};
use crate::attachment::{should_handle, target_extension, SkipReason};
use crate::config::RenameSettings;
use crate::error::RenameError;
use crate::note::Note;
use crate::sanitize::{is_meaningful, sanitize_stem, truncate_filename_if_needed};
use crate::template::render;
use crate::vault::Vault;
use anyhow::Result;
use chrono::{DateTime, Local};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// 開いているノートのリンク文字列を書き換える。見つからなければ `false`。
pub trait LinkRewriter {
    fn try_replace(&mut self, old: &str, new: &str) -> bool;
}

/// 名前の確認・編集をユーザーに求める。`None` はキャンセル。
pub trait UserPrompt {
    fn confirm_name(&mut self, suggested: &str, image: &Path) -> Option<String>;
}

/// リネーム処理が共有する環境。設定は処理中に変わらない。
#[derive(Debug)]
pub struct RenameContext<'a> {
    pub vault: &'a Vault,
    pub settings: &'a RenameSettings,
    pub locks: &'a DirLocks,
}

#[derive(Debug, Clone, Serialize)]
pub struct NameProposal {
    pub image: PathBuf,
    pub stem: String,
    pub extension: String,
    pub meaningful: bool,
    pub needs_review: bool,
}

#[derive(Debug, Clone)]
pub struct ActiveNote {
    pub note: Note,
    pub cursor_line: Option<usize>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Outcome {
    Skipped { reason: SkipReason },
    Cancelled,
    Renamed(RenameReport),
}

pub fn generate_name(
    image: &Path,
    note: &Note,
    ctx: &RenameContext<'_>,
    now: &DateTime<Local>,
) -> NameProposal {
    let template_ctx = note.template_context(ctx.vault.root());
    let rendered = render(&ctx.settings.pattern, &template_ctx, now);
    let extension = target_extension(image, ctx.settings);
    let stem = truncate_filename_if_needed(
        &sanitize_stem(&rendered),
        &format!(".{extension}"),
        ctx.settings.max_filename_len,
    );
    let meaningful = is_meaningful(&stem, ctx.settings.policy.delimiter());
    let needs_review = !meaningful || !ctx.settings.auto_rename;

    debug!(rendered = %rendered, stem = %stem, meaningful, needs_review, "ファイル名を生成しました");
    NameProposal {
        image: image.to_path_buf(),
        stem,
        extension,
        meaningful,
        needs_review,
    }
}

/// 作成イベント 1 件分を最後まで処理する。
///
/// 確認ダイアログでキャンセルされた場合はファイルに一切触れない。
pub fn handle_created(
    image: &Path,
    active: Option<&ActiveNote>,
    ctx: &RenameContext<'_>,
    prompt: &mut dyn UserPrompt,
    now: &DateTime<Local>,
) -> Result<Outcome> {
    if let Some(reason) = should_handle(image, ctx.settings) {
        debug!(path = %image.display(), ?reason, "対象外のファイルです");
        return Ok(Outcome::Skipped { reason });
    }

    let active = active.ok_or(RenameError::NoActiveDocument)?;
    let proposal = generate_name(image, &active.note, ctx, now);

    let stem = if proposal.needs_review {
        match prompt.confirm_name(&proposal.stem, image) {
            Some(stem) => stem,
            None => {
                info!(path = %image.display(), "リネームがキャンセルされました");
                return Ok(Outcome::Cancelled);
            }
        }
    } else {
        proposal.stem
    };

    let report = commit_rename(ctx, image, &stem, Some(active))?;
    Ok(Outcome::Renamed(report))
}
