use crate::attachment::{conversion_for, is_image, target_extension};
use crate::convert::{convert, ConvertTarget};
use crate::dedup::{resolve, CandidateName};
use crate::error::RenameError;
use crate::note::{Note, NoteLinkRewriter};
use crate::planner::{generate_name, ActiveNote, LinkRewriter, RenameContext};
use crate::sanitize::{sanitize_stem, truncate_filename_if_needed};
use crate::vault::LinkUpdate;
use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use regex::Regex;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{info, warn};

/// フォルダごとの直列化ポイント。
///
/// 重複判定からリネーム完了までを同じフォルダ内で排他にし、同時に作られた 2 ファイルが
/// 同じ番号を取らないようにする。プロセスをまたぐ競合は対象外。
#[derive(Debug, Default)]
pub struct DirLocks {
    inner: Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>,
}

impl DirLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_for(&self, dir: &Path) -> Arc<Mutex<()>> {
        let mut map = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(map.entry(dir.to_path_buf()).or_default())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RenameReport {
    pub from: PathBuf,
    pub to: PathBuf,
    pub changed: bool,
    pub converted: Option<ConvertTarget>,
    pub link_updated: bool,
    pub notes_updated: usize,
    pub notice: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ItemStatus {
    Renamed,
    Planned,
    Unchanged,
    Skipped { reason: String },
    Failed { error: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchItem {
    pub from: PathBuf,
    pub to: Option<PathBuf>,
    #[serde(flatten)]
    pub status: ItemStatus,
}

#[derive(Debug, Clone, Serialize, Default)]
pub struct BatchReport {
    pub renamed: usize,
    pub skipped: usize,
    pub failed: usize,
    pub items: Vec<BatchItem>,
}

impl BatchReport {
    fn push(&mut self, item: BatchItem) {
        match item.status {
            ItemStatus::Renamed | ItemStatus::Planned => self.renamed += 1,
            ItemStatus::Unchanged | ItemStatus::Skipped { .. } => self.skipped += 1,
            ItemStatus::Failed { .. } => self.failed += 1,
        }
        self.items.push(item);
    }

    pub fn summary(&self) -> String {
        format!(
            "Renamed {} files, skipped {}, failed {}",
            self.renamed, self.skipped, self.failed
        )
    }
}

/// 確定した名前でリネームを実行する。
///
/// 重複判定 → 変換 → リネーム → リンク更新 の順。変換やリネームに失敗した場合は元ファイルが残る。
pub fn commit_rename(
    ctx: &RenameContext<'_>,
    image: &Path,
    stem: &str,
    active: Option<&ActiveNote>,
) -> Result<RenameReport> {
    let image = ctx.vault.canonical(image);
    let dir = image
        .parent()
        .context("親ディレクトリを取得できませんでした")?
        .to_path_buf();
    let current_name = file_name_string(&image);

    let lock = ctx.locks.lock_for(&dir);
    let guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

    let siblings = ctx.vault.sibling_names(&dir)?;
    let final_name = resolve_final_name(ctx, &image, stem, &siblings)?;
    let target = dir.join(&final_name);

    if final_name == current_name {
        return Ok(RenameReport {
            from: image.clone(),
            to: image,
            changed: false,
            converted: None,
            link_updated: false,
            notes_updated: 0,
            notice: None,
        });
    }

    if target.exists() {
        return Err(RenameError::rename(
            image,
            target,
            io::Error::new(io::ErrorKind::AlreadyExists, "リネーム先が既に存在します"),
        )
        .into());
    }

    let link_update = ctx.vault.prepare_link_update(&image);
    let converted = conversion_for(&image, ctx.settings);
    match converted {
        Some(format) => {
            let bytes = fs::read(&image)
                .with_context(|| format!("画像を読めませんでした: {}", image.display()))?;
            let encoded = convert(&bytes, ctx.settings.quality, format)?;
            write_converted(&image, &target, &encoded)?;
        }
        None => fs::rename(&image, &target)
            .map_err(|err| RenameError::rename(image.clone(), target.clone(), err))?,
    }
    drop(guard);
    info!(from = %current_name, to = %final_name, "リネームしました");

    // カーソル行を先に書き換え、残りの参照は vault 全体の張り替えで拾う。
    let mut link_updated = false;
    if let Some(active) = active {
        link_updated = rewrite_active_note(ctx, active, &link_update, &target)?;
    }
    let notes_updated = ctx.vault.update_links(&link_update, &target)?;

    let notice = (!ctx.settings.disable_rename_notice)
        .then(|| format!("Renamed {current_name} to {final_name}"));

    Ok(RenameReport {
        from: image,
        to: target,
        changed: true,
        converted,
        link_updated,
        notes_updated,
        notice,
    })
}

/// 埋め込み画像を現在のパターンで一括リネームする。
///
/// 同じバッチ内の先行リネームが重複判定に反映されるよう、1 件ずつ順に処理する。
pub fn batch_rename_embeds(
    ctx: &RenameContext<'_>,
    note: &Note,
    now: &DateTime<Local>,
    dry_run: bool,
) -> Result<BatchReport> {
    let mut jobs = Vec::new();
    for image in embedded_files(ctx, note) {
        if !is_image(&image) {
            jobs.push(BatchJob::skip(image, "not an image"));
            continue;
        }
        let proposal = generate_name(&image, note, ctx, now);
        if !proposal.meaningful {
            jobs.push(BatchJob::skip(image, "name is not meaningful"));
            continue;
        }
        jobs.push(BatchJob::rename(image, proposal.stem));
    }
    run_batch(ctx, jobs, dry_run)
}

/// 埋め込みファイルのうち `find` に一致するものを `replace` で置換した名前にする。
pub fn batch_rename_matching(
    ctx: &RenameContext<'_>,
    note: &Note,
    find: &str,
    replace: &str,
    dry_run: bool,
) -> Result<BatchReport> {
    let pattern = Regex::new(find).map_err(|source| RenameError::InvalidPattern {
        pattern: find.to_string(),
        source,
    })?;

    let mut jobs = Vec::new();
    for file in embedded_files(ctx, note) {
        let stem = file
            .file_stem()
            .map(|v| v.to_string_lossy().to_string())
            .unwrap_or_default();
        if !pattern.is_match(&stem) {
            jobs.push(BatchJob::skip(file, "pattern did not match"));
            continue;
        }
        let replaced = pattern.replace_all(&stem, replace).to_string();
        jobs.push(BatchJob::rename(file, replaced));
    }
    run_batch(ctx, jobs, dry_run)
}

struct BatchJob {
    file: PathBuf,
    stem: std::result::Result<String, &'static str>,
}

impl BatchJob {
    fn rename(file: PathBuf, stem: String) -> Self {
        Self {
            file,
            stem: Ok(stem),
        }
    }

    fn skip(file: PathBuf, reason: &'static str) -> Self {
        Self {
            file,
            stem: Err(reason),
        }
    }
}

fn run_batch(ctx: &RenameContext<'_>, jobs: Vec<BatchJob>, dry_run: bool) -> Result<BatchReport> {
    let mut report = BatchReport::default();
    let mut reserved = HashMap::<PathBuf, DirPlan>::new();

    for job in jobs {
        let stem = match job.stem {
            Ok(stem) => stem,
            Err(reason) => {
                report.push(BatchItem {
                    from: job.file,
                    to: None,
                    status: ItemStatus::Skipped {
                        reason: reason.to_string(),
                    },
                });
                continue;
            }
        };

        let item = if dry_run {
            plan_one(ctx, &job.file, &stem, &mut reserved)
        } else {
            commit_rename(ctx, &job.file, &stem, None).map(|r| BatchItem {
                status: if r.changed {
                    ItemStatus::Renamed
                } else {
                    ItemStatus::Unchanged
                },
                from: r.from,
                to: Some(r.to),
            })
        };

        let item = item.unwrap_or_else(|err| {
            warn!(path = %job.file.display(), "リネームに失敗しました: {err:#}");
            BatchItem {
                from: job.file.clone(),
                to: None,
                status: ItemStatus::Failed {
                    error: format!("{err:#}"),
                },
            }
        });
        report.push(item);
    }

    info!(
        renamed = report.renamed,
        skipped = report.skipped,
        failed = report.failed,
        dry_run,
        "一括リネームが完了しました"
    );
    Ok(report)
}

/// dry-run 中のフォルダごとの計画。使う予定の名前と、空く予定の名前。
#[derive(Debug, Default)]
struct DirPlan {
    taken: Vec<String>,
    vacated: HashSet<String>,
}

fn plan_one(
    ctx: &RenameContext<'_>,
    file: &Path,
    stem: &str,
    reserved: &mut HashMap<PathBuf, DirPlan>,
) -> Result<BatchItem> {
    let file = ctx.vault.canonical(file);
    let dir = file
        .parent()
        .context("親ディレクトリを取得できませんでした")?
        .to_path_buf();
    let current_name = file_name_string(&file);

    let plan = reserved.entry(dir.clone()).or_default();
    let mut siblings: Vec<String> = ctx
        .vault
        .sibling_names(&dir)?
        .into_iter()
        .filter(|name| !plan.vacated.contains(name))
        .collect();
    siblings.extend(plan.taken.iter().cloned());

    let final_name = resolve_final_name(ctx, &file, stem, &siblings)?;
    if final_name == current_name {
        return Ok(BatchItem {
            from: file.clone(),
            to: Some(file),
            status: ItemStatus::Unchanged,
        });
    }
    plan.vacated.insert(current_name);
    plan.taken.push(final_name.clone());
    Ok(BatchItem {
        from: file,
        to: Some(dir.join(final_name)),
        status: ItemStatus::Planned,
    })
}

fn resolve_final_name(
    ctx: &RenameContext<'_>,
    file: &Path,
    stem: &str,
    siblings: &[String],
) -> Result<String> {
    let extension = target_extension(file, ctx.settings);
    let stem = truncate_filename_if_needed(
        &sanitize_stem(stem),
        &format!(".{extension}"),
        ctx.settings.max_filename_len,
    );
    if stem.is_empty() {
        return Err(RenameError::EmptyName.into());
    }

    let candidate = CandidateName::new(stem, &extension);
    Ok(resolve(
        &candidate,
        siblings,
        &ctx.settings.policy,
        &file_name_string(file),
    ))
}

/// ノート内で参照されているファイルを重複なしで出現順に返す。
fn embedded_files(ctx: &RenameContext<'_>, note: &Note) -> Vec<PathBuf> {
    let mut seen = HashSet::<PathBuf>::new();
    let mut files = Vec::new();
    for embed in note.embeds() {
        match ctx.vault.resolve_link(&note.path, &embed.target, embed.kind) {
            Some(path) => {
                if seen.insert(path.clone()) {
                    files.push(path);
                }
            }
            None => warn!(target_link = %embed.target, "リンク先が見つかりません"),
        }
    }
    files
}

fn rewrite_active_note(
    ctx: &RenameContext<'_>,
    active: &ActiveNote,
    link_update: &LinkUpdate,
    new_path: &Path,
) -> Result<bool> {
    let mut rewriter = NoteLinkRewriter::new(&active.note, active.cursor_line);
    let replaced = ctx
        .vault
        .link_replacements_for(link_update, new_path, &active.note.path)
        .iter()
        .any(|(old, new)| rewriter.try_replace(old, new));
    rewriter.save()?;
    Ok(replaced)
}

/// 変換後のバイト列を `target` に新規作成し、書けてから元ファイルを消す。
fn write_converted(source: &Path, target: &Path, encoded: &[u8]) -> Result<()> {
    let fail = |err: io::Error| RenameError::rename(source.to_path_buf(), target.to_path_buf(), err);

    let mut file = fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(target)
        .map_err(fail)?;
    let written = file.write_all(encoded).and_then(|()| file.sync_all());
    drop(file);
    if let Err(err) = written.and_then(|()| fs::remove_file(source)) {
        let _ = fs::remove_file(target);
        return Err(fail(err).into());
    }
    Ok(())
}

fn file_name_string(path: &Path) -> String {
    path.file_name()
        .map(|v| v.to_string_lossy().to_string())
        .unwrap_or_default()
}
