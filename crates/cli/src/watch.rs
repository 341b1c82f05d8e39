use crate::print_report;
use crate::prompt::StdinPrompt;
use anyhow::{Context, Result};
use chrono::Local;
use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use paste_image_renamer_core::{
    handle_created, ActiveNote, DirLocks, Note, Outcome, RenameContext, RenameSettings, Vault,
};
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use tracing::{debug, info, warn};

/// vault 内の作成イベントを 1 件ずつ順番に処理する。Ctrl-C で終了。
pub fn run(vault: &Vault, settings: &RenameSettings, note: Option<&Path>) -> Result<()> {
    let (tx, rx) = mpsc::channel::<PathBuf>();

    let mut watcher = RecommendedWatcher::new(
        move |res: notify::Result<Event>| match res {
            Ok(event) => {
                if !matches!(event.kind, EventKind::Create(_)) {
                    return;
                }
                for path in event.paths {
                    if tx.send(path).is_err() {
                        return;
                    }
                }
            }
            Err(err) => warn!(error = %err, "監視エラー"),
        },
        Config::default(),
    )
    .context("ファイル監視を開始できませんでした")?;
    watcher
        .watch(vault.root(), RecursiveMode::Recursive)
        .with_context(|| format!("監視できませんでした: {}", vault.root().display()))?;

    info!(vault = %vault.root().display(), "監視を開始しました");
    eprintln!("監視中: {} (Ctrl-C で終了)", vault.root().display());

    let locks = DirLocks::new();
    let ctx = RenameContext {
        vault,
        settings,
        locks: &locks,
    };
    let mut prompt = StdinPrompt;

    for path in rx {
        if !path.is_file() {
            continue;
        }
        debug!(path = %path.display(), "作成イベント");

        // 編集中のノートは毎回読み直す。
        let active = match note.map(Note::load).transpose() {
            Ok(note) => note.map(|note| ActiveNote {
                note,
                cursor_line: None,
            }),
            Err(err) => {
                eprintln!("ノートを読めませんでした: {err:#}");
                continue;
            }
        };

        match handle_created(&path, active.as_ref(), &ctx, &mut prompt, &Local::now()) {
            Ok(Outcome::Renamed(report)) => {
                if !settings.disable_rename_notice {
                    print_report(&report);
                }
            }
            Ok(Outcome::Cancelled) => eprintln!("キャンセルしました: {}", path.display()),
            Ok(Outcome::Skipped { .. }) => {}
            Err(err) => eprintln!("リネームに失敗しました: {err:#}"),
        }
    }

    Ok(())
}
