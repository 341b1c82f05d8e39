mod prompt;
mod watch;

use anyhow::Result;
use chrono::{DateTime, Local};
use clap::{Args, Parser, Subcommand, ValueEnum};
use paste_image_renamer_core::{
    app_paths, batch_rename_embeds, batch_rename_matching, commit_rename, generate_name,
    is_meaningful, load_config, load_config_from, render, sanitize_stem, save_config_to,
    ActiveNote, AppConfig, BatchReport, DirLocks, ItemStatus, Note, RenameContext, RenameError,
    RenameReport, RenameSettings, TemplateContext, UserPrompt, Vault,
};
use prompt::StdinPrompt;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "paste-image-renamer")]
#[command(about = "ノートに貼り付けた画像をテンプレートでリネームします")]
struct Cli {
    /// 設定ファイル (省略時は OS 標準の設定ディレクトリ)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[arg(short, long, global = true, default_value_t = false)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// 画像を 1 件リネームする
    Rename(RenameArgs),
    /// ノートに埋め込まれた画像をすべてパターンでリネームする
    Batch(BatchArgs),
    /// ノートに埋め込まれたファイルを正規表現で置換リネームする
    BatchReplace(BatchReplaceArgs),
    /// vault を監視し、貼り付けられた画像をリネームする
    Watch(WatchArgs),
    /// パターンの展開結果を表示する
    Preview(PreviewArgs),
    Config(ConfigArgs),
}

#[derive(Debug, Args)]
struct VaultArgs {
    #[arg(long, default_value = ".")]
    vault: PathBuf,
    #[arg(long)]
    pattern: Option<String>,
}

#[derive(Debug, Args)]
struct RenameArgs {
    image: PathBuf,
    #[command(flatten)]
    vault: VaultArgs,
    /// 画像を貼り付けたノート
    #[arg(long)]
    note: Option<PathBuf>,
    /// リンクを書き換える行 (1 始まり)
    #[arg(long)]
    line: Option<usize>,
    /// 確認せずにこの名前を使う
    #[arg(long)]
    name: Option<String>,
    /// 意味のある名前なら確認せずに確定する
    #[arg(long, short = 'y', default_value_t = false)]
    yes: bool,
    #[arg(long, value_enum, default_value_t = OutputFormat::Table)]
    output: OutputFormat,
}

#[derive(Debug, Args)]
struct BatchArgs {
    note: PathBuf,
    #[command(flatten)]
    vault: VaultArgs,
    #[arg(long, default_value_t = false)]
    apply: bool,
    #[arg(long, value_enum, default_value_t = OutputFormat::Table)]
    output: OutputFormat,
}

#[derive(Debug, Args)]
struct BatchReplaceArgs {
    note: PathBuf,
    #[arg(long)]
    find: String,
    #[arg(long)]
    replace: String,
    #[command(flatten)]
    vault: VaultArgs,
    #[arg(long, default_value_t = false)]
    apply: bool,
    #[arg(long, value_enum, default_value_t = OutputFormat::Table)]
    output: OutputFormat,
}

#[derive(Debug, Args)]
struct WatchArgs {
    #[command(flatten)]
    vault: VaultArgs,
    /// 貼り付け先として扱うノート
    #[arg(long)]
    note: Option<PathBuf>,
    #[arg(long, short = 'y', default_value_t = false)]
    yes: bool,
}

#[derive(Debug, Args)]
struct PreviewArgs {
    #[command(flatten)]
    vault: VaultArgs,
    #[arg(long)]
    note: Option<PathBuf>,
    #[arg(long, default_value = "png")]
    ext: String,
}

#[derive(Debug, Args)]
struct ConfigArgs {
    #[command(subcommand)]
    action: ConfigAction,
}

#[derive(Debug, Subcommand)]
enum ConfigAction {
    Show,
    Init,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormat {
    Table,
    Json,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = match &cli.config {
        Some(path) => load_config_from(path)?,
        None => load_config()?,
    };

    match cli.command {
        Commands::Rename(args) => cmd_rename(args, config),
        Commands::Batch(args) => cmd_batch(args, config),
        Commands::BatchReplace(args) => cmd_batch_replace(args, config),
        Commands::Watch(args) => cmd_watch(args, config),
        Commands::Preview(args) => cmd_preview(args, config),
        Commands::Config(config_args) => match config_args.action {
            ConfigAction::Show => cmd_config_show(cli.config.as_deref(), &config),
            ConfigAction::Init => cmd_config_init(cli.config.as_deref()),
        },
    }
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

fn with_pattern(mut config: AppConfig, pattern: Option<String>) -> AppConfig {
    if let Some(pattern) = pattern {
        config.image_name_pattern = pattern;
    }
    config
}

fn cmd_rename(args: RenameArgs, config: AppConfig) -> Result<()> {
    let mut config = with_pattern(config, args.vault.pattern);
    if args.yes {
        config.auto_rename = true;
    }
    let settings = config.settings()?;
    let vault = Vault::open(&args.vault.vault)?;
    let locks = DirLocks::new();
    let ctx = RenameContext {
        vault: &vault,
        settings: &settings,
        locks: &locks,
    };

    let active = load_active(&vault, args.note.as_deref(), args.line)?;
    let image = vault.canonical(&args.image);
    if !image.is_file() {
        anyhow::bail!("画像が存在しません: {}", image.display());
    }

    let stem = match args.name {
        Some(name) => name,
        None => {
            let active = active.as_ref().ok_or(RenameError::NoActiveDocument)?;
            let proposal = generate_name(&image, &active.note, &ctx, &Local::now());
            if proposal.needs_review {
                match StdinPrompt.confirm_name(&proposal.stem, &image) {
                    Some(stem) => stem,
                    None => {
                        eprintln!("キャンセルしました");
                        return Ok(());
                    }
                }
            } else {
                proposal.stem
            }
        }
    };

    let report = commit_rename(&ctx, &image, &stem, active.as_ref())?;
    match args.output {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        OutputFormat::Table => print_report(&report),
    }
    Ok(())
}

fn cmd_batch(args: BatchArgs, config: AppConfig) -> Result<()> {
    let settings = with_pattern(config, args.vault.pattern).settings()?;
    let vault = Vault::open(&args.vault.vault)?;
    let locks = DirLocks::new();
    let ctx = RenameContext {
        vault: &vault,
        settings: &settings,
        locks: &locks,
    };
    let note = Note::load(&vault.canonical(&args.note))?;

    let report = batch_rename_embeds(&ctx, &note, &Local::now(), !args.apply)?;
    finish_batch(&report, args.output, args.apply)
}

fn cmd_batch_replace(args: BatchReplaceArgs, config: AppConfig) -> Result<()> {
    let settings = with_pattern(config, args.vault.pattern).settings()?;
    let vault = Vault::open(&args.vault.vault)?;
    let locks = DirLocks::new();
    let ctx = RenameContext {
        vault: &vault,
        settings: &settings,
        locks: &locks,
    };
    let note = Note::load(&vault.canonical(&args.note))?;

    let report = batch_rename_matching(&ctx, &note, &args.find, &args.replace, !args.apply)?;
    finish_batch(&report, args.output, args.apply)
}

fn cmd_watch(args: WatchArgs, config: AppConfig) -> Result<()> {
    let mut config = with_pattern(config, args.vault.pattern);
    if args.yes {
        config.auto_rename = true;
    }
    let settings = config.settings()?;
    let vault = Vault::open(&args.vault.vault)?;
    let note = args.note.map(|path| vault.canonical(&path));
    watch::run(&vault, &settings, note.as_deref())
}

fn cmd_preview(args: PreviewArgs, config: AppConfig) -> Result<()> {
    let settings = with_pattern(config, args.vault.pattern).settings()?;
    let vault = Vault::open(&args.vault.vault)?;
    let stem = preview_stem(&vault, args.note.as_deref(), &settings, &Local::now())?;

    println!("{}.{}", stem, args.ext.to_lowercase());
    if !is_meaningful(&stem, settings.policy.delimiter()) {
        eprintln!("この名前は空とみなされるため、リネーム時に確認が求められます");
    }
    Ok(())
}

fn preview_stem(
    vault: &Vault,
    note: Option<&Path>,
    settings: &RenameSettings,
    now: &DateTime<Local>,
) -> Result<String> {
    let ctx = match note {
        Some(path) => Note::load(&vault.canonical(path))?.template_context(vault.root()),
        None => TemplateContext::new(),
    };
    Ok(sanitize_stem(&render(&settings.pattern, &ctx, now)))
}

fn cmd_config_show(path: Option<&Path>, config: &AppConfig) -> Result<()> {
    let path = match path {
        Some(path) => path.to_path_buf(),
        None => app_paths()?.config_path,
    };
    println!("設定ファイル: {}", path.display());
    println!("{}", toml::to_string_pretty(config)?);
    Ok(())
}

fn cmd_config_init(path: Option<&Path>) -> Result<()> {
    let path = match path {
        Some(path) => path.to_path_buf(),
        None => app_paths()?.config_path,
    };
    if path.exists() {
        println!("設定ファイルは既に存在します: {}", path.display());
        return Ok(());
    }
    save_config_to(&AppConfig::default(), &path)?;
    println!("設定ファイルを作成しました: {}", path.display());
    Ok(())
}

fn load_active(vault: &Vault, note: Option<&Path>, line: Option<usize>) -> Result<Option<ActiveNote>> {
    let Some(note) = note else {
        return Ok(None);
    };
    let note = Note::load(&vault.canonical(note))?;
    Ok(Some(ActiveNote {
        note,
        cursor_line: line.map(|l| l.saturating_sub(1)),
    }))
}

fn finish_batch(report: &BatchReport, output: OutputFormat, applied: bool) -> Result<()> {
    match output {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(report)?),
        OutputFormat::Table => print_batch(report),
    }
    if applied {
        eprintln!("{}", report.summary());
    } else {
        eprintln!("dry-runモード: 実ファイルは変更していません。適用するには --apply を指定してください。");
    }
    Ok(())
}

pub(crate) fn print_report(report: &RenameReport) {
    if !report.changed {
        println!("変更なし: {}", report.from.display());
        return;
    }
    if let Some(notice) = &report.notice {
        println!("{notice}");
    }
    if let Some(format) = report.converted {
        println!("  変換: {}", format.extension());
    }
    println!(
        "  リンク更新: 編集中ノート={} 他ノート={}件",
        if report.link_updated { "あり" } else { "なし" },
        report.notes_updated
    );
}

fn print_batch(report: &BatchReport) {
    println!("元ファイル -> 新ファイル (status)");
    for item in &report.items {
        let to = item
            .to
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "-".to_string());
        let status = match &item.status {
            ItemStatus::Renamed => "renamed".to_string(),
            ItemStatus::Planned => "planned".to_string(),
            ItemStatus::Unchanged => "unchanged".to_string(),
            ItemStatus::Skipped { reason } => format!("skipped: {reason}"),
            ItemStatus::Failed { error } => format!("failed: {error}"),
        };
        println!("{} -> {} ({})", item.from.display(), to, status);
    }

    println!(
        "\n集計: renamed={} skipped={} failed={}",
        report.renamed, report.skipped, report.failed
    );
}
