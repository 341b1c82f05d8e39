mod apply;
mod attachment;
mod config;
mod context;
mod convert;
mod date_format;
mod dedup;
mod error;
mod note;
mod planner;
mod sanitize;
mod template;
mod vault;

pub const DEFAULT_PATTERN: &str = "{{fileName}}";

pub use apply::{
    batch_rename_embeds, batch_rename_matching, commit_rename, BatchItem, BatchReport, DirLocks,
    ItemStatus, RenameReport,
};
pub use attachment::{
    is_image, is_markdown, is_pasted_image, should_handle, target_extension, SkipReason,
    PASTED_IMAGE_PREFIX,
};
pub use config::{
    app_paths, load_config, load_config_from, save_config, save_config_to, AppConfig, AppPaths,
    RenameSettings,
};
pub use context::TemplateContext;
pub use convert::{convert, is_png, parse_quality, ConvertTarget};
pub use date_format::format_moment;
pub use dedup::{resolve, CandidateName, DuplicatePolicy};
pub use error::RenameError;
pub use note::{Embed, LinkKind, Note, NoteLinkRewriter};
pub use planner::{
    generate_name, handle_created, ActiveNote, LinkRewriter, NameProposal, Outcome, RenameContext,
    UserPrompt,
};
pub use sanitize::{is_meaningful, normalize_delimiter, sanitize_stem};
pub use template::{parse_template, render, render_template, TemplatePart, Token};
pub use vault::{LinkUpdate, Vault};
