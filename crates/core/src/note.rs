use crate::context::{
    scalar_to_string, TemplateContext, VAR_DIR_NAME, VAR_FILE_NAME, VAR_FIRST_HEADING,
    VAR_IMAGE_NAME_KEY,
};
use crate::planner::LinkRewriter;
use anyhow::{Context, Result};
use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, CONTROLS};
use regex::Regex;
use serde_yaml::Value;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use tracing::warn;

static WIKI_EMBED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"!\[\[([^\]|#^]+)[^\]]*\]\]").expect("wiki embed regex")
});

static MARKDOWN_EMBED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"!\[[^\]]*\]\((<[^>]+>|[^)\s]+)(?:\s+"[^"]*")?\)"#)
        .expect("markdown embed regex")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkKind {
    Wiki,
    Markdown,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Embed {
    pub line: usize,
    pub text: String,
    pub target: String,
    pub kind: LinkKind,
}

#[derive(Debug, Clone)]
pub struct Note {
    pub path: PathBuf,
    pub content: String,
    pub frontmatter: Option<Value>,
    pub first_heading: Option<String>,
    body_start_line: usize,
}

impl Note {
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("ノートを読めませんでした: {}", path.display()))?;
        Ok(Self::parse(path, content))
    }

    pub fn parse(path: &Path, content: String) -> Self {
        let (frontmatter, body_start_line) = split_frontmatter(&content, path);
        let first_heading = find_first_heading(&content, body_start_line);
        Self {
            path: path.to_path_buf(),
            content,
            frontmatter,
            first_heading,
            body_start_line,
        }
    }

    pub fn stem(&self) -> String {
        self.path
            .file_stem()
            .map(|v| v.to_string_lossy().to_string())
            .unwrap_or_default()
    }

    /// ノートの親ディレクトリ名。vault 直下なら空文字。
    pub fn dir_name(&self, vault_root: &Path) -> String {
        match self.path.parent() {
            Some(parent) if parent != vault_root => parent
                .file_name()
                .map(|v| v.to_string_lossy().to_string())
                .unwrap_or_default(),
            _ => String::new(),
        }
    }

    pub fn image_name_key(&self) -> String {
        self.frontmatter
            .as_ref()
            .and_then(|fm| fm.get(VAR_IMAGE_NAME_KEY))
            .and_then(scalar_to_string)
            .unwrap_or_default()
    }

    pub fn template_context(&self, vault_root: &Path) -> TemplateContext {
        TemplateContext::new()
            .with_var(VAR_FILE_NAME, self.stem())
            .with_var(VAR_DIR_NAME, self.dir_name(vault_root))
            .with_var(VAR_IMAGE_NAME_KEY, self.image_name_key())
            .with_var(
                VAR_FIRST_HEADING,
                self.first_heading.clone().unwrap_or_default(),
            )
            .with_frontmatter(self.frontmatter.clone())
    }

    /// 本文中の埋め込みリンクを出現順に返す。コードブロック内は無視する。
    pub fn embeds(&self) -> Vec<Embed> {
        let mut out = Vec::new();
        for (index, line) in body_lines(&self.content, self.body_start_line) {
            let mut found: Vec<(usize, Embed)> = Vec::new();
            for caps in WIKI_EMBED.captures_iter(line) {
                let (Some(whole), Some(target)) = (caps.get(0), caps.get(1)) else {
                    continue;
                };
                found.push((
                    whole.start(),
                    Embed {
                        line: index,
                        text: whole.as_str().to_string(),
                        target: target.as_str().trim().to_string(),
                        kind: LinkKind::Wiki,
                    },
                ));
            }
            for caps in MARKDOWN_EMBED.captures_iter(line) {
                let (Some(whole), Some(target)) = (caps.get(0), caps.get(1)) else {
                    continue;
                };
                let raw = target
                    .as_str()
                    .trim_start_matches('<')
                    .trim_end_matches('>');
                if raw.contains("://") {
                    continue;
                }
                found.push((
                    whole.start(),
                    Embed {
                        line: index,
                        text: whole.as_str().to_string(),
                        target: decode_link_path(raw),
                        kind: LinkKind::Markdown,
                    },
                ));
            }
            found.sort_by_key(|(start, _)| *start);
            out.extend(found.into_iter().map(|(_, embed)| embed));
        }
        out
    }
}

/// 開いているノートの 1 行だけを書き換える。
///
/// 対象行はカーソル行、なければ旧リンクを含む最後の行。
#[derive(Debug)]
pub struct NoteLinkRewriter {
    path: PathBuf,
    lines: Vec<String>,
    cursor_line: Option<usize>,
    changed: bool,
}

impl NoteLinkRewriter {
    pub fn new(note: &Note, cursor_line: Option<usize>) -> Self {
        Self {
            path: note.path.clone(),
            lines: note.content.split_inclusive('\n').map(str::to_string).collect(),
            cursor_line,
            changed: false,
        }
    }

    pub fn changed(&self) -> bool {
        self.changed
    }

    pub fn content(&self) -> String {
        self.lines.concat()
    }

    pub fn save(&self) -> Result<bool> {
        if !self.changed {
            return Ok(false);
        }
        fs::write(&self.path, self.content())
            .with_context(|| format!("ノートを書き込めませんでした: {}", self.path.display()))?;
        Ok(true)
    }

    fn target_line(&self, old: &str) -> Option<usize> {
        match self.cursor_line {
            Some(line) => Some(line),
            None => self.lines.iter().rposition(|line| line.contains(old)),
        }
    }
}

impl LinkRewriter for NoteLinkRewriter {
    fn try_replace(&mut self, old: &str, new: &str) -> bool {
        if old.is_empty() {
            return false;
        }
        let Some(index) = self.target_line(old) else {
            return false;
        };
        let Some(line) = self.lines.get_mut(index) else {
            return false;
        };
        if !line.contains(old) {
            return false;
        }
        *line = line.replacen(old, new, 1);
        self.changed = true;
        true
    }
}

/// 生成するマークダウンリンクでエスケープする文字。非 ASCII は常にエスケープされる。
const LINK_PATH: &AsciiSet = &CONTROLS.add(b' ').add(b'"').add(b'<').add(b'>').add(b'`');

pub(crate) fn decode_link_path(value: &str) -> String {
    percent_decode_str(value).decode_utf8_lossy().into_owned()
}

pub(crate) fn encode_link_path(value: &str) -> String {
    utf8_percent_encode(value, LINK_PATH).to_string()
}

fn split_frontmatter(content: &str, path: &Path) -> (Option<Value>, usize) {
    let mut lines = content.lines();
    if lines.next().map(str::trim_end) != Some("---") {
        return (None, 0);
    }

    let mut yaml = String::new();
    for (offset, line) in lines.enumerate() {
        if line.trim_end() == "---" {
            let body_start = offset + 2;
            if yaml.trim().is_empty() {
                return (None, body_start);
            }
            return match serde_yaml::from_str::<Value>(&yaml) {
                Ok(value) => (Some(value), body_start),
                Err(err) => {
                    warn!(path = %path.display(), "frontmatter を解析できませんでした: {err}");
                    (None, body_start)
                }
            };
        }
        yaml.push_str(line);
        yaml.push('\n');
    }

    (None, 0)
}

fn find_first_heading(content: &str, body_start_line: usize) -> Option<String> {
    body_lines(content, body_start_line).find_map(|(_, line)| {
        let title = line.strip_prefix("# ")?;
        let title = title.trim().trim_end_matches('#').trim();
        (!title.is_empty()).then(|| title.to_string())
    })
}

fn body_lines(content: &str, body_start_line: usize) -> impl Iterator<Item = (usize, &str)> {
    let mut in_fence = false;
    content
        .lines()
        .enumerate()
        .skip(body_start_line)
        .filter(move |(_, line)| {
            let trimmed = line.trim_start();
            if trimmed.starts_with("```") || trimmed.starts_with("~~~") {
                in_fence = !in_fence;
                return false;
            }
            !in_fence
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "---\nimageNameKey: cover\ntags: [a]\n---\n\n```\n# not a heading\n![[ignored.png]]\n```\n# Trip to Kyoto #\n\nText ![[Pasted image 20220408.png]] and ![alt](assets/my%20shot.png \"title\")\n![[diagram.png|300]] ![web](https://example.com/a.png)\n";

    fn sample() -> Note {
        Note::parse(Path::new("/vault/travel/Kyoto.md"), SAMPLE.to_string())
    }

    #[test]
    fn parses_frontmatter_and_heading() {
        let note = sample();
        assert_eq!(note.image_name_key(), "cover");
        assert_eq!(note.first_heading.as_deref(), Some("Trip to Kyoto"));
    }

    #[test]
    fn template_context_exposes_fixed_variables() {
        let note = sample();
        let ctx = note.template_context(Path::new("/vault"));
        assert_eq!(ctx.lookup(VAR_FILE_NAME), "Kyoto");
        assert_eq!(ctx.lookup(VAR_DIR_NAME), "travel");
        assert_eq!(ctx.lookup(VAR_IMAGE_NAME_KEY), "cover");
        assert_eq!(ctx.lookup(VAR_FIRST_HEADING), "Trip to Kyoto");
        assert_eq!(ctx.lookup("tags.0"), "a");
    }

    #[test]
    fn dir_name_is_empty_at_vault_root() {
        let note = Note::parse(Path::new("/vault/Root.md"), String::new());
        assert_eq!(note.dir_name(Path::new("/vault")), "");
    }

    #[test]
    fn embeds_in_document_order_skipping_code_and_urls() {
        let embeds = sample().embeds();
        let targets: Vec<_> = embeds.iter().map(|e| e.target.as_str()).collect();
        assert_eq!(
            targets,
            vec!["Pasted image 20220408.png", "assets/my shot.png", "diagram.png"]
        );
        assert_eq!(embeds[0].kind, LinkKind::Wiki);
        assert_eq!(embeds[1].kind, LinkKind::Markdown);
        assert_eq!(embeds[2].text, "![[diagram.png|300]]");
        assert_eq!(embeds[0].line, 11);
    }

    #[test]
    fn invalid_frontmatter_is_ignored() {
        let note = Note::parse(
            Path::new("/vault/a.md"),
            "---\nkey: [unclosed\n---\n# Title\n".to_string(),
        );
        assert!(note.frontmatter.is_none());
        assert_eq!(note.first_heading.as_deref(), Some("Title"));
    }

    #[test]
    fn rewriter_replaces_only_in_cursor_line() {
        let note = Note::parse(
            Path::new("/vault/a.md"),
            "![[x.png]]\n![[x.png]]\n".to_string(),
        );
        let mut rewriter = NoteLinkRewriter::new(&note, Some(0));
        assert!(rewriter.try_replace("[[x.png]]", "[[y.png]]"));
        assert_eq!(rewriter.content(), "![[y.png]]\n![[x.png]]\n");
    }

    #[test]
    fn rewriter_defaults_to_last_matching_line() {
        let note = Note::parse(
            Path::new("/vault/a.md"),
            "![[x.png]]\ntext\n![[x.png]]".to_string(),
        );
        let mut rewriter = NoteLinkRewriter::new(&note, None);
        assert!(rewriter.try_replace("[[x.png]]", "[[y.png]]"));
        assert_eq!(rewriter.content(), "![[x.png]]\ntext\n![[y.png]]");
    }

    #[test]
    fn rewriter_is_silent_when_text_missing() {
        let note = Note::parse(Path::new("/vault/a.md"), "hello\n".to_string());
        let mut rewriter = NoteLinkRewriter::new(&note, Some(0));
        assert!(!rewriter.try_replace("[[x.png]]", "[[y.png]]"));
        assert!(!rewriter.changed());
        let mut rewriter = NoteLinkRewriter::new(&note, Some(5));
        assert!(!rewriter.try_replace("[[x.png]]", "[[y.png]]"));
    }

    #[test]
    fn link_paths_decode_and_encode() {
        assert_eq!(decode_link_path("a%20b%2Fc"), "a b/c");
        assert_eq!(decode_link_path("100%"), "100%");
        assert_eq!(decode_link_path("%zz"), "%zz");
        assert_eq!(decode_link_path("%E5%86%99%E7%9C%9F.png"), "写真.png");
        assert_eq!(encode_link_path("img/my shot.png"), "img/my%20shot.png");
        assert_eq!(encode_link_path("写真.png"), "%E5%86%99%E7%9C%9F.png");
    }
}
