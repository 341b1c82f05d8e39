use serde_yaml::Value;
use std::collections::BTreeMap;

pub const VAR_FILE_NAME: &str = "fileName";
pub const VAR_DIR_NAME: &str = "dirName";
pub const VAR_IMAGE_NAME_KEY: &str = "imageNameKey";
pub const VAR_FIRST_HEADING: &str = "firstHeading";

/// レンダリング時点の変数スナップショット。
///
/// 固定変数を先に引き、見つからなければ frontmatter をドット区切りのパスで辿る。
#[derive(Debug, Clone, Default)]
pub struct TemplateContext {
    vars: BTreeMap<String, String>,
    frontmatter: Option<Value>,
}

impl TemplateContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_var(mut self, name: &str, value: impl Into<String>) -> Self {
        self.vars.insert(name.to_string(), value.into());
        self
    }

    pub fn with_frontmatter(mut self, frontmatter: Option<Value>) -> Self {
        self.frontmatter = frontmatter;
        self
    }

    pub fn lookup(&self, name: &str) -> String {
        if let Some(value) = self.vars.get(name) {
            return value.clone();
        }
        self.frontmatter
            .as_ref()
            .and_then(|fm| lookup_path(fm, name))
            .unwrap_or_default()
    }
}

pub(crate) fn lookup_path(root: &Value, path: &str) -> Option<String> {
    let mut current = root;
    for segment in path.split('.') {
        let segment = segment.trim();
        if segment.is_empty() {
            return None;
        }
        current = match current {
            Value::Mapping(map) => map.get(segment)?,
            Value::Sequence(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    scalar_to_string(current)
}

pub(crate) fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Tagged(tagged) => scalar_to_string(&tagged.value),
        Value::Null | Value::Mapping(_) | Value::Sequence(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frontmatter() -> Value {
        serde_yaml::from_str(
            "imageNameKey: cover\nauthor:\n  name: Kelly\n  tags: [a, b]\nyear: 2022\ndraft: true\n",
        )
        .expect("valid yaml")
    }

    #[test]
    fn fixed_vars_shadow_frontmatter() {
        let ctx = TemplateContext::new()
            .with_var(VAR_IMAGE_NAME_KEY, "fixed")
            .with_frontmatter(Some(frontmatter()));
        assert_eq!(ctx.lookup(VAR_IMAGE_NAME_KEY), "fixed");
    }

    #[test]
    fn dotted_paths_walk_mappings_and_sequences() {
        let ctx = TemplateContext::new().with_frontmatter(Some(frontmatter()));
        assert_eq!(ctx.lookup("author.name"), "Kelly");
        assert_eq!(ctx.lookup("author.tags.1"), "b");
        assert_eq!(ctx.lookup("year"), "2022");
        assert_eq!(ctx.lookup("draft"), "true");
    }

    #[test]
    fn missing_or_non_scalar_values_are_empty() {
        let ctx = TemplateContext::new().with_frontmatter(Some(frontmatter()));
        assert_eq!(ctx.lookup("author"), "");
        assert_eq!(ctx.lookup("author.email"), "");
        assert_eq!(ctx.lookup("author..name"), "");
        assert_eq!(TemplateContext::new().lookup("fileName"), "");
    }
}
