use crate::sanitize::normalize_delimiter;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateName {
    pub stem: String,
    pub extension: String,
}

impl CandidateName {
    pub fn new(stem: impl Into<String>, extension: &str) -> Self {
        Self {
            stem: stem.into(),
            extension: extension.to_lowercase(),
        }
    }

    pub fn file_name(&self) -> String {
        join_name(&self.stem, &self.extension)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DuplicatePolicy {
    pub number_at_start: bool,
    delimiter: String,
    pub always: bool,
}

impl DuplicatePolicy {
    pub fn new(number_at_start: bool, delimiter: &str, always: bool) -> Self {
        Self {
            number_at_start,
            delimiter: normalize_delimiter(delimiter),
            always,
        }
    }

    pub fn delimiter(&self) -> &str {
        &self.delimiter
    }

    fn numbered(&self, candidate: &CandidateName, n: u64) -> String {
        let stem = if self.number_at_start {
            format!("{}{}{}", n, self.delimiter, candidate.stem)
        } else {
            format!("{}{}{}", candidate.stem, self.delimiter, n)
        };
        join_name(&stem, &candidate.extension)
    }

    fn number_pattern(&self, candidate: &CandidateName) -> Option<Regex> {
        let stem = regex::escape(&candidate.stem);
        let delimiter = regex::escape(&self.delimiter);
        let ext = if candidate.extension.is_empty() {
            String::new()
        } else {
            format!(r"\.{}", regex::escape(&candidate.extension))
        };
        let pattern = if self.number_at_start {
            format!(r"^([0-9]+){delimiter}{stem}{ext}$")
        } else {
            format!(r"^{stem}{delimiter}([0-9]+){ext}$")
        };
        Regex::new(&pattern).ok()
    }
}

impl Default for DuplicatePolicy {
    fn default() -> Self {
        Self::new(false, crate::sanitize::DEFAULT_DELIMITER, false)
    }
}

/// 兄弟ファイル名のスナップショットから衝突しない最終ファイル名を決める。
///
/// 番号は既存の最大値 + 1。欠番は埋めない。
pub fn resolve(
    candidate: &CandidateName,
    siblings: &[String],
    policy: &DuplicatePolicy,
    self_name: &str,
) -> String {
    let target = candidate.file_name();
    let pattern = policy.number_pattern(candidate);

    let mut exists = false;
    let mut max_number: Option<u64> = None;
    for sibling in siblings.iter().filter(|name| name.as_str() != self_name) {
        if *sibling == target {
            exists = true;
        }
        let number = pattern
            .as_ref()
            .and_then(|re| re.captures(sibling))
            .and_then(|caps| caps.get(1))
            .and_then(|m| m.as_str().parse::<u64>().ok());
        if let Some(number) = number {
            max_number = Some(max_number.map_or(number, |max| max.max(number)));
        }
    }

    if !exists && !policy.always {
        return target;
    }

    let next = max_number.unwrap_or(0).saturating_add(1);
    let resolved = policy.numbered(candidate, next);
    debug!(name = %target, resolved = %resolved, exists, "重複番号を付与しました");
    resolved
}

fn join_name(stem: &str, extension: &str) -> String {
    if extension.is_empty() {
        stem.to_string()
    } else {
        format!("{stem}.{extension}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    fn foo_png() -> CandidateName {
        CandidateName::new("foo", "png")
    }

    #[test]
    fn first_collision_gets_number_one() {
        let resolved = resolve(
            &foo_png(),
            &names(&["foo.png"]),
            &DuplicatePolicy::default(),
            "",
        );
        assert_eq!(resolved, "foo-1.png");
    }

    #[test]
    fn numbering_is_max_plus_one_without_gap_filling() {
        let resolved = resolve(
            &foo_png(),
            &names(&["foo.png", "foo-1.png", "foo-3.png"]),
            &DuplicatePolicy::default(),
            "",
        );
        assert_eq!(resolved, "foo-4.png");
    }

    #[test]
    fn no_collision_keeps_name() {
        let resolved = resolve(&foo_png(), &[], &DuplicatePolicy::default(), "");
        assert_eq!(resolved, "foo.png");
    }

    #[test]
    fn prefix_policy_counts_prefixed_numbers() {
        let policy = DuplicatePolicy::new(true, "-", true);
        let resolved = resolve(&foo_png(), &names(&["2-foo.png"]), &policy, "");
        assert_eq!(resolved, "3-foo.png");
    }

    #[test]
    fn prefix_policy_numbers_an_exact_collision() {
        let policy = DuplicatePolicy::new(true, "-", false);
        let resolved = resolve(&foo_png(), &names(&["foo.png", "1-foo.png"]), &policy, "");
        assert_eq!(resolved, "2-foo.png");
    }

    #[test]
    fn multi_character_delimiter_is_matched_literally() {
        let policy = DuplicatePolicy::new(false, " + ", false);
        assert_eq!(policy.delimiter(), " + ");
        let resolved = resolve(
            &foo_png(),
            &names(&["foo.png", "foo + 2.png", "foo+7.png", "foo  + 9.png"]),
            &policy,
            "",
        );
        assert_eq!(resolved, "foo + 3.png");
    }

    #[test]
    fn always_numbers_even_without_collision() {
        let policy = DuplicatePolicy::new(false, "_", true);
        let resolved = resolve(&foo_png(), &[], &policy, "");
        assert_eq!(resolved, "foo_1.png");
    }

    #[test]
    fn numbered_siblings_alone_do_not_force_numbering() {
        let resolved = resolve(
            &foo_png(),
            &names(&["foo-1.png", "foo-2.png"]),
            &DuplicatePolicy::default(),
            "",
        );
        assert_eq!(resolved, "foo.png");
    }

    #[test]
    fn self_name_is_excluded() {
        let resolved = resolve(
            &foo_png(),
            &names(&["foo.png", "bar.png"]),
            &DuplicatePolicy::default(),
            "foo.png",
        );
        assert_eq!(resolved, "foo.png");
    }

    #[test]
    fn match_is_case_sensitive() {
        let resolved = resolve(
            &foo_png(),
            &names(&["Foo.png", "FOO-7.png"]),
            &DuplicatePolicy::default(),
            "",
        );
        assert_eq!(resolved, "foo.png");
    }

    #[test]
    fn regex_metacharacters_in_stem_are_literal() {
        let candidate = CandidateName::new("a+b (1)", "png");
        let resolved = resolve(
            &candidate,
            &names(&["a+b (1).png", "a+b (1)-5.png", "aab (1)-9.png"]),
            &DuplicatePolicy::default(),
            "",
        );
        assert_eq!(resolved, "a+b (1)-6.png");
    }

    #[test]
    fn overflowing_numbers_are_ignored() {
        let resolved = resolve(
            &foo_png(),
            &names(&["foo.png", "foo-99999999999999999999999.png", "foo-2.png"]),
            &DuplicatePolicy::default(),
            "",
        );
        assert_eq!(resolved, "foo-3.png");
    }

    #[test]
    fn other_extensions_do_not_count() {
        let resolved = resolve(
            &foo_png(),
            &names(&["foo.png", "foo-8.jpeg"]),
            &DuplicatePolicy::default(),
            "",
        );
        assert_eq!(resolved, "foo-1.png");
    }

    #[test]
    fn invalid_delimiter_collapses_to_hyphen() {
        let policy = DuplicatePolicy::new(false, "", false);
        assert_eq!(policy.delimiter(), "-");
        let policy = DuplicatePolicy::new(false, "a/b", false);
        assert_eq!(policy.delimiter(), "-");
    }

    #[test]
    fn extension_is_lowercased() {
        assert_eq!(CandidateName::new("x", "PNG").file_name(), "x.png");
    }
}
