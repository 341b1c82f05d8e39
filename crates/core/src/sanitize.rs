const WINDOWS_RESERVED_NAMES: &[&str] = &[
    "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8",
    "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
];

const ALLOWED_PUNCTUATION: &[char] = &[
    ' ', '-', '_', '.', ',', '(', ')', '\'', '!', '&', '+', '=', '~', '@', '$', '%', ';',
];

pub const DEFAULT_DELIMITER: &str = "-";

/// ファイル名として使えない文字を取り除く。置換ではなく削除。
///
/// 何度適用しても結果は変わらない。
pub fn sanitize_stem(value: &str) -> String {
    let kept: String = value.chars().filter(|ch| is_allowed_char(*ch)).collect();
    let collapsed = collapse_whitespace(&kept);
    let mut out = collapsed
        .trim_matches(|c: char| c == ' ' || c == '.')
        .to_string();

    if is_windows_reserved(&out) {
        let first_dot = out.find('.').unwrap_or(out.len());
        out.insert_str(first_dot, "_file");
    }

    out
}

/// 区切り文字と空白を除いて何か残るか。
pub fn is_meaningful(stem: &str, delimiter: &str) -> bool {
    let mut rest = stem.to_string();
    if !delimiter.is_empty() {
        rest = rest.replace(delimiter, "");
    }
    rest.chars().any(|ch| !ch.is_whitespace())
}

/// 空や不正な区切り文字は `-` に置き換える。
pub fn normalize_delimiter(value: &str) -> String {
    let valid = !value.is_empty()
        && !value.trim().is_empty()
        && value.chars().all(|ch| is_allowed_char(ch) && ch != '.');
    if valid {
        value.to_string()
    } else {
        DEFAULT_DELIMITER.to_string()
    }
}

pub fn truncate_filename_if_needed(
    filename_without_ext: &str,
    extension_with_dot: &str,
    limit: usize,
) -> String {
    let ext_len = extension_with_dot.chars().count();
    if filename_without_ext.chars().count() + ext_len <= limit {
        return filename_without_ext.to_string();
    }

    let truncated: String = filename_without_ext
        .chars()
        .take(limit.saturating_sub(ext_len))
        .collect();
    truncated
        .trim_end_matches(|c: char| c == ' ' || c == '.' || c == '-' || c == '_')
        .to_string()
}

fn collapse_whitespace(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut prev_space = false;
    for ch in value.chars() {
        if ch == ' ' {
            if prev_space {
                continue;
            }
            prev_space = true;
        } else {
            prev_space = false;
        }
        out.push(ch);
    }
    out
}

fn is_allowed_char(ch: char) -> bool {
    ch.is_alphanumeric() || ALLOWED_PUNCTUATION.contains(&ch)
}

fn is_windows_reserved(value: &str) -> bool {
    let stem = value
        .split('.')
        .next()
        .unwrap_or(value)
        .to_ascii_uppercase();
    WINDOWS_RESERVED_NAMES
        .iter()
        .any(|reserved| reserved == &stem)
}
