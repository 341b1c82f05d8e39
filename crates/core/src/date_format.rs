//! Moment.js 互換の日付フォーマット。
//!
//! `{{DATE:YYYYMMDDHHmmss}}` のようなパターンで使われるトークンを chrono で展開する。
//! `[...]` で囲んだ部分はそのまま出力される。

use chrono::{DateTime, Datelike, Local, Timelike};

const TOKENS: &[&str] = &[
    "YYYY", "YY", "MMMM", "MMM", "MM", "M", "DDDD", "DDD", "DD", "Do", "D", "dddd", "ddd", "dd",
    "d", "HH", "H", "hh", "h", "kk", "k", "mm", "m", "ss", "s", "SSS", "SS", "S", "A", "a", "ZZ",
    "Z", "Q", "X", "x",
];

pub fn format_moment(now: &DateTime<Local>, format: &str) -> String {
    let mut out = String::with_capacity(format.len() * 2);
    let mut rest = format;

    while let Some(ch) = rest.chars().next() {
        if ch == '[' {
            if let Some(end) = rest.find(']') {
                out.push_str(&rest[1..end]);
                rest = &rest[end + 1..];
                continue;
            }
        }

        match TOKENS.iter().find(|token| rest.starts_with(**token)) {
            Some(token) => {
                out.push_str(&expand_token(now, token));
                rest = &rest[token.len()..];
            }
            None => {
                out.push(ch);
                rest = &rest[ch.len_utf8()..];
            }
        }
    }

    out
}

fn expand_token(now: &DateTime<Local>, token: &str) -> String {
    let millis = now.nanosecond() % 1_000_000_000 / 1_000_000;
    match token {
        "YYYY" => format!("{:04}", now.year()),
        "YY" => format!("{:02}", now.year().rem_euclid(100)),
        "Q" => ((now.month0() / 3) + 1).to_string(),
        "MMMM" => now.format("%B").to_string(),
        "MMM" => now.format("%b").to_string(),
        "MM" => format!("{:02}", now.month()),
        "M" => now.month().to_string(),
        "DDDD" => format!("{:03}", now.ordinal()),
        "DDD" => now.ordinal().to_string(),
        "DD" => format!("{:02}", now.day()),
        "Do" => ordinal(now.day()),
        "D" => now.day().to_string(),
        "dddd" => now.format("%A").to_string(),
        "ddd" => now.format("%a").to_string(),
        "dd" => now.format("%a").to_string().chars().take(2).collect(),
        "d" => now.weekday().num_days_from_sunday().to_string(),
        "HH" => format!("{:02}", now.hour()),
        "H" => now.hour().to_string(),
        "hh" => format!("{:02}", now.hour12().1),
        "h" => now.hour12().1.to_string(),
        "kk" => format!("{:02}", hour_1_to_24(now.hour())),
        "k" => hour_1_to_24(now.hour()).to_string(),
        "mm" => format!("{:02}", now.minute()),
        "m" => now.minute().to_string(),
        "ss" => format!("{:02}", now.second()),
        "s" => now.second().to_string(),
        "SSS" => format!("{:03}", millis),
        "SS" => format!("{:02}", millis / 10),
        "S" => (millis / 100).to_string(),
        "A" => if now.hour12().0 { "PM" } else { "AM" }.to_string(),
        "a" => if now.hour12().0 { "pm" } else { "am" }.to_string(),
        "ZZ" => now.format("%z").to_string(),
        "Z" => now.format("%:z").to_string(),
        "X" => now.timestamp().to_string(),
        "x" => now.timestamp_millis().to_string(),
        _ => token.to_string(),
    }
}

fn hour_1_to_24(hour: u32) -> u32 {
    if hour == 0 {
        24
    } else {
        hour
    }
}

fn ordinal(day: u32) -> String {
    let suffix = match (day % 10, day % 100) {
        (_, 11..=13) => "th",
        (1, _) => "st",
        (2, _) => "nd",
        (3, _) => "rd",
        _ => "th",
    };
    format!("{day}{suffix}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn fixed() -> DateTime<Local> {
        Local
            .with_ymd_and_hms(2022, 4, 8, 9, 5, 3)
            .single()
            .expect("valid local time")
    }

    #[test]
    fn formats_compact_timestamp() {
        assert_eq!(format_moment(&fixed(), "YYYYMMDDHHmmss"), "20220408090503");
    }

    #[test]
    fn keeps_separators_and_bracket_literals() {
        assert_eq!(
            format_moment(&fixed(), "YYYY-MM-DD [at] H:mm"),
            "2022-04-08 at 9:05"
        );
    }

    #[test]
    fn expands_names_and_ordinals() {
        assert_eq!(format_moment(&fixed(), "dddd, MMMM Do"), "Friday, April 8th");
        assert_eq!(format_moment(&fixed(), "ddd MMM"), "Fri Apr");
    }

    #[test]
    fn twelve_hour_clock() {
        assert_eq!(format_moment(&fixed(), "hh:mm A"), "09:05 AM");
        let evening = Local
            .with_ymd_and_hms(2022, 4, 8, 0, 30, 0)
            .single()
            .expect("valid local time");
        assert_eq!(format_moment(&evening, "h a k"), "12 am 24");
    }

    #[test]
    fn ordinal_suffixes() {
        assert_eq!(ordinal(1), "1st");
        assert_eq!(ordinal(2), "2nd");
        assert_eq!(ordinal(3), "3rd");
        assert_eq!(ordinal(11), "11th");
        assert_eq!(ordinal(13), "13th");
        assert_eq!(ordinal(22), "22nd");
    }

    #[test]
    fn unterminated_bracket_is_literal() {
        assert_eq!(format_moment(&fixed(), "[YYYY"), "[2022");
    }
}
