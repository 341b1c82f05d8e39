use crate::context::TemplateContext;
use crate::date_format::format_moment;
use chrono::{DateTime, Local};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TemplatePart {
    Literal(String),
    Token(Token),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    Date(String),
    Variable(String),
}

const DATE_PREFIX: &str = "DATE:";

/// `{{name}}` / `{{DATE:format}}` を左から順に切り出す。
///
/// 閉じられていない `{{` は以降すべてリテラルとして扱うため、エラーにはならない。
pub fn parse_template(input: &str) -> Vec<TemplatePart> {
    let mut parts = Vec::new();
    let mut literal = String::new();
    let mut rest = input;

    while let Some(open) = rest.find("{{") {
        let after_open = &rest[open + 2..];
        let Some(close) = after_open.find("}}") else {
            break;
        };

        literal.push_str(&rest[..open]);
        if !literal.is_empty() {
            parts.push(TemplatePart::Literal(std::mem::take(&mut literal)));
        }
        parts.push(TemplatePart::Token(parse_token(&after_open[..close])));
        rest = &after_open[close + 2..];
    }

    literal.push_str(rest);
    if !literal.is_empty() {
        parts.push(TemplatePart::Literal(literal));
    }

    parts
}

pub fn render_template(parts: &[TemplatePart], ctx: &TemplateContext, now: &DateTime<Local>) -> String {
    let mut output = String::new();
    for part in parts {
        match part {
            TemplatePart::Literal(s) => output.push_str(s),
            TemplatePart::Token(Token::Date(format)) => output.push_str(&format_moment(now, format)),
            TemplatePart::Token(Token::Variable(name)) => output.push_str(&ctx.lookup(name)),
        }
    }
    output
}

/// パース込みで 1 回レンダリングする。
pub fn render(pattern: &str, ctx: &TemplateContext, now: &DateTime<Local>) -> String {
    render_template(&parse_template(pattern), ctx, now)
}

fn parse_token(token: &str) -> Token {
    match token.strip_prefix(DATE_PREFIX) {
        Some(format) => Token::Date(format.to_string()),
        None => Token::Variable(token.trim().to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{VAR_DIR_NAME, VAR_FILE_NAME, VAR_IMAGE_NAME_KEY};
    use chrono::TimeZone;

    fn clock() -> DateTime<Local> {
        Local
            .with_ymd_and_hms(2022, 4, 8, 13, 45, 10)
            .single()
            .expect("valid local time")
    }

    #[test]
    fn pattern_without_tokens_is_unchanged() {
        let ctx = TemplateContext::new().with_var(VAR_FILE_NAME, "x");
        for pattern in ["", "plain", "a } b { c", "{single}", "}}{{"] {
            assert_eq!(render(pattern, &ctx, &clock()), pattern);
        }
    }

    #[test]
    fn renders_file_name() {
        let ctx = TemplateContext::new().with_var(VAR_FILE_NAME, "My note");
        assert_eq!(render("{{fileName}}", &ctx, &clock()), "My note");
    }

    #[test]
    fn renders_image_name_key_with_date() {
        let ctx = TemplateContext::new().with_var(VAR_IMAGE_NAME_KEY, "foo");
        assert_eq!(
            render("{{imageNameKey}}-{{DATE:YYYYMMDD}}", &ctx, &clock()),
            "foo-20220408"
        );
    }

    #[test]
    fn unknown_variables_render_empty() {
        let ctx = TemplateContext::new();
        assert_eq!(render("a{{nope}}b{{dirName}}c", &ctx, &clock()), "abc");
    }

    #[test]
    fn unterminated_token_is_literal() {
        let ctx = TemplateContext::new().with_var(VAR_FILE_NAME, "note");
        assert_eq!(
            render("{{fileName}}-{{dirName", &ctx, &clock()),
            "note-{{dirName"
        );
    }

    #[test]
    fn each_token_is_replaced_once_left_to_right() {
        let ctx = TemplateContext::new()
            .with_var(VAR_FILE_NAME, "{{dirName}}")
            .with_var(VAR_DIR_NAME, "dir");
        assert_eq!(
            render("{{fileName}}_{{dirName}}", &ctx, &clock()),
            "{{dirName}}_dir"
        );
    }

    #[test]
    fn parse_splits_literals_and_tokens() {
        let parts = parse_template("img {{ fileName }} {{DATE:HH:mm}}");
        assert_eq!(
            parts,
            vec![
                TemplatePart::Literal("img ".to_string()),
                TemplatePart::Token(Token::Variable("fileName".to_string())),
                TemplatePart::Literal(" ".to_string()),
                TemplatePart::Token(Token::Date("HH:mm".to_string())),
            ]
        );
    }

    #[test]
    fn date_token_uses_injected_clock() {
        let ctx = TemplateContext::new();
        assert_eq!(render("{{DATE:HHmmss}}", &ctx, &clock()), "134510");
    }
}
