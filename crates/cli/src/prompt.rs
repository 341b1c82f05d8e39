use paste_image_renamer_core::UserPrompt;
use std::io::{self, BufRead, Write};
use std::path::Path;

/// 端末で新しい名前を尋ねる。空入力は提案どおり、EOF はキャンセル。
pub struct StdinPrompt;

impl UserPrompt for StdinPrompt {
    fn confirm_name(&mut self, suggested: &str, image: &Path) -> Option<String> {
        let name = image
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        eprint!("{name} の新しい名前 [{suggested}]: ");
        let _ = io::stderr().flush();

        let mut line = String::new();
        match io::stdin().lock().read_line(&mut line) {
            Ok(0) | Err(_) => None,
            Ok(_) => Some(answer_or_default(&line, suggested)),
        }
    }
}

fn answer_or_default(line: &str, suggested: &str) -> String {
    let answer = line.trim();
    if answer.is_empty() {
        suggested.to_string()
    } else {
        answer.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_answer_keeps_suggestion() {
        assert_eq!(answer_or_default("\n", "Trip"), "Trip");
        assert_eq!(answer_or_default("  gate \n", "Trip"), "gate");
    }
}
