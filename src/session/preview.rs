//! One-line previews of captured pane output

use std::borrow::Cow;
use std::sync::LazyLock;

use regex::Regex;

/// Maximum preview length in characters before truncation
pub const PREVIEW_MAX_CHARS: usize = 80;

/// CSI sequences: colors, cursor movement, erase
static CSI_PATTERN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\x1b\[[0-9;]*[a-zA-Z]").unwrap());

/// OSC sequences terminated by BEL: window titles, hyperlinks
static OSC_PATTERN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\x1b\][^\x07]*\x07").unwrap());

/// Remove CSI and OSC escape sequences
pub fn strip_ansi(text: &str) -> Cow<'_, str> {
    match CSI_PATTERN.replace_all(text, "") {
        Cow::Borrowed(s) => OSC_PATTERN.replace_all(s, ""),
        Cow::Owned(s) => Cow::Owned(OSC_PATTERN.replace_all(&s, "").into_owned()),
    }
}

/// Last non-blank line of `output`, trimmed and truncated
pub fn preview_line(output: &str) -> String {
    let stripped = strip_ansi(output);
    let Some(line) = stripped
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .last()
    else {
        return String::new();
    };

    if line.chars().count() > PREVIEW_MAX_CHARS {
        let mut truncated: String = line.chars().take(PREVIEW_MAX_CHARS).collect();
        truncated.push_str("...");
        truncated
    } else {
        line.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_ansi() {
        assert_eq!(strip_ansi("\x1b[1;32mok\x1b[0m"), "ok");
        assert_eq!(strip_ansi("\x1b]0;title\x07prompt"), "prompt");
        assert_eq!(strip_ansi("plain"), "plain");
    }

    #[test]
    fn test_preview_takes_last_non_blank_line() {
        let output = "first\n\x1b[32m  > done  \x1b[0m\n\n   \n";
        assert_eq!(preview_line(output), "> done");
    }

    #[test]
    fn test_preview_empty() {
        assert_eq!(preview_line(""), "");
        assert_eq!(preview_line("\n  \n\x1b[0m\n"), "");
    }

    #[test]
    fn test_preview_truncates_by_chars() {
        let long = "é".repeat(100);
        let preview = preview_line(&long);
        assert!(preview.ends_with("..."));
        assert_eq!(preview.chars().count(), PREVIEW_MAX_CHARS + 3);

        let exact = "x".repeat(PREVIEW_MAX_CHARS);
        assert_eq!(preview_line(&exact), exact);
    }
}
