//! Shell-style argument vector tokenization for inbound commands.

/// Split trigger-stripped message text into an argument vector.
///
/// Quoted substrings stay together as single tokens. Text that shell
/// lexing rejects (an unbalanced quote, a trailing backslash) falls back
/// to plain whitespace splitting rather than swallowing the command.
pub fn tokenize(text: &str) -> Vec<String> {
    match shlex::split(text) {
        Some(argv) => argv,
        None => text.split_whitespace().map(str::to_string).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_split() {
        assert_eq!(tokenize("weather -l 92101"), vec!["weather", "-l", "92101"]);
    }

    #[test]
    fn test_quoted_substring_is_one_token() {
        assert_eq!(
            tokenize("whisper -u alice -m \"hello there\""),
            vec!["whisper", "-u", "alice", "-m", "hello there"]
        );
    }

    #[test]
    fn test_empty_text() {
        assert!(tokenize("").is_empty());
        assert!(tokenize("   ").is_empty());
    }

    #[test]
    fn test_unbalanced_quote_falls_back() {
        assert_eq!(tokenize("seen \"alice"), vec!["seen", "\"alice"]);
    }
}
