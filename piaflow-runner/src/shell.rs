//! Shell word helpers
//!
//! `split_command` is deliberately minimal: whitespace separates words and
//! either quote character toggles a single "quoted" state. There are no
//! escapes and no nesting, so `"it's"` does not do what a shell would.

/// Splits a command line into program and arguments
pub fn split_command(command: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut quoted = false;

    for c in command.chars() {
        match c {
            '"' | '\'' => quoted = !quoted,
            c if c.is_whitespace() && !quoted => {
                if !current.is_empty() {
                    parts.push(std::mem::take(&mut current));
                }
            }
            c => current.push(c),
        }
    }

    if !current.is_empty() {
        parts.push(current);
    }

    parts
}

/// Quotes a string for POSIX sh
pub fn shell_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', r#"'"'"'"#))
}

/// Joins words into a command line, quoting each one
pub fn quote_words<S: AsRef<str>>(words: &[S]) -> String {
    words
        .iter()
        .map(|w| shell_quote(w.as_ref()))
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_plain_words() {
        assert_eq!(split_command("go test ./..."), vec!["go", "test", "./..."]);
        assert_eq!(split_command("  echo   hi  "), vec!["echo", "hi"]);
        assert!(split_command("   ").is_empty());
    }

    #[test]
    fn test_split_respects_quotes() {
        assert_eq!(
            split_command(r#"echo "hello world" 'a b'"#),
            vec!["echo", "hello world", "a b"]
        );
        assert_eq!(split_command(r#"sh -c "exit 3""#), vec!["sh", "-c", "exit 3"]);
    }

    #[test]
    fn test_split_quotes_toggle_a_single_state() {
        // A single quote inside double quotes closes the quoted state
        assert_eq!(split_command(r#"echo "it's here""#), vec!["echo", "its", "here"]);
        assert_eq!(split_command(r#"a""b"#), vec!["ab"]);
        assert!(split_command(r#""""#).is_empty());
    }

    #[test]
    fn test_shell_quote() {
        assert_eq!(shell_quote("main"), "'main'");
        assert_eq!(shell_quote("it's"), r#"'it'"'"'s'"#);
        assert_eq!(shell_quote(""), "''");
    }

    #[test]
    fn test_quote_words() {
        assert_eq!(quote_words(&["kubectl", "-n", "my ns"]), "'kubectl' '-n' 'my ns'");
    }
}
