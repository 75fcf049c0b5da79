//! Keystroke encoding for tmux `send-keys`
//!
//! Two kinds of input reach a session:
//! - Literal text, typed as-is and confirmed with `Enter`
//! - Raw key sequences, already encoded as tmux key names (`C-c`, `Up`, `Escape`)

/// tmux key name that confirms a line of literal input
pub const CONFIRM_KEY: &str = "Enter";

/// Split a pre-encoded raw key sequence into individual tmux key arguments
///
/// Clients send sequences such as `"C-c"` or `"Escape : q Enter"`. Each
/// whitespace-separated token becomes one `send-keys` argument, passed to
/// tmux without any shell in between.
pub fn split_raw_keys(keys: &str) -> Vec<&str> {
    keys.split_whitespace().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_raw_keys() {
        assert_eq!(split_raw_keys("C-c"), vec!["C-c"]);
        assert_eq!(split_raw_keys("  Escape  :  q Enter "), vec!["Escape", ":", "q", "Enter"]);
        assert!(split_raw_keys("   ").is_empty());
    }
}
