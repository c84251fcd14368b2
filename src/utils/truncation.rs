const MAX_ERROR_LENGTH: usize = 200;

/// Shorten an error message for single-line status display.
pub fn truncate_error(error: &str) -> String {
    let first_line = error.lines().next().unwrap_or_default();
    if first_line.chars().count() <= MAX_ERROR_LENGTH {
        first_line.to_string()
    } else {
        let cut: String = first_line.chars().take(MAX_ERROR_LENGTH).collect();
        format!("{}...", cut)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_error_untouched() {
        assert_eq!(truncate_error("connection refused"), "connection refused");
    }

    #[test]
    fn test_long_error_truncated() {
        let long = "x".repeat(500);
        let out = truncate_error(&long);
        assert_eq!(out.len(), MAX_ERROR_LENGTH + 3);
        assert!(out.ends_with("..."));
    }

    #[test]
    fn test_multiline_keeps_first_line() {
        assert_eq!(truncate_error("handshake failed\nstack..."), "handshake failed");
    }
}
