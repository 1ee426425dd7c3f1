//! Shared utilities for the harness.

/// Mask credential material in a command line before logging.
///
/// Apply/destroy invocations carry the provider token as a `-var`
/// argument; log lines must never echo it.
pub fn mask_sensitive_command(cmd: &str) -> String {
    const SENSITIVE_KEYS: &[&str] = &[
        "hcloud_token",
        "token",
        "password",
        "secret",
        "private_key",
        "access_key",
    ];

    cmd.split_whitespace()
        .map(|word| {
            let lowered = word.to_lowercase();
            let sensitive = SENSITIVE_KEYS
                .iter()
                .any(|key| lowered.starts_with(&format!("{key}=")) || lowered.contains(&format!("{key}=")));
            if sensitive {
                match word.split_once('=') {
                    Some((key, _)) => format!("{key}=***"),
                    None => word.to_string(),
                }
            } else {
                word.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Short single-line summary of possibly multi-line process output.
pub fn first_line(text: &str) -> &str {
    text.lines().next().unwrap_or("").trim_end()
}
