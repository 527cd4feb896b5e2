//! Domain extraction from MX host names.

/// Derives the two Autoconfig lookup domains from an MX host.
///
/// Returns `(full, main)`: `full` is the host without its first label and
/// `main` is its registrable domain per the public suffix list. For
/// `mx1.mail.example.co.uk.` that is `("mail.example.co.uk", "example.co.uk")`.
pub fn extract_mx_domains(mx_host: &str) -> Result<(String, String), String> {
    let host = mx_host.trim_end_matches('.');
    let Some((_, full)) = host.split_once('.') else {
        return Err(format!("invalid MX Host name: {host}"));
    };
    if full.is_empty() {
        return Err(format!("invalid MX Host name: {host}"));
    }

    let main = psl::domain_str(&host.to_ascii_lowercase())
        .map(str::to_string)
        .ok_or_else(|| {
            format!("cannot extract maindomain: no registrable domain in {host}")
        })?;
    Ok((full.to_string(), main))
}
