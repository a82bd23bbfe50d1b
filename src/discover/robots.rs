//! Minimal robots.txt handling: extracting `Sitemap:` directives.
//!
//! Only the sitemap directives matter for discovery; allow/disallow rules are
//! the fetch scheduler's concern and are not interpreted here.

/// Extract all `Sitemap:` directive values from a robots.txt body
pub fn sitemap_directives(content: &str) -> Vec<String> {
    content
        .lines()
        .filter_map(|line| {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                return None;
            }
            let (key, value) = line.split_once(':')?;
            if !key.trim().eq_ignore_ascii_case("sitemap") {
                return None;
            }
            let value = value.trim();
            (!value.is_empty()).then(|| value.to_string())
        })
        .collect()
}
