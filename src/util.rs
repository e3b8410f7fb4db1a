pub(crate) fn urljoin(base: &str, path: &str) -> String {
    if path.starts_with("http://") || path.starts_with("https://") {
        return path.to_string();
    }
    let base = base.trim_end_matches('/');
    if path.starts_with('/') {
        format!("{}{}", base, path)
    } else {
        format!("{}/{}", base, path)
    }
}

/// Turns a server-supplied bundle file name into a single local path component.
///
/// Every `/` and `\` becomes `-`. Names that would still point at the
/// directory itself or its parent fall back to `fallback`.
pub fn sanitize_file_name(name: &str, fallback: &str) -> String {
    let replaced: String = name
        .chars()
        .map(|c| if c == '/' || c == '\\' { '-' } else { c })
        .collect();

    match replaced.trim() {
        "" | "." | ".." => {
            let fallback: String = fallback
                .chars()
                .map(|c| if c == '/' || c == '\\' { '-' } else { c })
                .collect();
            match fallback.trim() {
                "" | "." | ".." => "download".to_string(),
                _ => fallback,
            }
        }
        _ => replaced,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn urljoin_handles_slashes() {
        assert_eq!(urljoin("https://a.test/api/", "/login"), "https://a.test/api/login");
        assert_eq!(urljoin("https://a.test/api", "task"), "https://a.test/api/task");
        assert_eq!(urljoin("https://a.test/api", "https://b.test/x"), "https://b.test/x");
    }

    #[test]
    fn separators_become_hyphens() {
        assert_eq!(sanitize_file_name("a/b.tif", "f1"), "a-b.tif");
        assert_eq!(
            sanitize_file_name("MOD11A1.061_2020/LST_Day_1km.tif", "f1"),
            "MOD11A1.061_2020-LST_Day_1km.tif"
        );
        assert_eq!(sanitize_file_name("..\\..\\evil.csv", "f1"), "..-..-evil.csv");
        assert_eq!(sanitize_file_name("/etc/passwd", "f1"), "-etc-passwd");
    }

    #[test]
    fn dot_names_fall_back_to_file_id() {
        assert_eq!(sanitize_file_name("..", "f1"), "f1");
        assert_eq!(sanitize_file_name("", "f2"), "f2");
        assert_eq!(sanitize_file_name(".", ".."), "download");
    }

    #[test]
    fn sanitized_names_never_contain_separators() {
        for name in ["a/b", "a\\b", "//", "x/../y", "plain.csv"] {
            let out = sanitize_file_name(name, "id");
            assert!(!out.contains('/') && !out.contains('\\'), "{out}");
            assert_ne!(out, "..");
        }
    }
}
