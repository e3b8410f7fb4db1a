use anyhow::{Context, Result, bail};
use std::path::{Path, PathBuf};

use crate::client::ClientConfig;
use crate::session::Credentials;

pub(crate) const DEFAULT_URL: &str = "https://appeears.earthdatacloud.nasa.gov/api";

#[derive(Debug, Default)]
struct RcConfig {
    url: Option<String>,
    bundle_url: Option<String>,
    username: Option<String>,
    password: Option<String>,
    verify: Option<bool>,
}

pub(crate) fn load_config(url: Option<String>, verify: Option<bool>) -> Result<ClientConfig> {
    let mut url = url.or_else(|| std::env::var("APPEEARS_URL").ok());
    let mut bundle_url = std::env::var("APPEEARS_BUNDLE_URL").ok();
    let mut file_verify: Option<bool> = None;

    if url.is_none() || bundle_url.is_none() || verify.is_none() {
        if let Some(cfg) = read_first_rc()? {
            url = url.or(cfg.url);
            bundle_url = bundle_url.or(cfg.bundle_url);
            file_verify = cfg.verify;
        }
    }

    let url = url.unwrap_or_else(|| DEFAULT_URL.to_string());
    let bundle_url = bundle_url.unwrap_or_else(|| url.clone());
    let verify = verify.or(file_verify).unwrap_or(true);

    Ok(ClientConfig {
        url,
        bundle_url,
        verify,
    })
}

pub(crate) fn load_credentials(
    username: Option<String>,
    password: Option<String>,
) -> Result<Credentials> {
    let mut username = username.or_else(|| std::env::var("APPEEARS_USERNAME").ok());
    let mut password = password.or_else(|| std::env::var("APPEEARS_PASSWORD").ok());

    if username.is_none() || password.is_none() {
        if let Some(cfg) = read_first_rc()? {
            username = username.or(cfg.username);
            password = password.or(cfg.password);
        }
    }

    let locations = || {
        rc_candidates()
            .iter()
            .map(|p| p.display().to_string())
            .collect::<Vec<_>>()
            .join(", ")
    };

    let Some(username) = username else {
        bail!(
            "Missing configuration: username (set APPEEARS_USERNAME or put `username:` in one of: {})",
            locations()
        );
    };
    let Some(password) = password else {
        bail!(
            "Missing configuration: password (set APPEEARS_PASSWORD or put `password:` in one of: {})",
            locations()
        );
    };

    Ok(Credentials::new(username, password))
}

fn read_first_rc() -> Result<Option<RcConfig>> {
    for rc_path in rc_candidates() {
        if rc_path.exists() {
            let cfg = read_rc(&rc_path).with_context(|| {
                format!("failed to read configuration file {}", rc_path.display())
            })?;
            return Ok(Some(cfg));
        }
    }
    Ok(None)
}

fn read_rc(path: &Path) -> Result<RcConfig> {
    let text = std::fs::read_to_string(path)?;
    Ok(parse_rc(&text))
}

fn parse_rc(text: &str) -> RcConfig {
    let mut cfg = RcConfig::default();

    // `password:` may sit on one line with the value on the next.
    let mut pending_key: Option<&str> = None;

    for raw in text.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        if let Some(pk) = pending_key.take() {
            if !is_key_line(line) {
                assign(&mut cfg, pk, strip_quotes(line));
                continue;
            }
        }

        if let Some((k, v)) = line.split_once(':') {
            let k = k.trim();
            let v = strip_quotes(v.trim());
            match k {
                k if VALUE_KEYS.contains(&k) => {
                    if v.is_empty() {
                        pending_key = Some(k);
                    } else {
                        assign(&mut cfg, k, v);
                    }
                }
                "verify" => {
                    if !v.is_empty() {
                        cfg.verify = Some(v != "0" && !v.eq_ignore_ascii_case("false"));
                    }
                }
                _ => {}
            }
        }
    }

    cfg
}

const VALUE_KEYS: [&str; 4] = ["url", "bundle_url", "username", "password"];

fn is_key_line(line: &str) -> bool {
    line.split_once(':')
        .is_some_and(|(k, _)| VALUE_KEYS.contains(&k.trim()) || k.trim() == "verify")
}

fn assign(cfg: &mut RcConfig, key: &str, value: &str) {
    let value = Some(value.to_string());
    match key {
        "url" => cfg.url = value,
        "bundle_url" => cfg.bundle_url = value,
        "username" => cfg.username = value,
        "password" => cfg.password = value,
        _ => {}
    }
}

fn strip_quotes(s: &str) -> &str {
    let s = s.trim();
    if (s.starts_with('"') && s.ends_with('"') && s.len() >= 2)
        || (s.starts_with('\'') && s.ends_with('\'') && s.len() >= 2)
    {
        &s[1..s.len() - 1]
    } else {
        s
    }
}

fn rc_candidates() -> Vec<PathBuf> {
    // 1) APPEEARS_RC (explicit)
    // 2) ./.appeearsrc
    // 3) ~/.appeearsrc
    if let Ok(p) = std::env::var("APPEEARS_RC") {
        return vec![PathBuf::from(p)];
    }

    let mut v = Vec::new();
    if let Ok(cwd) = std::env::current_dir() {
        v.push(cwd.join(".appeearsrc"));
    }
    if let Some(home) = dirs::home_dir() {
        v.push(home.join(".appeearsrc"));
    }
    v
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn parses_inline_and_continuation_values() {
        let cfg = parse_rc(
            "# AppEEARS settings\n\
             url: https://example.test/api\n\
             username: 'alice'\n\
             password:\n\
             \"s3cr:et\"\n\
             verify: 0\n",
        );
        assert_eq!(cfg.url.as_deref(), Some("https://example.test/api"));
        assert_eq!(cfg.username.as_deref(), Some("alice"));
        assert_eq!(cfg.password.as_deref(), Some("s3cr:et"));
        assert_eq!(cfg.verify, Some(false));
        assert_eq!(cfg.bundle_url, None);
    }

    #[test]
    fn unknown_keys_are_ignored() {
        let cfg = parse_rc("key: 123\nbundle_url: https://files.test/api\n");
        assert_eq!(cfg.bundle_url.as_deref(), Some("https://files.test/api"));
        assert!(cfg.url.is_none());
    }

    #[test]
    fn reads_rc_from_disk() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(".appeearsrc");
        fs::write(&path, "username: bob\npassword: hunter2\n").unwrap();

        let cfg = read_rc(&path).unwrap();
        assert_eq!(cfg.username.as_deref(), Some("bob"));
        assert_eq!(cfg.password.as_deref(), Some("hunter2"));
    }

    #[test]
    fn explicit_arguments_win() {
        let cfg = load_config(Some("https://override.test/api".into()), Some(false)).unwrap();
        assert_eq!(cfg.url, "https://override.test/api");
        assert!(!cfg.verify);

        let creds = load_credentials(Some("u".into()), Some("p".into())).unwrap();
        assert_eq!(creds.username(), "u");
    }

    #[test]
    fn strip_quotes_handles_both_styles() {
        assert_eq!(strip_quotes("\"a\""), "a");
        assert_eq!(strip_quotes("'b'"), "b");
        assert_eq!(strip_quotes("\""), "\"");
        assert_eq!(strip_quotes(" c "), "c");
    }
}
