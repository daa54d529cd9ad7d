use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::{env_subst::substitute_env, schema::GroupcastConfig};

/// Standard config file names, checked in order.
const CONFIG_FILENAMES: &[&str] = &[
    "groupcast.toml",
    "groupcast.yaml",
    "groupcast.yml",
    "groupcast.json",
];

/// Load config from the given path (any supported format).
pub fn load_config(path: &Path) -> anyhow::Result<GroupcastConfig> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("failed to read {}: {e}", path.display()))?;
    let raw = substitute_env(&raw);
    parse_config(&raw, path)
}

/// Discover and load config from standard locations.
///
/// Search order:
/// 1. `./groupcast.{toml,yaml,yml,json}` (project-local)
/// 2. `~/.config/groupcast/groupcast.{toml,yaml,yml,json}` (user-global)
///
/// Returns `GroupcastConfig::default()` if no config file is found or the
/// one found fails to parse.
pub fn discover_and_load() -> GroupcastConfig {
    let Some(path) = find_config_file() else {
        debug!("no config file found, using defaults");
        return GroupcastConfig::default();
    };
    debug!(path = %path.display(), "loading config");
    match load_config(&path) {
        Ok(cfg) => cfg,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "failed to load config, using defaults");
            GroupcastConfig::default()
        },
    }
}

/// Effective configuration: the explicit file (which must load) or the
/// discovered one, with process environment overrides applied on top.
pub fn load(explicit: Option<&Path>) -> anyhow::Result<GroupcastConfig> {
    let config = match explicit {
        Some(path) => {
            debug!(path = %path.display(), "loading config");
            load_config(path)?
        },
        None => discover_and_load(),
    };
    Ok(apply_env_overrides(config, |name| std::env::var(name).ok()))
}

/// Apply `PORT`, `HOST` and `AUTH_TOKEN` from the environment.
///
/// An unparsable `PORT` is logged and ignored so the configured port stays.
pub fn apply_env_overrides(
    mut config: GroupcastConfig,
    lookup: impl Fn(&str) -> Option<String>,
) -> GroupcastConfig {
    if let Some(port) = lookup("PORT").filter(|v| !v.trim().is_empty()) {
        match port.trim().parse::<u16>() {
            Ok(port) => config.server.port = port,
            Err(e) => warn!(
                value = %port,
                error = %e,
                port = config.server.port,
                "ignoring invalid PORT"
            ),
        }
    }
    if let Some(host) = lookup("HOST").filter(|v| !v.trim().is_empty()) {
        config.server.bind = host.trim().to_string();
    }
    if let Some(token) = lookup("AUTH_TOKEN").filter(|v| !v.is_empty()) {
        config.server.auth_token = Some(token);
    }
    config
}

/// Find the first config file in standard locations.
pub fn find_config_file() -> Option<PathBuf> {
    let mut dirs = vec![PathBuf::from(".")];
    dirs.extend(config_dir());
    find_config_file_in(&dirs)
}

fn find_config_file_in(dirs: &[PathBuf]) -> Option<PathBuf> {
    dirs.iter()
        .flat_map(|dir| CONFIG_FILENAMES.iter().map(move |name| dir.join(name)))
        .find(|p| p.exists())
}

/// Returns the user config directory, `~/.config/groupcast/` on all platforms.
pub fn config_dir() -> Option<PathBuf> {
    home_dir().map(|h| h.join(".config").join("groupcast"))
}

fn home_dir() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| d.home_dir().to_path_buf())
}

fn parse_config(raw: &str, path: &Path) -> anyhow::Result<GroupcastConfig> {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("toml");

    match ext {
        "toml" => Ok(toml::from_str(raw)?),
        "yaml" | "yml" => Ok(serde_yaml::from_str(raw)?),
        "json" => Ok(serde_json::from_str(raw)?),
        _ => anyhow::bail!("unsupported config format: .{ext}"),
    }
}

#[cfg(test)]
mod tests {
    use {super::*, std::collections::HashMap};

    fn write(dir: &tempfile::TempDir, name: &str, body: &str) -> PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, body).unwrap();
        path
    }

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn loads_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            &dir,
            "groupcast.toml",
            r#"
[server]
port = 4000
auth_token = "s3cr3t"

[whatsapp]
client_id = "ops"

[whatsapp.driver]
command = "/usr/bin/node"
args = ["bridge/index.js", "--headless"]
"#,
        );
        let cfg = load_config(&path).unwrap();
        assert_eq!(cfg.server.port, 4000);
        assert_eq!(cfg.server.bind, "0.0.0.0");
        assert_eq!(cfg.server.auth_token.as_deref(), Some("s3cr3t"));
        assert_eq!(cfg.whatsapp.client_id, "ops");
        assert_eq!(cfg.whatsapp.data_path, PathBuf::from(".wwebjs_auth"));
        assert_eq!(cfg.whatsapp.driver.args, ["bridge/index.js", "--headless"]);
    }

    #[test]
    fn loads_yaml_and_json() {
        let dir = tempfile::tempdir().unwrap();
        let yaml = write(&dir, "groupcast.yaml", "server:\n  port: 5000\n");
        assert_eq!(load_config(&yaml).unwrap().server.port, 5000);

        let json = write(
            &dir,
            "groupcast.json",
            r#"{"whatsapp":{"print_qr":false}}"#,
        );
        assert!(!load_config(&json).unwrap().whatsapp.print_qr);
    }

    #[test]
    fn substitutes_placeholders_before_parsing() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            &dir,
            "groupcast.toml",
            "[server]\nauth_token = \"${GROUPCAST_LOADER_UNSET_XYZ:-from-default}\"\n",
        );
        let cfg = load_config(&path).unwrap();
        assert_eq!(cfg.server.auth_token.as_deref(), Some("from-default"));
    }

    #[test]
    fn rejects_unknown_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(&dir, "groupcast.ini", "port=1");
        let err = load_config(&path).unwrap_err().to_string();
        assert!(err.contains("unsupported config format"));
    }

    #[test]
    fn explicit_missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load(Some(&dir.path().join("nope.toml"))).is_err());
    }

    #[test]
    fn discovery_prefers_earlier_dirs_and_names() {
        let local = tempfile::tempdir().unwrap();
        let global = tempfile::tempdir().unwrap();
        write(&global, "groupcast.toml", "");
        let dirs = [local.path().to_path_buf(), global.path().to_path_buf()];
        assert_eq!(
            find_config_file_in(&dirs),
            Some(global.path().join("groupcast.toml"))
        );

        write(&local, "groupcast.yaml", "");
        write(&local, "groupcast.json", "");
        assert_eq!(
            find_config_file_in(&dirs),
            Some(local.path().join("groupcast.yaml"))
        );
    }

    #[test]
    fn env_overrides_win() {
        let cfg = apply_env_overrides(
            GroupcastConfig::default(),
            env(&[("PORT", "8080"), ("AUTH_TOKEN", "tok"), ("HOST", "127.0.0.1")]),
        );
        assert_eq!(cfg.server.port, 8080);
        assert_eq!(cfg.server.bind, "127.0.0.1");
        assert_eq!(cfg.server.auth_token.as_deref(), Some("tok"));
    }

    #[test]
    fn invalid_port_keeps_configured_value() {
        let mut base = GroupcastConfig::default();
        base.server.port = 4000;
        let cfg = apply_env_overrides(base, env(&[("PORT", "http")]));
        assert_eq!(cfg.server.port, 4000);

        let cfg = apply_env_overrides(GroupcastConfig::default(), env(&[("PORT", "70000")]));
        assert_eq!(cfg.server.port, 3008);
    }

    #[test]
    fn empty_env_values_are_ignored() {
        let mut base = GroupcastConfig::default();
        base.server.auth_token = Some("from-file".into());
        let cfg = apply_env_overrides(base, env(&[("AUTH_TOKEN", ""), ("PORT", " ")]));
        assert_eq!(cfg.server.auth_token.as_deref(), Some("from-file"));
        assert_eq!(cfg.server.port, 3008);
    }
}
