use specc_core::config::CONFIG_FILE;
use std::path::{Path, PathBuf};

/// Resolve the compiler config path.
///
/// Priority:
/// 1. `--config` flag / `SPECC_CONFIG` env var (passed in as `explicit`)
/// 2. Walk upward from `cwd` looking for `specc.yaml`
/// 3. `cwd/specc.yaml`, which need not exist (defaults apply)
pub fn resolve_config(explicit: Option<&Path>) -> PathBuf {
    let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    resolve_from(explicit, &cwd)
}

fn resolve_from(explicit: Option<&Path>, cwd: &Path) -> PathBuf {
    if let Some(p) = explicit {
        return p.to_path_buf();
    }
    cwd.ancestors()
        .map(|dir| dir.join(CONFIG_FILE))
        .find(|candidate| candidate.is_file())
        .unwrap_or_else(|| cwd.join(CONFIG_FILE))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn explicit_config_wins() {
        let dir = TempDir::new().unwrap();
        let explicit = dir.path().join("custom.yaml");
        assert_eq!(resolve_from(Some(&explicit), dir.path()), explicit);
    }

    #[test]
    fn finds_config_in_ancestor() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join(CONFIG_FILE), "version: 1\n").unwrap();
        let nested = dir.path().join("a/b");
        std::fs::create_dir_all(&nested).unwrap();
        assert_eq!(resolve_from(None, &nested), dir.path().join(CONFIG_FILE));
    }

    #[test]
    fn falls_back_to_cwd() {
        let dir = TempDir::new().unwrap();
        let got = resolve_from(None, dir.path());
        assert_eq!(got, dir.path().join(CONFIG_FILE));
    }
}
