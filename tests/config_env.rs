mod util;

use locsync::command::Tools;
use locsync::config::{CONFIG_ENV, Config};
use locsync::diff::DiffMethod;
use serial_test::serial;
use tempfile::TempDir;

use util::EnvGuard;

#[test]
#[serial]
fn config_path_follows_env() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("locsync.toml");
    std::fs::write(
        &path,
        "[tools]\nrsync = \"/opt/rsync/bin/rsync\"\n\n[defaults]\nmethod = \"hash\"\nprogress = false\n",
    )
    .unwrap();
    let _env = EnvGuard::set(CONFIG_ENV, path.to_string_lossy());

    assert_eq!(Config::default_path().as_deref(), Some(path.as_path()));
    let config = Config::load().unwrap();
    assert_eq!(config.tools().rsync, "/opt/rsync/bin/rsync");
    assert!(!config.defaults.progress);
    assert_eq!(config.method(None, &Tools::default()), DiffMethod::Hash);
}

#[test]
#[serial]
fn missing_env_file_means_defaults() {
    let tmp = TempDir::new().unwrap();
    let _env = EnvGuard::set(CONFIG_ENV, tmp.path().join("absent.toml").to_string_lossy());
    assert_eq!(Config::load().unwrap(), Config::default());
}

#[test]
#[serial]
fn empty_env_falls_back_to_platform_dir() {
    let _env = EnvGuard::set(CONFIG_ENV, "");
    if let Some(path) = Config::default_path() {
        assert!(path.ends_with("config.toml"));
    }
}
