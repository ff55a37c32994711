use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use std::fs;
use std::path::PathBuf;
use tempfile::tempdir;
use volclean::config::{Config, ConfigError};
use volclean::plan::Disposition;

#[test]
fn test_config_load_defaults() {
    // Use figment directly without Env to avoid interference from other tests
    let figment = Figment::from(Serialized::defaults(Config::default()));
    let config: Config = figment.extract().unwrap();
    assert_eq!(config.batch_size, 1000);
    assert_eq!(config.io_threads, 4);
    assert!(!config.use_trash);
    assert!(config.rules.is_empty());
}

#[test]
fn test_config_load_from_env() {
    // Only a store entry, so concurrent run_app tests are unaffected
    std::env::set_var("VOLCLEAN_STORES__ARCHIVE", "/vol/archive");

    let figment = Figment::from(Serialized::defaults(Config::default()))
        .merge(Env::prefixed("VOLCLEAN_").split("__"));
    let config: Config = figment.extract().unwrap();

    assert_eq!(config.stores["archive"], PathBuf::from("/vol/archive"));
    assert_eq!(config.batch_size, 1000);

    std::env::remove_var("VOLCLEAN_STORES__ARCHIVE");
}

#[test]
fn test_config_load_from_toml() {
    let temp_dir = tempdir().unwrap();
    let config_path = temp_dir.path().join("config.toml");

    let toml_content = r#"
batch_size = 500
io_threads = 8
exclude = ["*.tmp", "cache/"]
extensions = ["jpg", "mp3"]

[stores]
music = "/vol/music"
photos = "/vol/photos"

[[rules]]
category = "music"
disposition = "relocate"
extensions = ["mp3"]

[[rules]]
category = "photo"
name_pattern = "^IMG_\\d+"
"#;
    fs::write(&config_path, toml_content).unwrap();

    let config: Config = Figment::from(Serialized::defaults(Config::default()))
        .merge(Toml::file(&config_path))
        .extract()
        .unwrap();

    assert_eq!(config.batch_size, 500);
    assert_eq!(config.io_threads, 8);
    assert_eq!(config.exclude, vec!["*.tmp", "cache/"]);
    assert_eq!(config.stores.len(), 2);
    assert_eq!(config.rules.len(), 2);
    assert_eq!(config.rules[0].disposition, Disposition::Relocate);
    assert_eq!(config.rules[1].disposition, Disposition::Rename);

    let rules = config.purpose_rules().unwrap();
    assert_eq!(rules.len(), 2);
    let hit = rules
        .first_match(std::path::Path::new("/ext/dcim/IMG_0042.jpg"))
        .unwrap();
    assert_eq!(hit.category, "photo");
}

#[test]
fn test_config_load_rejects_invalid_values() {
    let temp_dir = tempdir().unwrap();
    let config_path = temp_dir.path().join("config.toml");
    fs::write(&config_path, "io_threads = 0\n").unwrap();

    let err = Config::load(Some(&config_path)).unwrap_err();
    assert!(matches!(err, ConfigError::Invalid { field: "io_threads", .. }));
}

#[test]
fn test_config_load_rejects_bad_rule() {
    let temp_dir = tempdir().unwrap();
    let config_path = temp_dir.path().join("config.toml");
    fs::write(&config_path, "[[rules]]\ncategory = \"empty\"\n").unwrap();

    let err = Config::load(Some(&config_path)).unwrap_err();
    assert!(matches!(err, ConfigError::Rule(_)));
}

#[test]
fn test_config_invalid_toml_is_error() {
    let temp_dir = tempdir().unwrap();
    let config_path = temp_dir.path().join("config.toml");
    fs::write(&config_path, "batch_size = [not valid").unwrap();

    let err = Config::load(Some(&config_path)).unwrap_err();
    assert!(matches!(err, ConfigError::Load(_)));
}

#[test]
fn test_config_scan_settings_flow_through() {
    let config = Config {
        extensions: vec![".JPG".into()],
        skip_hidden: true,
        ..Config::default()
    };
    let scan = config.scan_config();
    assert_eq!(scan.extensions, vec!["jpg"]);
    assert!(scan.skip_hidden);
    assert_eq!(scan.exclude, config.exclude);
}
