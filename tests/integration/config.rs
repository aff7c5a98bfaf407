//! Layered configuration through the public store.

use hive::config::{ConfigKey, ConfigScope, ConfigSource, ConfigStore, Theme};
use tempfile::TempDir;

fn store(dir: &TempDir) -> ConfigStore {
    ConfigStore::new(
        dir.path().join("proj/.hive/config.json"),
        Some(dir.path().join("home/.config/hive/config.json")),
    )
}

#[test]
fn test_local_overrides_global_until_unset() {
    let dir = TempDir::new().unwrap();
    let store = store(&dir);

    store.set(ConfigScope::Global, ConfigKey::Theme, "dark").unwrap();
    store.set(ConfigScope::Local, ConfigKey::Theme, "LIGHT").unwrap();

    let entry = store.get(ConfigKey::Theme);
    assert_eq!(entry.value, "light");
    assert_eq!(entry.source, ConfigSource::Local);
    assert_eq!(store.resolve().theme, Theme::Light);

    assert!(store.unset(ConfigScope::Local, ConfigKey::Theme).unwrap());
    let entry = store.get(ConfigKey::Theme);
    assert_eq!(entry.value, "dark");
    assert_eq!(entry.source, ConfigSource::Global);

    assert!(store.unset(ConfigScope::Global, ConfigKey::Theme).unwrap());
    assert_eq!(store.get(ConfigKey::Theme).source, ConfigSource::Default);
    assert!(!store.unset(ConfigScope::Global, ConfigKey::Theme).unwrap());
}

#[test]
fn test_invalid_value_never_reaches_disk() {
    let dir = TempDir::new().unwrap();
    let store = store(&dir);

    assert!(store.set(ConfigScope::Local, ConfigKey::Theme, "neon").is_err());
    assert!(!dir.path().join("proj/.hive/config.json").exists());

    store.set(ConfigScope::Local, ConfigKey::Theme, "dark").unwrap();
    assert!(store.set(ConfigScope::Local, ConfigKey::Theme, "neon").is_err());
    assert_eq!(store.get(ConfigKey::Theme).value, "dark");
}

#[test]
fn test_toggle_writes_local_and_keeps_global() {
    let dir = TempDir::new().unwrap();
    let store = store(&dir);
    store.set(ConfigScope::Global, ConfigKey::Theme, "light").unwrap();

    assert_eq!(store.toggle_theme().unwrap(), Theme::Dark);
    assert_eq!(store.get(ConfigKey::Theme).source, ConfigSource::Local);
    assert_eq!(store.toggle_theme().unwrap(), Theme::Light);

    let global = std::fs::read_to_string(dir.path().join("home/.config/hive/config.json")).unwrap();
    assert!(global.contains("light"));
}

#[test]
fn test_list_covers_every_key() {
    let dir = TempDir::new().unwrap();
    let entries = store(&dir).list();
    assert_eq!(entries.len(), ConfigKey::ALL.len());
    assert!(entries.iter().all(|e| e.source == ConfigSource::Default));
}
