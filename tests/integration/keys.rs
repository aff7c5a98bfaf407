//! Modal dispatch and the key tables a layout installs.

use std::time::Instant;

use hive::keys::{
    hive_table, HiveAction, Key, KeyDispatcher, ModalState, HIVE_TABLE, PREFIX_KEY, ROOT_TABLE,
};
use hive::layout::{LayoutMode, LayoutSpec};

use crate::fixtures::TestHive;

#[test]
fn test_every_key_returns_to_root() {
    let hive = TestHive::new(3);
    let mut keys = vec![Key::Escape, Key::Enter, Key::Other];
    keys.extend("0123456789ldtqxz".chars().map(Key::Char));

    for key in keys {
        let mut dispatcher = KeyDispatcher::new(hive.workers);
        dispatcher.enter(Instant::now());
        assert_eq!(dispatcher.state(), ModalState::Hive);
        let action = dispatcher.dispatch(key);
        assert_eq!(dispatcher.state(), ModalState::Root, "{:?}", key);

        match key {
            Key::Char(c @ '1'..='3') => {
                let n = c.to_digit(10).unwrap() as u8;
                assert_eq!(action, Some(HiveAction::AttachWorker(hive.slot(n))));
            }
            Key::Char('0') | Key::Char('l') => assert_eq!(action, Some(HiveAction::FocusLead)),
            Key::Char('d') => assert_eq!(action, Some(HiveAction::ToggleStatusPane)),
            Key::Char('t') => assert_eq!(action, Some(HiveAction::ToggleTheme)),
            _ => assert_eq!(action, None, "{:?}", key),
        }
    }
}

#[test]
fn test_root_keys_pass_through() {
    let mut dispatcher = KeyDispatcher::new(4);
    assert_eq!(dispatcher.dispatch(Key::Char('1')), None);
    assert_eq!(dispatcher.state(), ModalState::Root);
}

#[test]
fn test_layout_installs_hive_tables() {
    let hive = TestHive::new(2);
    let layout = hive
        .composer()
        .compose(LayoutSpec::new(60, LayoutMode::Status))
        .unwrap();

    let bindings = hive.host.bindings();
    assert_eq!(layout.bindings_installed, bindings.len());
    // Prefix, the mapped table, and the two fallbacks.
    assert_eq!(bindings.len(), 1 + hive_table(2).len() + 2);

    let prefix: Vec<_> = bindings.iter().filter(|(t, _, _)| t == ROOT_TABLE).collect();
    assert_eq!(prefix.len(), 1);
    assert_eq!(prefix[0].1, PREFIX_KEY);

    for (table, key, command) in &bindings {
        if table != HIVE_TABLE {
            continue;
        }
        let returns = command.join(" ") == "switch-client -T root";
        match key.as_str() {
            "Escape" | "Any" => assert!(returns, "{} must return to root", key),
            "1" | "2" => assert!(command.last().unwrap().contains("hive-proj-worker-")),
            "d" => assert!(command.last().unwrap().ends_with("--workers 2 pane toggle")),
            "t" => assert!(command.last().unwrap().ends_with("theme-toggle")),
            "0" | "l" => assert_eq!(command[0], "switch-client"),
            other => panic!("unexpected hive key {}", other),
        }
    }
}

#[test]
fn test_digit_keys_reach_live_worker_sessions() {
    let hive = TestHive::new(2);
    hive.manager().start(hive.slot(2));
    hive.composer().compose(LayoutSpec::default()).unwrap();

    let attach = hive
        .host
        .bindings()
        .into_iter()
        .find(|(t, k, _)| t == HIVE_TABLE && k == "2")
        .map(|(_, _, c)| c)
        .unwrap();
    assert!(attach.last().unwrap().contains("=hive-proj-worker-2"));
    assert!(hive.registry.exists(hive.slot(2)));
}
