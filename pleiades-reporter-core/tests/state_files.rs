use pleiades_reporter_core::state::{load_json, remove, save_json, slug, StateError};
use std::collections::BTreeMap;
use std::fs;
use tempfile::tempdir;

#[test]
fn saved_state_loads_back() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("nested").join("feed.json");
    let mut value = BTreeMap::new();
    value.insert("guid-1".to_string(), "2024-09-02T10:00:00Z".to_string());

    save_json(&path, &value).expect("save should create parent directories");
    let loaded: Option<BTreeMap<String, String>> = load_json(&path).expect("load");
    assert_eq!(loaded, Some(value));
}

#[test]
fn missing_state_is_none_and_removing_twice_is_fine() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("absent.json");
    let loaded: Option<Vec<String>> = load_json(&path).expect("missing file is not an error");
    assert!(loaded.is_none());
    remove(&path).expect("removing a missing file is fine");
}

#[test]
fn malformed_state_is_an_error() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("broken.json");
    fs::write(&path, "{not json").unwrap();
    let result: Result<Option<Vec<String>>, StateError> = load_json(&path);
    assert!(matches!(result, Err(StateError::Json { .. })));
}

#[test]
fn slug_is_file_name_safe() {
    assert_eq!(slug("Pleiades: New Places!"), "Pleiades__New_Places");
    assert_eq!(slug("zotero-pleiades_library"), "zotero-pleiades_library");
}
