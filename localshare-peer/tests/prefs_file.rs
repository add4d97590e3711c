use std::io::Write;

use localshare_peer::{
    JsonFilePreferences, LOCAL_NAME_KEY, PreferenceStore,
    prefs::{MAX_PREFS_BYTES, load_prefs_from_path},
};

#[test]
fn missing_file_loads_as_empty() {
    let dir = tempfile::tempdir().expect("create tempdir");
    let prefs = JsonFilePreferences::new(dir.path().join("prefs.json"));
    assert_eq!(prefs.load(LOCAL_NAME_KEY).expect("load"), None);
}

#[test]
fn stored_name_survives_a_new_store_instance() {
    let dir = tempfile::tempdir().expect("create tempdir");
    let path = dir.path().join("nested").join("prefs.json");

    JsonFilePreferences::new(&path)
        .store(LOCAL_NAME_KEY, "Attic NAS")
        .expect("store name");

    let reopened = JsonFilePreferences::new(&path);
    assert_eq!(
        reopened.load(LOCAL_NAME_KEY).expect("load").as_deref(),
        Some("Attic NAS")
    );
    assert_no_tmp_files(path.parent().expect("nested dir"));
}

fn assert_no_tmp_files(dir: &std::path::Path) {
    let leftovers: Vec<_> = std::fs::read_dir(dir)
        .expect("list dir")
        .filter_map(Result::ok)
        .filter(|entry| entry.file_name().to_string_lossy().ends_with(".tmp"))
        .collect();
    assert!(leftovers.is_empty(), "temp files left behind: {leftovers:?}");
}

#[test]
fn store_keeps_unrelated_keys() {
    let dir = tempfile::tempdir().expect("create tempdir");
    let path = dir.path().join("prefs.json");
    std::fs::write(&path, r#"{"theme":"dark"}"#).expect("seed prefs.json");

    let prefs = JsonFilePreferences::new(&path);
    prefs.store(LOCAL_NAME_KEY, "Office").expect("store name");

    let saved = load_prefs_from_path(&path).expect("reload");
    assert_eq!(saved.get("theme").map(String::as_str), Some("dark"));
    assert_eq!(saved.get(LOCAL_NAME_KEY).map(String::as_str), Some("Office"));
}

#[test]
fn oversized_file_is_rejected() {
    let dir = tempfile::tempdir().expect("create tempdir");
    let path = dir.path().join("prefs.json");

    let mut file = std::fs::File::create(&path).expect("create prefs.json");
    file.write_all(&vec![b'a'; (MAX_PREFS_BYTES as usize) + 1024])
        .expect("write oversized prefs.json");
    drop(file);

    let err = JsonFilePreferences::new(&path)
        .load(LOCAL_NAME_KEY)
        .expect_err("oversized file should error");
    let msg = err.to_string();
    assert!(msg.contains("too large"), "unexpected error: {msg}");
}

#[test]
fn corrupt_file_reports_parse_error() {
    let dir = tempfile::tempdir().expect("create tempdir");
    let path = dir.path().join("prefs.json");
    std::fs::write(&path, "not json").expect("write prefs.json");

    let err = JsonFilePreferences::new(&path)
        .load(LOCAL_NAME_KEY)
        .expect_err("corrupt file should error");
    assert!(err.to_string().starts_with("parse failed"));
}

#[test]
fn store_replaces_a_corrupt_file() {
    let dir = tempfile::tempdir().expect("create tempdir");
    let path = dir.path().join("prefs.json");
    std::fs::write(&path, "not json").expect("write prefs.json");

    let prefs = JsonFilePreferences::new(&path);
    prefs
        .store(LOCAL_NAME_KEY, "Desk")
        .expect("store over corrupt file");

    assert_eq!(
        prefs.load(LOCAL_NAME_KEY).expect("load").as_deref(),
        Some("Desk")
    );
    assert_no_tmp_files(dir.path());
}

#[test]
fn store_replaces_an_oversized_file() {
    let dir = tempfile::tempdir().expect("create tempdir");
    let path = dir.path().join("prefs.json");
    std::fs::write(&path, vec![b' '; (MAX_PREFS_BYTES as usize) + 1]).expect("write prefs.json");

    let prefs = JsonFilePreferences::new(&path);
    prefs
        .store(LOCAL_NAME_KEY, "Garage Mini")
        .expect("store over oversized file");

    assert_eq!(
        prefs.load(LOCAL_NAME_KEY).expect("load").as_deref(),
        Some("Garage Mini")
    );
    assert!(std::fs::metadata(&path).expect("metadata").len() < MAX_PREFS_BYTES);
}

#[test]
fn overlapping_stores_leave_a_readable_file() {
    let dir = tempfile::tempdir().expect("create tempdir");
    let path = dir.path().join("prefs.json");

    let writers: Vec<_> = (0..8)
        .map(|n| {
            let prefs = JsonFilePreferences::new(&path);
            std::thread::spawn(move || prefs.store(LOCAL_NAME_KEY, &format!("Device {n}")))
        })
        .collect();
    for writer in writers {
        writer.join().expect("writer thread").expect("store");
    }

    let name = JsonFilePreferences::new(&path)
        .load(LOCAL_NAME_KEY)
        .expect("load")
        .expect("a name was stored");
    assert!(name.starts_with("Device "));
    assert_no_tmp_files(dir.path());
}
