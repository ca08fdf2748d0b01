use inishare::{IniStore, Resolve, StoreConfig};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tempfile::TempDir;

fn config(dir: &Path) -> StoreConfig {
    StoreConfig {
        lock_dir: Some(dir.to_path_buf()),
        namespace_root: "Root".to_string(),
        well_known_sections: vec!["General".to_string()],
        ..Default::default()
    }
}

fn setup() -> (TempDir, PathBuf, IniStore) {
    let dir = TempDir::new().unwrap();
    let file = dir.path().canonicalize().unwrap().join("app.ini");
    let store = IniStore::new(config(dir.path()));
    (dir, file, store)
}

/// Simulates an outside editor: new content and a clearly later mtime.
fn edit_externally(path: &Path, content: &str) {
    fs::write(path, content).unwrap();
    let file = fs::File::options().write(true).open(path).unwrap();
    file.set_modified(SystemTime::now() + Duration::from_secs(60))
        .unwrap();
}

#[test]
fn test_first_default_wins() {
    let (_dir, file, store) = setup();

    assert_eq!(store.get(&file, "Printer", "Copies", 1), 1);
    assert_eq!(store.get(&file, "Printer", "Copies", 2), 1);
    assert_eq!(fs::read_to_string(&file).unwrap(), "[Printer]\nCopies=1\n");
}

#[test]
fn test_setting_same_value_does_not_touch_file() {
    let (_dir, file, store) = setup();
    assert!(store.set(&file, "Printer", "Port", 9100));
    let bytes = fs::read(&file).unwrap();
    let modified = fs::metadata(&file).unwrap().modified().unwrap();

    assert!(store.set(&file, "Printer", "Port", 9100));

    assert_eq!(fs::read(&file).unwrap(), bytes);
    assert_eq!(fs::metadata(&file).unwrap().modified().unwrap(), modified);
}

#[test]
fn test_external_edit_is_seen_on_next_read() {
    let (_dir, file, store) = setup();
    store.set(&file, "Printer", "Port", 9100);

    edit_externally(&file, "[Printer]\nPort=631\n");

    assert_eq!(store.get(&file, "Printer", "Port", 0), 631);
}

#[test]
fn test_external_edit_wins_over_cached_document() {
    let (_dir, file, store) = setup();
    store.set(&file, "Printer", "Port", 9100);

    edit_externally(&file, "[Scanner]\nDpi=300\n");
    assert!(store.set(&file, "Printer", "Host", "lp0"));

    assert_eq!(
        fs::read_to_string(&file).unwrap(),
        "[Scanner]\nDpi=300\n[Printer]\nHost=lp0\n"
    );
}

#[test]
fn test_well_known_label_is_namespaced() {
    let (_dir, file, store) = setup();

    store.set(&file, "General", "Language", "it");
    store.set(&file, "Root\\General", "Theme", "dark");

    assert_eq!(store.list_sections(&file), vec!["Root\\General"]);
    assert_eq!(
        store.list_keys(&file, "Root\\General"),
        vec!["Language", "Theme"]
    );
}

#[test]
fn test_duplicate_well_known_section_resolves_to_namespaced() {
    let (_dir, file, store) = setup();
    fs::write(
        &file,
        "[General]\na=1\nb=1\nc=1\n[Root\\General]\na=2\nb=2\nc=2\nd=2\ne=2\n",
    )
    .unwrap();

    assert_eq!(store.get(&file, "General", "a", 0), 2);
    assert!(store.set(&file, "General", "f", 3));

    // Nothing merged, the bare section is left as it was
    assert_eq!(store.list_keys(&file, "General"), vec!["a", "b", "c"]);
    assert_eq!(store.list_keys(&file, "Root\\General").len(), 6);
}

#[test]
fn test_legacy_bare_section_is_kept_until_namespaced_exists() {
    let (_dir, file, store) = setup();
    fs::write(&file, "[General]\nLanguage=en\n").unwrap();

    assert_eq!(
        store.get(&file, "General", "Language", String::new()),
        "en"
    );
    assert!(store.set(&file, "General", "Language", "de"));
    assert_eq!(store.list_sections(&file), vec!["General"]);
}

#[test]
fn test_other_label_prefers_namespaced_only_when_alone() {
    let (_dir, file, store) = setup();
    fs::write(&file, "[Root\\Printer]\nPort=1\n").unwrap();

    assert_eq!(store.get(&file, "Printer", "Port", 0), 1);

    fs::write(&file, "[Printer]\nPort=2\n[Root\\Printer]\nPort=1\n").unwrap();
    store.invalidate(&file);
    assert_eq!(store.get(&file, "Printer", "Port", 0), 2);
}

#[test]
fn test_comments_and_layout_survive_writes() {
    let (_dir, file, store) = setup();
    let original = "; shared settings\r\n[Printer]\r\n# port of the spooler\r\nPort = 9100 ; default\r\n\r\n[Scanner]\r\nDpi=300\r\n";
    fs::write(&file, original).unwrap();

    assert!(store.set(&file, "Scanner", "Dpi", 600));

    assert_eq!(
        fs::read_to_string(&file).unwrap(),
        original.replace("Dpi=300", "Dpi=600")
    );
    assert_eq!(store.get(&file, "Printer", "Port", 0), 9100);
}

#[test]
fn test_typed_values() {
    let (_dir, file, store) = setup();

    store.set(&file, "Types", "Flag", true);
    store.set(&file, "Types", "Ratio", 0.5);
    store.set(&file, "Types", "Count", -3i64);

    assert_eq!(
        fs::read_to_string(&file).unwrap(),
        "[Types]\nFlag=1\nRatio=0.5\nCount=-3\n"
    );
    assert!(store.get(&file, "Types", "Flag", false));
    assert_eq!(store.get(&file, "Types", "Ratio", 0.0), 0.5);
    assert_eq!(store.get(&file, "Types", "Count", 0i64), -3);
    assert_eq!(store.get(&file, "Types", "Flag", 0), 1);
}

#[test]
fn test_delete_then_get_recreates_section() {
    let (_dir, file, store) = setup();
    store.set(&file, "Printer", "Port", 9100);

    assert!(store.delete_section(&file, "Printer"));
    assert!(store.list_sections(&file).is_empty());
    assert_eq!(store.get(&file, "Printer", "Port", 631), 631);
    assert_eq!(store.list_keys(&file, "Printer"), vec!["Port"]);
}

#[test]
fn test_literal_and_smart_reads_can_differ() {
    let (_dir, file, store) = setup();
    fs::write(&file, "[General]\nx=bare\n[Root\\General]\nx=namespaced\n").unwrap();

    assert_eq!(
        store.get_with(&file, "General", "x", String::new(), Resolve::Literal),
        "bare"
    );
    assert_eq!(
        store.get_with(&file, "General", "x", String::new(), Resolve::Smart),
        "namespaced"
    );
}

#[test]
fn test_second_store_sees_first_store_writes() {
    let (dir, file, first) = setup();
    let second = IniStore::new(config(dir.path()));

    assert_eq!(second.get(&file, "Printer", "Port", 0), 0);
    first.set(&file, "Printer", "Port", 9100);
    assert_eq!(second.get(&file, "Printer", "Port", 0), 9100);

    second.set(&file, "Printer", "Host", "lp0");
    assert_eq!(
        first.get(&file, "Printer", "Host", String::new()),
        "lp0"
    );
    assert_eq!(first.list_keys(&file, "Printer"), vec!["Port", "Host"]);
}

#[test]
fn test_deleted_file_is_rebuilt() {
    let (_dir, file, store) = setup();
    store.set(&file, "Printer", "Port", 9100);

    fs::remove_file(&file).unwrap();

    assert_eq!(store.get(&file, "Printer", "Port", 631), 631);
    assert_eq!(fs::read_to_string(&file).unwrap(), "[Printer]\nPort=631\n");
}

#[test]
fn test_other_store_reads_back_exactly_what_was_accepted() {
    let (dir, file, writer) = setup();
    let reader = IniStore::new(config(dir.path()));

    assert!(!writer.set(&file, "Printer", "Label", "Tray #2"));
    assert!(!writer.set(&file, "Pad", "Name", "  x  "));
    assert!(writer.set(&file, "Printer", "Label", "Tray 2"));
    assert!(writer.set(&file, "Printer", "Url", "http://spool/q;2"));

    for key in ["Label", "Url"] {
        assert_eq!(
            reader.get(&file, "Printer", key, String::new()),
            writer.get(&file, "Printer", key, String::new())
        );
    }
    assert_eq!(reader.get(&file, "Printer", "Label", String::new()), "Tray 2");
    assert!(reader.list_keys(&file, "Pad").is_empty());
}

#[test]
fn test_bracket_in_header_comment_keeps_section() {
    let (_dir, file, store) = setup();
    let original = "[Printer] ; see [docs]\nPort=631\n";
    fs::write(&file, original).unwrap();

    assert_eq!(store.list_sections(&file), vec!["Printer"]);
    assert_eq!(store.get(&file, "Printer", "Port", 0), 631);
    assert_eq!(fs::read_to_string(&file).unwrap(), original);
}
