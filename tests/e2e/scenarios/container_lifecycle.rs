use crate::harness::TestWorkspace;
use projpack_core::{is_valid_container, temp_path, ContainerManager, PackError, Product};
use sha2::{Digest, Sha256};
use std::fs;

#[test]
fn test_create_open_round_trip() {
    let ws = TestWorkspace::empty().unwrap();
    let container = ws.create_container("budget.xlpj", b"quarterly numbers").unwrap();
    assert!(is_valid_container(&container));

    let mut manager = ContainerManager::new();
    let meta = manager.open(&container).unwrap();
    assert_eq!(meta.product_code, Product::Spreadsheet);
    assert_eq!(meta.author, "fixture");
    assert_eq!(
        meta.document_hash,
        hex::encode(Sha256::digest(b"quarterly numbers"))
    );
    assert!(manager.verify_document_hash().unwrap());

    let out = ws.join("exported.xlsx");
    manager.export_inner_document(&out).unwrap();
    assert_eq!(fs::read(out).unwrap(), b"quarterly numbers");
}

#[test]
fn test_edit_save_reopen() {
    let ws = TestWorkspace::empty().unwrap();
    let container = ws.create_container("deck.pppj", b"v1").unwrap();

    let mut manager = ContainerManager::new();
    manager.open(&container).unwrap();
    let v2 = ws.write_file("v2.pptx", b"second version").unwrap();
    manager.replace_inner_document(&v2).unwrap();
    manager.save("bob").unwrap();
    manager.close();
    assert!(!temp_path(&container).exists());

    let mut reopened = ContainerManager::new();
    let meta = reopened.open(&container).unwrap();
    assert_eq!(meta.last_modified_by, "bob");
    assert_eq!(
        meta.document_hash,
        hex::encode(Sha256::digest(b"second version"))
    );
    let out = ws.join("out.pptx");
    reopened.export_inner_document(&out).unwrap();
    assert_eq!(fs::read(out).unwrap(), b"second version");
}

#[test]
fn test_history_survives_reopen() {
    let ws = TestWorkspace::empty().unwrap();
    let container = ws.create_container("memo.dcpj", b"draft").unwrap();

    let mut manager = ContainerManager::new();
    manager.open(&container).unwrap();
    manager.add_history_snapshot("carol", "first draft").unwrap();
    manager.save("carol").unwrap();
    manager.close();

    let mut reopened = ContainerManager::new();
    let meta = reopened.open(&container).unwrap();
    assert_eq!(meta.history_count, 1);
    let history = reopened.list_history().unwrap();
    assert_eq!(history[0].comment, "first draft");
    assert_eq!(history[0].document_hash, hex::encode(Sha256::digest(b"draft")));
}

#[test]
fn test_plain_file_is_not_a_container() {
    let ws = TestWorkspace::empty().unwrap();
    let fake = ws.write_file("fake.xlpj", b"just some text").unwrap();
    assert!(!is_valid_container(&fake));

    let mut manager = ContainerManager::new();
    assert!(matches!(
        manager.open(&fake),
        Err(PackError::Format { .. })
    ));
    assert!(!manager.is_open());
}

#[test]
fn test_leftover_temp_file_is_cleaned_on_open_for_edit() {
    let ws = TestWorkspace::empty().unwrap();
    let container = ws.create_container("budget.xlpj", b"numbers").unwrap();
    fs::write(temp_path(&container), b"half written").unwrap();

    let mut manager = ContainerManager::new();
    manager.open_for_edit(&container).unwrap();
    assert!(!temp_path(&container).exists());
}

#[test]
fn test_create_refuses_existing_container() {
    let ws = TestWorkspace::empty().unwrap();
    let container = ws.create_container("budget.xlpj", b"numbers").unwrap();
    let before = fs::read(&container).unwrap();

    let source = ws.write_file("other.xlsx", b"other").unwrap();
    let mut manager = ContainerManager::new();
    let result =
        manager.create_from_source(&source, &container, Product::Spreadsheet, "eve", "1.0");
    assert!(matches!(result, Err(PackError::AlreadyExists { .. })));
    assert_eq!(fs::read(&container).unwrap(), before);
}

#[cfg(unix)]
#[test]
fn test_failed_save_leaves_container_intact() {
    let ws = TestWorkspace::empty().unwrap();
    let container = ws.create_container("budget.xlpj", b"safe content").unwrap();
    let before = fs::read(&container).unwrap();

    let mut manager = ContainerManager::new();
    manager.open(&container).unwrap();
    let workspace = manager.workspace_path().unwrap().to_path_buf();
    std::os::unix::fs::symlink(ws.join("missing-target"), workspace.join("broken")).unwrap();

    assert!(manager.save("mallory").is_err());
    assert_eq!(fs::read(&container).unwrap(), before);
    assert!(!temp_path(&container).exists());
    assert!(is_valid_container(&container));
}
