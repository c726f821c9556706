use crate::harness::TestWorkspace;
use chrono::Utc;
use projpack_core::{
    Config, HolderIdentity, NotePosition, NotesSaveOutcome, OpenMode, PackError, Project,
    StickyNote,
};

fn identity(user: &str, machine: &str, pid: u32) -> HolderIdentity {
    HolderIdentity::new(user, machine, pid)
}

fn note(author: &str, text: &str) -> StickyNote {
    StickyNote::new(author, text, NotePosition::default(), Utc::now())
}

#[test]
fn test_second_opener_falls_back_to_read_only() {
    let ws = TestWorkspace::empty().unwrap();
    let container = ws.create_container("plan.xlpj", b"plan").unwrap();
    let config = Config::default();

    let alice = Project::open(&container, identity("alice", "host-a", 1001), &config).unwrap();
    assert_eq!(alice.mode(), &OpenMode::ReadWrite);

    let mut bob = Project::open(&container, identity("bob", "host-b", 2002), &config).unwrap();
    match bob.mode() {
        OpenMode::ReadOnly { holder } => assert_eq!(holder.locked_by, "alice"),
        OpenMode::ReadWrite => panic!("bob should be read-only"),
    }
    assert!(matches!(
        bob.save("bob"),
        Err(PackError::ReadOnly { holder }) if holder == "alice"
    ));

    bob.close();
    alice.close();

    let carol = Project::open(&container, identity("carol", "host-c", 3003), &config).unwrap();
    assert!(!carol.is_read_only());
}

#[test]
fn test_notes_travel_inside_the_container() {
    let ws = TestWorkspace::empty().unwrap();
    let container = ws.create_container("plan.xlpj", b"plan").unwrap();
    let config = Config::default();

    let mut alice = Project::open(&container, identity("alice", "host-a", 1001), &config).unwrap();
    let outcome = alice
        .save_notes(|record| record.upsert_note(note("alice", "ship it")))
        .unwrap();
    assert!(matches!(outcome, NotesSaveOutcome::Saved(_)));
    alice.save("alice").unwrap();
    alice.close();

    // Copy only the container, as if mailed to someone without the sidecar
    let copy_dir = TestWorkspace::empty().unwrap();
    let copy = copy_dir.join("plan.xlpj");
    std::fs::copy(&container, &copy).unwrap();

    let mut dave = Project::open(&copy, identity("dave", "host-d", 4004), &config).unwrap();
    let notes = dave.notes();
    assert_eq!(notes.sticky_notes.len(), 1);
    assert_eq!(notes.sticky_notes[0].text, "ship it");
}

#[test]
fn test_read_only_viewer_notes_reach_the_owner() {
    let ws = TestWorkspace::empty().unwrap();
    let container = ws.create_container("plan.xlpj", b"plan").unwrap();
    let config = Config::default();

    let mut alice = Project::open(&container, identity("alice", "host-a", 1001), &config).unwrap();
    alice.notes();

    let mut bob = Project::open(&container, identity("bob", "host-b", 2002), &config).unwrap();
    assert!(bob.is_read_only());
    bob.save_notes(|record| record.upsert_note(note("bob", "typo in B4")))
        .unwrap();

    assert!(alice.notes_changed());
    let outcome = alice
        .save_notes(|record| record.upsert_note(note("alice", "fixed")))
        .unwrap();
    match outcome {
        NotesSaveOutcome::Saved(record) => assert_eq!(record.sticky_notes.len(), 2),
        NotesSaveOutcome::Unsaved(_) => panic!("owner save should merge"),
    }
}
