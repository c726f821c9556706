use crate::harness::steps::Sidecar;
use crate::harness::{Assertion, Scenario};

#[test]
fn test_garbage_lock_is_reclaimed() {
    Scenario::new("garbage_lock_is_reclaimed")
        .with_actor("alice", "host-a", 1001)
        .corrupt(Sidecar::Lock, b"\x00\xffnot json")
        .assert_unlocked()
        .assert(Assertion::LockFileExists(true))
        .acquire("alice")
        .assert_acquired("alice")
        .assert_lock_held_by("alice")
        .run()
        .unwrap();
}

#[test]
fn test_empty_lock_is_reclaimed() {
    Scenario::new("empty_lock_is_reclaimed")
        .with_actor("alice", "host-a", 1001)
        .corrupt(Sidecar::Lock, b"")
        .acquire("alice")
        .assert_acquired("alice")
        .run()
        .unwrap();
}

#[test]
fn test_lock_overwritten_while_held() {
    Scenario::new("lock_overwritten_while_held")
        .with_actor("alice", "host-a", 1001)
        .with_actor("bob", "host-b", 2002)
        .acquire("alice")
        .corrupt(Sidecar::Lock, b"{\"lockedBy\": ")
        .acquire("bob")
        .assert_acquired("bob")
        .assert(Assertion::LockedByMe {
            actor: "alice".into(),
            expected: false,
        })
        .run()
        .unwrap();
}

#[test]
fn test_corrupt_collab_loads_empty_and_is_replaced() {
    Scenario::new("corrupt_collab_loads_empty_and_is_replaced")
        .with_actor("alice", "host-a", 1001)
        .corrupt(Sidecar::Collab, b"{\"stickyNotes\": [")
        .load_notes("alice")
        .add_note("alice", "fresh start")
        .save_notes("alice")
        .assert_save_succeeded("alice")
        .assert_notes_on_disk(1)
        .assert(Assertion::NoteOnDisk("fresh start".into()))
        .run()
        .unwrap();
}

#[test]
fn test_collab_corrupted_after_load_conflicts() {
    Scenario::new("collab_corrupted_after_load_conflicts")
        .with_actor("alice", "host-a", 1001)
        .load_notes("alice")
        .corrupt(Sidecar::Collab, b"garbage")
        .add_note("alice", "lost race")
        .save_notes("alice")
        .assert_save_conflicted("alice")
        .reload_notes("alice")
        .add_note("alice", "after reload")
        .save_notes("alice")
        .assert_save_succeeded("alice")
        .assert_notes_on_disk(1)
        .run()
        .unwrap();
}
