//! Controller registry behavior.

mod common;

use std::thread;

use common::{FakeDevice, identify};
use nvpm::{ControllerEntry, ControllerRegistry};

fn entry(id: u64) -> ControllerEntry {
    ControllerEntry::new(FakeDevice::new(id, &identify()).shared())
}

#[test]
fn test_insert_dedupes_by_device() {
    let registry = ControllerRegistry::new();
    let first = registry.insert(entry(1));
    let again = registry.insert(entry(1));
    let other = registry.insert(entry(2));

    assert_eq!(first, again);
    assert_ne!(first, other);
    assert_eq!(registry.len(), 2);
    assert_eq!(registry.find(2), Some(other));
}

#[test]
fn test_tokens_in_publication_order() {
    let registry = ControllerRegistry::new();
    let tokens: Vec<_> = (10..15).map(|id| registry.insert(entry(id))).collect();
    assert_eq!(registry.tokens(), tokens);
}

#[test]
fn test_remove() {
    let registry = ControllerRegistry::new();
    let a = registry.insert(entry(1));
    let b = registry.insert(entry(2));

    assert!(registry.remove(a).is_some());
    assert!(registry.remove(a).is_none());
    assert!(registry.get(a).is_none());
    assert!(registry.remove_device(2).is_some());
    assert!(registry.get(b).is_none());
    assert!(registry.is_empty());

    // Tokens are not reused.
    let c = registry.insert(entry(1));
    assert_ne!(c, a);
    assert_ne!(c, b);
}

#[test]
fn test_entry_lookup() {
    let registry = ControllerRegistry::new();
    let token = registry.insert(entry(3));
    let found = registry.get(token).unwrap();
    assert_eq!(found.lock().device_id(), 3);
    assert!(!found.lock().processed());
}

#[test]
fn test_concurrent_publish() {
    let registry = ControllerRegistry::new();
    thread::scope(|s| {
        for t in 0..4u64 {
            let registry = &registry;
            s.spawn(move || {
                for i in 0..16 {
                    registry.insert(entry(t * 100 + i));
                    // Republishing from another thread must not duplicate.
                    registry.insert(entry(i));
                }
            });
        }
    });
    // Ids 0..16 are also thread 0's own.
    assert_eq!(registry.len(), 64);
    for id in 0..16 {
        assert!(registry.find(id).is_some());
    }
}
