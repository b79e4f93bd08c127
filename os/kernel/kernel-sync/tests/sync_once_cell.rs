use kernel_sync::SyncOnceCell;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;

#[test]
fn get_before_init_is_none() {
    let cell = SyncOnceCell::<u32>::new();
    assert!(cell.get().is_none());
    assert_eq!(*cell.get_or_init(|| 5), 5);
    assert_eq!(cell.get(), Some(&5));
}

#[test]
fn set_only_succeeds_once() {
    let cell = SyncOnceCell::new();
    assert_eq!(cell.set(String::from("first")).map(String::as_str), Ok("first"));
    assert_eq!(cell.set(String::from("second")), Err(String::from("second")));
    assert_eq!(cell.get().map(String::as_str), Some("first"));
}

#[test]
fn init_runs_exactly_once_under_contention() {
    let cell = Arc::new(SyncOnceCell::new());
    let calls = Arc::new(AtomicUsize::new(0));

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let cell = Arc::clone(&cell);
            let calls = Arc::clone(&calls);
            thread::spawn(move || {
                *cell.get_or_init(|| {
                    calls.fetch_add(1, Ordering::SeqCst);
                    i
                })
            })
        })
        .collect();

    let seen: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(seen.iter().all(|v| *v == seen[0]));
}

#[test]
fn value_is_dropped_with_the_cell() {
    let tracker = Arc::new(());
    {
        let cell = SyncOnceCell::new();
        cell.get_or_init(|| Arc::clone(&tracker));
        assert_eq!(Arc::strong_count(&tracker), 2);
    }
    assert_eq!(Arc::strong_count(&tracker), 1);
}
