use oeannotator_core::autosave::{Autosave, SaveError};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

#[test]
fn failed_flush_stays_pending_and_is_retried() {
    let attempts = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&attempts);
    let autosave = Autosave::new(
        Duration::from_millis(40),
        Box::new(move || -> Result<(), SaveError> {
            if seen.fetch_add(1, Ordering::SeqCst) == 0 {
                return Err("disk full".into());
            }
            Ok(())
        }),
    )
    .unwrap();

    autosave.trigger();
    thread::sleep(Duration::from_millis(400));

    assert_eq!(attempts.load(Ordering::SeqCst), 2);
    assert!(!autosave.is_pending());
}

#[test]
fn save_now_error_is_returned_to_caller() {
    let autosave = Autosave::new(
        Duration::from_secs(60),
        Box::new(|| -> Result<(), SaveError> { Err("read-only store".into()) }),
    )
    .unwrap();

    let err = autosave.save_now().unwrap_err();

    assert_eq!(err.to_string(), "read-only store");
    assert!(autosave.is_pending());
}

#[test]
fn retriggering_postpones_flush() {
    let saves = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&saves);
    let autosave = Autosave::new(
        Duration::from_millis(120),
        Box::new(move || -> Result<(), SaveError> {
            seen.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }),
    )
    .unwrap();

    autosave.trigger();
    thread::sleep(Duration::from_millis(80));
    autosave.trigger();
    thread::sleep(Duration::from_millis(80));
    assert_eq!(saves.load(Ordering::SeqCst), 0);

    thread::sleep(Duration::from_millis(300));
    assert_eq!(saves.load(Ordering::SeqCst), 1);
}

#[test]
fn drop_does_not_flush_pending_save() {
    let saves = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&saves);
    let autosave = Autosave::new(
        Duration::from_secs(60),
        Box::new(move || -> Result<(), SaveError> {
            seen.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }),
    )
    .unwrap();

    autosave.trigger();
    drop(autosave);

    assert_eq!(saves.load(Ordering::SeqCst), 0);
}
