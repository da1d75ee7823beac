mod helpers;

use helpers::{add, memory_db};
use hsg::memory::decay::{fingerprint, needs_regeneration, retention, run_sweep};
use hsg::memory::store::get_memory;
use hsg::sector::Sector;
use std::sync::atomic::AtomicUsize;

#[test]
fn retention_decays_over_simulated_days() {
    let r0 = retention(0.0);
    let r30 = retention(30.0);
    let r365 = retention(365.0);
    assert!((r0 - 1.0).abs() < 1e-9);
    assert!(r30 < r0);
    assert!(r365 < r30);
    assert!(r365 >= 0.0);
}

#[test]
fn fingerprint_is_deterministic_and_unit_length() {
    let a = fingerprint("user-123:a memorable event");
    let b = fingerprint("user-123:a memorable event");
    let c = fingerprint("user-123:a different event entirely");
    assert_eq!(a, b);
    assert_ne!(a, c);
    let norm: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    assert!((norm - 1.0).abs() < 1e-4);
}

#[tokio::test]
async fn sweep_over_an_old_memory_lowers_its_salience_and_shrinks_its_vector() {
    let mut conn = memory_db();
    let id = add(&mut conn, Some("alice"), "an old memory that should decay", Sector::Semantic);

    let before = get_memory(&conn, &id).unwrap().unwrap().salience;
    let ninety_days_ms = 90 * 86_400_000;
    let active = AtomicUsize::new(0);
    let now = hsg::memory::types::now_ms() + ninety_days_ms;

    let stats = run_sweep(&conn, 1000, 5000, 64, now, &active).await.unwrap();
    assert_eq!(stats.skipped_quiescence, false);
    assert!(stats.scanned >= 1);

    let after = get_memory(&conn, &id).unwrap().unwrap();
    assert!(after.salience <= before);
}

#[tokio::test]
async fn sweep_is_skipped_while_queries_are_active() {
    let mut conn = memory_db();
    add(&mut conn, Some("alice"), "a memory", Sector::Semantic);

    let active = AtomicUsize::new(1);
    let now = hsg::memory::types::now_ms();
    let stats = run_sweep(&conn, 1000, 5000, 64, now, &active).await.unwrap();
    assert!(stats.skipped_quiescence);
    assert_eq!(stats.scanned, 0);
}

#[test]
fn regeneration_is_needed_only_at_the_compression_floor() {
    assert!(needs_regeneration(64));
    assert!(!needs_regeneration(256));
}
