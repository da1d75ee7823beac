mod helpers;

use helpers::{add, memory_db};
use hsg::memory::reflection::run_reflection;
use hsg::memory::users::{get_user_profile, user_stats};
use hsg::sector::Sector;

#[test]
fn reflection_summarizes_the_largest_cluster_and_bumps_reflection_count() {
    let mut conn = memory_db();
    add(&mut conn, Some("alice"), "notes on sourdough starter hydration", Sector::Procedural);
    add(&mut conn, Some("alice"), "notes on sourdough starter feeding schedule", Sector::Procedural);
    add(&mut conn, Some("alice"), "a one-off thought about astronomy", Sector::Semantic);

    let summary = run_reflection(&conn, "alice").unwrap();
    assert!(summary.is_some());

    let profile = get_user_profile(&conn, "alice").unwrap().unwrap();
    assert_eq!(profile.reflection_count, 1);

    run_reflection(&conn, "alice").unwrap();
    let profile = get_user_profile(&conn, "alice").unwrap().unwrap();
    assert_eq!(profile.reflection_count, 2);
}

#[test]
fn user_stats_aggregate_across_sectors() {
    let mut conn = memory_db();
    add(&mut conn, Some("alice"), "an episodic memory", Sector::Episodic);
    add(&mut conn, Some("alice"), "a semantic memory", Sector::Semantic);
    add(&mut conn, Some("alice"), "another semantic memory", Sector::Semantic);

    let stats = user_stats(&conn, "alice").unwrap();
    assert_eq!(stats.memory_count, 3);
    assert_eq!(stats.by_sector.get("semantic"), Some(&2));
    assert_eq!(stats.by_sector.get("episodic"), Some(&1));
    assert!(stats.avg_salience > 0.0);
}
