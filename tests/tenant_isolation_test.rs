mod helpers;

use helpers::{add, fast_router, memory_db};
use hsg::memory::retrieval::{hsg_query, QueryFilter};
use hsg::memory::store::list_memories;
use hsg::sector::Sector;

#[tokio::test]
async fn query_never_crosses_tenants() {
    let mut conn = memory_db();
    let router = fast_router(64);
    add(&mut conn, Some("alice"), "alice's private diary entry about a trip", Sector::Episodic);
    add(&mut conn, Some("bob"), "bob's private diary entry about a trip", Sector::Episodic);

    let results = hsg_query(
        &conn,
        &router,
        "private diary entry about a trip",
        Sector::Episodic,
        10,
        QueryFilter { user_id: Some("alice".into()), sector: None },
        0.0,
        100,
        false,
    )
    .await
    .unwrap();

    assert!(results.iter().all(|r| r.memory.user_id.as_deref() == Some("alice")));
}

#[test]
fn list_memories_scopes_strictly_by_tenant() {
    let mut conn = memory_db();
    add(&mut conn, Some("alice"), "alice memory one", Sector::Semantic);
    add(&mut conn, Some("alice"), "alice memory two", Sector::Semantic);
    add(&mut conn, Some("bob"), "bob memory one", Sector::Semantic);

    let alice = list_memories(&conn, Some("alice"), None, 100, 0).unwrap();
    let bob = list_memories(&conn, Some("bob"), None, 100, 0).unwrap();

    assert_eq!(alice.len(), 2);
    assert_eq!(bob.len(), 1);
    assert!(alice.iter().all(|m| m.user_id.as_deref() == Some("alice")));
}
