mod helpers;

use helpers::{fast_router, memory_db};
use hsg::config::IngestConfig;
use hsg::memory::ingest::{ingest_document, ContentType, IngestRequest};
use hsg::memory::store::get_memory;
use hsg::memory::types::reserved_keys;
use hsg::memory::waypoints::outgoing;
use serde_json::json;

#[tokio::test]
async fn large_document_produces_linked_root_and_children() {
    let mut conn = memory_db();
    let router = fast_router(64);
    let mut cfg = IngestConfig::default();
    cfg.ingest_large_threshold = 10;
    cfg.ingest_section_size = 60;

    let text = "Paragraph about gardening and roses in spring.\n\n\
                Paragraph about a road trip across three states.\n\n\
                Paragraph about learning to bake sourdough bread.";

    let result = ingest_document(
        &mut conn,
        &router,
        IngestRequest {
            content_type: ContentType::Text,
            data: text,
            user_id: Some("alice"),
            metadata: None,
        },
        &cfg,
    )
    .await
    .unwrap();

    assert!(!result.child_ids.is_empty());

    let root = get_memory(&conn, &result.root_id).unwrap().unwrap();
    assert_eq!(root.metadata[reserved_keys::IS_ROOT], json!(true));
    assert_eq!(root.metadata[reserved_keys::TOTAL_SECTIONS], json!(result.child_ids.len()));

    let edges = outgoing(&conn, &result.root_id).unwrap();
    assert_eq!(edges.len(), result.child_ids.len());

    for child_id in &result.child_ids {
        let child = get_memory(&conn, child_id).unwrap().unwrap();
        assert_eq!(child.metadata[reserved_keys::PARENT_ID], json!(result.root_id));
        assert_eq!(child.user_id.as_deref(), Some("alice"));
    }
}

#[tokio::test]
async fn small_document_is_stored_as_a_single_memory() {
    let mut conn = memory_db();
    let router = fast_router(64);
    let cfg = IngestConfig::default();

    let result = ingest_document(
        &mut conn,
        &router,
        IngestRequest {
            content_type: ContentType::Markdown,
            data: "a short markdown note",
            user_id: None,
            metadata: None,
        },
        &cfg,
    )
    .await
    .unwrap();

    assert!(result.child_ids.is_empty());
    assert!(get_memory(&conn, &result.root_id).unwrap().is_some());
}
