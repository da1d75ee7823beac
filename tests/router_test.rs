use hsg::config::RouterConfig;
use hsg::embedding::providers::SyntheticProvider;
use hsg::embedding::router::EmbeddingRouter;
use hsg::sector::Sector;

#[tokio::test]
async fn semantic_tier_reports_a_typed_error_on_gross_dimension_mismatch() {
    let mut cfg = RouterConfig::default();
    cfg.tier = "semantic".into();
    cfg.vector_dim = 256;
    cfg.router_fallback_enabled = false;
    let router = EmbeddingRouter::with_provider(cfg, Box::new(SyntheticProvider::new(900)));

    let err = router.embed_for_sector("hello world", Sector::Semantic).await.unwrap_err();
    assert!(err.to_string().contains("dimension incompatible"));
}

#[tokio::test]
async fn hybrid_tier_degrades_gracefully_on_the_same_mismatch() {
    let mut cfg = RouterConfig::default();
    cfg.tier = "hybrid".into();
    cfg.vector_dim = 256;
    cfg.router_fallback_enabled = false;
    let router = EmbeddingRouter::with_provider(cfg, Box::new(SyntheticProvider::new(900)));

    let outcome = router.embed_for_sector("hello world", Sector::Semantic).await.unwrap();
    assert!(outcome.fell_back);
    assert_eq!(outcome.vector.len(), 256);
}

#[tokio::test]
async fn fast_tier_is_deterministic_across_calls() {
    let mut cfg = RouterConfig::default();
    cfg.tier = "fast".into();
    cfg.vector_dim = 64;
    let router = EmbeddingRouter::new(cfg).unwrap();

    let a = router.embed_for_sector("the same text", Sector::Procedural).await.unwrap();
    let b = router.embed_for_sector("the same text", Sector::Procedural).await.unwrap();
    assert_eq!(a.vector, b.vector);
}
