//! Catalog reads against the stub backend: cache hits and explicit
//! invalidation.

use rust_decimal::Decimal;
use shopfront_integration_tests::{StubBackend, sample_item};

#[tokio::test]
async fn test_second_list_is_served_from_cache() {
    let stub = StubBackend::start().await;
    stub.state.seed_item(sample_item("sku-1", "Walnut Desk Clock", 1000));
    stub.state.seed_item(sample_item("sku-2", "Stoneware Mug", 450));

    let (storefront, _store) = stub.storefront();
    storefront
        .session()
        .login("alice", "hunter2")
        .await
        .expect("login");

    let hits_before = stub.state.hits();
    let first = storefront.catalog().list_items().await.expect("first list");
    assert_eq!(first.len(), 2);
    assert_eq!(first[0].price, Decimal::new(1000, 2));

    let second = storefront.catalog().list_items().await.expect("second list");
    assert_eq!(second.len(), 2);
    assert_eq!(
        stub.state.hits(),
        hits_before + 1,
        "the second list must not reach the backend"
    );
}

#[tokio::test]
async fn test_invalidate_forces_a_fresh_fetch() {
    let stub = StubBackend::start().await;
    stub.state.seed_item(sample_item("sku-1", "Walnut Desk Clock", 1000));

    let (storefront, _store) = stub.storefront();
    storefront
        .session()
        .login("alice", "hunter2")
        .await
        .expect("login");

    let first = storefront.catalog().list_items().await.expect("first list");
    assert_eq!(first.len(), 1);

    // The catalog changed behind the cache.
    stub.state.seed_item(sample_item("sku-2", "Stoneware Mug", 450));
    let cached = storefront.catalog().list_items().await.expect("cached list");
    assert_eq!(cached.len(), 1, "stale until invalidated");

    storefront.catalog().invalidate().await;
    let fresh = storefront.catalog().list_items().await.expect("fresh list");
    assert_eq!(fresh.len(), 2);
}
