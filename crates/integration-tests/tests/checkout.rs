//! Checkout against the stub backend: the cart-to-order transition, the
//! whole-cart gate under a parked backend call, and failure leaving the
//! server cart intact.

use rust_decimal::Decimal;
use shopfront_client::{CheckoutError, Storefront};
use shopfront_core::{ItemId, OrderStatus};
use shopfront_integration_tests::{StubBackend, sample_item, wait_until};

async fn storefront_with_cart(stub: &StubBackend) -> Storefront {
    stub.state.seed_item(sample_item("sku-1", "Walnut Desk Clock", 1000));

    let (storefront, _store) = stub.storefront();
    storefront
        .session()
        .login("alice", "hunter2")
        .await
        .expect("login");
    storefront
        .cart()
        .add_item(&ItemId::from("sku-1"), 2)
        .await
        .expect("add item");
    storefront
}

#[tokio::test]
async fn test_place_order_converts_cart_and_empties_it() {
    let stub = StubBackend::start().await;
    let storefront = storefront_with_cart(&stub).await;

    storefront.checkout().place_order().await.expect("place order");
    assert!(!storefront.checkout().in_flight());

    // The server emptied the cart; the caller refreshes to observe it.
    let cart = storefront.cart().refresh().await.expect("refresh");
    assert!(cart.is_empty());

    let orders = storefront.checkout().list_orders().await.expect("list orders");
    assert_eq!(orders.len(), 1);
    assert_eq!(orders[0].status, OrderStatus::Pending);
    assert_eq!(orders[0].total_amount, Decimal::new(2000, 2));
    assert_eq!(orders[0].items.len(), 1);
    assert_eq!(orders[0].items[0].quantity, 2);
    assert_eq!(orders[0].items[0].price, Decimal::new(1000, 2));
}

#[tokio::test]
async fn test_second_checkout_rejected_while_first_is_in_flight() {
    let stub = StubBackend::start().await;
    let storefront = storefront_with_cart(&stub).await;

    // Park the first placement inside the backend handler.
    stub.state.set_hold_orders(true);
    let checkout = storefront.checkout().clone();
    let parked = tokio::spawn(async move { checkout.place_order().await });

    let state = std::sync::Arc::clone(&stub.state);
    wait_until("first placement to reach the backend", move || {
        state.orders_started() > 0
    })
    .await;
    assert!(storefront.checkout().in_flight());

    let hits_before = stub.state.hits();
    let err = storefront
        .checkout()
        .place_order()
        .await
        .expect_err("overlapping checkout must be rejected");
    assert!(matches!(err, CheckoutError::CheckoutInFlight));
    assert_eq!(
        stub.state.hits(),
        hits_before,
        "the rejection happens before any network call"
    );

    stub.state.set_hold_orders(false);
    stub.state.release_order();
    parked
        .await
        .expect("join parked task")
        .expect("parked placement succeeds");

    assert!(!storefront.checkout().in_flight());
    assert_eq!(stub.state.orders().len(), 1, "exactly one order placed");
}

#[tokio::test]
async fn test_failed_checkout_leaves_cart_intact_and_gate_released() {
    let stub = StubBackend::start().await;
    let storefront = storefront_with_cart(&stub).await;

    stub.state.set_fail_orders(true);
    let err = storefront
        .checkout()
        .place_order()
        .await
        .expect_err("placement must fail");
    assert!(matches!(err, CheckoutError::Api(_)));
    assert!(!storefront.checkout().in_flight());

    // Nothing changed server-side; a retry is a fresh user decision.
    let cart = storefront.cart().refresh().await.expect("refresh");
    assert_eq!(cart.total_quantity(), 2);

    stub.state.set_fail_orders(false);
    storefront.checkout().place_order().await.expect("retry succeeds");
    assert_eq!(stub.state.orders().len(), 1);
}
