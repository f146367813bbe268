//! Checkout transition and order history.
//!
//! Checkout is not idempotent from the client's perspective: repeating the
//! call after a transient failure could double-order. A whole-cart gate -
//! the same discipline as the per-line cart lock, scoped to the aggregate -
//! refuses overlapping calls before any network I/O.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::Deserialize;
use thiserror::Error;
use tracing::instrument;

use shopfront_core::Order;

use crate::error::ApiError;
use crate::http::ApiClient;

/// Errors surfaced by checkout operations.
#[derive(Debug, Error)]
pub enum CheckoutError {
    /// Local rejection: a checkout call is already in flight.
    #[error("a checkout is already in flight")]
    CheckoutInFlight,

    /// The backend call failed; nothing changed locally and the operation is
    /// never retried automatically - retry is a user action.
    #[error(transparent)]
    Api(#[from] ApiError),
}

#[derive(Debug, Deserialize)]
struct OrdersEnvelope {
    #[serde(default)]
    orders: Vec<Order>,
}

/// Converts the current server-side cart into an order.
///
/// Cheaply cloneable; all clones share one checkout gate.
#[derive(Clone)]
pub struct Checkout {
    api: ApiClient,
    in_flight: Arc<AtomicBool>,
}

impl Checkout {
    /// Create a checkout handle over the pipeline.
    #[must_use]
    pub fn new(api: ApiClient) -> Self {
        Self {
            api,
            in_flight: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Whether a checkout call is currently in flight.
    #[must_use]
    pub fn in_flight(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Materialize the current server-side cart into an order.
    ///
    /// On success the server has emptied the cart; the caller refreshes any
    /// cart-dependent state and navigates to confirmation. On failure
    /// nothing changed locally.
    ///
    /// # Errors
    ///
    /// Returns [`CheckoutError::CheckoutInFlight`] when a call is already in
    /// flight, or the classified [`CheckoutError::Api`] failure.
    #[instrument(skip(self))]
    pub async fn place_order(&self) -> Result<(), CheckoutError> {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(CheckoutError::CheckoutInFlight);
        }
        let _gate = GateGuard(Arc::clone(&self.in_flight));

        self.api.post_empty("/orders").await?;
        Ok(())
    }

    /// Read-only order history, newest first as reported by the backend.
    ///
    /// # Errors
    ///
    /// Returns the classified [`CheckoutError::Api`] failure.
    #[instrument(skip(self))]
    pub async fn list_orders(&self) -> Result<Vec<Order>, CheckoutError> {
        let envelope: OrdersEnvelope = self.api.get("/orders").await?;
        Ok(envelope.orders)
    }
}

/// Releases the checkout gate on drop, success or failure.
struct GateGuard(Arc<AtomicBool>);

impl Drop for GateGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ClientConfig;
    use crate::credentials::MemoryCredentialStore;
    use crate::session::SessionSignals;
    use url::Url;

    fn test_checkout() -> Checkout {
        let config = ClientConfig::new(Url::parse("http://127.0.0.1:9").expect("valid url"));
        let signals = SessionSignals::new(Arc::new(MemoryCredentialStore::new()));
        let api = ApiClient::new(&config, signals).expect("build client");
        Checkout::new(api)
    }

    #[tokio::test]
    async fn test_engaged_gate_rejects_before_any_network_call() {
        let checkout = test_checkout();

        // Engage the gate as an in-flight call would.
        checkout.in_flight.store(true, Ordering::Release);
        assert!(checkout.in_flight());

        let err = checkout
            .place_order()
            .await
            .expect_err("second checkout must be rejected");
        assert!(matches!(err, CheckoutError::CheckoutInFlight));

        // The rejection must not have released the original gate.
        assert!(checkout.in_flight());
    }

    #[test]
    fn test_gate_guard_releases_on_drop() {
        let flag = Arc::new(AtomicBool::new(true));
        {
            let _gate = GateGuard(Arc::clone(&flag));
        }
        assert!(!flag.load(Ordering::Acquire));
    }
}
