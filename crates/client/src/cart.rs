//! Cart aggregate engine.
//!
//! The local cart is a cache of the remote cart: every successful mutation
//! is followed by a wholesale refresh, and the server-reported subtotal is
//! never recomputed locally. A per-line mutation lock keeps at most one
//! mutating call in flight per cart line; a second call against a locked
//! line is rejected synchronously rather than queued, so UI feedback stays
//! immediate and nothing races on the network.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::watch;
use tracing::instrument;

use shopfront_core::{Cart, CartLine, CartTotals, InvalidQuantity, ItemId, validate_quantity};

use crate::error::ApiError;
use crate::http::ApiClient;

/// Errors surfaced by cart operations.
#[derive(Debug, Error)]
pub enum CartError {
    /// Local rejection: the requested quantity is below the minimum. No
    /// network call is made and no lock is taken.
    #[error(transparent)]
    InvalidQuantity(#[from] InvalidQuantity),

    /// Local rejection: a mutation for this line is already in flight. The
    /// UI is expected to disable the control while locked; the engine
    /// enforces it regardless as a second line of defense.
    #[error("a mutation for item {0} is already in flight")]
    MutationInFlight(ItemId),

    /// The backend call failed. The local cache is left stale until the
    /// caller retries or refreshes explicitly; the engine never retries or
    /// rolls back on its own.
    #[error(transparent)]
    Api(#[from] ApiError),
}

/// Wire shape of `GET /carts`: `{ cart: { items: [...] }, total }`.
#[derive(Debug, Deserialize)]
struct CartEnvelope {
    #[serde(default)]
    cart: Option<CartBody>,
    /// Server-computed subtotal.
    #[serde(default)]
    total: Decimal,
}

#[derive(Debug, Default, Deserialize)]
struct CartBody {
    #[serde(default)]
    items: Vec<CartLine>,
}

impl From<CartEnvelope> for Cart {
    fn from(envelope: CartEnvelope) -> Self {
        Self {
            lines: envelope.cart.unwrap_or_default().items,
            subtotal: envelope.total,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AddLineRequest<'a> {
    item_id: &'a ItemId,
    quantity: u32,
}

#[derive(Debug, Serialize)]
struct UpdateLineRequest {
    quantity: u32,
}

/// Cart aggregate engine.
///
/// Cheaply cloneable; all clones share one cache and one lock table.
#[derive(Clone)]
pub struct CartEngine {
    api: ApiClient,
    inner: Arc<CartEngineInner>,
}

struct CartEngineInner {
    /// Local cache of the remote cart; replaced wholesale on refresh and
    /// never trusted as authoritative between refreshes.
    cache: Mutex<Cart>,
    /// Item ids with a mutating call currently in flight.
    in_flight: Mutex<HashSet<ItemId>>,
    /// Total line quantity, republished after every refresh that changes it.
    size: watch::Sender<u64>,
}

impl CartEngine {
    /// Create an engine over the pipeline. The cache starts empty.
    #[must_use]
    pub fn new(api: ApiClient) -> Self {
        let (size, _) = watch::channel(0);
        Self {
            api,
            inner: Arc::new(CartEngineInner {
                cache: Mutex::new(Cart::default()),
                in_flight: Mutex::new(HashSet::new()),
                size,
            }),
        }
    }

    /// Snapshot of the cached cart.
    ///
    /// The cache trails the backend: a read during a mutation's lock window
    /// may still observe the pre-mutation quantity.
    #[must_use]
    pub fn cart(&self) -> Cart {
        self.inner
            .cache
            .lock()
            .expect("cart cache mutex poisoned")
            .clone()
    }

    /// Display totals derived from the server-reported subtotal.
    #[must_use]
    pub fn totals(&self) -> CartTotals {
        CartTotals::from_subtotal(self.cart().subtotal)
    }

    /// Whether a mutation for this line is currently in flight.
    #[must_use]
    pub fn mutation_in_flight(&self, item_id: &ItemId) -> bool {
        self.inner
            .in_flight
            .lock()
            .expect("cart lock table mutex poisoned")
            .contains(item_id)
    }

    /// Observe total line quantity changes (e.g. for a cart badge).
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.inner.size.subscribe()
    }

    /// Fetch the authoritative cart and replace the local cache wholesale.
    ///
    /// # Errors
    ///
    /// Returns [`CartError::Api`] when the fetch fails; the cache is left
    /// untouched in that case.
    #[instrument(skip(self))]
    pub async fn refresh(&self) -> Result<Cart, CartError> {
        let envelope: CartEnvelope = self.api.get("/carts").await?;
        let cart = Cart::from(envelope);

        *self
            .inner
            .cache
            .lock()
            .expect("cart cache mutex poisoned") = cart.clone();

        let total = cart.total_quantity();
        self.inner.size.send_if_modified(|current| {
            if *current == total {
                false
            } else {
                *current = total;
                true
            }
        });

        Ok(cart)
    }

    /// Set the quantity of an existing cart line.
    ///
    /// Quantities below the minimum are rejected locally with zero network
    /// calls and no lock taken. The per-line lock is held for the duration
    /// of the update call only and released on any outcome; the follow-up
    /// refresh runs unlocked.
    ///
    /// # Errors
    ///
    /// Returns [`CartError::InvalidQuantity`], [`CartError::MutationInFlight`],
    /// or the classified [`CartError::Api`] failure.
    #[instrument(skip(self), fields(item_id = %item_id, quantity))]
    pub async fn set_quantity(&self, item_id: &ItemId, quantity: u32) -> Result<Cart, CartError> {
        validate_quantity(quantity)?;

        let result = {
            let _guard = self.lock_line(item_id)?;
            self.api
                .put_unit(&format!("/carts/{item_id}"), &UpdateLineRequest { quantity })
                .await
        };
        result?;

        self.refresh().await
    }

    /// Remove a line from the cart.
    ///
    /// Same lock discipline as [`set_quantity`](Self::set_quantity).
    ///
    /// # Errors
    ///
    /// Returns [`CartError::MutationInFlight`] or the classified
    /// [`CartError::Api`] failure.
    #[instrument(skip(self), fields(item_id = %item_id))]
    pub async fn remove_item(&self, item_id: &ItemId) -> Result<Cart, CartError> {
        let result = {
            let _guard = self.lock_line(item_id)?;
            self.api.delete_unit(&format!("/carts/{item_id}")).await
        };
        result?;

        self.refresh().await
    }

    /// Add an item to the cart.
    ///
    /// No per-line lock is taken (the line is new, or the backend merges
    /// quantities), and no rollback is needed on failure because no
    /// optimistic local write was made.
    ///
    /// # Errors
    ///
    /// Returns [`CartError::InvalidQuantity`] or the classified
    /// [`CartError::Api`] failure.
    #[instrument(skip(self), fields(item_id = %item_id, quantity))]
    pub async fn add_item(&self, item_id: &ItemId, quantity: u32) -> Result<Cart, CartError> {
        validate_quantity(quantity)?;

        self.api
            .post_unit("/carts", &AddLineRequest { item_id, quantity })
            .await?;

        self.refresh().await
    }

    fn lock_line(&self, item_id: &ItemId) -> Result<LineGuard, CartError> {
        let mut in_flight = self
            .inner
            .in_flight
            .lock()
            .expect("cart lock table mutex poisoned");
        if !in_flight.insert(item_id.clone()) {
            return Err(CartError::MutationInFlight(item_id.clone()));
        }
        drop(in_flight);

        Ok(LineGuard {
            engine: Arc::clone(&self.inner),
            item_id: item_id.clone(),
        })
    }
}

/// RAII guard for one line's mutation lock. Dropping the guard releases the
/// lock whether the mutation succeeded or failed.
struct LineGuard {
    engine: Arc<CartEngineInner>,
    item_id: ItemId,
}

impl Drop for LineGuard {
    fn drop(&mut self) {
        if let Ok(mut in_flight) = self.engine.in_flight.lock() {
            in_flight.remove(&self.item_id);
        }
    }
}
