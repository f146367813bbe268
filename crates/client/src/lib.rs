//! Shopfront client engine.
//!
//! The session-consistency and cart-mutation core for the Shopfront
//! storefront backend:
//!
//! - [`credentials`] - durable storage for the opaque session token
//! - [`http`] - the request pipeline: bearer injection and failure
//!   classification
//! - [`session`] - the identity state machine and invalidation plumbing
//! - [`cart`] - the remotely-authoritative cart aggregate with per-line
//!   mutation locks
//! - [`checkout`] - the cart-to-order transition behind a whole-cart gate
//! - [`catalog`] - cached catalog reads
//!
//! Views consume [`Storefront`], the facade that wires these together; it
//! is the only sanctioned path to the backend. No view talks HTTP directly.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use shopfront_client::{ClientConfig, MemoryCredentialStore, Storefront};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ClientConfig::from_env()?;
//! let store = Arc::new(MemoryCredentialStore::new());
//! let storefront = Storefront::new(&config, store)?;
//!
//! storefront.session().resolve().await;
//! let cart = storefront.cart().refresh().await?;
//! println!("{} items in cart", cart.total_quantity());
//! # Ok(())
//! # }
//! ```

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod cart;
pub mod catalog;
pub mod checkout;
pub mod config;
pub mod credentials;
pub mod error;
pub mod http;
pub mod session;

pub use cart::{CartEngine, CartError};
pub use catalog::Catalog;
pub use checkout::{Checkout, CheckoutError};
pub use config::{ClientConfig, ConfigError};
pub use credentials::{CredentialStore, FileCredentialStore, MemoryCredentialStore, SessionToken};
pub use error::ApiError;
pub use http::ApiClient;
pub use session::{
    LoginResponse, Navigation, RegisterResponse, SessionManager, SessionSignals, SessionState,
};

use std::sync::Arc;

/// Facade wiring the session signals, pipeline, and engines together.
///
/// Cheaply cloneable; all clones share the same state.
#[derive(Clone)]
pub struct Storefront {
    session: SessionManager,
    cart: CartEngine,
    checkout: Checkout,
    catalog: Catalog,
}

impl Storefront {
    /// Wire up a client against the given backend and credential store.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Network`] if the HTTP client cannot be built.
    pub fn new(config: &ClientConfig, store: Arc<dyn CredentialStore>) -> Result<Self, ApiError> {
        let signals = SessionSignals::new(store);
        let api = ApiClient::new(config, Arc::clone(&signals))?;

        Ok(Self {
            session: SessionManager::new(api.clone(), signals),
            cart: CartEngine::new(api.clone()),
            checkout: Checkout::new(api.clone()),
            catalog: Catalog::new(api),
        })
    }

    /// Session lifecycle: resolve, login, register, logout, observation.
    #[must_use]
    pub const fn session(&self) -> &SessionManager {
        &self.session
    }

    /// Cart aggregate engine.
    #[must_use]
    pub const fn cart(&self) -> &CartEngine {
        &self.cart
    }

    /// Checkout transition and order history.
    #[must_use]
    pub const fn checkout(&self) -> &Checkout {
        &self.checkout
    }

    /// Cached catalog reads.
    #[must_use]
    pub const fn catalog(&self) -> &Catalog {
        &self.catalog
    }
}
