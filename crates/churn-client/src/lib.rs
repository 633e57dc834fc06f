//! `churn-client`: the data and session layer behind the ChurnBuster
//! dashboard views.
//!
//! # Architecture
//!
//! ```text
//! views (churn-cli)
//!     │
//!     ├──► AuthContext   ← session state machine, persisted to Storage
//!     │
//!     └──► DataContext   ← overview / metrics / playbooks / alerts cache
//!              │
//!              ▼
//!          ApiClient     ← token slot + validation, sole backend boundary
//!              │
//!              ▼
//!          Backend       ← HttpBackend (reqwest) or MockBackend (fixtures)
//! ```
//!
//! Both contexts are plain values shared through `Arc`; state changes are
//! published on `tokio::sync::watch` channels so a view can either read the
//! current value or await the next change.
//!
//! # Quick start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use churn_client::{ApiClient, AuthContext, DataContext, MockBackend};
//! use churn_core::storage::MemoryStorage;
//! use churn_core::types::MetricsQuery;
//!
//! let client = Arc::new(ApiClient::new(MockBackend::default(), Arc::new(MemoryStorage::new())));
//! let auth = AuthContext::restore(Arc::clone(&client));
//! auth.login("demo@example.com", "password").await?;
//!
//! let data = DataContext::new(client, MetricsQuery::new("cust-001", 30));
//! data.mount().await;
//! println!("{:?}", data.state().overview.value);
//! ```

pub mod auth;
pub mod backend;
pub mod client;
pub mod data;
pub mod error;
pub mod http;
pub mod mock;

pub use auth::{AuthContext, AuthState};
pub use backend::{AnyBackend, Backend};
pub use client::ApiClient;
pub use data::{DataContext, DataState, Resource};
pub use error::ApiError;
pub use http::HttpBackend;
pub use mock::{MockBackend, MockFixtures, Op};

/// Convenience `Result` alias for this crate.
pub type Result<T> = std::result::Result<T, ApiError>;
