//! Session token lifecycle for the job-board client: an in-memory access-token store, a
//! single-flight refresh coordinator, and per-service HTTP clients that attach bearer credentials
//! and recover from `401` responses exactly once.

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

pub mod auth;
pub mod client;
pub mod config;
pub mod endpoint;
pub mod error;
pub mod flows;
pub mod http;
pub mod obs;
pub mod store;
#[cfg(any(test, feature = "test"))]
pub mod _preludet {
	//! Convenience re-exports and helpers for tests; enabled via `cfg(test)` or the `test` crate
	//! feature.

	pub use crate::_prelude::*;

	// self
	use crate::{
		auth::{SessionIdentity, TokenRecord},
		config::{ServiceEndpoints, SessionConfig},
		flows::SessionBroker,
		store::{MemoryTokenStore, TokenStore},
	};

	/// Builds a broker whose services all live under `base`, backed by a fresh memory store.
	pub fn build_test_broker(base: &str) -> (SessionBroker, Arc<MemoryTokenStore>) {
		let base = Url::parse(base).expect("Test base URL should parse.");
		let config = SessionConfig::new(ServiceEndpoints::uniform(base));
		let store_backend = Arc::new(MemoryTokenStore::default());
		let store: Arc<dyn TokenStore> = store_backend.clone();
		let broker = SessionBroker::with_store(config, store)
			.expect("Test broker should build from a valid configuration.");

		(broker, store_backend)
	}

	/// Builds an active record for `token` that expires after `ttl`.
	pub fn active_record(token: &str, ttl: Duration) -> TokenRecord {
		TokenRecord::builder()
			.access_token(token)
			.issued_now()
			.expires_in(ttl)
			.identity(SessionIdentity::default())
			.build()
			.expect("Active record fixture should build.")
	}
}

mod _prelude {
	pub use std::{
		collections::BTreeSet,
		error::Error as StdError,
		fmt::{Debug, Display, Formatter, Result as FmtResult},
		future::Future,
		pin::Pin,
		sync::Arc,
		time::Duration as StdDuration,
	};

	pub use parking_lot::{Mutex, RwLock};
	pub use reqwest::{Client as ReqwestClient, Error as ReqwestError};
	pub use serde::{Deserialize, Serialize};
	pub use thiserror::Error as ThisError;
	pub use time::{Duration, OffsetDateTime};
	pub use url::Url;

	pub use crate::error::{Error, Result};
}

pub use reqwest;
pub use url;
#[cfg(test)] use {color_eyre as _, httpmock as _};
