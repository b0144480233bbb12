#![allow(dead_code)]

// std
use std::{sync::Arc, time::Duration as StdDuration};
// crates.io
use httpmock::MockServer;
use time::Duration;
// self
use jobboard_session::{
	auth::TokenRecord,
	config::{ServiceEndpoints, SessionConfig},
	flows::SessionBroker,
	store::{MemoryTokenStore, TokenStore},
	url::Url,
};

/// Delay applied to refresh mocks so concurrent `401`s land while the refresh is in flight.
pub const REFRESH_DELAY: StdDuration = StdDuration::from_millis(300);

pub fn config_for(server: &MockServer) -> SessionConfig {
	let base = Url::parse(&server.base_url()).expect("Mock server URL should parse.");

	SessionConfig::new(ServiceEndpoints::uniform(base))
}

pub fn broker_with(config: SessionConfig) -> (SessionBroker, Arc<MemoryTokenStore>) {
	let store = Arc::new(MemoryTokenStore::default());
	let broker = SessionBroker::with_store(config, store.clone())
		.expect("Broker should build against the mock server.");

	(broker, store)
}

pub fn broker_for(server: &MockServer) -> (SessionBroker, Arc<MemoryTokenStore>) {
	broker_with(config_for(server))
}

pub fn seed(store: &MemoryTokenStore, token: &str) {
	store.set(
		TokenRecord::builder()
			.access_token(token)
			.issued_now()
			.expires_in(Duration::minutes(15))
			.build()
			.expect("Seed record should build."),
	);
}

pub fn current_token(store: &MemoryTokenStore) -> Option<String> {
	store.get().access_token.map(|token| token.expose().to_owned())
}

pub fn grant_body(token: &str) -> String {
	format!(r#"{{"accessToken":"{token}","expiresInSeconds":900,"username":"jane","roles":["ROLE_CANDIDATE"]}}"#)
}

pub fn bearer(token: &str) -> String {
	format!("Bearer {token}")
}
