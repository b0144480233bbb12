//! Session flows powered by the broker facade: sign-in, OAuth callbacks, refresh, and logout.

pub mod login;
pub mod refresh;

mod logout;

pub use login::*;
pub use refresh::*;

// crates.io
use reqwest::RequestBuilder;
// self
use crate::{
	_prelude::*,
	auth::{TokenRecord, TokenSecret},
	client::ApiClient,
	config::{Service, SessionConfig},
	endpoint::EndpointClassifier,
	error::{ResponseError, TransportError},
	http::{self, RefreshTransport, ReqwestHttpClient, ReqwestRefreshTransport, TokenGrant},
	store::{MemoryTokenStore, TokenStore},
};

/// Owns the process-wide session singletons and hands out API clients that share them.
///
/// One broker is built per process. Every [`ApiClient`] it creates shares the same token store,
/// refresh coordinator, endpoint classifier, and reqwest client (and with it the cookie jar that
/// carries the refresh cookie). Cloning the broker is cheap and clones share all state.
#[derive(Clone)]
pub struct SessionBroker {
	/// Token store read by every client.
	pub store: Arc<dyn TokenStore>,
	/// Endpoint classification tables.
	pub classifier: Arc<EndpointClassifier>,
	/// Single-flight refresh coordinator.
	pub coordinator: Arc<RefreshCoordinator>,
	/// HTTP client shared by the API clients, the auth flows, and the refresh transport.
	pub http_client: ReqwestHttpClient,
	/// Deployment configuration.
	pub config: Arc<SessionConfig>,
}
impl SessionBroker {
	/// Creates a broker backed by a fresh [`MemoryTokenStore`].
	pub fn new(config: SessionConfig) -> Result<Self> {
		Self::with_store(config, Arc::new(MemoryTokenStore::default()))
	}

	/// Creates a broker backed by the caller's store.
	///
	/// The broker provisions its own reqwest client (cookie store enabled, optional request
	/// timeout) and refreshes through `POST <auth base><refresh path>`.
	pub fn with_store(config: SessionConfig, store: Arc<dyn TokenStore>) -> Result<Self> {
		let http_client = ReqwestHttpClient::new(config.request_timeout)?;
		let refresh_url = http::join_path(&config.endpoints.auth, &config.auth_paths.refresh)?;
		let transport = ReqwestRefreshTransport::new(http_client.clone(), refresh_url);

		Ok(Self::with_parts(config, store, http_client, Arc::new(transport)))
	}

	/// Assembles a broker from caller-provided parts, e.g. a custom refresh transport.
	pub fn with_parts(
		config: SessionConfig,
		store: Arc<dyn TokenStore>,
		http_client: ReqwestHttpClient,
		transport: Arc<dyn RefreshTransport>,
	) -> Self {
		let coordinator = Arc::new(RefreshCoordinator::new(store.clone(), transport));

		Self {
			store,
			classifier: Arc::new(config.classifier.clone()),
			coordinator,
			http_client,
			config: Arc::new(config),
		}
	}

	/// Creates a client for one of the configured backend services.
	pub fn client(&self, service: Service) -> ApiClient {
		self.client_for(self.config.endpoints.base(service).clone())
	}

	/// Creates a client rooted at an arbitrary base URL.
	///
	/// Clients are independent values but share the broker's store, coordinator, classifier, and
	/// connection pool.
	pub fn client_for(&self, base_url: Url) -> ApiClient {
		ApiClient::new(
			base_url,
			self.http_client.clone(),
			self.store.clone(),
			self.classifier.clone(),
			self.coordinator.clone(),
		)
	}

	/// Obtains a new access token through the shared coordinator.
	pub async fn request_refresh(&self) -> Result<TokenSecret> {
		self.coordinator.request_refresh().await
	}

	/// Snapshot of the current session record.
	pub fn session(&self) -> TokenRecord {
		self.store.get()
	}

	/// Resolves an auth endpoint path against the auth service base URL.
	pub fn auth_url(&self, path: &str) -> Result<Url> {
		Ok(http::join_path(&self.config.endpoints.auth, path)?)
	}

	/// Sends an auth request and decodes the token payload.
	///
	/// `on_transport` maps reqwest failures so callers can single out timeouts.
	async fn exchange_grant<F>(
		&self,
		path: &str,
		request: RequestBuilder,
		on_transport: F,
	) -> Result<TokenGrant>
	where
		F: Fn(ReqwestError) -> Error,
	{
		let response = request.send().await.map_err(&on_transport)?;
		let status = response.status();
		let body = response.bytes().await.map_err(&on_transport)?;

		if !status.is_success() {
			return Err(Error::Status {
				path: path.to_owned(),
				status: status.as_u16(),
				body_preview: http::body_preview(&body),
			});
		}

		Ok(http::decode_json(&body, path)?)
	}

	/// Writes a login or OAuth grant into the store, lowering the logout flag.
	fn install_grant(&self, path: &str, grant: TokenGrant) -> Result<TokenRecord> {
		let record = grant
			.into_record(OffsetDateTime::now_utc())
			.map_err(|err| ResponseError::Invalid { path: path.to_owned(), reason: err.to_string() })?;

		if self.coordinator.is_in_flight() {
			tracing::warn!(
				"Sign-in landed while a refresh is in flight; the refresh result will replace it."
			);
		}

		self.store.set(record.clone());

		Ok(record)
	}
}
impl Debug for SessionBroker {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("SessionBroker")
			.field("config", &self.config)
			.field("coordinator", &self.coordinator)
			.field("authenticated", &self.store.is_valid())
			.finish()
	}
}

fn transport_error(err: ReqwestError) -> Error {
	TransportError::from(err).into()
}
