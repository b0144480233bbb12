//! Transport primitives: the shared reqwest client, URL joining, JSON decoding, and the refresh
//! exchange.
//!
//! The refresh credential is an httponly cookie set by the auth backend on sign-in. It is never
//! read by this crate; the shared [`ReqwestHttpClient`] keeps a cookie jar so the cookie travels
//! with the refresh call exactly as a browser would send it.

// std
use std::ops::Deref;
// crates.io
use serde::de::DeserializeOwned;
// self
use crate::{
	_prelude::*,
	auth::{AccessClaims, RoleSet, SessionIdentity, TenantId, TokenRecord, TokenRecordBuilderError, Username},
	error::{ConfigError, RefreshFailure, ResponseError},
};

const BODY_PREVIEW_LIMIT: usize = 256;

/// Boxed future returned by [`RefreshTransport::refresh`].
pub type RefreshFuture<'a> =
	Pin<Box<dyn Future<Output = Result<TokenGrant, RefreshFailure>> + 'a + Send>>;

/// Performs the refresh-token exchange against the auth backend.
///
/// The refresh coordinator's only dependency on an HTTP stack. Implementations report any
/// non-success status, transport error, or undecodable body as a [`RefreshFailure`]; they never
/// retry.
pub trait RefreshTransport
where
	Self: Send + Sync,
{
	/// Exchanges the refresh credential for a new access token.
	fn refresh(&self) -> RefreshFuture<'_>;
}

/// Token payload returned by the login, OAuth callback, and refresh endpoints.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenGrant {
	/// New bearer credential.
	pub access_token: String,
	/// Lifetime of the credential in seconds.
	#[serde(default)]
	pub expires_in_seconds: Option<i64>,
	/// Signed-in username.
	#[serde(default)]
	pub username: Option<String>,
	/// Roles granted to the user.
	#[serde(default)]
	pub roles: Vec<String>,
	/// Tenant the user acts for.
	#[serde(default)]
	pub tenant_id: Option<String>,
}
impl TokenGrant {
	/// Creates a grant carrying only an access token.
	pub fn new(access_token: impl Into<String>) -> Self {
		Self {
			access_token: access_token.into(),
			expires_in_seconds: None,
			username: None,
			roles: Vec::new(),
			tenant_id: None,
		}
	}

	/// Converts the grant into a session record issued at `now`.
	///
	/// Fields the payload omits are filled from the access token's JWT claims when it has any.
	/// Identity values that fail validation are dropped rather than failing the exchange.
	pub fn into_record(self, now: OffsetDateTime) -> Result<TokenRecord, TokenRecordBuilderError> {
		if self.access_token.is_empty() {
			return Err(TokenRecordBuilderError::MissingAccessToken);
		}

		let claims = AccessClaims::decode(&self.access_token).unwrap_or_default();
		let identity = SessionIdentity {
			username: self.username.as_deref().and_then(Username::accept),
			roles: RoleSet::lenient(self.roles),
			tenant: self.tenant_id.as_deref().and_then(TenantId::accept),
		}
		.merge_claims(&claims);
		let mut builder =
			TokenRecord::builder().access_token(self.access_token).issued_at(now).identity(identity);

		match (self.expires_in_seconds, claims.expires_at()) {
			(Some(secs), _) => builder = builder.expires_in(Duration::seconds(secs)),
			(None, Some(instant)) => builder = builder.expires_at(instant),
			(None, None) => {},
		}

		builder.build()
	}
}
impl Debug for TokenGrant {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("TokenGrant")
			.field("access_token", &"<redacted>")
			.field("expires_in_seconds", &self.expires_in_seconds)
			.field("username", &self.username)
			.field("roles", &self.roles)
			.field("tenant_id", &self.tenant_id)
			.finish()
	}
}

/// Thin wrapper around [`ReqwestClient`] so shared HTTP behavior lives in one place.
///
/// Every API client and the refresh transport share one instance, and with it one cookie jar and
/// connection pool.
#[derive(Clone, Debug)]
pub struct ReqwestHttpClient(pub ReqwestClient);
impl ReqwestHttpClient {
	/// Builds a client with a cookie store and an optional per-request timeout.
	pub fn new(timeout: Option<StdDuration>) -> Result<Self, ConfigError> {
		let mut builder = ReqwestClient::builder().cookie_store(true);

		if let Some(timeout) = timeout {
			builder = builder.timeout(timeout);
		}

		Ok(Self(builder.build().map_err(ConfigError::http_client_build)?))
	}

	/// Wraps an existing reqwest [`ReqwestClient`].
	///
	/// The client must keep cookies (`cookie_store(true)`) for refreshes to carry the session
	/// cookie.
	pub fn with_client(client: ReqwestClient) -> Self {
		Self(client)
	}
}
impl AsRef<ReqwestClient> for ReqwestHttpClient {
	fn as_ref(&self) -> &ReqwestClient {
		&self.0
	}
}
impl Deref for ReqwestHttpClient {
	type Target = ReqwestClient;

	fn deref(&self) -> &Self::Target {
		&self.0
	}
}

/// reqwest-backed [`RefreshTransport`] posting to `<auth-base>/refresh` with an empty body.
#[derive(Clone, Debug)]
pub struct ReqwestRefreshTransport {
	client: ReqwestHttpClient,
	endpoint: Url,
}
impl ReqwestRefreshTransport {
	/// Creates a transport for the given refresh endpoint.
	pub fn new(client: ReqwestHttpClient, endpoint: Url) -> Self {
		Self { client, endpoint }
	}

	/// Refresh endpoint URL.
	pub fn endpoint(&self) -> &Url {
		&self.endpoint
	}

	async fn exchange(&self) -> Result<TokenGrant, RefreshFailure> {
		let network = |err: ReqwestError| RefreshFailure::Network { message: err.to_string() };
		let response = self.client.post(self.endpoint.clone()).send().await.map_err(network)?;
		let status = response.status();

		if !status.is_success() {
			return Err(RefreshFailure::Rejected { status: status.as_u16() });
		}

		let body = response.bytes().await.map_err(network)?;

		decode_json(&body, self.endpoint.path())
			.map_err(|err| RefreshFailure::Malformed { message: err.to_string() })
	}
}
impl RefreshTransport for ReqwestRefreshTransport {
	fn refresh(&self) -> RefreshFuture<'_> {
		Box::pin(self.exchange())
	}
}

/// Appends `path` (optionally carrying a `?query`) to the path of `base`.
///
/// Unlike [`Url::join`], the base path is always kept, so gateway prefixes survive:
/// `https://host/api` + `/jobs/7?page=2` → `https://host/api/jobs/7?page=2`. Escapes already
/// present in `path` are kept as they are.
pub fn join_path(base: &Url, path: &str) -> Result<Url, ConfigError> {
	if base.cannot_be_a_base() {
		return Err(ConfigError::CannotBeBase { url: base.to_string() });
	}

	let (path, query) = match path.split_once('?') {
		Some((path, query)) => (path, Some(query)),
		None => (path, None),
	};
	let mut joined = base.path().trim_end_matches('/').to_owned();

	for segment in path.split('/').filter(|segment| !segment.is_empty()) {
		joined.push('/');
		joined.push_str(segment);
	}
	if joined.is_empty() {
		joined.push('/');
	}

	let mut url = base.clone();

	url.set_path(&joined);
	url.set_query(query);
	url.set_fragment(None);

	Ok(url)
}

/// Decodes a JSON body, reporting the failing field path on error.
pub(crate) fn decode_json<T>(body: &[u8], path: &str) -> Result<T, ResponseError>
where
	T: DeserializeOwned,
{
	let mut deserializer = serde_json::Deserializer::from_slice(body);

	serde_path_to_error::deserialize(&mut deserializer)
		.map_err(|source| ResponseError::Malformed { path: path.to_owned(), source })
}

/// Leading part of a response body for error reports; `None` for empty bodies.
pub(crate) fn body_preview(body: &[u8]) -> Option<String> {
	if body.is_empty() {
		return None;
	}

	let text = String::from_utf8_lossy(body);
	let mut preview: String = text.chars().take(BODY_PREVIEW_LIMIT).collect();

	if text.chars().count() > BODY_PREVIEW_LIMIT {
		preview.push('…');
	}

	Some(preview)
}
