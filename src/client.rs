//! Per-service API clients that attach the session credential and recover from `401` once.
//!
//! Each request is classified by its path before it leaves:
//!
//! - public paths are sent exactly as the caller built them;
//! - protected paths carry `Authorization: Bearer <token>` when the store holds a valid token. A
//!   locally expired token is dropped from the store and the request goes out without it.
//!
//! A `401` from a refreshable path triggers recovery: if another request already refreshed the
//! session, its token is reused; otherwise the shared coordinator refreshes. The request is then
//! resent exactly once. Everything else (including a second `401`) is returned to the caller.

// crates.io
use reqwest::{
	Method, Response, StatusCode,
	header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue},
};
use serde::de::DeserializeOwned;
// self
use crate::{
	_prelude::*,
	auth::TokenSecret,
	endpoint::{EndpointClassifier, EndpointPolicy},
	error::{ConfigError, TransportError},
	flows::RefreshCoordinator,
	http::{self, ReqwestHttpClient},
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
	store::TokenStore,
};

/// HTTP client rooted at one backend service.
///
/// Created by [`SessionBroker::client`](crate::flows::SessionBroker::client); clones and sibling
/// clients share the token store, refresh coordinator, and connection pool.
#[derive(Clone)]
pub struct ApiClient {
	base_url: Url,
	http_client: ReqwestHttpClient,
	store: Arc<dyn TokenStore>,
	classifier: Arc<EndpointClassifier>,
	coordinator: Arc<RefreshCoordinator>,
}
impl ApiClient {
	pub(crate) fn new(
		base_url: Url,
		http_client: ReqwestHttpClient,
		store: Arc<dyn TokenStore>,
		classifier: Arc<EndpointClassifier>,
		coordinator: Arc<RefreshCoordinator>,
	) -> Self {
		Self { base_url, http_client, store, classifier, coordinator }
	}

	/// Base URL every request path is appended to.
	pub fn base_url(&self) -> &Url {
		&self.base_url
	}

	/// Starts a request for `path` (e.g. `/jobs/42?expand=company`).
	pub fn request(&self, method: Method, path: impl Into<String>) -> ApiRequest<'_> {
		ApiRequest {
			client: self,
			method,
			path: path.into(),
			query: Vec::new(),
			headers: HeaderMap::new(),
			body: None,
			error: None,
		}
	}

	/// Starts a `GET` request.
	pub fn get(&self, path: impl Into<String>) -> ApiRequest<'_> {
		self.request(Method::GET, path)
	}

	/// Starts a `POST` request.
	pub fn post(&self, path: impl Into<String>) -> ApiRequest<'_> {
		self.request(Method::POST, path)
	}

	/// Starts a `PUT` request.
	pub fn put(&self, path: impl Into<String>) -> ApiRequest<'_> {
		self.request(Method::PUT, path)
	}

	/// Starts a `PATCH` request.
	pub fn patch(&self, path: impl Into<String>) -> ApiRequest<'_> {
		self.request(Method::PATCH, path)
	}

	/// Starts a `DELETE` request.
	pub fn delete(&self, path: impl Into<String>) -> ApiRequest<'_> {
		self.request(Method::DELETE, path)
	}

	fn current_bearer(&self, now: OffsetDateTime) -> Option<TokenSecret> {
		if self.store.expire_if_stale(now) {
			tracing::debug!("Dropped a locally expired access token.");
		}

		self.store.get().bearer_at(now).cloned()
	}

	async fn recover(&self, sent: Option<&TokenSecret>) -> Result<TokenSecret> {
		let current = self.store.get().bearer_at(OffsetDateTime::now_utc()).cloned();

		match current {
			Some(token) if Some(&token) != sent => {
				tracing::debug!("Reusing a token refreshed by a concurrent request.");

				Ok(token)
			},
			_ => self.coordinator.request_refresh().await,
		}
	}
}
impl Debug for ApiClient {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("ApiClient").field("base_url", &self.base_url.as_str()).finish()
	}
}

/// Request builder whose body is buffered so it can be resent after a refresh.
///
/// Builder errors (invalid headers, unencodable bodies) are deferred to [`send`](Self::send).
#[derive(Debug)]
pub struct ApiRequest<'a> {
	client: &'a ApiClient,
	method: Method,
	path: String,
	query: Vec<(String, String)>,
	headers: HeaderMap,
	body: Option<Vec<u8>>,
	error: Option<ConfigError>,
}
impl ApiRequest<'_> {
	/// Appends a query parameter.
	pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
		self.query.push((key.into(), value.into()));

		self
	}

	/// Appends a header.
	pub fn header(mut self, name: &str, value: &str) -> Self {
		match (HeaderName::from_bytes(name.as_bytes()), HeaderValue::from_str(value)) {
			(Ok(name), Ok(value)) => {
				self.headers.append(name, value);
			},
			_ => self.fail(ConfigError::InvalidHeader { name: name.to_owned() }),
		}

		self
	}

	/// Sets a JSON body and the matching content type.
	pub fn json<T>(mut self, body: &T) -> Self
	where
		T: ?Sized + Serialize,
	{
		match serde_json::to_vec(body) {
			Ok(bytes) => {
				self.headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
				self.body = Some(bytes);
			},
			Err(err) => self.fail(ConfigError::BodyEncode(err)),
		}

		self
	}

	/// Sets a raw body; pair it with a `Content-Type` header.
	pub fn body(mut self, body: impl Into<Vec<u8>>) -> Self {
		self.body = Some(body.into());

		self
	}

	/// Sends the request, refreshing and resending once on `401`.
	///
	/// Non-success statuses become [`Error::Status`]; a `401` after the retry becomes
	/// [`Error::RetryExhausted`]; a failed refresh surfaces as [`Error::SessionExpired`] or
	/// [`Error::LoggedOut`] without resending.
	pub async fn send(self) -> Result<Response> {
		const KIND: FlowKind = FlowKind::Request;

		let span = FlowSpan::new(KIND, "send");

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

		let result = span.instrument(self.execute()).await;

		obs::record_result(KIND, result)
	}

	/// Sends the request and decodes a JSON response body.
	pub async fn send_json<T>(self) -> Result<T>
	where
		T: DeserializeOwned,
	{
		let path = self.path.clone();
		let response = self.send().await?;
		let body = response.bytes().await.map_err(TransportError::from)?;

		Ok(http::decode_json(&body, &path)?)
	}

	fn fail(&mut self, error: ConfigError) {
		if self.error.is_none() {
			self.error = Some(error);
		}
	}

	async fn execute(mut self) -> Result<Response> {
		if let Some(error) = self.error.take() {
			return Err(error.into());
		}

		let url = http::join_path(&self.client.base_url, &self.path)?;
		let policy = self.client.classifier.policy(&self.path);
		let sent = if policy.is_public() {
			None
		} else {
			self.client.current_bearer(OffsetDateTime::now_utc())
		};
		let response = self.dispatch(&url, policy, sent.as_ref()).await?;

		if response.status() != StatusCode::UNAUTHORIZED || !policy.refreshable {
			return self.ensure_success(response).await;
		}

		let token = self.client.recover(sent.as_ref()).await?;
		let retried = self.dispatch(&url, policy, Some(&token)).await?;

		if retried.status() == StatusCode::UNAUTHORIZED {
			tracing::warn!(path = %self.path, "Request was rejected again after refreshing the session.");

			return Err(Error::RetryExhausted {
				path: self.path.clone(),
				status: retried.status().as_u16(),
			});
		}

		self.ensure_success(retried).await
	}

	async fn dispatch(
		&self,
		url: &Url,
		policy: EndpointPolicy,
		bearer: Option<&TokenSecret>,
	) -> Result<Response> {
		let mut headers = self.headers.clone();

		if let Some(token) = bearer.filter(|_| !policy.is_public()) {
			let value = token.bearer_header().map_err(|_| ConfigError::InvalidHeader {
				name: AUTHORIZATION.to_string(),
			})?;

			headers.insert(AUTHORIZATION, value);
		}

		let mut request =
			self.client.http_client.request(self.method.clone(), url.clone()).headers(headers);

		if !self.query.is_empty() {
			request = request.query(&self.query);
		}
		if let Some(body) = &self.body {
			request = request.body(body.clone());
		}

		Ok(request.send().await.map_err(TransportError::from)?)
	}

	async fn ensure_success(&self, response: Response) -> Result<Response> {
		let status = response.status();

		if status.is_success() {
			return Ok(response);
		}

		let body = response.bytes().await.map_err(TransportError::from)?;

		Err(Error::Status {
			path: self.path.clone(),
			status: status.as_u16(),
			body_preview: http::body_preview(&body),
		})
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::{_preludet::build_test_broker, config::Service};

	#[tokio::test]
	async fn builder_errors_surface_on_send() {
		let (broker, _) = build_test_broker("http://127.0.0.1:9");
		let client = broker.client(Service::Job);
		let err = client
			.get("/jobs")
			.header("bad header", "value")
			.send()
			.await
			.expect_err("Invalid header names must fail the request.");

		assert!(
			matches!(err, Error::Config(ConfigError::InvalidHeader { ref name }) if name == "bad header")
		);
	}

	#[test]
	fn json_bodies_set_content_type() {
		let (broker, _) = build_test_broker("http://127.0.0.1:9");
		let client = broker.client(Service::Application);
		let request = client.post("/applications").json(&serde_json::json!({ "jobId": 7 }));

		assert_eq!(
			request.headers.get(CONTENT_TYPE).and_then(|v| v.to_str().ok()),
			Some("application/json")
		);
		assert_eq!(request.body.as_deref(), Some(br#"{"jobId":7}"#.as_slice()));
		assert!(request.error.is_none());
	}

	#[test]
	fn stale_tokens_are_not_attached() {
		let (broker, store) = build_test_broker("http://127.0.0.1:9");
		let client = broker.client(Service::User);
		let now = OffsetDateTime::now_utc();

		store.set(crate::_preludet::active_record("T1", Duration::minutes(1)));

		assert_eq!(client.current_bearer(now).map(|t| t.expose().to_owned()), Some("T1".into()));
		assert!(client.current_bearer(now + Duration::minutes(2)).is_none());
		assert!(store.get().access_token.is_none());
		assert!(!store.logout_flag().is_logged_out());
	}
}
