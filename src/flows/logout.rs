// crates.io
use reqwest::header::AUTHORIZATION;
// self
use crate::{
	_prelude::*,
	error::ConfigError,
	flows::{SessionBroker, transport_error},
	http,
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
};

impl SessionBroker {
	/// Signs out locally, then asks the auth service to end the server-side session.
	///
	/// The store is cleared and the logout flag raised before the network call, so no refresh
	/// can resurrect the session even if the call is slow or fails. A failing call is returned to
	/// the caller; local state stays cleared either way.
	pub async fn logout(&self) -> Result<()> {
		const KIND: FlowKind = FlowKind::Logout;

		let span = FlowSpan::new(KIND, "logout");

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

		let result = span
			.instrument(async move {
				let bearer = self.store.get().access_token;

				self.store.clear(true);

				let path = self.config.auth_paths.logout.as_str();
				let mut request = self.http_client.post(self.auth_url(path)?);

				if let Some(token) = bearer {
					let value = token.bearer_header().map_err(|_| ConfigError::InvalidHeader {
						name: AUTHORIZATION.to_string(),
					})?;

					request = request.header(AUTHORIZATION, value);
				}

				let response = request.send().await.map_err(transport_error)?;
				let status = response.status();

				if status.is_success() {
					return Ok(());
				}

				let body = response.bytes().await.map_err(transport_error)?;

				tracing::warn!(status = status.as_u16(), "Server-side logout failed.");

				Err(Error::Status {
					path: path.to_owned(),
					status: status.as_u16(),
					body_preview: http::body_preview(&body),
				})
			})
			.await;

		obs::record_result(KIND, result)
	}
}
