//! Credential sign-in and the OAuth authorization-code callback exchange.
//!
//! Both flows end the same way: the auth service answers with a token payload, the payload
//! becomes a [`TokenRecord`], and the record replaces whatever the store held. Writing the record
//! lowers the logout flag, re-enabling refreshes after an earlier sign-out. The refresh cookie
//! set by the same response lands in the shared cookie jar.

// crates.io
use reqwest::header::CONTENT_TYPE;
// self
use crate::{
	_prelude::*,
	auth::TokenRecord,
	error::{ConfigError, ResponseError},
	flows::{SessionBroker, transport_error},
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
};

/// Username and password for a credential sign-in.
#[derive(Clone, PartialEq, Eq, Serialize)]
pub struct Credentials {
	/// Account name.
	pub username: String,
	password: String,
}
impl Credentials {
	/// Creates a credential pair.
	pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
		Self { username: username.into(), password: password.into() }
	}
}
impl Debug for Credentials {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("Credentials")
			.field("username", &self.username)
			.field("password", &"<redacted>")
			.finish()
	}
}

/// Authorization-code callback received from the identity provider redirect.
#[derive(Clone, PartialEq, Eq, Serialize)]
pub struct OAuthCallback {
	/// One-time authorization code.
	pub code: String,
	/// Opaque state echoed back by the provider.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub state: Option<String>,
}
impl OAuthCallback {
	/// Creates a callback from already-extracted parameters.
	pub fn new(code: impl Into<String>, state: Option<String>) -> Self {
		Self { code: code.into(), state }
	}

	/// Extracts the callback parameters from the redirect URL.
	///
	/// A provider `error` parameter becomes [`Error::OAuthDenied`]; a redirect without a code is
	/// reported as an invalid response.
	pub fn from_redirect(redirect: &Url) -> Result<Self> {
		let mut code = None;
		let mut state = None;
		let mut error = None;
		let mut description = None;

		for (key, value) in redirect.query_pairs() {
			match key.as_ref() {
				"code" => code = Some(value.into_owned()),
				"state" => state = Some(value.into_owned()),
				"error" => error = Some(value.into_owned()),
				"error_description" => description = Some(value.into_owned()),
				_ => {},
			}
		}

		if let Some(error) = error {
			let reason = match description {
				Some(description) => format!("{error} ({description})"),
				None => error,
			};

			return Err(Error::OAuthDenied { reason });
		}

		let code = code.filter(|code| !code.is_empty()).ok_or_else(|| ResponseError::Invalid {
			path: redirect.path().to_owned(),
			reason: "redirect carries no authorization code".into(),
		})?;

		Ok(Self { code, state: state.filter(|state| !state.is_empty()) })
	}

	/// Checks the echoed state against the one issued before the redirect.
	pub fn verify_state(&self, expected: &str) -> Result<()> {
		match self.state.as_deref() {
			Some(state) if state == expected => Ok(()),
			_ => Err(Error::OAuthStateMismatch),
		}
	}
}
impl Debug for OAuthCallback {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("OAuthCallback")
			.field("code", &"<redacted>")
			.field("state", &self.state)
			.finish()
	}
}

impl SessionBroker {
	/// Signs in with a username and password and stores the issued token.
	pub async fn login(&self, credentials: &Credentials) -> Result<TokenRecord> {
		const KIND: FlowKind = FlowKind::Login;

		let span = FlowSpan::new(KIND, "login");

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

		let result = span
			.instrument(async move {
				let path = self.config.auth_paths.login.as_str();
				let body = serde_json::to_vec(credentials).map_err(ConfigError::BodyEncode)?;
				let request = self
					.http_client
					.post(self.auth_url(path)?)
					.header(CONTENT_TYPE, "application/json")
					.body(body);
				let grant = self.exchange_grant(path, request, transport_error).await?;

				self.install_grant(path, grant)
			})
			.await;

		obs::record_result(KIND, result)
	}

	/// Exchanges an OAuth authorization code for a session token.
	///
	/// The exchange is bounded by [`SessionConfig::callback_timeout`]; when it elapses the call
	/// fails with [`Error::CallbackTimeout`] and the store is left untouched.
	///
	/// [`SessionConfig::callback_timeout`]: crate::config::SessionConfig::callback_timeout
	pub async fn exchange_oauth_callback(&self, callback: &OAuthCallback) -> Result<TokenRecord> {
		const KIND: FlowKind = FlowKind::OAuthCallback;

		let span = FlowSpan::new(KIND, "exchange_oauth_callback");

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

		let result = span
			.instrument(async move {
				let path = self.config.auth_paths.oauth_callback.as_str();
				let after = self.config.callback_timeout;
				let body = serde_json::to_vec(callback).map_err(ConfigError::BodyEncode)?;
				let request = self
					.http_client
					.post(self.auth_url(path)?)
					.header(CONTENT_TYPE, "application/json")
					.timeout(after)
					.body(body);
				let grant = self
					.exchange_grant(path, request, |err| {
						if err.is_timeout() {
							Error::CallbackTimeout { after }
						} else {
							transport_error(err)
						}
					})
					.await?;

				self.install_grant(path, grant)
			})
			.await;

		obs::record_result(KIND, result)
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	fn redirect(query: &str) -> Url {
		Url::parse(&format!("https://app.example.com/oauth2/redirect?{query}"))
			.expect("Redirect fixture should parse.")
	}

	#[test]
	fn callback_parses_code_and_state() {
		let callback = OAuthCallback::from_redirect(&redirect("code=abc&state=xyz&scope=email"))
			.expect("Redirect with a code should parse.");

		assert_eq!(callback.code, "abc");
		assert!(callback.verify_state("xyz").is_ok());
		assert!(matches!(callback.verify_state("other"), Err(Error::OAuthStateMismatch)));
		assert!(!format!("{callback:?}").contains("abc"));
	}

	#[test]
	fn provider_errors_and_missing_codes_are_rejected() {
		let denied = OAuthCallback::from_redirect(&redirect(
			"error=access_denied&error_description=User%20cancelled",
		))
		.expect_err("Provider errors must be surfaced.");

		assert!(
			matches!(denied, Error::OAuthDenied { ref reason } if reason == "access_denied (User cancelled)")
		);

		let missing = OAuthCallback::from_redirect(&redirect("state=xyz"))
			.expect_err("Redirects without a code must be rejected.");

		assert!(matches!(missing, Error::Response(ResponseError::Invalid { .. })));

		let stateless = OAuthCallback::from_redirect(&redirect("code=abc"))
			.expect("Missing state still yields a callback.");

		assert!(matches!(stateless.verify_state("xyz"), Err(Error::OAuthStateMismatch)));
	}

	#[test]
	fn credentials_redact_password() {
		let credentials = Credentials::new("jane", "hunter2");
		let rendered = format!("{credentials:?}");

		assert!(rendered.contains("jane"));
		assert!(!rendered.contains("hunter2"));
		assert_eq!(
			serde_json::to_value(&credentials).expect("Credentials should serialize."),
			serde_json::json!({ "username": "jane", "password": "hunter2" })
		);
	}
}
