//! Best-effort reading of JWT payload claims.
//!
//! Access tokens are opaque to the session, but the auth backend issues JWTs whose payload
//! carries the expiry and identity. When a token response omits those fields they are filled
//! from the payload. Signatures are not verified: the values only drive client-side decisions
//! (when to stop sending a token, which views to show), never authorization.
//!
//! Every claim is read on its own. A claim with an unexpected shape is skipped and never hides
//! its neighbours, so `exp` survives whatever the identity claims look like.

// crates.io
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use serde_json::{Map, Value};
// self
use crate::_prelude::*;

/// Claims the session understands; everything else in the payload is ignored.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AccessClaims {
	/// Subject, typically the username.
	pub sub: Option<String>,
	/// Explicit username (`username` or `preferred_username`), preferred over `sub`.
	pub username: Option<String>,
	/// Role names from `roles` or `authorities`.
	pub roles: Vec<String>,
	/// Tenant (company) identifier from `tenantId` or `tenant_id`.
	pub tenant_id: Option<String>,
	/// Expiry as seconds since the Unix epoch.
	pub exp: Option<i64>,
}
impl AccessClaims {
	/// Decodes the payload segment of `token`, returning `None` for opaque or malformed tokens.
	pub fn decode(token: &str) -> Option<Self> {
		let mut segments = token.split('.');
		let (_header, payload, _signature) = (segments.next()?, segments.next()?, segments.next()?);

		if segments.next().is_some() {
			return None;
		}

		let bytes = URL_SAFE_NO_PAD.decode(payload.trim_end_matches('=')).ok()?;
		let payload = serde_json::from_slice::<Map<String, Value>>(&bytes).ok()?;

		Some(Self::from_payload(&payload))
	}

	/// Reads the known claims out of a decoded payload object.
	pub fn from_payload(payload: &Map<String, Value>) -> Self {
		let first = |keys: &[&str]| keys.iter().find_map(|key| payload.get(*key));

		Self {
			sub: payload.get("sub").and_then(text),
			username: ["username", "preferred_username"]
				.iter()
				.find_map(|key| payload.get(*key).and_then(text)),
			roles: first(&["roles", "authorities"]).map(role_names).unwrap_or_default(),
			tenant_id: ["tenantId", "tenant_id"]
				.iter()
				.find_map(|key| payload.get(*key).and_then(text)),
			exp: payload.get("exp").and_then(epoch_seconds),
		}
	}

	/// Username claim, falling back to the subject.
	pub fn principal(&self) -> Option<&str> {
		self.username.as_deref().or(self.sub.as_deref())
	}

	/// Expiry instant, if the claim is present and representable.
	pub fn expires_at(&self) -> Option<OffsetDateTime> {
		self.exp.and_then(|secs| OffsetDateTime::from_unix_timestamp(secs).ok())
	}
}

fn text(value: &Value) -> Option<String> {
	match value {
		Value::String(text) => Some(text.clone()),
		Value::Number(number) => Some(number.to_string()),
		_ => None,
	}
}

fn epoch_seconds(value: &Value) -> Option<i64> {
	match value {
		Value::Number(number) => number.as_i64().or_else(|| number.as_f64().map(|secs| secs as i64)),
		Value::String(text) => text.trim().parse().ok(),
		_ => None,
	}
}

// Accepts `"A B"`, `"A,B"`, `["A", "B"]`, and Spring-style `[{"authority": "A"}]`.
fn role_names(value: &Value) -> Vec<String> {
	match value {
		Value::String(joined) => joined
			.split(|c: char| c == ',' || c.is_whitespace())
			.filter(|role| !role.is_empty())
			.map(str::to_owned)
			.collect(),
		Value::Array(items) => items
			.iter()
			.filter_map(|item| match item {
				Value::String(role) => Some(role.clone()),
				Value::Object(entry) =>
					["authority", "role", "name"].iter().find_map(|key| entry.get(*key).and_then(text)),
				_ => None,
			})
			.collect(),
		_ => Vec::new(),
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	fn jwt(payload: &str) -> String {
		format!("eyJhbGciOiJIUzI1NiJ9.{}.c2ln", URL_SAFE_NO_PAD.encode(payload))
	}

	#[test]
	fn decodes_identity_and_expiry() {
		let token = jwt(
			r#"{"sub":"jane","roles":["ROLE_HR"],"tenantId":"acme","exp":1767225600,"iat":1}"#,
		);
		let claims = AccessClaims::decode(&token).expect("Well-formed JWT payload should decode.");

		assert_eq!(claims.principal(), Some("jane"));
		assert_eq!(claims.roles, vec!["ROLE_HR".to_string()]);
		assert_eq!(claims.tenant_id.as_deref(), Some("acme"));
		assert_eq!(
			claims.expires_at(),
			Some(time::macros::datetime!(2026-01-01 00:00 UTC)),
		);
	}

	#[test]
	fn aliases_cover_common_claim_names() {
		let token = jwt(
			r#"{"sub":"u-1","preferred_username":"jane","authorities":["ROLE_ADMIN"],"tenant_id":"t"}"#,
		);
		let claims = AccessClaims::decode(&token).expect("Aliased claims should decode.");

		assert_eq!(claims.principal(), Some("jane"));
		assert_eq!(claims.roles, vec!["ROLE_ADMIN".to_string()]);
		assert_eq!(claims.tenant_id.as_deref(), Some("t"));
		assert_eq!(claims.expires_at(), None);
	}

	#[test]
	fn odd_identity_shapes_keep_the_expiry() {
		let scalar = AccessClaims::decode(&jwt(r#"{"sub":"jane","roles":"ROLE_HR","exp":1000}"#))
			.expect("String roles should not break decoding.");

		assert_eq!(scalar.roles, vec!["ROLE_HR".to_string()]);
		assert_eq!(scalar.exp, Some(1000));

		let spring = AccessClaims::decode(&jwt(
			r#"{"username":"jane","preferred_username":"j","authorities":[{"authority":"ROLE_HR"},7],"tenantId":42,"exp":"1000"}"#,
		))
		.expect("Mixed claim shapes should decode.");

		assert_eq!(spring.principal(), Some("jane"));
		assert_eq!(spring.roles, vec!["ROLE_HR".to_string()]);
		assert_eq!(spring.tenant_id.as_deref(), Some("42"));
		assert_eq!(spring.exp, Some(1000));

		let broken = AccessClaims::decode(&jwt(r#"{"roles":{"x":1},"tenantId":[],"exp":1000}"#))
			.expect("Unusable identity claims are skipped.");

		assert!(broken.roles.is_empty());
		assert!(broken.tenant_id.is_none());
		assert_eq!(broken.exp, Some(1000));
	}

	#[test]
	fn opaque_tokens_yield_nothing() {
		assert!(AccessClaims::decode("opaque-token").is_none());
		assert!(AccessClaims::decode("a.b").is_none());
		assert!(AccessClaims::decode("a.!!!.c").is_none());
		assert!(AccessClaims::decode(&jwt("[1,2]")).is_none());
		assert!(AccessClaims::decode(&format!("{}.extra", jwt("{}"))).is_none());
	}
}
