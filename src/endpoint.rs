//! Endpoint classification: which paths carry a credential and which may trigger a refresh.
//!
//! Classification is a pure function of the request path matched against static prefix tables.
//! Prefixes match whole path segments, so `/auth/login` covers `/auth/login` and
//! `/auth/login/otp` but not `/auth/loginx`. Query strings and fragments are ignored. Unknown
//! paths are protected and refreshable.

// std
use std::borrow::Cow;
// self
use crate::_prelude::*;

/// Default prefixes reachable without a credential.
pub const DEFAULT_PUBLIC_PREFIXES: &[&str] = &[
	"/auth/login",
	"/auth/register",
	"/auth/refresh",
	"/auth/oauth2",
	"/auth/forgot-password",
	"/auth/reset-password",
	"/auth/verify-email",
	"/jobs/public",
	"/companies/public",
];
/// Default prefixes whose `401` must never trigger a nested refresh.
pub const DEFAULT_NON_REFRESHABLE_PREFIXES: &[&str] =
	&["/auth/refresh", "/auth/login", "/auth/logout"];

/// Whether a request carries the session credential.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EndpointClass {
	/// Sent without a credential; `401` responses are returned as-is.
	Public,
	/// Sent with the bearer credential when one is valid.
	Protected,
}

/// Combined classification used by the API client interceptors.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EndpointPolicy {
	/// Credential requirement.
	pub class: EndpointClass,
	/// Whether a `401` may trigger a refresh-and-retry.
	pub refreshable: bool,
}
impl EndpointPolicy {
	/// Returns true for public endpoints.
	pub fn is_public(&self) -> bool {
		matches!(self.class, EndpointClass::Public)
	}
}

/// Static prefix tables mapping request paths to [`EndpointPolicy`] values.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EndpointClassifier {
	public: Vec<String>,
	non_refreshable: Vec<String>,
}
impl EndpointClassifier {
	/// Creates a classifier from custom prefix tables.
	pub fn new<P, N, S, T>(public: P, non_refreshable: N) -> Self
	where
		P: IntoIterator<Item = S>,
		N: IntoIterator<Item = T>,
		S: Into<String>,
		T: Into<String>,
	{
		Self {
			public: public.into_iter().map(|prefix| normalize_prefix(prefix.into())).collect(),
			non_refreshable: non_refreshable
				.into_iter()
				.map(|prefix| normalize_prefix(prefix.into()))
				.collect(),
		}
	}

	/// Classifies `path` as public or protected.
	pub fn classify(&self, path: &str) -> EndpointClass {
		if matches_any(&self.public, &request_path(path)) {
			EndpointClass::Public
		} else {
			EndpointClass::Protected
		}
	}

	/// Returns whether a `401` from `path` may trigger a refresh.
	///
	/// Public endpoints never refresh; the refresh, login, and logout endpoints are excluded so a
	/// failing refresh cannot recurse.
	pub fn is_refreshable(&self, path: &str) -> bool {
		let path = request_path(path);

		!matches_any(&self.public, &path) && !matches_any(&self.non_refreshable, &path)
	}

	/// Full policy for `path`.
	pub fn policy(&self, path: &str) -> EndpointPolicy {
		EndpointPolicy { class: self.classify(path), refreshable: self.is_refreshable(path) }
	}
}
impl Default for EndpointClassifier {
	fn default() -> Self {
		Self::new(
			DEFAULT_PUBLIC_PREFIXES.iter().copied(),
			DEFAULT_NON_REFRESHABLE_PREFIXES.iter().copied(),
		)
	}
}

fn normalize_prefix(prefix: String) -> String {
	let trimmed = prefix.trim().trim_end_matches('/');

	if trimmed.starts_with('/') { trimmed.to_owned() } else { format!("/{trimmed}") }
}

fn request_path(path: &str) -> Cow<'_, str> {
	let end = path.find(['?', '#']).unwrap_or(path.len());
	let path = &path[..end];

	if path.starts_with('/') { Cow::Borrowed(path) } else { Cow::Owned(format!("/{path}")) }
}

fn matches_any(prefixes: &[String], path: &str) -> bool {
	prefixes.iter().any(|prefix| {
		prefix == "/"
			|| path
				.strip_prefix(prefix.as_str())
				.is_some_and(|rest| rest.is_empty() || rest.starts_with('/'))
	})
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn default_table_separates_public_and_protected() {
		let classifier = EndpointClassifier::default();

		assert_eq!(classifier.classify("/auth/login"), EndpointClass::Public);
		assert_eq!(classifier.classify("/jobs/public/search?q=rust"), EndpointClass::Public);
		assert_eq!(classifier.classify("companies/public/7"), EndpointClass::Public);
		assert_eq!(classifier.classify("/applications/mine"), EndpointClass::Protected);
		assert_eq!(classifier.classify("/auth/logout"), EndpointClass::Protected);
	}

	#[test]
	fn prefixes_match_whole_segments() {
		let classifier = EndpointClassifier::default();

		assert_eq!(classifier.classify("/auth/login/otp"), EndpointClass::Public);
		assert_eq!(classifier.classify("/auth/loginx"), EndpointClass::Protected);
		assert_eq!(classifier.classify("/jobs/publications"), EndpointClass::Protected);
	}

	#[test]
	fn auth_endpoints_never_refresh() {
		let classifier = EndpointClassifier::default();

		assert!(!classifier.is_refreshable("/auth/refresh"));
		assert!(!classifier.is_refreshable("/auth/login"));
		assert!(!classifier.is_refreshable("/auth/logout"));
		assert!(!classifier.is_refreshable("/jobs/public"));
		assert!(classifier.is_refreshable("/users/me"));

		let logout = classifier.policy("/auth/logout#fragment");

		assert_eq!(logout, EndpointPolicy { class: EndpointClass::Protected, refreshable: false });
	}

	#[test]
	fn unknown_paths_fail_safe_toward_auth() {
		let classifier = EndpointClassifier::default();
		let policy = classifier.policy("/never/seen/before");

		assert!(!policy.is_public());
		assert!(policy.refreshable);
	}

	#[test]
	fn custom_tables_are_normalized() {
		let classifier = EndpointClassifier::new(["health/"], ["/session/end"]);

		assert_eq!(classifier.classify("/health"), EndpointClass::Public);
		assert!(!classifier.is_refreshable("/session/end"));
		assert!(classifier.is_refreshable("/session"));
	}
}
