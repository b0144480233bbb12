//! Session-level error types shared across the store, refresh coordinator, and API clients.

// self
use crate::_prelude::*;

/// Crate-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Canonical error exposed by public APIs.
#[derive(Debug, ThisError)]
pub enum Error {
	/// Local configuration problem.
	#[error(transparent)]
	Config(#[from] ConfigError),
	/// Transport failure (DNS, TCP, TLS).
	#[error(transparent)]
	Transport(#[from] TransportError),
	/// Response body could not be decoded.
	#[error(transparent)]
	Response(#[from] ResponseError),

	/// Backend answered with a non-success status.
	#[error("Request to `{path}` failed with HTTP {status}.")]
	Status {
		/// Request path as supplied by the caller.
		path: String,
		/// HTTP status code.
		status: u16,
		/// Leading part of the response body, when one was returned.
		body_preview: Option<String>,
	},
	/// The refresh exchange failed; the session cannot recover without a new sign-in.
	#[error("Session expired; sign in again.")]
	SessionExpired(#[source] RefreshFailure),
	/// Refresh was requested after an explicit logout.
	#[error("Session was signed out; refresh is disabled until the next sign-in.")]
	LoggedOut,
	/// The single retry after a successful refresh was still rejected.
	#[error("Request to `{path}` was still rejected with HTTP {status} after refreshing the session.")]
	RetryExhausted {
		/// Request path as supplied by the caller.
		path: String,
		/// HTTP status code of the retried request.
		status: u16,
	},
	/// The OAuth callback exchange did not finish in time.
	#[error("OAuth callback exchange timed out after {}ms.", .after.as_millis())]
	CallbackTimeout {
		/// Configured bound that elapsed.
		after: StdDuration,
	},
	/// The identity provider redirected back with an error.
	#[error("OAuth sign-in was denied: {reason}.")]
	OAuthDenied {
		/// Provider-supplied error code and description.
		reason: String,
	},
	/// The callback `state` does not match the one issued before the redirect.
	#[error("OAuth callback state does not match the pending sign-in.")]
	OAuthStateMismatch,
}
impl Error {
	/// Returns `true` when the failure means the user has to sign in again.
	///
	/// UI collaborators use this to show a generic "please sign in again" message instead of the
	/// raw HTTP error.
	pub fn requires_sign_in(&self) -> bool {
		matches!(self, Self::SessionExpired(_) | Self::LoggedOut | Self::RetryExhausted { .. })
	}

	/// HTTP status associated with the failure, if any.
	pub fn status(&self) -> Option<u16> {
		match self {
			Self::Status { status, .. } | Self::RetryExhausted { status, .. } => Some(*status),
			Self::SessionExpired(RefreshFailure::Rejected { status }) => Some(*status),
			_ => None,
		}
	}
}
impl From<RefreshFailure> for Error {
	fn from(failure: RefreshFailure) -> Self {
		match failure {
			RefreshFailure::LoggedOut => Self::LoggedOut,
			other => Self::SessionExpired(other),
		}
	}
}

/// Configuration and validation failures.
#[derive(Debug, ThisError)]
pub enum ConfigError {
	/// HTTP client could not be constructed.
	#[error("HTTP client could not be constructed.")]
	HttpClientBuild {
		/// Underlying transport builder failure.
		#[source]
		source: BoxError,
	},
	/// A configured URL cannot be parsed.
	#[error("Configured URL `{name}` is invalid.")]
	InvalidUrl {
		/// Setting or environment variable name.
		name: String,
		/// Underlying parsing failure.
		#[source]
		source: url::ParseError,
	},
	/// A base URL cannot carry path segments (e.g. `mailto:`).
	#[error("URL `{url}` cannot be used as a base URL.")]
	CannotBeBase {
		/// Offending URL.
		url: String,
	},
	/// A header value contains characters HTTP does not allow.
	#[error("Header `{name}` has an invalid value.")]
	InvalidHeader {
		/// Header name.
		name: String,
	},
	/// Request body could not be encoded.
	#[error("Request body could not be encoded as JSON.")]
	BodyEncode(#[source] serde_json::Error),
}
impl ConfigError {
	/// Wraps a transport's builder failure inside [`ConfigError`].
	pub fn http_client_build(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::HttpClientBuild { source: Box::new(src) }
	}
}

/// Transport-level failures (network, IO).
#[derive(Debug, ThisError)]
pub enum TransportError {
	/// Underlying HTTP client reported a network failure.
	#[error("Network error occurred while calling the backend.")]
	Network {
		/// Transport-specific network error.
		#[source]
		source: BoxError,
	},
	/// Underlying IO failure surfaced during transport.
	#[error("I/O error occurred while calling the backend.")]
	Io(#[from] std::io::Error),
}
impl TransportError {
	/// Wraps a transport-specific network error.
	pub fn network(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::Network { source: Box::new(src) }
	}
}
impl From<ReqwestError> for TransportError {
	fn from(e: ReqwestError) -> Self {
		Self::network(e)
	}
}

/// Response decoding failures.
#[derive(Debug, ThisError)]
pub enum ResponseError {
	/// Body is not the JSON shape the endpoint promises.
	#[error("Response from `{path}` is malformed JSON.")]
	Malformed {
		/// Request path as supplied by the caller.
		path: String,
		/// Structured parsing failure.
		#[source]
		source: serde_path_to_error::Error<serde_json::Error>,
	},
	/// Body parsed but carries values the session cannot use.
	#[error("Response from `{path}` is invalid: {reason}.")]
	Invalid {
		/// Request path as supplied by the caller.
		path: String,
		/// What was wrong with the payload.
		reason: String,
	},
}

/// Outcome of a failed refresh activation, shared verbatim by every waiter.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum RefreshFailure {
	/// Refresh endpoint answered with a non-success status.
	#[error("Refresh endpoint rejected the session with HTTP {status}.")]
	Rejected {
		/// HTTP status code.
		status: u16,
	},
	/// Refresh call never produced a response.
	#[error("Refresh call failed: {message}.")]
	Network {
		/// Rendered transport error.
		message: String,
	},
	/// Refresh endpoint answered 2xx with an unusable body.
	#[error("Refresh response is malformed: {message}.")]
	Malformed {
		/// Rendered decoding error.
		message: String,
	},
	/// The user signed out while the refresh was in flight.
	#[error("Session was signed out while the refresh was in flight.")]
	LoggedOut,
}
