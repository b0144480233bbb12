//! Deployment configuration: per-service base URLs, auth endpoint paths, and timeouts.
//!
//! Each backend service has its own base URL, read from `JOBBOARD_<SERVICE>_URL` and falling
//! back to a `localhost` default. Request paths (including the service segment, e.g.
//! `/jobs/42`) are appended to the base URL, so a base may carry a gateway prefix such as
//! `https://gateway.example.com/api`.

// self
use crate::{_prelude::*, endpoint::EndpointClassifier, error::ConfigError};

/// Default bound on the OAuth callback exchange.
pub const DEFAULT_CALLBACK_TIMEOUT: StdDuration = StdDuration::from_secs(15);

/// Backend services the client talks to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Service {
	/// Sign-in, refresh, logout, OAuth callbacks.
	Auth,
	/// Job postings.
	Job,
	/// Candidate applications.
	Application,
	/// User profiles and settings.
	User,
	/// Notification preferences and inbox.
	Notification,
	/// CV uploads.
	Cv,
	/// Admin monitoring.
	Monitoring,
}
impl Service {
	/// Every service, in declaration order.
	pub const ALL: [Service; 7] = [
		Service::Auth,
		Service::Job,
		Service::Application,
		Service::User,
		Service::Notification,
		Service::Cv,
		Service::Monitoring,
	];

	/// Returns a stable label suitable for logs and span fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			Service::Auth => "auth",
			Service::Job => "job",
			Service::Application => "application",
			Service::User => "user",
			Service::Notification => "notification",
			Service::Cv => "cv",
			Service::Monitoring => "monitoring",
		}
	}

	/// Environment variable overriding the base URL.
	pub const fn env_var(self) -> &'static str {
		match self {
			Service::Auth => "JOBBOARD_AUTH_URL",
			Service::Job => "JOBBOARD_JOB_URL",
			Service::Application => "JOBBOARD_APPLICATION_URL",
			Service::User => "JOBBOARD_USER_URL",
			Service::Notification => "JOBBOARD_NOTIFICATION_URL",
			Service::Cv => "JOBBOARD_CV_URL",
			Service::Monitoring => "JOBBOARD_MONITORING_URL",
		}
	}

	/// Local development default.
	pub const fn default_url(self) -> &'static str {
		match self {
			Service::Auth => "http://localhost:8081",
			Service::Job => "http://localhost:8082",
			Service::Application => "http://localhost:8083",
			Service::User => "http://localhost:8084",
			Service::Notification => "http://localhost:8085",
			Service::Cv => "http://localhost:8086",
			Service::Monitoring => "http://localhost:8087",
		}
	}
}
impl Display for Service {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Base URL for every [`Service`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServiceEndpoints {
	/// Auth service.
	pub auth: Url,
	/// Job service.
	pub job: Url,
	/// Application service.
	pub application: Url,
	/// User service.
	pub user: Url,
	/// Notification service.
	pub notification: Url,
	/// CV service.
	pub cv: Url,
	/// Monitoring service.
	pub monitoring: Url,
}
impl ServiceEndpoints {
	/// Loads base URLs from the process environment.
	pub fn from_env() -> Result<Self, ConfigError> {
		Self::from_lookup(|name| std::env::var(name).ok())
	}

	/// Uses the `localhost` defaults for every service.
	pub fn localhost() -> Result<Self, ConfigError> {
		Self::from_lookup(|_| None)
	}

	/// Loads base URLs through `lookup`, falling back to the `localhost` defaults for unset or
	/// blank variables.
	pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
	where
		F: Fn(&str) -> Option<String>,
	{
		let load = |service: Service| {
			let name = service.env_var();
			let raw = lookup(name)
				.map(|value| value.trim().to_owned())
				.filter(|value| !value.is_empty())
				.unwrap_or_else(|| service.default_url().to_owned());

			parse_base(name, &raw)
		};

		Ok(Self {
			auth: load(Service::Auth)?,
			job: load(Service::Job)?,
			application: load(Service::Application)?,
			user: load(Service::User)?,
			notification: load(Service::Notification)?,
			cv: load(Service::Cv)?,
			monitoring: load(Service::Monitoring)?,
		})
	}

	/// Points every service at the same base URL (gateway deployments and tests).
	pub fn uniform(base: Url) -> Self {
		Self {
			auth: base.clone(),
			job: base.clone(),
			application: base.clone(),
			user: base.clone(),
			notification: base.clone(),
			cv: base.clone(),
			monitoring: base,
		}
	}

	/// Overrides the base URL of a single service.
	pub fn with(mut self, service: Service, base: Url) -> Self {
		*self.base_mut(service) = base;

		self
	}

	/// Base URL of `service`.
	pub fn base(&self, service: Service) -> &Url {
		match service {
			Service::Auth => &self.auth,
			Service::Job => &self.job,
			Service::Application => &self.application,
			Service::User => &self.user,
			Service::Notification => &self.notification,
			Service::Cv => &self.cv,
			Service::Monitoring => &self.monitoring,
		}
	}

	fn base_mut(&mut self, service: Service) -> &mut Url {
		match service {
			Service::Auth => &mut self.auth,
			Service::Job => &mut self.job,
			Service::Application => &mut self.application,
			Service::User => &mut self.user,
			Service::Notification => &mut self.notification,
			Service::Cv => &mut self.cv,
			Service::Monitoring => &mut self.monitoring,
		}
	}
}

fn parse_base(name: &str, raw: &str) -> Result<Url, ConfigError> {
	let url =
		Url::parse(raw).map_err(|source| ConfigError::InvalidUrl { name: name.to_owned(), source })?;

	if url.cannot_be_a_base() {
		return Err(ConfigError::CannotBeBase { url: raw.to_owned() });
	}

	Ok(url)
}

/// Paths of the auth endpoints, relative to the auth service base URL.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthPaths {
	/// Credential sign-in.
	pub login: String,
	/// Refresh-token exchange (`POST <auth-base>/refresh`).
	pub refresh: String,
	/// Server-side session invalidation.
	pub logout: String,
	/// OAuth authorization-code exchange.
	pub oauth_callback: String,
}
impl Default for AuthPaths {
	fn default() -> Self {
		Self {
			login: "/auth/login".into(),
			refresh: "/auth/refresh".into(),
			logout: "/auth/logout".into(),
			oauth_callback: "/auth/oauth2/callback".into(),
		}
	}
}

/// Everything needed to assemble a [`SessionBroker`](crate::flows::SessionBroker).
#[derive(Clone, Debug)]
pub struct SessionConfig {
	/// Per-service base URLs.
	pub endpoints: ServiceEndpoints,
	/// Auth endpoint paths.
	pub auth_paths: AuthPaths,
	/// Endpoint classification tables.
	pub classifier: EndpointClassifier,
	/// Optional bound applied to every API request, including refreshes.
	pub request_timeout: Option<StdDuration>,
	/// Bound on the OAuth callback exchange.
	pub callback_timeout: StdDuration,
}
impl SessionConfig {
	/// Creates a configuration with default paths, classifier, and timeouts.
	pub fn new(endpoints: ServiceEndpoints) -> Self {
		Self {
			endpoints,
			auth_paths: AuthPaths::default(),
			classifier: EndpointClassifier::default(),
			request_timeout: None,
			callback_timeout: DEFAULT_CALLBACK_TIMEOUT,
		}
	}

	/// Loads endpoints from the environment and applies defaults elsewhere.
	pub fn from_env() -> Result<Self, ConfigError> {
		Ok(Self::new(ServiceEndpoints::from_env()?))
	}

	/// Replaces the auth endpoint paths.
	pub fn with_auth_paths(mut self, paths: AuthPaths) -> Self {
		self.auth_paths = paths;

		self
	}

	/// Replaces the endpoint classifier.
	pub fn with_classifier(mut self, classifier: EndpointClassifier) -> Self {
		self.classifier = classifier;

		self
	}

	/// Bounds every API request.
	pub fn with_request_timeout(mut self, timeout: StdDuration) -> Self {
		self.request_timeout = Some(timeout);

		self
	}

	/// Overrides the OAuth callback bound (defaults to 15 seconds).
	pub fn with_callback_timeout(mut self, timeout: StdDuration) -> Self {
		self.callback_timeout = timeout;

		self
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn lookup_falls_back_to_localhost_defaults() {
		let endpoints = ServiceEndpoints::from_lookup(|name| match name {
			"JOBBOARD_JOB_URL" => Some("https://jobs.example.com/api".into()),
			"JOBBOARD_CV_URL" => Some("   ".into()),
			_ => None,
		})
		.expect("Lookup-based endpoints should load.");

		assert_eq!(endpoints.base(Service::Job).as_str(), "https://jobs.example.com/api");
		assert_eq!(endpoints.base(Service::Cv).as_str(), "http://localhost:8086/");
		assert_eq!(endpoints.base(Service::Auth).as_str(), "http://localhost:8081/");
		assert_eq!(
			endpoints,
			ServiceEndpoints::localhost().expect("Defaults should parse.").with(
				Service::Job,
				Url::parse("https://jobs.example.com/api").expect("Fixture URL should parse."),
			)
		);
	}

	#[test]
	fn invalid_urls_name_the_variable() {
		let err = ServiceEndpoints::from_lookup(|name| {
			(name == "JOBBOARD_USER_URL").then(|| "not a url".to_owned())
		})
		.expect_err("Unparseable URLs must be rejected.");

		assert!(matches!(err, ConfigError::InvalidUrl { ref name, .. } if name == "JOBBOARD_USER_URL"));

		let err = ServiceEndpoints::from_lookup(|name| {
			(name == "JOBBOARD_AUTH_URL").then(|| "mailto:hr@example.com".to_owned())
		})
		.expect_err("URLs that cannot be a base must be rejected.");

		assert!(matches!(err, ConfigError::CannotBeBase { .. }));
	}

	#[test]
	fn session_config_defaults() {
		let config = SessionConfig::new(
			ServiceEndpoints::localhost().expect("Localhost defaults should parse."),
		);

		assert_eq!(config.callback_timeout, StdDuration::from_secs(15));
		assert!(config.request_timeout.is_none());
		assert_eq!(config.auth_paths.refresh, "/auth/refresh");
		assert_eq!(Service::ALL.len(), 7);
		assert_eq!(Service::Notification.to_string(), "notification");
	}
}
