//! Session token record, identity claims, lifecycle helpers, and builder.

// self
use crate::{
	_prelude::*,
	auth::{
		RoleSet, TenantId, Username,
		token::{claims::AccessClaims, secret::TokenSecret},
	},
};

/// Lifecycle status of the session credential at a given instant.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TokenStatus {
	/// No access token is held.
	Unauthenticated,
	/// Token is present and not known to be expired.
	Active,
	/// Token is present but its expiry has passed; it must not be sent.
	Expired,
}

/// Errors produced by [`TokenRecordBuilder`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum TokenRecordBuilderError {
	/// Issued when no access token value was provided.
	#[error("Access token is required.")]
	MissingAccessToken,
	/// Issued when the relative expiry is zero or negative.
	#[error("The expires_in value must be positive.")]
	NonPositiveExpiresIn,
	/// Issued when the expiry falls outside the representable date range.
	#[error("The expiry is out of range.")]
	ExpiryOutOfRange,
}

/// Identity claims attached when the token was issued or refreshed.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionIdentity {
	/// Signed-in username.
	pub username: Option<Username>,
	/// Roles granted to the user.
	pub roles: RoleSet,
	/// Tenant (company) the user acts for.
	pub tenant: Option<TenantId>,
}
impl SessionIdentity {
	/// Fills fields missing from `self` with values read from token claims.
	///
	/// Claims that fail identifier validation are skipped rather than rejected.
	pub fn merge_claims(mut self, claims: &AccessClaims) -> Self {
		if self.username.is_none() {
			self.username = claims.principal().and_then(Username::accept);
		}
		if self.roles.is_empty() {
			self.roles = RoleSet::lenient(claims.roles.iter().cloned());
		}
		if self.tenant.is_none() {
			self.tenant = claims.tenant_id.as_deref().and_then(TenantId::accept);
		}

		self
	}
}

/// The single source of truth for the current session credential.
///
/// `access_token == None` if and only if the session is unauthenticated. `expires_at == None`
/// means the expiry is unknown and the token is treated as usable until the server rejects it.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenRecord {
	/// Bearer credential; callers must avoid logging it.
	pub access_token: Option<TokenSecret>,
	/// Absolute expiry instant.
	pub expires_at: Option<OffsetDateTime>,
	/// Identity claims attached to the token.
	pub identity: SessionIdentity,
	/// Instant the record was populated.
	pub issued_at: Option<OffsetDateTime>,
}
impl TokenRecord {
	/// Returns a builder for populated records.
	pub fn builder() -> TokenRecordBuilder {
		TokenRecordBuilder::default()
	}

	/// The unauthenticated record.
	pub fn empty() -> Self {
		Self::default()
	}

	/// Computes the lifecycle status at a given instant.
	pub fn status_at(&self, instant: OffsetDateTime) -> TokenStatus {
		if self.access_token.is_none() {
			return TokenStatus::Unauthenticated;
		}

		match self.expires_at {
			Some(expires_at) if expires_at <= instant => TokenStatus::Expired,
			_ => TokenStatus::Active,
		}
	}

	/// Convenience helper that checks the status using the current UTC instant.
	pub fn status(&self) -> TokenStatus {
		self.status_at(OffsetDateTime::now_utc())
	}

	/// Returns `true` iff a token is present and not expired at `instant`.
	pub fn is_valid_at(&self, instant: OffsetDateTime) -> bool {
		matches!(self.status_at(instant), TokenStatus::Active)
	}

	/// Returns `true` iff a token is present and not expired now.
	pub fn is_valid(&self) -> bool {
		self.is_valid_at(OffsetDateTime::now_utc())
	}

	/// Returns the token when it may be attached to a request at `instant`.
	pub fn bearer_at(&self, instant: OffsetDateTime) -> Option<&TokenSecret> {
		if self.is_valid_at(instant) { self.access_token.as_ref() } else { None }
	}

	/// Expiry as epoch milliseconds.
	pub fn expiry_at_ms(&self) -> Option<i64> {
		self.expires_at.map(|at| (at.unix_timestamp_nanos() / 1_000_000) as i64)
	}
}
impl Debug for TokenRecord {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("TokenRecord")
			.field("access_token", &self.access_token.as_ref().map(|_| "<redacted>"))
			.field("expires_at", &self.expires_at)
			.field("identity", &self.identity)
			.field("issued_at", &self.issued_at)
			.finish()
	}
}

/// Builder for [`TokenRecord`].
#[derive(Clone, Debug, Default)]
pub struct TokenRecordBuilder {
	access_token: Option<TokenSecret>,
	issued_at: Option<OffsetDateTime>,
	expires_at: Option<OffsetDateTime>,
	expires_in: Option<Duration>,
	identity: SessionIdentity,
}
impl TokenRecordBuilder {
	/// Provides the access token value.
	pub fn access_token(mut self, token: impl Into<String>) -> Self {
		self.access_token = Some(TokenSecret::new(token));

		self
	}

	/// Sets the issued-at instant.
	pub fn issued_at(mut self, instant: OffsetDateTime) -> Self {
		self.issued_at = Some(instant);

		self
	}

	/// Convenience helper that stamps `issued_at` with the current clock.
	pub fn issued_now(self) -> Self {
		self.issued_at(OffsetDateTime::now_utc())
	}

	/// Sets an absolute expiry instant.
	pub fn expires_at(mut self, instant: OffsetDateTime) -> Self {
		self.expires_at = Some(instant);

		self
	}

	/// Sets a relative expiry duration from the issued instant.
	pub fn expires_in(mut self, duration: Duration) -> Self {
		self.expires_in = Some(duration);

		self
	}

	/// Attaches identity claims.
	pub fn identity(mut self, identity: SessionIdentity) -> Self {
		self.identity = identity;

		self
	}

	/// Consumes the builder and produces a [`TokenRecord`].
	///
	/// An absolute expiry wins over a relative one; with neither, the expiry is left unknown.
	pub fn build(self) -> Result<TokenRecord, TokenRecordBuilderError> {
		let access_token = self.access_token.ok_or(TokenRecordBuilderError::MissingAccessToken)?;
		let issued_at = self.issued_at.unwrap_or_else(OffsetDateTime::now_utc);
		let expires_at = match (self.expires_at, self.expires_in) {
			(Some(instant), _) => Some(instant),
			(None, Some(delta)) if !delta.is_positive() =>
				return Err(TokenRecordBuilderError::NonPositiveExpiresIn),
			(None, Some(delta)) => Some(
				issued_at.checked_add(delta).ok_or(TokenRecordBuilderError::ExpiryOutOfRange)?,
			),
			(None, None) => None,
		};

		Ok(TokenRecord {
			access_token: Some(access_token),
			expires_at,
			identity: self.identity,
			issued_at: Some(issued_at),
		})
	}
}
