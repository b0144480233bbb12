//! Strongly typed identity claims attached to a session.
//!
//! The values are opaque to the session. Validation only rejects what can never be a real
//! claim: blank or padded strings and values longer than [`IDENTIFIER_MAX_LEN`].

// std
use std::ops::Deref;
// self
use crate::_prelude::*;

macro_rules! def_claim {
	($name:ident, $doc:literal, $kind:literal) => {
		#[doc = $doc]
		#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
		#[serde(try_from = "String", into = "String")]
		pub struct $name(String);
		impl $name {
			/// Creates the claim after validation.
			pub fn new(value: impl Into<String>) -> Result<Self, IdentifierError> {
				let value = value.into();

				validate_claim($kind, &value)?;

				Ok(Self(value))
			}

			/// Like [`Self::new`], but traces and discards invalid values.
			pub fn accept(value: &str) -> Option<Self> {
				Self::new(value)
					.inspect_err(|err| tracing::trace!(%err, "Dropping identity claim."))
					.ok()
			}
		}
		impl Deref for $name {
			type Target = str;

			fn deref(&self) -> &Self::Target {
				&self.0
			}
		}
		impl AsRef<str> for $name {
			fn as_ref(&self) -> &str {
				&self.0
			}
		}
		impl From<$name> for String {
			fn from(value: $name) -> Self {
				value.0
			}
		}
		impl TryFrom<String> for $name {
			type Error = IdentifierError;

			fn try_from(value: String) -> Result<Self, Self::Error> {
				Self::new(value)
			}
		}
		impl Debug for $name {
			fn fmt(&self, f: &mut Formatter) -> FmtResult {
				write!(f, concat!($kind, "({})"), self.0)
			}
		}
		impl Display for $name {
			fn fmt(&self, f: &mut Formatter) -> FmtResult {
				f.write_str(&self.0)
			}
		}
	};
}

/// Longest accepted claim, in bytes.
pub const IDENTIFIER_MAX_LEN: usize = 128;

/// Error returned when a claim fails validation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, ThisError)]
pub enum IdentifierError {
	/// The claim was empty or whitespace only.
	#[error("{kind} claim cannot be blank.")]
	Blank {
		/// Kind of claim (tenant, username).
		kind: &'static str,
	},
	/// The claim starts or ends with whitespace.
	#[error("{kind} claim has surrounding whitespace.")]
	Padded {
		/// Kind of claim (tenant, username).
		kind: &'static str,
	},
	/// The claim exceeded the allowed length.
	#[error("{kind} claim exceeds {max} bytes.")]
	TooLong {
		/// Kind of claim (tenant, username).
		kind: &'static str,
		/// Maximum permitted length.
		max: usize,
	},
}

def_claim! { TenantId, "Tenant (company) the signed-in user acts for.", "Tenant" }
def_claim! { Username, "Login name of the signed-in user.", "Username" }

fn validate_claim(kind: &'static str, value: &str) -> Result<(), IdentifierError> {
	if value.trim().is_empty() {
		return Err(IdentifierError::Blank { kind });
	}
	if value.trim() != value {
		return Err(IdentifierError::Padded { kind });
	}
	if value.len() > IDENTIFIER_MAX_LEN {
		return Err(IdentifierError::TooLong { kind, max: IDENTIFIER_MAX_LEN });
	}

	Ok(())
}
