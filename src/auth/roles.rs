//! Ordered role set carried by a session identity.

// std
use std::collections::btree_set::Iter;
// self
use crate::_prelude::*;

/// Errors emitted when validating role names.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum RoleValidationError {
	/// Empty role entries are not allowed.
	#[error("Role entries cannot be empty.")]
	Empty,
	/// Roles cannot contain embedded whitespace characters.
	#[error("Role contains whitespace: {role}.")]
	ContainsWhitespace {
		/// The offending role string.
		role: String,
	},
}

/// Deduplicated, lexicographically ordered role names (`ROLE_CANDIDATE`, `ROLE_HR`, ...).
///
/// The core never interprets roles; route guards read them to decide which views a user may
/// open.
#[derive(Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "Vec<String>", into = "Vec<String>")]
pub struct RoleSet(BTreeSet<String>);
impl RoleSet {
	/// Creates a role set from any iterator, rejecting blank or padded entries.
	pub fn new<I, S>(roles: I) -> Result<Self, RoleValidationError>
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		let mut set = BTreeSet::new();

		for role in roles {
			let role = role.into();

			validate_role(&role)?;
			set.insert(role);
		}

		Ok(Self(set))
	}

	/// Creates a role set from server-provided claims, keeping every valid entry.
	///
	/// Invalid entries are dropped one by one and traced; they never discard their neighbours.
	pub fn lenient<I, S>(roles: I) -> Self
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		let mut set = BTreeSet::new();

		for role in roles {
			let role = role.into();

			match validate_role(&role) {
				Ok(()) => {
					set.insert(role);
				},
				Err(err) => tracing::trace!(%err, "Dropping role claim."),
			}
		}

		Self(set)
	}

	/// Number of distinct roles.
	pub fn len(&self) -> usize {
		self.0.len()
	}

	/// Returns true if no roles are present.
	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}

	/// Returns true if the set contains `role`.
	pub fn contains(&self, role: &str) -> bool {
		self.0.contains(role)
	}

	/// Returns true if the set shares at least one role with `required`.
	pub fn contains_any<'a>(&self, required: impl IntoIterator<Item = &'a str>) -> bool {
		required.into_iter().any(|role| self.contains(role))
	}

	/// Iterator over roles in order.
	pub fn iter(&self) -> impl Iterator<Item = &str> {
		self.0.iter().map(String::as_str)
	}
}
impl<'a> IntoIterator for &'a RoleSet {
	type IntoIter = Iter<'a, String>;
	type Item = &'a String;

	fn into_iter(self) -> Self::IntoIter {
		self.0.iter()
	}
}
impl TryFrom<Vec<String>> for RoleSet {
	type Error = RoleValidationError;

	fn try_from(value: Vec<String>) -> Result<Self, Self::Error> {
		Self::new(value)
	}
}
impl From<RoleSet> for Vec<String> {
	fn from(value: RoleSet) -> Self {
		value.0.into_iter().collect()
	}
}
impl Debug for RoleSet {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_set().entries(self.iter()).finish()
	}
}
impl Display for RoleSet {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		for (idx, role) in self.iter().enumerate() {
			if idx > 0 {
				f.write_str(",")?;
			}

			f.write_str(role)?;
		}

		Ok(())
	}
}

fn validate_role(role: &str) -> Result<(), RoleValidationError> {
	if role.is_empty() {
		return Err(RoleValidationError::Empty);
	}
	if role.chars().any(char::is_whitespace) {
		return Err(RoleValidationError::ContainsWhitespace { role: role.to_owned() });
	}

	Ok(())
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn roles_are_deduplicated_and_ordered() {
		let roles = RoleSet::new(["ROLE_HR", "ROLE_CANDIDATE", "ROLE_HR"])
			.expect("Role fixture should be valid.");

		assert_eq!(roles.len(), 2);
		assert_eq!(roles.iter().collect::<Vec<_>>(), vec!["ROLE_CANDIDATE", "ROLE_HR"]);
		assert_eq!(roles.to_string(), "ROLE_CANDIDATE,ROLE_HR");
		assert!(roles.contains_any(["ROLE_ADMIN", "ROLE_HR"]));
		assert!(!roles.contains("ROLE_ADMIN"));
	}

	#[test]
	fn roles_reject_blank_and_padded_entries() {
		assert_eq!(RoleSet::new([""]), Err(RoleValidationError::Empty));
		assert!(matches!(
			RoleSet::new([" ROLE_HR"]),
			Err(RoleValidationError::ContainsWhitespace { .. })
		));
		assert!(serde_json::from_str::<RoleSet>("[\"ROLE HR\"]").is_err());
	}

	#[test]
	fn lenient_sets_keep_valid_neighbours() {
		let roles = RoleSet::lenient(["ROLE_HR", "", "ROLE ADMIN", "ROLE_CANDIDATE"]);

		assert_eq!(roles.iter().collect::<Vec<_>>(), vec!["ROLE_CANDIDATE", "ROLE_HR"]);
		assert!(RoleSet::lenient(Vec::<String>::new()).is_empty());
	}

	#[test]
	fn roles_deserialize_from_json_arrays() {
		let roles: RoleSet = serde_json::from_str("[\"ROLE_ADMIN\",\"ROLE_ADMIN\"]")
			.expect("Role arrays should deserialize.");

		assert_eq!(roles.len(), 1);
		assert!(RoleSet::default().is_empty());
	}
}
