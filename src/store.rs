//! Token store contract, the in-memory implementation, and the logout flag.
//!
//! The store is the only shared mutable session state besides the [`LogoutFlag`] it owns. It is
//! constructed once per process and injected as `Arc<dyn TokenStore>` into the refresh
//! coordinator and every API client, so tests can substitute their own implementation.

pub mod logout;
pub mod memory;

pub use logout::LogoutFlag;
pub use memory::MemoryTokenStore;

// self
use crate::{_prelude::*, auth::TokenRecord};

/// Result of writing a refreshed record.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RefreshCommit {
	/// The record replaced the previous one.
	Committed,
	/// The logout flag was raised; the record was discarded.
	LoggedOut,
}

/// Process-wide holder of the current session credential.
///
/// Reads never block on I/O and are safe from any number of concurrent API clients. Writers are
/// last-write-wins; the refresh coordinator guarantees at most one refresh write at a time, while
/// login writes may overwrite concurrently.
pub trait TokenStore
where
	Self: Send + Sync,
{
	/// Returns a snapshot of the current record.
	fn get(&self) -> TokenRecord;

	/// Atomically replaces the record after a login or OAuth exchange and lowers the logout flag.
	fn set(&self, record: TokenRecord);

	/// Atomically replaces the record after a refresh, unless the logout flag is raised.
	///
	/// The flag check and the write happen under the same lock [`clear`](Self::clear) uses, so a
	/// logout can never be undone by a refresh that settles after it.
	fn commit_refresh(&self, record: TokenRecord) -> RefreshCommit;

	/// Empties the record; `mark_logged_out` also raises the logout flag.
	fn clear(&self, mark_logged_out: bool);

	/// Silently clears the record if its token has expired at `now`, returning whether it did.
	///
	/// Does not raise the logout flag, so the next `401` may still refresh.
	fn expire_if_stale(&self, now: OffsetDateTime) -> bool;

	/// Monotonic counter bumped by every write.
	fn generation(&self) -> u64;

	/// The logout flag guarding refresh attempts.
	fn logout_flag(&self) -> &LogoutFlag;

	/// Returns `true` iff a token is present and not expired at `now`.
	fn is_valid_at(&self, now: OffsetDateTime) -> bool {
		self.get().is_valid_at(now)
	}

	/// Returns `true` iff a token is present and not expired.
	fn is_valid(&self) -> bool {
		self.is_valid_at(OffsetDateTime::now_utc())
	}
}
