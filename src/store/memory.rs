//! Thread-safe in-memory [`TokenStore`]; the session lives exactly as long as the process.

// self
use crate::{
	_prelude::*,
	auth::TokenRecord,
	store::{LogoutFlag, RefreshCommit, TokenStore},
};

#[derive(Debug, Default)]
struct Slot {
	record: TokenRecord,
	generation: u64,
}
impl Slot {
	fn replace(&mut self, record: TokenRecord) {
		self.record = record;
		self.generation += 1;
	}
}

/// Default [`TokenStore`] holding the record behind a read-write lock.
#[derive(Debug, Default)]
pub struct MemoryTokenStore {
	slot: RwLock<Slot>,
	logout: LogoutFlag,
}
impl MemoryTokenStore {
	/// Creates an empty store that shares an existing logout flag.
	pub fn with_logout_flag(logout: LogoutFlag) -> Self {
		Self { slot: Default::default(), logout }
	}
}
impl TokenStore for MemoryTokenStore {
	fn get(&self) -> TokenRecord {
		self.slot.read().record.clone()
	}

	fn set(&self, record: TokenRecord) {
		let mut slot = self.slot.write();

		slot.replace(record);
		self.logout.clear_logged_out();
	}

	fn commit_refresh(&self, record: TokenRecord) -> RefreshCommit {
		let mut slot = self.slot.write();

		if self.logout.is_logged_out() {
			return RefreshCommit::LoggedOut;
		}

		slot.replace(record);

		RefreshCommit::Committed
	}

	fn clear(&self, mark_logged_out: bool) {
		let mut slot = self.slot.write();

		if mark_logged_out {
			self.logout.mark_logged_out();
		}

		slot.replace(TokenRecord::empty());
	}

	fn expire_if_stale(&self, now: OffsetDateTime) -> bool {
		let mut slot = self.slot.write();

		if slot.record.access_token.is_none() || slot.record.is_valid_at(now) {
			return false;
		}

		slot.replace(TokenRecord::empty());

		true
	}

	fn generation(&self) -> u64 {
		self.slot.read().generation
	}

	fn logout_flag(&self) -> &LogoutFlag {
		&self.logout
	}
}
