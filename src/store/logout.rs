//! Process-wide logout flag.

// std
use std::sync::atomic::{AtomicBool, Ordering};
// self
use crate::_prelude::*;

/// Raised by an explicit logout; while raised the refresh coordinator refuses to refresh.
///
/// Clones share the same flag.
#[derive(Clone, Debug, Default)]
pub struct LogoutFlag(Arc<AtomicBool>);
impl LogoutFlag {
	/// Raises the flag.
	pub fn mark_logged_out(&self) {
		self.0.store(true, Ordering::SeqCst);
	}

	/// Lowers the flag after a successful sign-in.
	pub fn clear_logged_out(&self) {
		self.0.store(false, Ordering::SeqCst);
	}

	/// Returns whether the user has explicitly logged out.
	pub fn is_logged_out(&self) -> bool {
		self.0.load(Ordering::SeqCst)
	}
}
