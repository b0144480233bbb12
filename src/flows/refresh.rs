//! Single-flight refresh coordination.
//!
//! [`RefreshCoordinator::request_refresh`] is the only way a refresh reaches the network. The
//! coordinator keeps at most one activation in flight: the first caller creates it, every caller
//! that arrives before it settles joins it, and all of them observe the same outcome. Joining and
//! creating happen in one critical section that never awaits, so two callers can never both
//! believe they are first.
//!
//! A settled activation has already written the store (new record on success, silent clear on
//! failure) before any waiter resumes. The coordinator never retries; the next activation starts
//! only after the previous one released its slot.

mod metrics;

pub use metrics::RefreshMetrics;

// crates.io
use futures_util::future::{BoxFuture, FutureExt, Shared};
// self
use crate::{
	_prelude::*,
	auth::TokenSecret,
	error::RefreshFailure,
	http::RefreshTransport,
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
	store::{RefreshCommit, TokenStore},
};

type Outcome = std::result::Result<TokenSecret, RefreshFailure>;

struct Activation {
	id: u64,
	outcome: Shared<BoxFuture<'static, Outcome>>,
}

#[derive(Default)]
struct Slot {
	next_id: u64,
	current: Option<Activation>,
}

struct Inner {
	store: Arc<dyn TokenStore>,
	transport: Arc<dyn RefreshTransport>,
	slot: Mutex<Slot>,
	metrics: Arc<RefreshMetrics>,
}
impl Inner {
	async fn run(self: Arc<Self>, id: u64) -> Outcome {
		const KIND: FlowKind = FlowKind::Refresh;

		let span = FlowSpan::new(KIND, "request_refresh");

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);
		self.metrics.record_attempt();

		let outcome = span.instrument(self.exchange()).await;

		self.release(id);

		match &outcome {
			Ok(_) => {
				self.metrics.record_success();
				obs::record_flow_outcome(KIND, FlowOutcome::Success);
			},
			Err(failure) => {
				self.metrics.record_failure();
				obs::record_flow_outcome(KIND, FlowOutcome::Failure);
				tracing::debug!(%failure, "Refresh failed.");
			},
		}

		outcome
	}

	async fn exchange(&self) -> Outcome {
		let generation = self.store.generation();
		let grant = match self.transport.refresh().await {
			Ok(grant) => grant,
			Err(failure) => return Err(self.settle_failure(failure)),
		};
		let record = match grant.into_record(OffsetDateTime::now_utc()) {
			Ok(record) => record,
			Err(err) =>
				return Err(
					self.settle_failure(RefreshFailure::Malformed { message: err.to_string() })
				),
		};
		let token = record.access_token.clone().ok_or_else(|| {
			self.settle_failure(RefreshFailure::Malformed {
				message: "Access token is missing.".into(),
			})
		})?;

		if self.store.generation() != generation {
			tracing::warn!(
				"A sign-in landed while the refresh was in flight; the refreshed token replaces it."
			);
		}

		match self.store.commit_refresh(record) {
			RefreshCommit::Committed => Ok(token),
			RefreshCommit::LoggedOut => {
				tracing::debug!("Discarding the refreshed token because the session was signed out.");

				Err(RefreshFailure::LoggedOut)
			},
		}
	}

	fn settle_failure(&self, failure: RefreshFailure) -> RefreshFailure {
		if self.store.logout_flag().is_logged_out() {
			return RefreshFailure::LoggedOut;
		}

		self.store.clear(false);

		failure
	}

	fn release(&self, id: u64) {
		let mut slot = self.slot.lock();

		if slot.current.as_ref().is_some_and(|current| current.id == id) {
			slot.current = None;
		}
	}
}

/// Ensures at most one refresh exchange is in flight and fans its outcome out to every waiter.
///
/// The exchange is a shared future owned by the activation rather than by its first caller.
/// Dropping any waiter, the first one included, leaves the exchange running for the others; it
/// is never started twice.
pub struct RefreshCoordinator {
	inner: Arc<Inner>,
}
impl RefreshCoordinator {
	/// Creates a coordinator writing refreshed records into `store`.
	pub fn new(store: Arc<dyn TokenStore>, transport: Arc<dyn RefreshTransport>) -> Self {
		Self {
			inner: Arc::new(Inner {
				store,
				transport,
				slot: Default::default(),
				metrics: Default::default(),
			}),
		}
	}

	/// Obtains a new access token, joining the in-flight refresh when there is one.
	///
	/// Fails with [`Error::LoggedOut`] without touching the network when the user has signed
	/// out, and with [`Error::SessionExpired`] when the exchange itself fails. Every caller that
	/// joined the same activation receives the same result.
	pub async fn request_refresh(&self) -> Result<TokenSecret> {
		let outcome = {
			let mut slot = self.inner.slot.lock();

			if self.inner.store.logout_flag().is_logged_out() {
				self.inner.metrics.record_short_circuit();
				tracing::debug!("Refresh refused because the session was signed out.");

				return Err(Error::LoggedOut);
			}

			match slot.current.as_ref() {
				Some(activation) => {
					self.inner.metrics.record_join();
					tracing::debug!("Joining the in-flight refresh.");

					activation.outcome.clone()
				},
				None => {
					slot.next_id = slot.next_id.wrapping_add(1);

					let id = slot.next_id;
					let outcome = self.inner.clone().run(id).boxed().shared();

					slot.current = Some(Activation { id, outcome: outcome.clone() });

					outcome
				},
			}
		};

		outcome.await.map_err(Error::from)
	}

	/// Returns `true` while a refresh activation is pending.
	pub fn is_in_flight(&self) -> bool {
		self.inner.slot.lock().current.is_some()
	}

	/// Refresh counters.
	pub fn metrics(&self) -> &Arc<RefreshMetrics> {
		&self.inner.metrics
	}
}
impl Debug for RefreshCoordinator {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("RefreshCoordinator")
			.field("in_flight", &self.is_in_flight())
			.field("metrics", &self.inner.metrics)
			.finish()
	}
}

#[cfg(test)]
mod tests {
	// std
	use std::sync::atomic::{AtomicUsize, Ordering};
	// crates.io
	use tokio::task::JoinSet;
	// self
	use super::*;
	use crate::{
		_preludet::active_record,
		http::{RefreshFuture, TokenGrant},
		store::MemoryTokenStore,
	};

	type Scripted = std::result::Result<TokenGrant, RefreshFailure>;

	struct ScriptedTransport {
		calls: AtomicUsize,
		delay: StdDuration,
		outcomes: Mutex<Vec<Scripted>>,
	}
	impl ScriptedTransport {
		fn new(delay: StdDuration, outcomes: Vec<Scripted>) -> Arc<Self> {
			Arc::new(Self { calls: AtomicUsize::new(0), delay, outcomes: Mutex::new(outcomes) })
		}

		fn calls(&self) -> usize {
			self.calls.load(Ordering::SeqCst)
		}
	}
	impl RefreshTransport for ScriptedTransport {
		fn refresh(&self) -> RefreshFuture<'_> {
			Box::pin(async move {
				self.calls.fetch_add(1, Ordering::SeqCst);
				tokio::time::sleep(self.delay).await;

				let mut outcomes = self.outcomes.lock();

				if outcomes.is_empty() {
					Err(RefreshFailure::Rejected { status: 401 })
				} else {
					outcomes.remove(0)
				}
			})
		}
	}

	fn grant(token: &str) -> Scripted {
		let mut grant = TokenGrant::new(token);

		grant.expires_in_seconds = Some(900);

		Ok(grant)
	}

	fn build(
		transport: Arc<ScriptedTransport>,
	) -> (Arc<RefreshCoordinator>, Arc<MemoryTokenStore>) {
		let store = Arc::new(MemoryTokenStore::default());
		let coordinator = Arc::new(RefreshCoordinator::new(store.clone(), transport));

		(coordinator, store)
	}

	#[tokio::test]
	async fn concurrent_callers_share_one_exchange() {
		let transport = ScriptedTransport::new(StdDuration::from_millis(100), vec![grant("T2")]);
		let (coordinator, store) = build(transport.clone());

		store.set(active_record("T1", Duration::minutes(15)));

		let mut waiters = JoinSet::new();

		for _ in 0..5 {
			let coordinator = coordinator.clone();

			waiters.spawn(async move { coordinator.request_refresh().await });
		}

		while let Some(joined) = waiters.join_next().await {
			let token = joined
				.expect("Refresh task should not panic.")
				.expect("Every waiter should receive the refreshed token.");

			assert_eq!(token.expose(), "T2");
		}

		assert_eq!(transport.calls(), 1);
		assert_eq!(coordinator.metrics().attempts(), 1);
		assert_eq!(coordinator.metrics().joins(), 4);
		assert_eq!(coordinator.metrics().successes(), 1);
		assert!(!coordinator.is_in_flight());
		assert_eq!(store.get().access_token.map(|t| t.expose().to_owned()), Some("T2".into()));
	}

	#[tokio::test]
	async fn failure_fans_out_and_clears_silently() {
		let transport = ScriptedTransport::new(
			StdDuration::from_millis(50),
			vec![Err(RefreshFailure::Rejected { status: 401 })],
		);
		let (coordinator, store) = build(transport.clone());

		store.set(active_record("T1", Duration::minutes(15)));

		let (first, second, third) = tokio::join!(
			coordinator.request_refresh(),
			coordinator.request_refresh(),
			coordinator.request_refresh(),
		);

		for result in [first, second, third] {
			assert!(matches!(
				result,
				Err(Error::SessionExpired(RefreshFailure::Rejected { status: 401 }))
			));
		}

		assert_eq!(transport.calls(), 1);
		assert!(store.get().access_token.is_none());
		assert!(!store.logout_flag().is_logged_out(), "Refresh failures must not mark a logout.");
		assert_eq!(coordinator.metrics().failures(), 1);
	}

	#[tokio::test]
	async fn signed_out_sessions_short_circuit() {
		let transport = ScriptedTransport::new(StdDuration::ZERO, vec![grant("T2")]);
		let (coordinator, store) = build(transport.clone());

		store.clear(true);

		assert!(matches!(coordinator.request_refresh().await, Err(Error::LoggedOut)));
		assert_eq!(transport.calls(), 0);
		assert_eq!(coordinator.metrics().short_circuits(), 1);
		assert!(!coordinator.is_in_flight());
	}

	#[tokio::test]
	async fn logout_during_refresh_discards_the_result() {
		let transport = ScriptedTransport::new(StdDuration::from_millis(100), vec![grant("T2")]);
		let (coordinator, store) = build(transport.clone());

		store.set(active_record("T1", Duration::minutes(15)));

		let (result, _) = tokio::join!(coordinator.request_refresh(), async {
			tokio::time::sleep(StdDuration::from_millis(20)).await;
			store.clear(true);
		});

		assert!(matches!(result, Err(Error::LoggedOut)));
		assert_eq!(transport.calls(), 1);
		assert!(store.get().access_token.is_none(), "A logout must never be undone by a refresh.");
		assert!(store.logout_flag().is_logged_out());
	}

	#[tokio::test]
	async fn settled_activations_do_not_absorb_later_requests() {
		let transport =
			ScriptedTransport::new(StdDuration::from_millis(10), vec![grant("T2"), grant("T3")]);
		let (coordinator, store) = build(transport.clone());
		let first = coordinator.request_refresh().await.expect("First refresh should succeed.");
		let second = coordinator.request_refresh().await.expect("Second refresh should succeed.");

		assert_eq!(first.expose(), "T2");
		assert_eq!(second.expose(), "T3");
		assert_eq!(transport.calls(), 2);
		assert_eq!(store.get().access_token.map(|t| t.expose().to_owned()), Some("T3".into()));
	}

	#[tokio::test]
	async fn dropping_the_first_caller_keeps_the_exchange_alive() {
		let transport = ScriptedTransport::new(StdDuration::from_millis(100), vec![grant("T2")]);
		let (coordinator, store) = build(transport.clone());

		store.set(active_record("T1", Duration::minutes(15)));

		let (leader, joiner) = tokio::join!(
			tokio::time::timeout(StdDuration::from_millis(30), coordinator.request_refresh()),
			async {
				tokio::time::sleep(StdDuration::from_millis(5)).await;
				coordinator.request_refresh().await
			},
		);

		assert!(leader.is_err(), "The first caller should have timed out.");
		assert_eq!(joiner.expect("The joiner should receive the token.").expose(), "T2");
		assert_eq!(transport.calls(), 1);
		assert_eq!(coordinator.metrics().attempts(), 1);
		assert!(!coordinator.is_in_flight());
	}

	#[tokio::test]
	async fn abandoned_refreshes_are_resumed_by_the_next_caller() {
		let transport = ScriptedTransport::new(StdDuration::from_millis(50), vec![grant("T2")]);
		let (coordinator, _) = build(transport.clone());
		let abandoned =
			tokio::time::timeout(StdDuration::from_millis(10), coordinator.request_refresh()).await;

		assert!(abandoned.is_err());
		assert!(coordinator.is_in_flight());

		let token = coordinator.request_refresh().await.expect("The pending refresh should settle.");

		assert_eq!(token.expose(), "T2");
		assert_eq!(transport.calls(), 1);
		assert_eq!(coordinator.metrics().joins(), 1);
	}

	#[tokio::test]
	async fn unrepresentable_expiry_fails_the_refresh() {
		let mut distant = TokenGrant::new("T2");

		distant.expires_in_seconds = Some(1_000_000_000_000);

		let transport = ScriptedTransport::new(StdDuration::ZERO, vec![Ok(distant), grant("T3")]);
		let (coordinator, store) = build(transport.clone());

		store.set(active_record("T1", Duration::minutes(15)));

		let settled = tokio::spawn({
			let coordinator = coordinator.clone();

			async move { coordinator.request_refresh().await }
		})
		.await
		.expect("Refresh task should not panic.");

		assert!(matches!(settled, Err(Error::SessionExpired(RefreshFailure::Malformed { .. }))));
		assert!(!coordinator.is_in_flight());
		assert!(store.get().access_token.is_none());
		assert_eq!(
			coordinator.request_refresh().await.expect("The next refresh should run.").expose(),
			"T3"
		);
		assert_eq!(transport.calls(), 2);
	}

	#[tokio::test]
	async fn malformed_grants_count_as_failures() {
		let mut bad = TokenGrant::new("T2");

		bad.expires_in_seconds = Some(-5);

		let transport = ScriptedTransport::new(StdDuration::ZERO, vec![Ok(bad)]);
		let (coordinator, store) = build(transport);

		store.set(active_record("T1", Duration::minutes(15)));

		assert!(matches!(
			coordinator.request_refresh().await,
			Err(Error::SessionExpired(RefreshFailure::Malformed { .. }))
		));
		assert!(!store.is_valid());
	}
}
