//! Determinism testing utilities.
//!
//! Provides a harness for verifying that a production session
//! produces identical results given identical inputs.
//!
//! # Testing Strategy
//!
//! Production must be 100% deterministic for lockstep multiplayer.
//! Sources of non-determinism include:
//!
//! - **Floating-point math**: Different CPUs can produce different results.
//!   Timers and probabilities use [`rts_production::math::Fixed`].
//!
//! - **HashMap iteration order**: Rust's default hasher is randomized.
//!   Launchers are processed in ascending ID order.
//!
//! - **System randomness**: Prefab picks and AI rolls draw from seeded
//!   ChaCha streams.
//!
//! # Test Levels
//!
//! 1. **Unit tests**: Individual queue and upgrade behavior
//! 2. **Property tests**: Random request sequences must replay identically
//! 3. **Integration tests**: Full sessions are reproducible
//! 4. **Parallel tests**: Running N sessions in parallel all match

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::thread;

use rts_production::session::Session;
use rts_production::snapshot::SessionSnapshot;

/// Result of a determinism test.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeterminismResult {
    /// Whether all runs produced identical results.
    pub is_deterministic: bool,
    /// Hashes from each run.
    pub hashes: Vec<u64>,
    /// Number of ticks simulated.
    pub ticks: u64,
}

impl DeterminismResult {
    /// Get all unique hashes (should be 1 for a deterministic session).
    #[must_use]
    pub fn unique_hashes(&self) -> Vec<u64> {
        let mut unique: Vec<u64> = self.hashes.clone();
        unique.sort_unstable();
        unique.dedup();
        unique
    }

    /// Assert that the session was deterministic, with a detailed error message.
    ///
    /// # Panics
    ///
    /// Panics if the runs produced different hashes.
    pub fn assert_deterministic(&self) {
        if !self.is_deterministic {
            let unique = self.unique_hashes();
            panic!(
                "Session is non-deterministic!\n\
                 Runs: {}\n\
                 Ticks: {}\n\
                 Unique hashes: {} (expected 1)\n\
                 All hashes: {:?}",
                self.hashes.len(),
                self.ticks,
                unique.len(),
                self.hashes
            );
        }
    }
}

/// Result of parallel session runs.
#[derive(Debug, Clone)]
pub struct ParallelSimResult {
    /// Final state hash from each session.
    pub hashes: Vec<u64>,
    /// Number of ticks each session ran.
    pub ticks: u64,
    /// Number of sessions run.
    pub num_sims: usize,
}

impl ParallelSimResult {
    /// Check if all sessions produced identical results.
    #[must_use]
    pub fn is_deterministic(&self) -> bool {
        self.hashes.windows(2).all(|w| w[0] == w[1])
    }

    /// Assert all sessions matched.
    ///
    /// # Panics
    ///
    /// Panics if sessions produced different hashes.
    pub fn assert_deterministic(&self) {
        if !self.is_deterministic() {
            let mut unique: Vec<u64> = self.hashes.clone();
            unique.sort_unstable();
            unique.dedup();
            panic!(
                "Parallel sessions diverged!\n\
                 Sessions: {}\n\
                 Ticks: {}\n\
                 Unique hashes: {}\n\
                 All hashes: {:?}",
                self.num_sims,
                self.ticks,
                unique.len(),
                self.hashes
            );
        }
    }
}

/// Run a simulation multiple times and verify determinism.
///
/// # Arguments
///
/// * `runs` - Number of times to run the simulation
/// * `ticks` - Number of ticks to simulate per run
/// * `setup` - Function to create initial state
/// * `step` - Function to advance the state by one tick
/// * `hash` - Function to compute state hash
///
/// # Example
///
/// ```ignore
/// use rts_test_utils::determinism::{session_hash, verify_determinism};
/// use rts_test_utils::fixtures::skirmish_session;
///
/// let result = verify_determinism(
///     5,   // Run 5 times
///     100, // 100 ticks each
///     || skirmish_session(7, 3, 2),
///     |session| { session.tick(); },
///     session_hash,
/// );
/// result.assert_deterministic();
/// ```
pub fn verify_determinism<S, Setup, Step, HashFn>(
    runs: usize,
    ticks: u64,
    setup: Setup,
    step: Step,
    hash: HashFn,
) -> DeterminismResult
where
    Setup: Fn() -> S,
    Step: Fn(&mut S),
    HashFn: Fn(&S) -> u64,
{
    let mut hashes = Vec::with_capacity(runs);

    for _ in 0..runs {
        let mut state = setup();

        for _ in 0..ticks {
            step(&mut state);
        }

        hashes.push(hash(&state));
    }

    let is_deterministic = hashes.windows(2).all(|w| w[0] == w[1]);

    DeterminismResult {
        is_deterministic,
        hashes,
        ticks,
    }
}

/// State hash of a session.
///
/// # Panics
///
/// Panics if the session state cannot be serialized.
#[must_use]
pub fn session_hash(session: &Session) -> u64 {
    session
        .state_hash()
        .expect("session state serializes")
}

/// Run two identically configured sessions and compare final hashes.
pub fn verify_session_determinism<F>(setup_fn: F, num_ticks: u64) -> bool
where
    F: Fn() -> Session,
{
    let result = verify_determinism(
        2,
        num_ticks,
        &setup_fn,
        |session| {
            session.tick();
        },
        session_hash,
    );
    result.is_deterministic
}

/// Run N sessions on scoped threads and collect final hashes.
///
/// Catches non-determinism that only shows up under thread scheduling or
/// memory layout differences.
///
/// # Panics
///
/// Panics if a session thread panics.
pub fn run_parallel_sessions<F>(setup_fn: F, num_sims: usize, num_ticks: u64) -> ParallelSimResult
where
    F: Fn() -> Session + Sync,
{
    let hashes = thread::scope(|s| {
        let handles: Vec<_> = (0..num_sims)
            .map(|_| {
                s.spawn(|| {
                    let mut session = setup_fn();
                    for _ in 0..num_ticks {
                        session.tick();
                    }
                    session_hash(&session)
                })
            })
            .collect();

        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    ParallelSimResult {
        hashes,
        ticks: num_ticks,
        num_sims,
    }
}

/// Compare two session runs tick-by-tick, finding first divergence.
///
/// # Returns
///
/// `None` if the sessions stay identical, `Some(tick)` if they diverge
/// at that tick.
pub fn find_first_divergence<F>(setup_fn: F, num_ticks: u64) -> Option<u64>
where
    F: Fn() -> Session,
{
    let mut first = setup_fn();
    let mut second = setup_fn();

    if session_hash(&first) != session_hash(&second) {
        return Some(0);
    }

    for tick in 1..=num_ticks {
        first.tick();
        second.tick();

        if session_hash(&first) != session_hash(&second) {
            tracing::warn!(tick, "Sessions diverged");
            return Some(tick);
        }
    }

    None
}

/// Verify that a snapshot taken mid-run resumes exactly.
///
/// Runs `num_ticks`, encodes a snapshot, restores it into a freshly set up
/// session along with a copy of the host's ledgers, then runs both for
/// `num_ticks` more and compares hashes.
pub fn verify_snapshot_determinism<F>(setup_fn: F, num_ticks: u64) -> bool
where
    F: Fn() -> Session,
{
    let mut original = setup_fn();
    for _ in 0..num_ticks {
        original.tick();
    }

    let Ok(bytes) = original.snapshot().to_bytes() else {
        return false;
    };
    let Ok(snapshot) = SessionSnapshot::from_bytes(&bytes) else {
        return false;
    };

    let mut resumed = setup_fn();
    if resumed.restore(snapshot).is_err() {
        return false;
    }
    *resumed.host_mut() = original.host().clone();
    if session_hash(&resumed) != session_hash(&original) {
        return false;
    }

    for _ in 0..num_ticks {
        original.tick();
        resumed.tick();
    }
    session_hash(&original) == session_hash(&resumed)
}

/// Compute a simple hash for any hashable value.
pub fn compute_hash<T: Hash>(value: &T) -> u64 {
    let mut hasher = DefaultHasher::new();
    value.hash(&mut hasher);
    hasher.finish()
}

/// Proptest strategies for session operations.
///
/// These strategies generate random but reproducible request sequences for
/// property-based testing of queues and the resource ledger.
pub mod strategies {
    use proptest::prelude::*;
    use rts_production::admission::AdmissionResult;
    use rts_production::launcher::LauncherId;
    use rts_production::math::Fixed;
    use rts_production::session::Session;

    /// One scripted step against a session.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum SessionOp {
        /// Launch catalog entry `task` on the `launcher`-th launcher.
        Launch {
            /// Index into the launcher list.
            launcher: usize,
            /// Catalog index.
            task: usize,
        },
        /// Cancel queue entry `queue_index` on the `launcher`-th launcher.
        Cancel {
            /// Index into the launcher list.
            launcher: usize,
            /// Queue position.
            queue_index: usize,
        },
        /// Advance one tick.
        Tick,
    }

    impl SessionOp {
        /// Apply to a session. Launcher indices wrap around `launchers`;
        /// operations on missing launchers or tasks are ignored.
        pub fn apply(self, session: &mut Session, launchers: &[LauncherId]) -> Option<AdmissionResult> {
            if launchers.is_empty() {
                return None;
            }
            match self {
                Self::Launch { launcher, task } => {
                    session.launch(launchers[launcher % launchers.len()], task).ok()
                }
                Self::Cancel {
                    launcher,
                    queue_index,
                } => {
                    let _ = session.cancel(launchers[launcher % launchers.len()], queue_index);
                    None
                }
                Self::Tick => {
                    session.tick();
                    None
                }
            }
        }
    }

    /// Generate reload times from 0 to 20 seconds in quarter steps.
    pub fn arb_reload_time() -> impl Strategy<Value = Fixed> {
        (0i32..80i32).prop_map(|quarters| Fixed::from_num(quarters) / Fixed::from_num(4))
    }

    /// Generate resource amounts (0-200).
    pub fn arb_amount() -> impl Strategy<Value = i32> {
        0i32..200i32
    }

    /// Generate holder health values (0-500).
    pub fn arb_health() -> impl Strategy<Value = i32> {
        0i32..500i32
    }

    /// Generate one session operation over `launchers` launchers with
    /// `tasks` catalog entries each.
    pub fn arb_session_op(launchers: usize, tasks: usize) -> impl Strategy<Value = SessionOp> {
        prop_oneof![
            3 => (0..launchers, 0..tasks).prop_map(|(launcher, task)| SessionOp::Launch { launcher, task }),
            2 => (0..launchers, 0usize..5).prop_map(|(launcher, queue_index)| SessionOp::Cancel {
                launcher,
                queue_index,
            }),
            2 => Just(SessionOp::Tick),
        ]
    }

    /// Generate a sequence of session operations.
    pub fn arb_op_sequence(
        launchers: usize,
        tasks: usize,
        max_len: usize,
    ) -> impl Strategy<Value = Vec<SessionOp>> {
        proptest::collection::vec(arb_session_op(launchers, tasks), 0..max_len)
    }
}
