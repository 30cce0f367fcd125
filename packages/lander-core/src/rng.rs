//! rng.rs — concurrent PRNG: one central engine, per-thread refill buffers
//!
//! GA operators and randomizers can run from any thread, but a single engine
//! behind a mutex would serialise them on every draw. Instead each thread
//! keeps a refill buffer of raw words per facade: on an empty buffer the
//! thread takes one short lock, draws the word it returns, and refills the
//! whole buffer from the same engine. Buffers die with their thread; a
//! dropped facade unregisters its id so stale buffers are pruned on the next
//! refill.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};

/// Refill granularity of a runner-grade facade.
pub const RUNNER_BUFFER_WORDS: usize = 64;
/// Refill granularity of a trainer-grade facade (operators draw per gene,
/// so the trainer burns words much faster).
pub const TRAINER_BUFFER_WORDS: usize = 4096;

static NEXT_FACADE_ID: AtomicU64 = AtomicU64::new(1);
static LIVE_FACADES: Mutex<Option<HashSet<u64>>> = Mutex::new(None);

thread_local! {
    static BUFFERS: RefCell<HashMap<u64, Vec<u64>>> = RefCell::new(HashMap::new());
}

fn live_facades<R>(f: impl FnOnce(&mut HashSet<u64>) -> R) -> R {
    let mut guard = LIVE_FACADES.lock().unwrap_or_else(PoisonError::into_inner);
    f(guard.get_or_insert_with(HashSet::new))
}

pub struct ConcurrentRng {
    id: u64,
    buffer_words: usize,
    core: Mutex<StdRng>,
}

impl ConcurrentRng {
    pub fn new(engine: StdRng, buffer_words: usize) -> Self {
        let id = NEXT_FACADE_ID.fetch_add(1, Ordering::Relaxed);
        live_facades(|live| live.insert(id));
        Self { id, buffer_words, core: Mutex::new(engine) }
    }

    fn next_word(&self) -> u64 {
        BUFFERS.with(|buffers| {
            let mut map = buffers.borrow_mut();
            if let Some(word) = map.get_mut(&self.id).and_then(Vec::pop) {
                return word;
            }
            // Buffer empty: one short lock draws the returned word and the
            // whole refill. Prune buffers of facades that died meanwhile.
            live_facades(|live| map.retain(|id, _| live.contains(id)));
            let buf = map.entry(self.id).or_default();
            let mut engine = self.core.lock().unwrap_or_else(PoisonError::into_inner);
            let first = engine.next_u64();
            buf.reserve(self.buffer_words);
            for _ in 0..self.buffer_words {
                buf.push(engine.next_u64());
            }
            first
        })
    }
}

impl Drop for ConcurrentRng {
    fn drop(&mut self) {
        live_facades(|live| live.remove(&self.id));
        // The dropping thread can clean up eagerly; other threads prune on
        // their next refill. try_with: TLS may already be gone at thread exit.
        let _ = BUFFERS.try_with(|buffers| {
            buffers.borrow_mut().remove(&self.id);
        });
    }
}

// ── Cloneable handle ──────────────────────────────────────────────────────────

/// Cheap-to-clone handle over a [`ConcurrentRng`]; implements [`RngCore`] so
/// `rand_distr` distributions sample straight through it.
#[derive(Clone)]
pub struct SharedRng(Arc<ConcurrentRng>);

impl SharedRng {
    pub fn new(engine: StdRng, buffer_words: usize) -> Self {
        Self(Arc::new(ConcurrentRng::new(engine, buffer_words)))
    }

    pub fn trainer_grade(engine: StdRng) -> Self {
        Self::new(engine, TRAINER_BUFFER_WORDS)
    }

    pub fn runner_grade(engine: StdRng) -> Self {
        Self::new(engine, RUNNER_BUFFER_WORDS)
    }

    /// Deterministic facade for tests and replays.
    pub fn seeded(seed: u64, buffer_words: usize) -> Self {
        Self::new(StdRng::seed_from_u64(seed), buffer_words)
    }
}

impl RngCore for SharedRng {
    fn next_u32(&mut self) -> u32 {
        self.0.next_word() as u32
    }

    fn next_u64(&mut self) -> u64 {
        self.0.next_word()
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        let mut chunks = dest.chunks_exact_mut(8);
        for chunk in &mut chunks {
            chunk.copy_from_slice(&self.0.next_word().to_le_bytes());
        }
        let rem = chunks.into_remainder();
        if !rem.is_empty() {
            let word = self.0.next_word().to_le_bytes();
            let len = rem.len();
            rem.copy_from_slice(&word[..len]);
        }
    }

    fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), rand::Error> {
        self.fill_bytes(dest);
        Ok(())
    }
}
