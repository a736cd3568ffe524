//! Append-only trade history.
//!
//! [`TradeLedger`] stores ticks in fixed-size chunks. Once a chunk fills up it
//! is sealed into an immutable `Arc<[Tick]>`, so a [`LedgerSnapshot`] only
//! has to clone the sealed chunk pointers and copy the (short) active chunk.
//! Readers never hold the lock while iterating and never see a half-written
//! tick; the writer keeps appending while snapshots are alive.
//!
//! Ticks are kept in arrival order. Out-of-order timestamps are appended as
//! received, never resorted.

use std::collections::VecDeque;
use std::sync::{Arc, PoisonError, RwLock};

use crate::types::Tick;

/// Default number of ticks per sealed chunk.
const DEFAULT_CHUNK_LEN: usize = 1024;

struct Inner {
    sealed: VecDeque<Arc<[Tick]>>,
    active: Vec<Tick>,
    sealed_len: usize,
    appended: u64,
}

/// Ordered, append-only sequence of [`Tick`]s.
///
/// Shared between the feed (single writer) and any number of readers via
/// `Arc<TradeLedger>`.
pub struct TradeLedger {
    inner: RwLock<Inner>,
    chunk_len: usize,
    retention: Option<usize>,
}

impl TradeLedger {
    /// Create an empty ledger with unbounded retention.
    pub fn new() -> Self {
        Self::with_chunk_len(DEFAULT_CHUNK_LEN, None)
    }

    /// Create an empty ledger that keeps at least `max_ticks` of the most
    /// recent ticks. Older sealed chunks are released once a whole chunk
    /// falls outside the limit. Existing snapshots are unaffected.
    pub fn with_retention(max_ticks: usize) -> Self {
        Self::with_chunk_len(DEFAULT_CHUNK_LEN, Some(max_ticks))
    }

    fn with_chunk_len(chunk_len: usize, retention: Option<usize>) -> Self {
        let chunk_len = chunk_len.max(1);
        Self {
            inner: RwLock::new(Inner {
                sealed: VecDeque::new(),
                active: Vec::with_capacity(chunk_len),
                sealed_len: 0,
                appended: 0,
            }),
            chunk_len,
            retention,
        }
    }

    /// Append a tick. Fields are validated by the decoder before they get here.
    pub fn append(&self, tick: Tick) {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        inner.active.push(tick);
        inner.appended += 1;

        if inner.active.len() >= self.chunk_len {
            let full = std::mem::replace(&mut inner.active, Vec::with_capacity(self.chunk_len));
            inner.sealed_len += full.len();
            inner.sealed.push_back(full.into());

            if let Some(max) = self.retention {
                while let Some(front_len) = inner.sealed.front().map(|c| c.len()) {
                    if inner.sealed_len - front_len < max {
                        break;
                    }
                    inner.sealed_len -= front_len;
                    inner.sealed.pop_front();
                }
            }
        }
    }

    /// Number of ticks currently retained.
    pub fn len(&self) -> usize {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        inner.sealed_len + inner.active.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Total number of ticks ever appended, including released ones.
    pub fn total_appended(&self) -> u64 {
        self.inner.read().unwrap_or_else(PoisonError::into_inner).appended
    }

    /// Take a consistent view of every retained tick in append order.
    pub fn snapshot(&self) -> LedgerSnapshot {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        LedgerSnapshot {
            sealed: inner.sealed.iter().cloned().collect(),
            tail: inner.active.as_slice().into(),
        }
    }

    /// Mean of the last `window` prices, or NaN if fewer are available.
    pub fn rolling_average(&self, window: usize) -> f64 {
        rolling_average(&self.snapshot().last_prices(window), window)
    }
}

impl Default for TradeLedger {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time view of a [`TradeLedger`].
///
/// Cheap to clone and restartable: every call to [`iter`](Self::iter) walks
/// the same ticks from the beginning.
#[derive(Clone)]
pub struct LedgerSnapshot {
    sealed: Vec<Arc<[Tick]>>,
    tail: Arc<[Tick]>,
}

impl LedgerSnapshot {
    pub fn len(&self) -> usize {
        self.sealed.iter().map(|c| c.len()).sum::<usize>() + self.tail.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Lazily iterate ticks in append order.
    pub fn iter(&self) -> impl Iterator<Item = &Tick> + '_ {
        self.sealed.iter().flat_map(|c| c.iter()).chain(self.tail.iter())
    }

    /// Prices of the last `n` ticks (fewer if the snapshot is shorter), oldest first.
    pub fn last_prices(&self, n: usize) -> Vec<f64> {
        let skip = self.len().saturating_sub(n);
        self.iter().skip(skip).map(|t| t.price).collect()
    }
}

impl<'a> IntoIterator for &'a LedgerSnapshot {
    type Item = &'a Tick;
    type IntoIter = Box<dyn Iterator<Item = &'a Tick> + 'a>;

    fn into_iter(self) -> Self::IntoIter {
        Box::new(self.iter())
    }
}

/// Arithmetic mean of the last `window` values of `prices`.
///
/// Returns NaN when `window` is zero or fewer than `window` values exist.
pub fn rolling_average(prices: &[f64], window: usize) -> f64 {
    if window == 0 || prices.len() < window {
        return f64::NAN;
    }
    prices[prices.len() - window..].iter().sum::<f64>() / window as f64
}
