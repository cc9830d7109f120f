//! Per-epoch ordering of manifest indices.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::sync::{Mutex, PoisonError};

/// One unit of work: which manifest entry to process, and in which epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ticket {
    pub index: usize,
    pub epoch: u32,
}

/// Hands out every manifest index exactly once per epoch, wrapping to a fresh
/// order when an epoch runs out.
#[derive(Debug)]
pub struct EpochSequencer {
    order: Vec<usize>,
    cursor: usize,
    epoch: u32,
    shuffle: bool,
    num_epochs: Option<u32>,
    rng: StdRng,
}

impl EpochSequencer {
    pub fn new(len: usize, shuffle: bool, seed: Option<u64>, num_epochs: Option<u32>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_rng(&mut rand::rng()),
        };
        let mut sequencer = Self {
            order: (0..len).collect(),
            cursor: 0,
            epoch: 0,
            shuffle,
            num_epochs,
            rng,
        };
        sequencer.reorder();
        sequencer
    }

    /// Current epoch (0-based).
    pub fn epoch(&self) -> u32 {
        self.epoch
    }

    pub fn next_ticket(&mut self) -> Option<Ticket> {
        if self.order.is_empty() {
            return None;
        }
        if self.cursor == self.order.len() {
            if self.num_epochs.is_some_and(|n| self.epoch + 1 >= n) {
                return None;
            }
            self.epoch += 1;
            self.cursor = 0;
            self.reorder();
        }
        let ticket = Ticket {
            index: self.order[self.cursor],
            epoch: self.epoch,
        };
        self.cursor += 1;
        Some(ticket)
    }

    fn reorder(&mut self) {
        if self.shuffle {
            self.order.shuffle(&mut self.rng);
        }
    }
}

/// Thread-safe wrapper: concurrent pullers never receive the same ticket.
#[derive(Debug)]
pub struct SharedSequencer {
    inner: Mutex<EpochSequencer>,
}

impl SharedSequencer {
    pub fn new(sequencer: EpochSequencer) -> Self {
        Self {
            inner: Mutex::new(sequencer),
        }
    }

    pub fn pull(&self) -> Option<Ticket> {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .next_ticket()
    }
}
