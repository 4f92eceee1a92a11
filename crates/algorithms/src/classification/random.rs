//! Deterministic random streams for sampling and centroid seeding.
//!
//! Both generators are 48-bit linear congruential generators sharing the
//! recurrence `state = (state * 0x5DEECE66D + 0xB) mod 2^48` and returning
//! the high bits of the new state. They differ only in how the seed becomes
//! the initial state:
//!
//! - [`Generator::Rand48`]: POSIX `srand48` seeding. The two 32-bit halves
//!   of the seed are XOR-folded first, so any seed below 2^32 reproduces
//!   the C library stream exactly.
//! - [`Generator::Java`]: the seed scrambling of `java.util.Random`
//!   (`(seed ^ 0x5DEECE66D) & (2^48 - 1)`), so streams match that runtime's
//!   `next`/`nextInt(bound)` output.
//!
//! A stream is owned by one classification run and only advanced from the
//! calling thread; the draw order is part of the reproducibility contract.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use terraclass_core::{Error, Result};

const MULTIPLIER: u64 = 0x5_DEEC_E66D;
const INCREMENT: u64 = 0xB;
const MASK: u64 = (1 << 48) - 1;
const RAND48_LOW: u64 = 0x330E;

/// Seeding strategy of a [`RandomStream`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Generator {
    /// POSIX `drand48` family
    #[default]
    Rand48,
    /// `java.util.Random`
    Java,
}

impl Generator {
    /// Human-readable name
    pub fn name(&self) -> &'static str {
        match self {
            Generator::Rand48 => "rand48",
            Generator::Java => "java",
        }
    }
}

/// Seeded 48-bit LCG stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RandomStream {
    state: u64,
}

impl RandomStream {
    /// Seed a new stream
    pub fn new(generator: Generator, seed: u64) -> Self {
        let state = match generator {
            Generator::Rand48 => {
                let folded = (seed ^ (seed >> 32)) & 0xFFFF_FFFF;
                (folded << 16) | RAND48_LOW
            }
            Generator::Java => (seed ^ MULTIPLIER) & MASK,
        };
        Self { state }
    }

    /// Advance the state and return its top `bits` bits (1..=48)
    pub fn next_bits(&mut self, bits: u32) -> u64 {
        debug_assert!((1..=48).contains(&bits));
        self.state = self
            .state
            .wrapping_mul(MULTIPLIER)
            .wrapping_add(INCREMENT)
            & MASK;
        self.state >> (48 - bits)
    }

    /// Uniform double in [0, 1) with 53 bits of precision
    pub fn next_f64(&mut self) -> f64 {
        let hi = self.next_bits(26);
        let lo = self.next_bits(27);
        ((hi << 27) + lo) as f64 / (1u64 << 53) as f64
    }

    /// Uniform integer in `[0, bound)`.
    ///
    /// Power-of-two bounds take the high bits of one draw; other bounds use
    /// rejection sampling so every value is equally likely.
    pub fn uniform_index(&mut self, bound: usize) -> Result<usize> {
        if bound == 0 {
            return Err(Error::invalid_parameter(
                "bound",
                bound,
                "random index bound must be positive",
            ));
        }
        Ok(self.index_below(bound as u64) as usize)
    }

    fn index_below(&mut self, bound: u64) -> u64 {
        const BITS31: u64 = 1 << 31;
        const BITS62: u64 = 1 << 62;

        if bound < BITS31 {
            if bound.is_power_of_two() {
                return (bound * self.next_bits(31)) >> 31;
            }
            loop {
                let bits = self.next_bits(31);
                let value = bits % bound;
                if bits - value + (bound - 1) < BITS31 {
                    return value;
                }
            }
        }

        if bound <= BITS62 {
            loop {
                let bits = (self.next_bits(31) << 31) | self.next_bits(31);
                let value = bits % bound;
                if bits - value + (bound - 1) < BITS62 {
                    return value;
                }
            }
        }

        // 62 bits cannot cover the bound; draw 64 and drop the 2^64 mod bound
        // lowest values so the rest split evenly into residues.
        let reject_below = bound.wrapping_neg() % bound;
        loop {
            let bits = (self.next_bits(32) << 32) | self.next_bits(32);
            if bits >= reject_below {
                return bits % bound;
            }
        }
    }

    /// Lazily shuffled indices of `0..population` (partial Fisher-Yates).
    ///
    /// Every `next()` consumes exactly one bounded draw, and only displaced
    /// positions are stored, so taking k items costs O(k) memory.
    pub fn shuffled_indices(&mut self, population: usize) -> ShuffledIndices<'_> {
        ShuffledIndices {
            stream: self,
            population,
            position: 0,
            displaced: HashMap::new(),
        }
    }

    /// `k` distinct indices drawn uniformly from `0..population`, in draw order
    pub fn sample_without_replacement(&mut self, population: usize, k: usize) -> Result<Vec<usize>> {
        if k > population {
            return Err(Error::InsufficientSamples {
                required: k,
                available: population,
            });
        }
        Ok(self.shuffled_indices(population).take(k).collect())
    }
}

/// Iterator returned by [`RandomStream::shuffled_indices`]
#[derive(Debug)]
pub struct ShuffledIndices<'a> {
    stream: &'a mut RandomStream,
    population: usize,
    position: usize,
    displaced: HashMap<usize, usize>,
}

impl Iterator for ShuffledIndices<'_> {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        let i = self.position;
        if i >= self.population {
            return None;
        }
        self.position += 1;

        let j = i + self.stream.index_below((self.population - i) as u64) as usize;
        let at_i = self.displaced.remove(&i).unwrap_or(i);
        if j == i {
            return Some(at_i);
        }
        let at_j = self.displaced.insert(j, at_i).unwrap_or(j);
        Some(at_j)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.population - self.position;
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for ShuffledIndices<'_> {}
