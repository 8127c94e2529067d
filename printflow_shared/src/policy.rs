//! # Scheduling policy
//!
//! The dispatcher picks its policy from the shape of the pending queue alone:
//!
//! | queue length            | mean remaining pages | policy |
//! |-------------------------|----------------------|--------|
//! | `<= fcfs_max_queue_len` | any                  | FCFS   |
//! | `> fcfs_max_queue_len`  | `<= srtf_max_mean`   | SRTF   |
//! | `> fcfs_max_queue_len`  | `> srtf_max_mean`    | SJF    |
//!
//! SJF and SRTF dequeue the same way (fewest remaining pages, earliest position
//! on ties); only SRTF preempts running printers.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Policy {
    #[default]
    Fcfs,
    Sjf,
    Srtf,
}

impl Policy {
    pub fn is_preemptive(self) -> bool {
        matches!(self, Policy::Srtf)
    }

    /// Index of the job to dequeue, given the remaining pages of each pending job in queue order.
    pub fn pick_next<I>(self, remaining: I) -> Option<usize>
    where
        I: IntoIterator<Item = u32>,
    {
        let mut remaining = remaining.into_iter();
        match self {
            Policy::Fcfs => remaining.next().map(|_| 0),
            // min_by_key keeps the first of equal minima, so ties go to the earliest position.
            Policy::Sjf | Policy::Srtf => remaining
                .enumerate()
                .min_by_key(|&(_, pages)| pages)
                .map(|(index, _)| index),
        }
    }
}

impl fmt::Display for Policy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Policy::Fcfs => "FCFS",
            Policy::Sjf => "SJF",
            Policy::Srtf => "SRTF",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyThresholds {
    /// Queues up to this length are always served first-come-first-served.
    pub fcfs_max_queue_len: usize,
    /// Longer queues use SRTF while the mean remaining page count stays at or below this.
    pub srtf_max_mean_remaining: f64,
}

impl Default for PolicyThresholds {
    fn default() -> Self {
        Self {
            fcfs_max_queue_len: 3,
            srtf_max_mean_remaining: 20.0,
        }
    }
}

impl PolicyThresholds {
    pub fn select<I>(&self, remaining: I) -> Policy
    where
        I: IntoIterator<Item = u32>,
    {
        let (count, total) = remaining
            .into_iter()
            .fold((0usize, 0u64), |(count, total), pages| (count + 1, total + pages as u64));
        if count == 0 || count <= self.fcfs_max_queue_len {
            return Policy::Fcfs;
        }
        let mean = total as f64 / count as f64;
        if mean <= self.srtf_max_mean_remaining {
            Policy::Srtf
        } else {
            Policy::Sjf
        }
    }
}
