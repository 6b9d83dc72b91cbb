//! Priority lanes of the fast-path queue.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Lane {
    High,
    Low,
}

impl Lane {
    /// Drain order: high always before low.
    pub const ALL: [Lane; 2] = [Lane::High, Lane::Low];

    pub fn for_priority(priority: i32, high_priority_threshold: i32) -> Self {
        if priority >= high_priority_threshold {
            Lane::High
        } else {
            Lane::Low
        }
    }

    /// Queue key in the ephemeral store.
    pub fn key(self) -> &'static str {
        match self {
            Lane::High => "queue:high",
            Lane::Low => "queue:low",
        }
    }
}

impl fmt::Display for Lane {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Lane::High => write!(f, "high"),
            Lane::Low => write!(f, "low"),
        }
    }
}
