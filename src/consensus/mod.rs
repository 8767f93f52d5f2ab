//! Consensus module - block admission, proof-of-work, and difficulty
//! retargeting

mod block;
mod chain;
mod difficulty;

pub use block::*;
pub use chain::*;
pub use difficulty::*;
