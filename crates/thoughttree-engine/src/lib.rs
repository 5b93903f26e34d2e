//! Heuristic tree search for iterative LLM reasoning.
//!
//! A thought tree is grown one frontier node at a time: each round drafts,
//! critiques, refines and sample-scores up to K candidate steps, then
//! backpropagates an exponential-decay blend of the best child and advances
//! along the UCT-maximal branch until a terminal reason fires.

pub mod prompts;
pub mod score;
pub mod search;
pub mod tree;

pub use search::{SearchEngine, SearchSnapshot};
pub use tree::{NodeId, TerminalReason, ThoughtNode, ThoughtTree};
