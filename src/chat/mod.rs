pub mod analyzer;
pub mod backend;
pub mod heuristic;
