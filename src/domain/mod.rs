// Core model: parsing the three listings, classifying, traversing, replaying.

pub mod callgraph;
pub mod location;
pub mod replay;
pub mod steps;
pub mod symbol_table;
pub mod trace;
pub mod traversal;
