//
// bimodalcp is free software: you can redistribute it and/or modify
// it under the terms of the GNU Lesser General Public License  v3
// as published by the Free Software Foundation.
//
// bimodalcp is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY.
// See the GNU Lesser General Public License  for more details.
//
// You should have received a copy of the GNU Lesser General Public License
// along with bimodalcp. If not, see http://www.gnu.org/licenses/lgpl-3.0.en.html
//
// Copyright (c)  2024 by the bimodalcp authors
//

//! This crate implements a small trail-based constraint programming engine
//! whose centerpiece is a domain consistent (GAC) filtering of the
//! alldifferent constraint. The filtering repairs a bipartite maximum
//! matching with BFS augmenting paths and prunes variable-value pairs
//! crossing the strongly connected components of the residual graph
//! (Tarjan). Both traversals pick, per variable, between iterating the
//! variable domain and iterating the list of not-yet-visited values,
//! whichever is expected to be cheaper; hence the "bimodal" name.
//!
//! The engine itself follows the usual layering of a CP solver:
//!
//! * the `state` module provides the trailed state manager, which is the
//!   backtrack environment every reversible resource registers with,
//! * the `engine` module provides the variables (domains), the propagators
//!   abstraction and the propagation fixpoint,
//! * the `constraints` module provides the alldifferent constraint.

pub mod constraints;
mod engine;
mod state;

pub use engine::*;
pub use state::*;

/// The prelude re-exports the complete public api of the crate. It is only
/// meant as a convenience for the client code (and for the tests).
pub mod prelude {
    pub use crate::constraints::*;
    pub use crate::engine::*;
    pub use crate::state::*;
}
