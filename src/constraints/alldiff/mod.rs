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

//! This module provides the alldifferent constraint: all the variables it
//! bears on must take pairwise distinct values.
//!
//! Posting the constraint installs two propagators:
//!
//! * [`AllDiffInstantiated`], a lightweight pass that removes the value of
//!   every instantiated variable from the domains of the others. It reacts
//!   to instantiations only, and lets an instantiation propagate without a
//!   full matching repair and SCC computation;
//! * [`AllDiffBimodal`], the domain consistent filtering based on maximum
//!   matching and SCC pruning, with the classic/complemented iteration
//!   choice driven by a [`Mode`].
//!
//! A solver front end letting its users pick the mode on the command line
//! would typically parse the `AC_*` names below with [`Mode::from_str`].

use std::str::FromStr;

use crate::{
    CPResult, CpModel, DomainCondition, ModelingConstruct, PropagationContext, Propagator,
    Variable,
};

mod matching;
mod propagator;

pub use matching::BipartiteMatching;
pub use propagator::AllDiffBimodal;

/// How the filtering chooses, for each variable, between iterating the
/// variable domain (classic) and iterating the list of unvisited values
/// (complemented).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mode {
    /// always iterate the domain
    Classic,
    /// always iterate the unvisited values
    Complement,
    /// iterate the domain iff it is smaller than the unvisited list
    Partial,
    /// like `Partial`, except that the DFS compares the domain size with
    /// the square root of the unvisited count: a DFS step amortizes
    /// differently than a BFS or a prune step because of the track-left
    /// resumption
    Tuned,
}

impl Mode {
    /// mode string selecting [`Mode::Classic`]
    pub const CLASSIC: &'static str = "AC_CLASSIC";
    /// mode string selecting [`Mode::Complement`]
    pub const COMPLEMENT: &'static str = "AC_COMPLEMENT";
    /// mode string selecting [`Mode::Partial`]
    pub const PARTIAL: &'static str = "AC_PARTIAL";
    /// mode string selecting [`Mode::Tuned`]
    pub const TUNED: &'static str = "AC_TUNED";

    /// True iff the BFS of the matching repair should iterate the domain of
    /// a variable with `domain_size` values, given the current number of
    /// unvisited values.
    pub(crate) fn choice_bfs(self, domain_size: usize, unvisited: usize) -> bool {
        match self {
            Mode::Classic => true,
            Mode::Complement => false,
            Mode::Partial | Mode::Tuned => domain_size < unvisited,
        }
    }

    /// True iff the DFS of the SCC computation should iterate the domain.
    pub(crate) fn choice_dfs(self, domain_size: usize, unvisited: usize) -> bool {
        match self {
            Mode::Classic => true,
            Mode::Complement => false,
            Mode::Partial => domain_size < unvisited,
            // domain_size < sqrt(unvisited), kept in integer arithmetic
            Mode::Tuned => domain_size.saturating_mul(domain_size) < unvisited,
        }
    }

    /// True iff the pruning should iterate the domain, given the number of
    /// values outside the discovered SCC.
    pub(crate) fn choice_prune(self, domain_size: usize, complement: usize) -> bool {
        match self {
            Mode::Classic => true,
            Mode::Complement => false,
            Mode::Partial | Mode::Tuned => domain_size < complement,
        }
    }
}

/// The error raised when parsing an unknown alldifferent mode string
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
#[error("unknown alldifferent mode: {0}")]
pub struct UnknownMode(String);

impl FromStr for Mode {
    type Err = UnknownMode;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            Self::CLASSIC => Ok(Mode::Classic),
            Self::COMPLEMENT => Ok(Mode::Complement),
            Self::PARTIAL => Ok(Mode::Partial),
            Self::TUNED => Ok(Mode::Tuned),
            other => Err(UnknownMode(other.to_string())),
        }
    }
}

/// This propagator removes the value of every instantiated variable from
/// the domains of all the other variables of an alldifferent constraint.
/// It implements no consistency beyond that: the heavy lifting belongs to
/// [`AllDiffBimodal`], which subsumes this filtering. Running the cheap
/// pass first simply spares a matching repair and an SCC computation for
/// the common case where search instantiated a variable whose value only
/// needs forwarding to the other domains.
#[derive(Debug, Clone)]
pub struct AllDiffInstantiated {
    vars: Vec<Variable>,
}
impl AllDiffInstantiated {
    /// creates the propagator for the given variables
    pub fn new(vars: Vec<Variable>) -> Self {
        Self { vars }
    }
}
impl Propagator for AllDiffInstantiated {
    fn propagate(&mut self, cx: &mut dyn PropagationContext) -> CPResult<()> {
        for i in 0..self.vars.len() {
            let x = self.vars[i];
            if let Some(value) = cx.fixed_value(x) {
                for (j, y) in self.vars.iter().copied().enumerate() {
                    if j != i {
                        cx.remove(y, value)?;
                    }
                }
            }
        }
        Ok(())
    }
}

/// The alldifferent modeling construct. Installing it posts the
/// instantiation propagator and the bimodal GAC filtering on the given
/// variables.
#[derive(Debug, Clone)]
pub struct AllDifferent {
    /// All these variables must take different values in the solution
    vars: Vec<Variable>,
    /// The iteration mode applied by the GAC filtering
    mode: Mode,
}
impl AllDifferent {
    /// creates a new constraint with the given filtering mode
    pub fn new(vars: Vec<Variable>, mode: Mode) -> Self {
        Self { vars, mode }
    }
}
impl ModelingConstruct for AllDifferent {
    fn install(&self, cp: &mut dyn CpModel) {
        let instantiated = AllDiffInstantiated::new(self.vars.clone());
        let instantiated = cp.post(Box::new(instantiated));

        let bimodal = AllDiffBimodal::new(cp, &self.vars, self.mode);
        let bimodal = cp.post(Box::new(bimodal));

        cp.schedule(instantiated);
        cp.schedule(bimodal);
        for x in self.vars.iter().copied() {
            cp.propagate_on(instantiated, DomainCondition::IsFixed(x));
            cp.propagate_on(bimodal, DomainCondition::DomainChanged(x));
        }
    }
}

// #############################################################################
// ### UNIT TESTS ##############################################################
// #############################################################################

#[cfg(test)]
mod test_mode {
    use super::*;

    #[test]
    fn the_public_names_parse_to_the_modes() {
        assert_eq!("AC_CLASSIC".parse(), Ok(Mode::Classic));
        assert_eq!("AC_COMPLEMENT".parse(), Ok(Mode::Complement));
        assert_eq!("AC_PARTIAL".parse(), Ok(Mode::Partial));
        assert_eq!("AC_TUNED".parse(), Ok(Mode::Tuned));

        assert!("AC_ZHANG".parse::<Mode>().is_err());
        assert!("".parse::<Mode>().is_err());
    }

    #[test]
    fn tuned_uses_a_square_root_threshold_for_the_dfs() {
        // 3 * 3 < 10 : iterate the domain
        assert!(Mode::Tuned.choice_dfs(3, 10));
        // 4 * 4 >= 10 : iterate the unvisited values
        assert!(!Mode::Tuned.choice_dfs(4, 10));
        // the bfs and prune choices stay linear
        assert!(Mode::Tuned.choice_bfs(9, 10));
        assert!(Mode::Tuned.choice_prune(9, 10));
    }
}
