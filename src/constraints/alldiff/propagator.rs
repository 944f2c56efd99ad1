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

//! This module provides the domain consistent (GAC) filtering of the
//! alldifferent constraint.
//!
//! The filtering is a variant of the classic algorithm of Regin ("A
//! filtering algorithm for constraints of difference in CSPs", AAAI-94)
//! based on the partially complemented residual graph representation:
//!
//! 1. a maximum matching between the variables and their domain values is
//!    maintained incrementally, and repaired with BFS augmenting paths when
//!    domains change. When some variable cannot be matched, the constraint
//!    is infeasible;
//! 2. the strongly connected components of the residual graph (matched
//!    edges from value to variable, domain edges from variable to value,
//!    plus an artificial sink adjacent to the unmatched values) are computed
//!    with a Tarjan DFS. Every variable-value edge whose endpoints lie in
//!    two different components can belong to no maximum matching and is
//!    pruned.
//!
//! Both traversals are *bimodal*: for each variable they either iterate the
//! domain of the variable (classic mode) or the list of the values not yet
//! visited by the traversal (complemented mode), whichever the configured
//! [`Mode`](super::Mode) deems cheaper. The list of unvisited values is a
//! tracking list, whose `track_left` primitive lets the complemented DFS
//! resume in the middle of the list after a recursive call consumed an
//! arbitrary chunk of it.
//!
//! The procedure is incremental along the search tree: instantiated
//! variables and the values that no domain can reach anymore are removed
//! from the *universes* of the tracking lists at the end of a propagation,
//! and those removals are recorded on the trail so that backtracking
//! restores the lists exactly as they were.

use crate::{CPResult, Inconsistency, PropagationContext, Propagator, ReversibleTrackingList, Variable};

use super::{BipartiteMatching, Mode};

/// The stateful part of the alldifferent filtering. One instance is owned by
/// each posted alldifferent constraint and lives for as long as the
/// constraint does.
pub struct AllDiffBimodal {
    /// the variables that must take pairwise distinct values
    vars: Vec<Variable>,
    /// smallest value of any domain at construction time
    min_value: isize,
    /// largest value of any domain at construction time
    max_value: isize,
    /// the dynamic list of the uninstantiated variables (universe [0, R-1])
    variables_dynamic: ReversibleTrackingList,
    /// the dynamic list of the values reachable from the domain of at least
    /// one variable; during a traversal its in-list is the set of values not
    /// visited yet
    values_dynamic: ReversibleTrackingList,
    /// the list used to materialize "the values outside the current SCC"
    /// during the pruning step
    complement_scc: ReversibleTrackingList,
    /// the matching, repaired incrementally at each propagation
    matching: BipartiteMatching,

    /// parent of each value node in the BFS tree of the matching repair
    parent_bfs: Vec<isize>,
    /// the FIFO queue of the variables to explore during the BFS
    queue_bfs: Vec<isize>,
    head_bfs: usize,
    tail_bfs: usize,

    /// the artificial sink node of the residual graph
    t_node: isize,
    /// the stack used by Tarjan's algorithm, over value nodes
    tarjan_stack: Vec<isize>,
    top_tarjan: usize,
    /// presence of each value in the Tarjan stack
    in_stack: Vec<bool>,
    /// previsit order of the values
    pre: Vec<usize>,
    /// low point of the values
    low: Vec<usize>,
    /// current visit number of the DFS
    num_visit: usize,
    /// true until the first SCC of the current propagation got discovered
    first_scc: bool,

    /// how to choose between classic and complemented iteration
    mode: Mode,
    /// true iff some variable-value pair was pruned by the current call
    pruned: bool,
}

impl AllDiffBimodal {
    /// Creates the filtering state for the given variables. The tracking
    /// lists are registered with the state manager behind the propagation
    /// context, and the universes of the value lists are refined right away
    /// to exclude the values no domain contains.
    pub fn new<C: PropagationContext + ?Sized>(cx: &mut C, vars: &[Variable], mode: Mode) -> Self {
        assert!(!vars.is_empty(), "alldifferent needs at least one variable");
        let n_vars = vars.len();

        let mut min_value = isize::MAX;
        let mut max_value = isize::MIN;
        for x in vars.iter().copied() {
            min_value = min_value.min(cx.min(x).unwrap_or(isize::MAX));
            max_value = max_value.max(cx.max(x).unwrap_or(isize::MIN));
        }
        let n_values = (max_value - min_value + 1) as usize;

        let variables_dynamic = cx.manage_tracking_list(0, n_vars as isize - 1);
        let values_dynamic = cx.manage_tracking_list(min_value, max_value);
        let complement_scc = cx.manage_tracking_list(min_value, max_value);
        Self::refine_universe(cx, values_dynamic, vars, min_value, max_value);
        Self::refine_universe(cx, complement_scc, vars, min_value, max_value);

        Self {
            vars: vars.to_vec(),
            min_value,
            max_value,
            variables_dynamic,
            values_dynamic,
            complement_scc,
            matching: BipartiteMatching::new(0, n_vars as isize - 1, min_value, max_value),
            //
            parent_bfs: vec![0; n_values],
            queue_bfs: vec![0; n_vars],
            head_bfs: 0,
            tail_bfs: 0,
            //
            t_node: min_value - 1,
            tarjan_stack: vec![0; n_values],
            top_tarjan: 0,
            in_stack: vec![false; n_values],
            pre: vec![0; n_values],
            low: vec![0; n_values],
            num_visit: 0,
            first_scc: true,
            //
            mode,
            pruned: false,
        }
    }

    /// The value universes initially are plain intervals: remove from them
    /// every value which is contained in no variable's domain (the domains
    /// themselves may contain holes).
    fn refine_universe<C: PropagationContext + ?Sized>(
        cx: &mut C,
        universe: ReversibleTrackingList,
        vars: &[Variable],
        min_value: isize,
        max_value: isize,
    ) {
        for value in min_value..=max_value {
            let reachable = vars.iter().copied().any(|x| cx.contains(x, value));
            if !reachable {
                cx.tracking_list_remove_from_universe(universe, value);
            }
        }
    }

    /// Runs one full propagation: synchronize the dynamic structures, repair
    /// the matching, filter the domains, shrink the universes. Returns true
    /// iff at least one value was pruned from some domain, and an
    /// [`Inconsistency`] when the constraint cannot be satisfied.
    pub fn propagate<C: PropagationContext + ?Sized>(&mut self, cx: &mut C) -> CPResult<bool> {
        self.pruned = false;

        self.update_structures_opening(cx);

        if !self.find_maximum_matching(cx) {
            log::trace!("alldifferent: no maximum matching, raising a contradiction");
            return Err(Inconsistency);
        }

        self.filter(cx)?;
        self.update_structures_ending(cx);

        Ok(self.pruned)
    }

    fn val_idx(&self, value: isize) -> usize {
        (value - self.min_value) as usize
    }

    //**************************************************************************
    // DYNAMIC STRUCTURES SYNCHRONIZATION
    //**************************************************************************

    /// Re-aligns the matching with the current domains: an instantiated
    /// variable gets (re)matched with its fixed value, and a variable whose
    /// matched value left its domain gets unmatched. The universes only
    /// shrink at closing, so that they shrink once per successful call.
    fn update_structures_opening<C: PropagationContext + ?Sized>(&mut self, cx: &mut C) {
        let vd = self.variables_dynamic;
        let mut var = cx.tracking_list_get_source(vd);
        while cx.tracking_list_has_next(vd, var) {
            var = cx.tracking_list_get_next(vd, var);
            let x = self.vars[var as usize];
            if cx.is_fixed(x) {
                // the set_match below requires both endpoints to be free
                let value = cx.min(x).unwrap();
                if self.matching.in_matching_u(var) {
                    self.matching.un_match(var, self.matching.match_u(var));
                }
                if self.matching.in_matching_v(value) {
                    self.matching.un_match(self.matching.match_v(value), value);
                }
                self.matching.set_match(var, value);
            } else if self.matching.in_matching_u(var)
                && !cx.contains(x, self.matching.match_u(var))
            {
                self.matching.un_match(var, self.matching.match_u(var));
            }
        }
    }

    /// After the domains got filtered, the values still unvisited are
    /// reachable from no domain and the freshly instantiated variables need
    /// not be considered ever again below this node of the search tree: all
    /// of them leave the universes, through the trailed removal so that
    /// backtracking puts them back.
    fn update_structures_ending<C: PropagationContext + ?Sized>(&mut self, cx: &mut C) {
        // collect the unvisited values; tarjan's stack is free at this point
        // so it is reused as scratch instead of allocating
        let list = self.values_dynamic;
        let mut val = cx.tracking_list_get_source(list);
        while cx.tracking_list_has_next(list, val) {
            val = cx.tracking_list_get_next(list, val);
            self.tarjan_stack[self.top_tarjan] = val;
            self.top_tarjan += 1;
        }

        // the universes may only shrink while the in-lists are full
        cx.tracking_list_refill(self.values_dynamic);
        cx.tracking_list_refill(self.complement_scc);

        while self.top_tarjan != 0 {
            let v = self.tarjan_stack[self.top_tarjan - 1];
            cx.tracking_list_remove_from_universe_trailed(self.values_dynamic, v);
            cx.tracking_list_remove_from_universe_trailed(self.complement_scc, v);
            self.top_tarjan -= 1;
        }

        let vd = self.variables_dynamic;
        let mut var = cx.tracking_list_get_source(vd);
        while cx.tracking_list_has_next(vd, var) {
            var = cx.tracking_list_get_next(vd, var);
            let x = self.vars[var as usize];
            if cx.is_fixed(x) {
                cx.tracking_list_remove_from_universe_trailed(vd, var);

                let value = cx.min(x).unwrap();
                cx.tracking_list_remove_from_universe_trailed(self.values_dynamic, value);
                cx.tracking_list_remove_from_universe_trailed(self.complement_scc, value);
            }
        }
    }

    //**************************************************************************
    // MAXIMUM MATCHING
    //**************************************************************************

    /// Grows the current matching until every variable of the dynamic list
    /// is matched, or returns false when some variable admits no augmenting
    /// path (the constraint is then infeasible).
    fn find_maximum_matching<C: PropagationContext + ?Sized>(&mut self, cx: &mut C) -> bool {
        let vd = self.variables_dynamic;
        let mut var = cx.tracking_list_get_source(vd);
        while cx.tracking_list_has_next(vd, var) {
            var = cx.tracking_list_get_next(vd, var);
            if !self.matching.in_matching_u(var) {
                // refill brings back the values visited by the previous BFS
                // instead of recreating the list from scratch
                cx.tracking_list_refill(self.values_dynamic);
                match self.augmenting_path(cx, var) {
                    Some(val) => self.augment_matching(val),
                    None => {
                        // values_dynamic is universe-managed by the trail: it
                        // must be refilled even on the failure path, else the
                        // universe restoration would corrupt the list
                        cx.tracking_list_refill(self.values_dynamic);
                        return false;
                    }
                }
            }
        }
        cx.tracking_list_refill(self.values_dynamic);
        true
    }

    /// BFS over the residual graph rooted at the unmatched variable `root`.
    /// The queue holds variables; the values are the frontier. Returns the
    /// unmatched value closing an augmenting path, if any.
    fn augmenting_path<C: PropagationContext + ?Sized>(
        &mut self,
        cx: &mut C,
        root: isize,
    ) -> Option<isize> {
        self.head_bfs = 0;
        self.tail_bfs = 1;
        self.queue_bfs[0] = root;

        while self.head_bfs != self.tail_bfs {
            let var = self.queue_bfs[self.head_bfs];
            self.head_bfs += 1;
            let x = self.vars[var as usize];

            let unvisited = cx.tracking_list_get_size(self.values_dynamic);
            if self.mode.choice_bfs(cx.size(x), unvisited) {
                // small domain: iterate it and explore the unvisited values
                let mut cur = cx.min(x);
                while let Some(val) = cur {
                    if cx.tracking_list_is_present(self.values_dynamic, val)
                        && self.stop(cx, var, val)
                    {
                        return Some(val);
                    }
                    cur = cx.next_value(x, val);
                }
            } else {
                // large domain: iterate the unvisited values and explore the
                // ones belonging to the domain
                let list = self.values_dynamic;
                let mut val = cx.tracking_list_get_source(list);
                while cx.tracking_list_has_next(list, val) {
                    val = cx.tracking_list_get_next(list, val);
                    if cx.contains(x, val) && self.stop(cx, var, val) {
                        return Some(val);
                    }
                }
            }
        }
        None
    }

    /// Visits the value `val` reached from `var`. A matched value forwards
    /// the exploration to its matched variable and the BFS goes on; an
    /// unmatched value closes an augmenting path.
    fn stop<C: PropagationContext + ?Sized>(&mut self, cx: &mut C, var: isize, val: isize) -> bool {
        let idx = self.val_idx(val);
        self.parent_bfs[idx] = var;
        if self.matching.in_matching_v(val) {
            cx.tracking_list_remove(self.values_dynamic, val);
            self.queue_bfs[self.tail_bfs] = self.matching.match_v(val);
            self.tail_bfs += 1;
            false
        } else {
            true
        }
    }

    /// Flips the matched and unmatched edges along the augmenting path
    /// ending at `root`, reconstructed from the BFS parents and the current
    /// matching. The matching grows by one.
    fn augment_matching(&mut self, root: isize) {
        let mut val = root;
        loop {
            let var = self.parent_bfs[self.val_idx(val)];
            if self.matching.in_matching_u(var) {
                let val_next = self.matching.match_u(var);
                self.matching.un_match(var, val_next);
                self.matching.set_match(var, val);
                val = val_next;
            } else {
                // the last variable is the BFS root, unmatched by definition
                self.matching.set_match(var, val);
                return;
            }
        }
    }

    //**************************************************************************
    // SCC + PRUNING
    //**************************************************************************

    /// Computes the SCCs of the residual graph with a Tarjan DFS rooted at
    /// each value still matched to a relevant variable, pruning each
    /// component as soon as it is discovered.
    fn filter<C: PropagationContext + ?Sized>(&mut self, cx: &mut C) -> CPResult<()> {
        self.num_visit = 1;
        self.first_scc = true;

        let vd = self.variables_dynamic;
        let mut var = cx.tracking_list_get_source(vd);
        while cx.tracking_list_has_next(vd, var) {
            var = cx.tracking_list_get_next(vd, var);
            if cx.tracking_list_is_present(self.values_dynamic, self.matching.match_u(var)) {
                self.bi_dfs(cx, var)?;
            }
        }
        // whatever remains on the stack is the SCC of the artificial t_node
        if self.top_tarjan != 0 {
            self.prune(cx, self.t_node)?;
        }
        Ok(())
    }

    /// One step of the Tarjan DFS: enters the value matched to `var` and
    /// explores the domain edges of `var`, in classic or complemented mode.
    fn bi_dfs<C: PropagationContext + ?Sized>(&mut self, cx: &mut C, var: isize) -> CPResult<()> {
        let x = self.vars[var as usize];
        let m = self.matching.match_u(var);
        let mi = self.val_idx(m);

        self.pre[mi] = self.num_visit;
        self.low[mi] = self.num_visit;
        self.num_visit += 1;
        cx.tracking_list_remove(self.values_dynamic, m);
        self.tarjan_stack[self.top_tarjan] = m;
        self.top_tarjan += 1;
        self.in_stack[mi] = true;

        let unvisited = cx.tracking_list_get_size(self.values_dynamic);
        if self.mode.choice_dfs(cx.size(x), unvisited) {
            // small domain: iterate it
            let mut cur = cx.min(x);
            while let Some(val) = cur {
                if val != m && cx.tracking_list_is_present(self.values_dynamic, val) {
                    // case 1: explore a non visited value
                    self.process(cx, var, val)?;
                } else if val != m && self.in_stack[self.val_idx(val)] {
                    // case 2: update low(m) via an already visited value
                    // still sitting in tarjan's stack
                    self.low[mi] = self.low[mi].min(self.pre[self.val_idx(val)]);
                }
                cur = cx.next_value(x, val);
            }
        } else {
            // large domain, step 1: explore the non visited values. Instead
            // of walking from the source, the walk starts right before the
            // lower bound of the domain (the list is sorted in ascending
            // order) and stops past its upper bound.
            let list = self.values_dynamic;
            let mut pointer = cx.tracking_list_get_previous(list, cx.min(x).unwrap());
            let mut var_ub = cx.max(x).unwrap();

            while cx.tracking_list_has_next(list, pointer) && pointer < var_ub {
                // the recursive calls may have consumed the value the walk
                // was standing on: resume from the nearest present one
                pointer = cx.tracking_list_track_left(list, pointer);
                // skip the run of consecutive non-domain values
                while cx.tracking_list_has_next(list, pointer)
                    && pointer < var_ub
                    && !cx.contains(x, cx.tracking_list_get_next(list, pointer))
                {
                    pointer = cx.tracking_list_get_next(list, pointer);
                }
                if cx.tracking_list_has_next(list, pointer) && pointer < var_ub {
                    let val = cx.tracking_list_get_next(list, pointer);
                    self.process(cx, var, val)?;
                    // the domain may have been narrowed by a nested pruning
                    var_ub = cx.max(x).unwrap();
                }
            }

            // step 2: update low(m) with the most ancient visited value that
            // is either a domain value or cannot improve low anymore
            for index in 0..self.top_tarjan {
                let val = self.tarjan_stack[index];
                let vi = self.val_idx(val);
                if cx.contains(x, val) || self.pre[vi] >= self.low[mi] {
                    self.low[mi] = self.low[mi].min(self.pre[vi]);
                    break;
                }
            }
        }

        if self.pre[mi] == self.low[mi] {
            // m is the root of its SCC
            self.prune(cx, m)?;
        }
        Ok(())
    }

    /// Expands the unvisited value `val` reached from `var`: a matched value
    /// forwards the DFS to its matched variable, an unmatched value is a
    /// predecessor of t_node and closes the low point of `var` right away.
    fn process<C: PropagationContext + ?Sized>(
        &mut self,
        cx: &mut C,
        var: isize,
        val: isize,
    ) -> CPResult<()> {
        let mi = self.val_idx(self.matching.match_u(var));
        if self.matching.in_matching_v(val) {
            self.bi_dfs(cx, self.matching.match_v(val))?;
            self.low[mi] = self.low[mi].min(self.low[self.val_idx(val)]);
        } else {
            let vi = self.val_idx(val);
            self.pre[vi] = self.num_visit;
            self.low[vi] = 0;
            self.num_visit += 1;
            self.low[mi] = 0;
            cx.tracking_list_remove(self.values_dynamic, val);
            self.tarjan_stack[self.top_tarjan] = val;
            self.top_tarjan += 1;
            self.in_stack[vi] = true;
        }
        Ok(())
    }

    /// Pops the SCC rooted at `root` off tarjan's stack and prunes every
    /// variable-value edge leaving it: the domains of the matched variables
    /// of the SCC are clipped to the value range of the SCC and cleansed of
    /// the values outside of it.
    ///
    /// On entry `complement_scc` is refilled, which makes it equal to the
    /// current value universe (its universe shrinks in lockstep with the one
    /// of `values_dynamic`); removing the SCC members then leaves exactly
    /// the values outside the component.
    fn prune<C: PropagationContext + ?Sized>(&mut self, cx: &mut C, root: isize) -> CPResult<()> {
        cx.tracking_list_refill(self.complement_scc);

        // step 1: pop the SCC, clear the stack marks, build the complement
        // and record the value range of the component
        let mut min_scc = self.max_value;
        let mut max_scc = self.min_value;
        let mut root_index = self.top_tarjan;
        loop {
            root_index -= 1;
            let val = self.tarjan_stack[root_index];
            let idx = self.val_idx(val);
            self.in_stack[idx] = false;
            cx.tracking_list_remove(self.complement_scc, val);
            min_scc = min_scc.min(val);
            max_scc = max_scc.max(val);
            if val == root || root_index == 0 {
                break;
            }
        }

        // particular case: a singleton SCC forces the instantiation of its
        // matched variable (the value is necessarily matched, otherwise it
        // would share the SCC of t_node)
        if self.top_tarjan - root_index == 1 {
            let val = self.tarjan_stack[root_index];
            let var = self.matching.match_v(val);
            let x = self.vars[var as usize];
            if cx.size(x) > 1 {
                self.pruned = true;
            }
            cx.fix(x, val)?;
        }

        // step 2: prune the domains of the matched variables of the SCC.
        // The very first SCC discovered by a propagation has no edge leaving
        // it, so there is nothing to prune for it.
        if !self.first_scc {
            for index in root_index..self.top_tarjan {
                let val = self.tarjan_stack[index];
                if !self.matching.in_matching_v(val) {
                    continue;
                }
                let var = self.matching.match_v(val);
                let x = self.vars[var as usize];

                // every value outside [min_scc, max_scc] is outside the SCC
                if cx.update_bounds(x, min_scc, max_scc)? {
                    self.pruned = true;
                }

                // a singleton domain has nothing left to prune
                if cx.size(x) > 1 {
                    let complement = cx.tracking_list_get_size(self.complement_scc);
                    if self.mode.choice_prune(cx.size(x), complement) {
                        // small domain: iterate it and prune the values that
                        // are in the complement
                        let mut cur = cx.min(x);
                        while let Some(value) = cur {
                            if cx.tracking_list_is_present(self.complement_scc, value) {
                                cx.remove(x, value)?;
                                self.pruned = true;
                            }
                            cur = cx.next_value(x, value);
                        }
                    } else {
                        // large domain: iterate the complement and prune the
                        // values that are in the domain
                        let list = self.complement_scc;
                        let mut value = cx.tracking_list_get_source(list);
                        while cx.tracking_list_has_next(list, value) {
                            value = cx.tracking_list_get_next(list, value);
                            if cx.contains(x, value) {
                                cx.remove(x, value)?;
                                self.pruned = true;
                            }
                        }
                    }
                }
            }
        }

        self.first_scc = false;
        self.top_tarjan = root_index;
        Ok(())
    }
}

impl Propagator for AllDiffBimodal {
    fn propagate(&mut self, cx: &mut dyn PropagationContext) -> CPResult<()> {
        self.propagate(cx).map(|_| ())
    }
}

#[cfg(test)]
impl AllDiffBimodal {
    /// test only: the current matching
    pub(crate) fn matching(&self) -> &BipartiteMatching {
        &self.matching
    }
    /// test only: the handles of the three tracking lists
    pub(crate) fn lists(
        &self,
    ) -> (
        ReversibleTrackingList,
        ReversibleTrackingList,
        ReversibleTrackingList,
    ) {
        (self.variables_dynamic, self.values_dynamic, self.complement_scc)
    }
}

// #############################################################################
// ### UNIT TESTS ##############################################################
// #############################################################################

#[cfg(test)]
mod test_alldiff_bimodal {
    use crate::prelude::*;

    type Store = DomainStoreImpl<TrailedStateManager>;

    const ALL_MODES: [Mode; 4] = [Mode::Classic, Mode::Complement, Mode::Partial, Mode::Tuned];

    fn ivar(ds: &mut Store, val: &[isize]) -> Variable {
        let min = val.first().copied().unwrap();
        let max = val.last().copied().unwrap();
        let var = ds.new_int_var(min, max);

        let mut v = val.iter().copied();
        let mut k = v.next();
        for i in min..=max {
            if Some(i) == k {
                k = v.next();
            } else {
                ds.remove(var, i).ok();
            }
        }
        var
    }

    fn domain(ds: &Store, var: Variable) -> Vec<isize> {
        let mut values = vec![];
        let mut cur = ds.min(var);
        while let Some(v) = cur {
            values.push(v);
            cur = ds.next_value(var, v);
        }
        values
    }

    #[test]
    fn it_prunes_the_values_of_a_saturated_subset() {
        for mode in ALL_MODES {
            let mut ds = Store::default();
            let x1 = ivar(&mut ds, &[1, 2]);
            let x2 = ivar(&mut ds, &[1, 2]);
            let x3 = ivar(&mut ds, &[1, 2, 3, 4]);
            let x4 = ivar(&mut ds, &[1, 2, 3, 4]);

            let mut alldiff = AllDiffBimodal::new(&mut ds, &[x1, x2, x3, x4], mode);
            assert_eq!(Ok(true), alldiff.propagate(&mut ds));

            assert_eq!(domain(&ds, x1), vec![1, 2]);
            assert_eq!(domain(&ds, x2), vec![1, 2]);
            assert_eq!(domain(&ds, x3), vec![3, 4]);
            assert_eq!(domain(&ds, x4), vec![3, 4]);
        }
    }

    #[test]
    fn it_does_not_prune_a_complete_value_square() {
        // the n-queens column constraint: n variables over n values, the
        // matching is perfect and everything lies in one single SCC
        for mode in ALL_MODES {
            let mut ds = Store::default();
            let vars: Vec<_> = (0..8).map(|_| ds.new_int_var(1, 8)).collect();

            let mut alldiff = AllDiffBimodal::new(&mut ds, &vars, mode);
            assert_eq!(Ok(false), alldiff.propagate(&mut ds));

            assert!(alldiff.matching().is_maximum());
            assert!(alldiff.matching().is_valid());
            for x in vars.iter().copied() {
                assert_eq!(8, ds.size(x));
            }
        }
    }

    #[test]
    fn it_raises_a_contradiction_when_no_matching_exists() {
        for mode in ALL_MODES {
            let mut ds = Store::default();
            let x1 = ivar(&mut ds, &[1, 2]);
            let x2 = ivar(&mut ds, &[1, 2]);
            let x3 = ivar(&mut ds, &[1, 2]);

            let mut alldiff = AllDiffBimodal::new(&mut ds, &[x1, x2, x3], mode);
            assert_eq!(Err(Inconsistency), alldiff.propagate(&mut ds));
        }
    }

    #[test]
    fn an_instantiated_variable_consumes_its_value() {
        for mode in ALL_MODES {
            let mut ds = Store::default();
            let x1 = ivar(&mut ds, &[1]);
            let x2 = ivar(&mut ds, &[1, 2, 3]);
            let x3 = ivar(&mut ds, &[1, 2, 3]);

            let mut alldiff = AllDiffBimodal::new(&mut ds, &[x1, x2, x3], mode);
            assert_eq!(Ok(true), alldiff.propagate(&mut ds));

            assert_eq!(domain(&ds, x2), vec![2, 3]);
            assert_eq!(domain(&ds, x3), vec![2, 3]);
        }
    }

    #[test]
    fn it_filters_across_holes_and_negative_values() {
        for mode in ALL_MODES {
            let mut ds = Store::default();
            let x1 = ivar(&mut ds, &[0, 2, 3, 5]);
            let x2 = ivar(&mut ds, &[4]);
            let x3 = ivar(&mut ds, &[-1, 1]);
            let x4 = ivar(&mut ds, &[-4, -2, 0, 2, 3]);
            let x5 = ivar(&mut ds, &[-1]);

            let mut alldiff = AllDiffBimodal::new(&mut ds, &[x1, x2, x3, x4, x5], mode);
            assert_eq!(Ok(true), alldiff.propagate(&mut ds));

            assert_eq!(domain(&ds, x3), vec![1]);
        }
    }

    #[test]
    fn hall_intervals_are_discovered_transitively() {
        for mode in ALL_MODES {
            let mut ds = Store::default();
            let x1 = ivar(&mut ds, &[1, 2, 3, 4, 5]);
            let x2 = ivar(&mut ds, &[2]);
            let x3 = ivar(&mut ds, &[1, 2, 3, 4, 5]);
            let x4 = ivar(&mut ds, &[1]);
            let x5 = ivar(&mut ds, &[1, 2, 3, 4, 5, 6]);
            let x6 = ivar(&mut ds, &[6, 7, 8]);
            let x7 = ivar(&mut ds, &[3]);
            let x8 = ivar(&mut ds, &[6, 7, 8, 9]);
            let x9 = ivar(&mut ds, &[6, 7, 8]);

            let vars = [x1, x2, x3, x4, x5, x6, x7, x8, x9];
            let mut alldiff = AllDiffBimodal::new(&mut ds, &vars, mode);
            assert_eq!(Ok(true), alldiff.propagate(&mut ds));

            assert_eq!(domain(&ds, x1), vec![4, 5]);
            assert_eq!(domain(&ds, x3), vec![4, 5]);
            assert_eq!(domain(&ds, x5), vec![6]);
            assert_eq!(domain(&ds, x8), vec![9]);
            assert_eq!(domain(&ds, x9), vec![7, 8]);
        }
    }

    #[test]
    fn propagation_is_idempotent_on_a_fixpoint() {
        for mode in ALL_MODES {
            let mut ds = Store::default();
            let x1 = ivar(&mut ds, &[1, 2]);
            let x2 = ivar(&mut ds, &[1, 2]);
            let x3 = ivar(&mut ds, &[1, 2, 3, 4]);
            let x4 = ivar(&mut ds, &[1, 2, 3, 4]);

            let mut alldiff = AllDiffBimodal::new(&mut ds, &[x1, x2, x3, x4], mode);
            assert_eq!(Ok(true), alldiff.propagate(&mut ds));
            assert_eq!(Ok(false), alldiff.propagate(&mut ds));
        }
    }

    #[test]
    fn all_modes_filter_the_same_domains() {
        let instances: &[&[&[isize]]] = &[
            &[&[1, 2], &[1, 2], &[1, 2, 3, 4], &[1, 2, 3, 4]],
            &[&[1], &[1, 2, 3], &[1, 2, 3]],
            &[&[3, 4], &[1], &[3, 4], &[0], &[3, 4, 5], &[5, 6, 7], &[2, 9, 10]],
            &[&[1, 2, 3, 4, 5], &[2], &[1, 2, 3, 4, 5], &[1], &[1, 2, 3, 4, 5, 6]],
        ];
        for instance in instances {
            let mut reference: Option<Vec<Vec<isize>>> = None;
            for mode in ALL_MODES {
                let mut ds = Store::default();
                let vars: Vec<_> = instance.iter().map(|d| ivar(&mut ds, d)).collect();
                let mut alldiff = AllDiffBimodal::new(&mut ds, &vars, mode);
                alldiff.propagate(&mut ds).unwrap();

                let domains: Vec<_> = vars.iter().map(|&x| domain(&ds, x)).collect();
                match &reference {
                    None => reference = Some(domains),
                    Some(expected) => assert_eq!(expected, &domains),
                }
            }
        }
    }

    #[test]
    fn backtracking_restores_the_dynamic_structures() {
        let mut ds = Store::default();
        let x1 = ds.new_int_var(1, 4);
        let x2 = ds.new_int_var(1, 4);
        let x3 = ds.new_int_var(1, 4);
        let vars = [x1, x2, x3];

        let mut alldiff = AllDiffBimodal::new(&mut ds, &vars, Mode::Tuned);
        assert_eq!(Ok(false), alldiff.propagate(&mut ds));

        let (vars_list, values_list, complement_list) = alldiff.lists();
        let vars_universe = ds.tracking_list_get_universe_size(vars_list);
        let values_universe = ds.tracking_list_get_universe_size(values_list);

        ds.save_state();

        // instantiating x1 shrinks every universe on the next propagation
        assert_eq!(Ok(true), ds.fix(x1, 2));
        assert_eq!(Ok(true), alldiff.propagate(&mut ds));
        assert!(ds.tracking_list_get_universe_size(vars_list) < vars_universe);
        assert!(ds.tracking_list_get_universe_size(values_list) < values_universe);
        assert!(!ds.contains(x2, 2));
        assert!(!ds.contains(x3, 2));

        ds.restore_state();

        // the universes are back, and so are the domains
        assert_eq!(vars_universe, ds.tracking_list_get_universe_size(vars_list));
        assert_eq!(values_universe, ds.tracking_list_get_universe_size(values_list));
        assert_eq!(
            values_universe,
            ds.tracking_list_get_universe_size(complement_list)
        );
        for x in vars {
            assert_eq!(4, ds.size(x));
        }

        // the matching is not trailed: the opening resynchronizes it with the
        // restored domains instead. Propagating again from the restored state
        // must behave like a fresh run on the same domains
        assert_eq!(Ok(false), alldiff.propagate(&mut ds));
        assert!(alldiff.matching().is_valid());
        assert!(alldiff.matching().is_maximum());
    }

    #[test]
    fn universes_keep_shrinking_along_a_branch() {
        let mut ds = Store::default();
        let x1 = ds.new_int_var(1, 3);
        let x2 = ds.new_int_var(1, 3);
        let x3 = ds.new_int_var(1, 3);

        let mut alldiff = AllDiffBimodal::new(&mut ds, &[x1, x2, x3], Mode::Tuned);
        assert_eq!(Ok(false), alldiff.propagate(&mut ds));

        let (vars_list, values_list, _) = alldiff.lists();

        ds.save_state();
        assert_eq!(Ok(true), ds.fix(x1, 1));
        assert_eq!(Ok(true), alldiff.propagate(&mut ds));
        assert_eq!(2, ds.tracking_list_get_universe_size(vars_list));
        assert_eq!(2, ds.tracking_list_get_universe_size(values_list));

        ds.save_state();
        assert_eq!(Ok(true), ds.fix(x2, 2));
        assert_eq!(Ok(true), alldiff.propagate(&mut ds));
        // fixing x2 to 2 leaves x3 alone on value 3: everything collapses
        assert_eq!(Some(3), ds.fixed_value(x3));
        assert_eq!(0, ds.tracking_list_get_universe_size(vars_list));
        assert_eq!(0, ds.tracking_list_get_universe_size(values_list));

        ds.restore_state();
        assert_eq!(2, ds.tracking_list_get_universe_size(vars_list));
        assert_eq!(2, ds.tracking_list_get_universe_size(values_list));

        ds.restore_state();
        assert_eq!(3, ds.tracking_list_get_universe_size(vars_list));
        assert_eq!(3, ds.tracking_list_get_universe_size(values_list));
    }

    /// reference implementation: a value belongs to the GAC domain of a
    /// variable iff some assignment of pairwise distinct domain values
    /// extends it. Plain exhaustive search, only usable on tiny instances.
    fn brute_force_gac(domains: &[Vec<isize>]) -> Option<Vec<Vec<isize>>> {
        fn extend(domains: &[Vec<isize>], partial: &mut Vec<isize>) -> bool {
            if partial.len() == domains.len() {
                return true;
            }
            for v in domains[partial.len()].iter().copied() {
                if !partial.contains(&v) {
                    partial.push(v);
                    if extend(domains, partial) {
                        partial.pop();
                        return true;
                    }
                    partial.pop();
                }
            }
            false
        }

        let mut feasible = false;
        let mut gac: Vec<Vec<isize>> = vec![vec![]; domains.len()];
        for (i, dom) in domains.iter().enumerate() {
            for v in dom.iter().copied() {
                let mut partial: Vec<isize> = vec![];
                let mut reordered: Vec<Vec<isize>> = vec![vec![v]];
                reordered.extend(
                    domains
                        .iter()
                        .enumerate()
                        .filter(|&(j, _)| j != i)
                        .map(|(_, d)| d.clone()),
                );
                if extend(&reordered, &mut partial) {
                    feasible = true;
                    gac[i].push(v);
                }
            }
        }
        if feasible {
            Some(gac)
        } else {
            None
        }
    }

    #[test]
    fn random_instances_agree_with_the_exhaustive_reference() {
        use rand::rngs::SmallRng;
        use rand::{Rng, SeedableRng};

        let mut rng = SmallRng::seed_from_u64(0x5eed);
        for _ in 0..200 {
            let n_vars = rng.gen_range(2..=5);
            let domains: Vec<Vec<isize>> = (0..n_vars)
                .map(|_| {
                    let mut dom: Vec<isize> =
                        (0..=6).filter(|_| rng.gen_bool(0.5)).collect();
                    if dom.is_empty() {
                        dom.push(rng.gen_range(0..=6));
                    }
                    dom
                })
                .collect();

            let expected = brute_force_gac(&domains);
            for mode in ALL_MODES {
                let mut ds = Store::default();
                let vars: Vec<_> = domains.iter().map(|d| ivar(&mut ds, d)).collect();
                let mut alldiff = AllDiffBimodal::new(&mut ds, &vars, mode);

                match (alldiff.propagate(&mut ds), &expected) {
                    (Err(Inconsistency), None) => (),
                    (Err(Inconsistency), Some(_)) => {
                        panic!("spurious contradiction on {domains:?} with {mode:?}")
                    }
                    (Ok(_), None) => {
                        panic!("missed contradiction on {domains:?} with {mode:?}")
                    }
                    (Ok(pruned), Some(gac)) => {
                        let filtered: Vec<_> =
                            vars.iter().map(|&x| domain(&ds, x)).collect();
                        assert_eq!(gac, &filtered, "wrong filtering on {domains:?} with {mode:?}");
                        assert_eq!(
                            pruned,
                            gac != &domains,
                            "wrong pruned flag on {domains:?} with {mode:?}"
                        );
                    }
                }
            }
        }
    }

    #[test]
    fn incremental_runs_match_a_fresh_propagator() {
        // propagate, narrow, propagate again: the outcome must be identical
        // to what a propagator created on the narrowed domains computes
        for mode in ALL_MODES {
            let mut ds = Store::default();
            let x1 = ivar(&mut ds, &[1, 2, 3]);
            let x2 = ivar(&mut ds, &[1, 2, 3]);
            let x3 = ivar(&mut ds, &[1, 2, 3, 4, 5]);
            let vars = [x1, x2, x3];

            let mut alldiff = AllDiffBimodal::new(&mut ds, &vars, mode);
            assert_eq!(Ok(false), alldiff.propagate(&mut ds));

            assert_eq!(Ok(true), ds.remove(x1, 3));
            assert_eq!(Ok(true), ds.remove(x2, 3));
            alldiff.propagate(&mut ds).unwrap();
            let incremental: Vec<_> = vars.iter().map(|&x| domain(&ds, x)).collect();

            let mut fresh_ds = Store::default();
            let y1 = ivar(&mut fresh_ds, &[1, 2]);
            let y2 = ivar(&mut fresh_ds, &[1, 2]);
            let y3 = ivar(&mut fresh_ds, &[1, 2, 3, 4, 5]);
            let mut fresh = AllDiffBimodal::new(&mut fresh_ds, &[y1, y2, y3], mode);
            fresh.propagate(&mut fresh_ds).unwrap();
            let scratch: Vec<_> = [y1, y2, y3].iter().map(|&y| domain(&fresh_ds, y)).collect();

            assert_eq!(incremental, scratch);
        }
    }
}
