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

//! This module provides the definition and implementation of the variables,
//! DomainStore and DomainBroker

use crate::{
    ReversibleBitSet, ReversibleInt, ReversibleTrackingList,
    StateManager, TrackingListManager,
};

/// This is the kind of error that gets raised whenever a propagator fails
#[derive(Debug, Clone, Copy, thiserror::Error, PartialEq, Eq, Hash)]
#[error("inconsistency")]
pub struct Inconsistency;

/// The result of a propagation operation. (Note: all propagation opertations
/// can fail, in which case they raise an Inconsistency error)
pub type CPResult<T> = Result<T, Inconsistency>;

/// An integer variable that can be used in a CP model
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct Variable(pub(crate) usize);

/// A domain store is the entity that gives a hook to propagators for
/// modifying the variables domains. (Note however that no propagator can
/// directly access the events associated with a given variable, nor decide
/// to save or restore the state of these domains to a previous value. These
/// are the responsibilities devoted to a DomainBroker -- which is typically
/// implemented by the same structure as DomainStore; but it helps to split
/// responsibilities).
///
/// All the narrowing operations return a boolean flag telling whether the
/// domain was actually shrunk by the call. This is what lets a filtering
/// procedure report that it pruned something without second guessing the
/// domains.
pub trait DomainStore {
    /// Creates a new integer variable covering the min..=max range of values
    fn new_int_var(&mut self, min: isize, max: isize) -> Variable;
    /// Returns the minimum value of the domain of this variable (if it exists)
    fn min(&self, var: Variable) -> Option<isize>;
    /// Returns the maximum value of the domain of this variable (if it exists)
    fn max(&self, var: Variable) -> Option<isize>;
    /// Returns the size of the domain of this variable
    fn size(&self, var: Variable) -> usize;
    /// Returns true iff the domain of the target `var` contains the
    /// specified `value`
    fn contains(&self, var: Variable, value: isize) -> bool;
    /// Returns the smallest value of the domain of this variable strictly
    /// greater than the given `value` (if there is one). The probe value
    /// needs not belong to the domain, which makes this method the natural
    /// way of iterating a domain in ascending order even while values are
    /// being removed from it
    fn next_value(&self, var: Variable, value: isize) -> Option<isize>;
    /// Returns true iff the value of the target variable is fixed/imposed
    fn is_fixed(&self, var: Variable) -> bool {
        self.size(var) == 1
    }
    /// Returns the value assigned to the variable when it is fixed
    fn fixed_value(&self, var: Variable) -> Option<isize> {
        if self.is_fixed(var) {
            self.min(var)
        } else {
            None
        }
    }
    /// Forces the value of this variable. It returns an Inconsistency error
    /// when fixing the value of the target variable is impossible
    fn fix(&mut self, var: Variable, value: isize) -> CPResult<bool>;
    /// Removes the specified value from the domain of the target variable.
    /// An Inconsistency error is returned when the domain of the variable
    /// becomes empty because of this removal
    fn remove(&mut self, var: Variable, value: isize) -> CPResult<bool>;
    /// Removes all value less than (<) the specified value from the domain
    /// of the target variable. An Inconsistency error is returned when the
    /// domain of the variable becomes empty because of this removal
    fn remove_below(&mut self, var: Variable, value: isize) -> CPResult<bool>;
    /// Removes all value greater than (>) the specified value from the
    /// domain of the target variable. An Inconsistency error is returned
    /// when the domain of the variable becomes empty because of this removal
    fn remove_above(&mut self, var: Variable, value: isize) -> CPResult<bool>;
    /// Restricts the domain of the target variable to the values of the
    /// [lo, hi] interval. An Inconsistency error is returned when the domain
    /// of the variable becomes empty because of this narrowing
    fn update_bounds(&mut self, var: Variable, lo: isize, hi: isize) -> CPResult<bool> {
        let low_changed = self.remove_below(var, lo)?;
        let high_changed = self.remove_above(var, hi)?;
        Ok(low_changed || high_changed)
    }
}

/// An event that tells what happened to the domain of a variable
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DomainEvent {
    /// This is the variable impacted by a possible change in its domain
    pub variable: Variable,
    /// This flag is set when the domain of the variable has become fixed
    /// (That is, it only has one single value left in its domain)
    pub is_fixed: bool,
    /// This flag is set when the domain of a variable has become empty
    /// (this should somehow have triggered an Inconsistency error)
    pub is_empty: bool,
    /// This flag is set when the domain's minimum has changed
    pub min_changed: bool,
    /// This flag is set when the domain's maximum has changed
    pub max_changed: bool,
    /// This flag is set when a change has occured in the domain of the
    /// variable (this is the weakest of the requirements to set a flag)
    pub domain_changed: bool,
}
impl DomainEvent {
    /// an event where nothing happened yet for the given variable
    fn clear(variable: Variable) -> Self {
        Self {
            variable,
            is_fixed: false,
            is_empty: false,
            min_changed: false,
            max_changed: false,
            domain_changed: false,
        }
    }
}

/// The domain broker is the facet of the domain store which is in charge of
/// tracking all changes occurring in the domain of the variables. A domain
/// broker is the object which is used by the solver to decide which
/// propagators deserve a spot on the propagation agenda.
pub trait DomainBroker {
    /// saves the current state of all variables
    fn save_state(&mut self);
    /// restores the previous state of all variables
    fn restore_state(&mut self);
    /// forgets all events that have happened on a variable
    fn clear_events(&mut self);
    /// goes over all the events that have occurred on the variables
    fn for_each_event<F: FnMut(DomainEvent)>(&self, f: F);
}

/// This is a simple implementation of a domain store. It implements both the
/// DomainStore and the DomainBroker traits, which means it really is an
/// entity that encompasses the complete lifecycle of a variable (but has
/// nothing to do with the higher level constructs that *use* the events
/// applied to these variables)
pub struct DomainStoreImpl<T: StateManager> {
    /// The state manager in charge of saving/restoring the domains states
    state: T,
    /// How many variables are there right now ?
    n_vars: ReversibleInt,
    /// The domains of all variables. A domain is a plain reversible bitset:
    /// this is what gives the variables their ascending `next_value`
    /// iteration even when the domain is full of holes
    domains: Vec<ReversibleBitSet>,
    /// The events that have been applied to the variables
    events: Vec<DomainEvent>,
}
impl<T: StateManager> DomainStoreImpl<T> {
    /// Creates a new instance of the domain store based on the given state
    /// manager
    pub fn new(mut state: T) -> Self {
        let n_vars = state.manage_int(0);
        Self {
            state,
            n_vars,
            domains: vec![],
            events: vec![],
        }
    }

    /// Utility to reach the underlying state manager
    pub fn state_manager(&self) -> &T {
        &self.state
    }
    /// Utility to reach the underlying state manager in a mutable way
    pub fn state_manager_mut(&mut self) -> &mut T {
        &mut self.state
    }
}

impl<T: StateManager> From<T> for DomainStoreImpl<T> {
    fn from(state: T) -> Self {
        Self::new(state)
    }
}
impl<T: StateManager + Default> Default for DomainStoreImpl<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T: StateManager> DomainStore for DomainStoreImpl<T> {
    fn new_int_var(&mut self, min: isize, max: isize) -> Variable {
        assert!(min <= max, "a variable must have a non empty domain");
        let id = (self.state.increment(self.n_vars) - 1) as usize;
        let n = (max - min + 1) as usize;
        let domain = self.state.manage_bit_set(n, min);

        let variable = Variable(id);
        if id == self.domains.len() {
            // its a fresh variable
            self.domains.push(domain);
            self.events.push(DomainEvent::clear(variable));
        } else {
            // let us recycle the old data
            self.domains[id] = domain;
            self.events[id] = DomainEvent::clear(variable);
        }
        variable
    }

    fn min(&self, var: Variable) -> Option<isize> {
        self.state.bit_set_get_min(self.domains[var.0])
    }

    fn max(&self, var: Variable) -> Option<isize> {
        self.state.bit_set_get_max(self.domains[var.0])
    }

    fn size(&self, var: Variable) -> usize {
        self.state.bit_set_size(self.domains[var.0])
    }

    fn contains(&self, var: Variable, value: isize) -> bool {
        self.state.bit_set_contains(self.domains[var.0], value)
    }

    fn next_value(&self, var: Variable, value: isize) -> Option<isize> {
        self.state.bit_set_next_value(self.domains[var.0], value)
    }

    fn fix(&mut self, var: Variable, value: isize) -> CPResult<bool> {
        let dom = self.domains[var.0];
        if !self.state.bit_set_contains(dom, value) {
            self.state.bit_set_remove_all(dom);
            self.events[var.0].is_empty = true;
            self.events[var.0].domain_changed = true;
            Err(Inconsistency)
        } else if self.state.bit_set_size(dom) == 1 {
            // if there is nothing to do, then we're done
            Ok(false)
        } else {
            let min_changed = self.state.bit_set_get_min(dom) != Some(value);
            let max_changed = self.state.bit_set_get_max(dom) != Some(value);
            self.state.bit_set_remove_all_but(dom, value);

            self.events[var.0].min_changed |= min_changed;
            self.events[var.0].max_changed |= max_changed;
            self.events[var.0].domain_changed = true;
            self.events[var.0].is_fixed = true;
            Ok(true)
        }
    }

    fn remove(&mut self, var: Variable, value: isize) -> CPResult<bool> {
        let dom = self.domains[var.0];
        if !self.state.bit_set_contains(dom, value) {
            // there is nothing to do
            Ok(false)
        } else {
            let min_changed = self.state.bit_set_get_min(dom) == Some(value);
            let max_changed = self.state.bit_set_get_max(dom) == Some(value);

            self.state.bit_set_remove(dom, value);
            let size = self.state.bit_set_size(dom);
            let is_fixed = size == 1;
            let is_empty = size == 0;

            self.events[var.0].min_changed |= min_changed && !is_empty;
            self.events[var.0].max_changed |= max_changed && !is_empty;
            self.events[var.0].is_fixed |= is_fixed;
            self.events[var.0].is_empty |= is_empty;
            self.events[var.0].domain_changed = true;

            if is_empty {
                Err(Inconsistency)
            } else {
                Ok(true)
            }
        }
    }

    fn remove_below(&mut self, var: Variable, value: isize) -> CPResult<bool> {
        let dom = self.domains[var.0];
        match self.state.bit_set_get_min(dom) {
            None => Err(Inconsistency),
            Some(min) if min >= value => Ok(false),
            Some(_) => {
                self.state.bit_set_remove_below(dom, value);
                let size = self.state.bit_set_size(dom);

                match size {
                    0 => {
                        self.events[var.0].is_empty = true;
                        self.events[var.0].domain_changed = true;
                        Err(Inconsistency)
                    }
                    1 => {
                        self.events[var.0].is_fixed = true;
                        self.events[var.0].min_changed = true;
                        self.events[var.0].domain_changed = true;
                        Ok(true)
                    }
                    _ => {
                        self.events[var.0].min_changed = true;
                        self.events[var.0].domain_changed = true;
                        Ok(true)
                    }
                }
            }
        }
    }

    fn remove_above(&mut self, var: Variable, value: isize) -> CPResult<bool> {
        let dom = self.domains[var.0];
        match self.state.bit_set_get_max(dom) {
            None => Err(Inconsistency),
            Some(max) if max <= value => Ok(false),
            Some(_) => {
                self.state.bit_set_remove_above(dom, value);
                let size = self.state.bit_set_size(dom);

                match size {
                    0 => {
                        self.events[var.0].is_empty = true;
                        self.events[var.0].domain_changed = true;
                        Err(Inconsistency)
                    }
                    1 => {
                        self.events[var.0].is_fixed = true;
                        self.events[var.0].max_changed = true;
                        self.events[var.0].domain_changed = true;
                        Ok(true)
                    }
                    _ => {
                        self.events[var.0].max_changed = true;
                        self.events[var.0].domain_changed = true;
                        Ok(true)
                    }
                }
            }
        }
    }
}

impl<T: StateManager> DomainBroker for DomainStoreImpl<T> {
    fn save_state(&mut self) {
        self.state.save_state()
    }

    fn restore_state(&mut self) {
        self.state.restore_state()
    }

    fn clear_events(&mut self) {
        for e in self.events.iter_mut() {
            e.is_empty = false;
            e.is_fixed = false;
            e.min_changed = false;
            e.max_changed = false;
            e.domain_changed = false;
        }
    }

    fn for_each_event<F: FnMut(DomainEvent)>(&self, f: F) {
        self.events
            .iter()
            .copied()
            .filter(|e| {
                e.is_empty | e.is_fixed | e.max_changed | e.min_changed | e.domain_changed
            })
            .for_each(f);
    }
}

//------------------------------------------------------------------------------
// The domain store also gives access to the reversible tracking lists of its
// state manager. This is how a propagator owning backtrack-aware lists (read:
// the alldifferent filtering) reaches both the domains and its lists through
// one single handle.
//------------------------------------------------------------------------------
impl<T: StateManager> TrackingListManager for DomainStoreImpl<T> {
    fn manage_tracking_list(&mut self, a: isize, b: isize) -> ReversibleTrackingList {
        self.state.manage_tracking_list(a, b)
    }
    fn tracking_list_get_next(&self, id: ReversibleTrackingList, e: isize) -> isize {
        self.state.tracking_list_get_next(id, e)
    }
    fn tracking_list_get_previous(&self, id: ReversibleTrackingList, e: isize) -> isize {
        self.state.tracking_list_get_previous(id, e)
    }
    fn tracking_list_get_source(&self, id: ReversibleTrackingList) -> isize {
        self.state.tracking_list_get_source(id)
    }
    fn tracking_list_get_sink(&self, id: ReversibleTrackingList) -> isize {
        self.state.tracking_list_get_sink(id)
    }
    fn tracking_list_has_next(&self, id: ReversibleTrackingList, e: isize) -> bool {
        self.state.tracking_list_has_next(id, e)
    }
    fn tracking_list_has_previous(&self, id: ReversibleTrackingList, e: isize) -> bool {
        self.state.tracking_list_has_previous(id, e)
    }
    fn tracking_list_is_present(&self, id: ReversibleTrackingList, e: isize) -> bool {
        self.state.tracking_list_is_present(id, e)
    }
    fn tracking_list_get_size(&self, id: ReversibleTrackingList) -> usize {
        self.state.tracking_list_get_size(id)
    }
    fn tracking_list_get_universe_size(&self, id: ReversibleTrackingList) -> usize {
        self.state.tracking_list_get_universe_size(id)
    }
    fn tracking_list_is_empty(&self, id: ReversibleTrackingList) -> bool {
        self.state.tracking_list_is_empty(id)
    }
    fn tracking_list_remove(&mut self, id: ReversibleTrackingList, e: isize) {
        self.state.tracking_list_remove(id, e)
    }
    fn tracking_list_refill(&mut self, id: ReversibleTrackingList) {
        self.state.tracking_list_refill(id)
    }
    fn tracking_list_remove_from_universe(&mut self, id: ReversibleTrackingList, e: isize) {
        self.state.tracking_list_remove_from_universe(id, e)
    }
    fn tracking_list_remove_from_universe_trailed(
        &mut self,
        id: ReversibleTrackingList,
        e: isize,
    ) {
        self.state.tracking_list_remove_from_universe_trailed(id, e)
    }
    fn tracking_list_track_left(&self, id: ReversibleTrackingList, e: isize) -> isize {
        self.state.tracking_list_track_left(id, e)
    }
}

// #############################################################################
// ### UNIT TESTS ##############################################################
// #############################################################################
