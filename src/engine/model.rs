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

//! This module provides the propagator abstraction and the machinery that
//! runs propagators to a fixpoint: posting, condition watches and the
//! propagation agenda.

use std::collections::VecDeque;

use crate::{
    DomainBroker, DomainEvent, DomainStore, DomainStoreImpl, ReversibleInt,
    ReversibleTrackingList, SaveAndRestore, StateManager, TrackingListManager,
    TrailedStateManager, Variable,
};

use super::CPResult;

/// What a propagator gets to see when it is executed: the domains of the
/// variables, plus the reversible tracking lists of the underlying state
/// manager (some filtering algorithms -- notably alldifferent -- maintain
/// backtrack-aware lists of relevant variables and values between their
/// invocations).
///
/// Every type that provides both facets is a propagation context; the
/// blanket implementation below takes care of that.
pub trait PropagationContext: DomainStore + TrackingListManager {}
impl<X: DomainStore + TrackingListManager + ?Sized> PropagationContext for X {}

/// A modeling construct is the user facing form of a constraint. Installing
/// one may post several propagators and subscribe each of them to the
/// domain conditions it must react to.
pub trait ModelingConstruct {
    /// Posts the propagators realizing this construct into the given model
    /// and hooks them to the relevant domain conditions.
    fn install(&self, cp: &mut dyn CpModel);
}

/// The handle to a posted propagator. The model hands one out at posting
/// time; scheduling requests and watch subscriptions use it to designate
/// their target.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct Constraint(usize);

/// A propagator enforces some level of consistency on the domains of the
/// variables it bears on. It is executed by the fixpoint loop whenever one
/// of the domain conditions it watches fired.
pub trait Propagator {
    /// Actually runs the custom propagation algorithm
    fn propagate(&mut self, cx: &mut dyn PropagationContext) -> CPResult<()>;
}

/// For convenience, any mutable closure over the propagation context is
/// accepted wherever a propagator is expected.
impl<F: FnMut(&mut dyn PropagationContext) -> CPResult<()>> Propagator for F {
    fn propagate(&mut self, cx: &mut dyn PropagationContext) -> CPResult<()> {
        self(cx)
    }
}

/// A condition on the domain of one variable which a propagator can watch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DomainCondition {
    /// the domain of the variable shrank to one single value
    IsFixed(Variable),
    /// the minimum of the domain moved up
    MinimumChanged(Variable),
    /// the maximum of the domain moved down
    MaximumChanged(Variable),
    /// some value disappeared from the domain (the weakest condition)
    DomainChanged(Variable),
}
impl DomainCondition {
    /// True iff the given domain event makes this condition fire
    fn fires_on(self, event: DomainEvent) -> bool {
        match self {
            DomainCondition::IsFixed(x) => x == event.variable && event.is_fixed,
            DomainCondition::MinimumChanged(x) => x == event.variable && event.min_changed,
            DomainCondition::MaximumChanged(x) => x == event.variable && event.max_changed,
            DomainCondition::DomainChanged(x) => x == event.variable && event.domain_changed,
        }
    }
}

/// A constraint store keeps the posted propagators together with the
/// conditions they watch, and runs them to a propagation fixpoint when the
/// domains change.
pub trait ConstraintStore {
    /// Installs a modeling construct into this store
    fn install(&mut self, modeling_construct: &dyn ModelingConstruct);
    /// Posts a propagator. Posting alone never runs anything: the returned
    /// handle must be scheduled, or subscribed to some condition
    fn post(&mut self, propagator: Box<dyn Propagator>) -> Constraint;
    /// Puts the designated propagator on the agenda of the next fixpoint
    fn schedule(&mut self, constraint: Constraint);
    /// Subscribes the propagator to a domain condition: from this call on
    /// (and until the search backtracks over it), the propagator gets
    /// scheduled whenever the condition fires
    fn propagate_on(&mut self, constraint: Constraint, cond: DomainCondition);
    /// Runs the agenda until no propagator has anything left to do
    fn fixpoint(&mut self) -> CPResult<()>;
}

/// A CP model groups every facet a client manipulates: the variables and
/// their domains (DomainStore), the constraints (ConstraintStore), the
/// choice point management (SaveAndRestore) and, for the stateful
/// propagators, the reversible tracking lists of the state manager.
pub trait CpModel: DomainStore + TrackingListManager + ConstraintStore + SaveAndRestore {}

/// The model implementation backed by the trailed state manager; this is
/// what client code normally instantiates.
pub type DefaultCpModel = CpModelImpl<TrailedStateManager>;

/// One subscription of a propagator to a domain condition.
#[derive(Debug, Clone, Copy)]
struct Watch {
    /// the watched condition
    condition: DomainCondition,
    /// the propagator to schedule when the condition fires
    constraint: Constraint,
}

/// Registration is backtrack aware: a propagator posted (or a watch added)
/// below a choice point must vanish when the search unwinds past it.
/// Rather than trailing the vectors themselves, the model records their
/// live lengths as managed integers and truncates to the restored lengths
/// after each backtrack.
#[derive(Debug, Clone, Copy)]
struct LiveSizes {
    /// number of live entries of the propagators vector
    propagators: ReversibleInt,
    /// number of live entries of the watch list
    watches: ReversibleInt,
}

/// The provided implementation of a CP model.
///
/// Scheduling works with an explicit agenda. Narrowing operations leave
/// events on the domain store; between two propagator executions the
/// fixpoint sweeps these events over the watch list and appends every
/// propagator whose condition fired -- and which is not already waiting --
/// to a FIFO agenda. Propagators hence run in an order determined only by
/// the subscription order and the domain events, never by iteration order
/// of some hash container.
pub struct CpModelImpl<T: StateManager> {
    /// the variables, their domains, and the pending domain events
    store: DomainStoreImpl<T>,
    /// every live propagator, in posting order
    propagators: Vec<Box<dyn Propagator>>,
    /// every live condition subscription, in subscription order
    watches: Vec<Watch>,
    /// the backtrack aware lengths of the two vectors above
    live: LiveSizes,
    /// pending[i] is true iff propagator i currently sits in the agenda
    pending: Vec<bool>,
    /// the propagators awaiting execution, oldest first
    agenda: VecDeque<Constraint>,
}

impl<T: StateManager> CpModel for CpModelImpl<T> {}

impl<T: StateManager> CpModelImpl<T> {
    /// Creates an empty model on top of the given state manager
    pub fn new(mut sm: T) -> Self {
        let live = LiveSizes {
            propagators: sm.manage_int(0),
            watches: sm.manage_int(0),
        };
        Self {
            store: DomainStoreImpl::new(sm),
            propagators: vec![],
            watches: vec![],
            live,
            pending: vec![],
            agenda: VecDeque::new(),
        }
    }

    /// Sweeps the pending domain events over the watch list, appending the
    /// propagators whose condition fired to the agenda. The `pending` marks
    /// guarantee a propagator waits in the agenda at most once.
    fn absorb_events(&mut self) {
        let watches = &self.watches;
        let pending = &mut self.pending;
        let agenda = &mut self.agenda;
        self.store.for_each_event(|event| {
            for watch in watches.iter() {
                if watch.condition.fires_on(event) && !pending[watch.constraint.0] {
                    pending[watch.constraint.0] = true;
                    agenda.push_back(watch.constraint);
                }
            }
        });
        self.store.clear_events();
    }
}

//------------------------------------------------------------------------------
// Constraint store facet
//------------------------------------------------------------------------------
impl<T: StateManager> ConstraintStore for CpModelImpl<T> {
    fn install(&mut self, modeling_construct: &dyn ModelingConstruct) {
        modeling_construct.install(self)
    }

    fn post(&mut self, propagator: Box<dyn Propagator>) -> Constraint {
        let constraint = Constraint(self.propagators.len());
        self.propagators.push(propagator);
        self.pending.push(false);
        let count = self.live.propagators;
        self.store.state_manager_mut().increment(count);
        constraint
    }

    fn schedule(&mut self, constraint: Constraint) {
        if !self.pending[constraint.0] {
            self.pending[constraint.0] = true;
            self.agenda.push_back(constraint);
        }
    }

    fn propagate_on(&mut self, constraint: Constraint, cond: DomainCondition) {
        // a watch is worth recording once
        let duplicate = self
            .watches
            .iter()
            .any(|watch| watch.constraint == constraint && watch.condition == cond);
        if !duplicate {
            self.watches.push(Watch {
                condition: cond,
                constraint,
            });
            let count = self.live.watches;
            self.store.state_manager_mut().increment(count);
        }
    }

    fn fixpoint(&mut self) -> CPResult<()> {
        loop {
            self.absorb_events();
            let constraint = match self.agenda.pop_front() {
                Some(constraint) => constraint,
                None => return CPResult::Ok(()),
            };
            self.pending[constraint.0] = false;
            log::trace!("fixpoint: running propagator {}", constraint.0);
            self.propagators[constraint.0].propagate(&mut self.store)?;
        }
    }
}

//------------------------------------------------------------------------------
// Save and restore facet
//------------------------------------------------------------------------------
impl<T: StateManager> SaveAndRestore for CpModelImpl<T> {
    fn save_state(&mut self) {
        self.store.save_state()
    }

    fn restore_state(&mut self) {
        self.store.restore_state();

        // registrations made below the abandoned node disappear wholesale:
        // the restored live lengths say how much of the vectors survives
        let props = self.store.state_manager().get_int(self.live.propagators) as usize;
        let watches = self.store.state_manager().get_int(self.live.watches) as usize;
        self.propagators.truncate(props);
        self.pending.truncate(props);
        self.watches.truncate(watches);

        // whatever was awaiting propagation belonged to that subtree too
        self.agenda.clear();
        self.pending.iter_mut().for_each(|waiting| *waiting = false);
    }
}

//------------------------------------------------------------------------------
// Domain store facet
//------------------------------------------------------------------------------
impl<T: StateManager> DomainStore for CpModelImpl<T> {
    fn new_int_var(&mut self, min: isize, max: isize) -> Variable {
        self.store.new_int_var(min, max)
    }

    fn min(&self, var: Variable) -> Option<isize> {
        self.store.min(var)
    }

    fn max(&self, var: Variable) -> Option<isize> {
        self.store.max(var)
    }

    fn size(&self, var: Variable) -> usize {
        self.store.size(var)
    }

    fn contains(&self, var: Variable, value: isize) -> bool {
        self.store.contains(var, value)
    }

    fn next_value(&self, var: Variable, value: isize) -> Option<isize> {
        self.store.next_value(var, value)
    }

    fn fix(&mut self, var: Variable, value: isize) -> CPResult<bool> {
        self.store.fix(var, value)
    }

    fn remove(&mut self, var: Variable, value: isize) -> CPResult<bool> {
        self.store.remove(var, value)
    }

    fn remove_below(&mut self, var: Variable, value: isize) -> CPResult<bool> {
        self.store.remove_below(var, value)
    }

    fn remove_above(&mut self, var: Variable, value: isize) -> CPResult<bool> {
        self.store.remove_above(var, value)
    }
}

//------------------------------------------------------------------------------
// Tracking lists facet
//------------------------------------------------------------------------------
impl<T: StateManager> TrackingListManager for CpModelImpl<T> {
    fn manage_tracking_list(&mut self, a: isize, b: isize) -> ReversibleTrackingList {
        self.store.manage_tracking_list(a, b)
    }
    fn tracking_list_get_next(&self, id: ReversibleTrackingList, e: isize) -> isize {
        self.store.tracking_list_get_next(id, e)
    }
    fn tracking_list_get_previous(&self, id: ReversibleTrackingList, e: isize) -> isize {
        self.store.tracking_list_get_previous(id, e)
    }
    fn tracking_list_get_source(&self, id: ReversibleTrackingList) -> isize {
        self.store.tracking_list_get_source(id)
    }
    fn tracking_list_get_sink(&self, id: ReversibleTrackingList) -> isize {
        self.store.tracking_list_get_sink(id)
    }
    fn tracking_list_has_next(&self, id: ReversibleTrackingList, e: isize) -> bool {
        self.store.tracking_list_has_next(id, e)
    }
    fn tracking_list_has_previous(&self, id: ReversibleTrackingList, e: isize) -> bool {
        self.store.tracking_list_has_previous(id, e)
    }
    fn tracking_list_is_present(&self, id: ReversibleTrackingList, e: isize) -> bool {
        self.store.tracking_list_is_present(id, e)
    }
    fn tracking_list_get_size(&self, id: ReversibleTrackingList) -> usize {
        self.store.tracking_list_get_size(id)
    }
    fn tracking_list_get_universe_size(&self, id: ReversibleTrackingList) -> usize {
        self.store.tracking_list_get_universe_size(id)
    }
    fn tracking_list_is_empty(&self, id: ReversibleTrackingList) -> bool {
        self.store.tracking_list_is_empty(id)
    }
    fn tracking_list_remove(&mut self, id: ReversibleTrackingList, e: isize) {
        self.store.tracking_list_remove(id, e)
    }
    fn tracking_list_refill(&mut self, id: ReversibleTrackingList) {
        self.store.tracking_list_refill(id)
    }
    fn tracking_list_remove_from_universe(&mut self, id: ReversibleTrackingList, e: isize) {
        self.store.tracking_list_remove_from_universe(id, e)
    }
    fn tracking_list_remove_from_universe_trailed(&mut self, id: ReversibleTrackingList, e: isize) {
        self.store.tracking_list_remove_from_universe_trailed(id, e)
    }
    fn tracking_list_track_left(&self, id: ReversibleTrackingList, e: isize) -> isize {
        self.store.tracking_list_track_left(id, e)
    }
}

impl<T: StateManager> From<T> for CpModelImpl<T> {
    fn from(sm: T) -> Self {
        Self::new(sm)
    }
}
impl<T: StateManager + Default> Default for CpModelImpl<T> {
    fn default() -> Self {
        Self::from(T::default())
    }
}

// #############################################################################
// ### UNIT TESTS ##############################################################
// #############################################################################


//~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~
//~~~~ SAVE AND RESTORE ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~
//~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~
#[cfg(test)]
mod test_default_model_saveandrestore {
    use crate::Inconsistency;

    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn save_and_restore_state_should_work_together() {
        let mut ds = DefaultCpModel::default();
        let x = ds.new_int_var(5, 10);
        let y = ds.new_int_var(0, 1);

        assert!(!ds.is_fixed(x));
        assert!(!ds.is_fixed(y));
        ds.save_state();

        assert_eq!(ds.fix(x, 9), Ok(true));
        assert_eq!(ds.fix(y, 0), Ok(true));
        assert!(ds.is_fixed(x));
        assert!(ds.is_fixed(y));

        ds.restore_state();
        assert!(!ds.is_fixed(x));
        assert!(!ds.is_fixed(y));
        assert_eq!(ds.size(x), 6);
        assert_eq!(ds.size(y), 2);
    }

    /*
    Unfortunately, these are best tested together (long-ish test)
    - restore drops all stale propagators
    - a stale propagator is never fired after having been dropped on restore
    - restore detaches all stale propagators
    - restore drops all stale watches
    */
    #[test]
    fn restore_drops_all_stale_propagators_and_watches() {
        let mut ds = DefaultCpModel::default();
        let x = ds.new_int_var(5, 10);
        let y = ds.new_int_var(5, 10);
        let z = ds.new_int_var(5, 10);

        let flag_x = Rc::new(RefCell::new(false));
        let flag_y = Rc::new(RefCell::new(false));
        let flag_z = Rc::new(RefCell::new(false));

        // constraint x is created and installed at root level. it is never
        // removed, and it is fired every time the domain of variable x is
        // changed.
        let rc_flag_x = flag_x.clone();
        let constraint_x = ds.post(Box::new(move |_: &mut dyn PropagationContext| {
            *rc_flag_x.borrow_mut() = true;
            Ok(())
        }));
        ds.propagate_on(constraint_x, DomainCondition::DomainChanged(x));
        ds.save_state();

        assert_eq!(1, ds.propagators.len());
        assert_eq!(1, ds.watches.len());
        //
        assert_eq!(Ok(true), ds.remove(x, 5));
        assert_eq!(Ok(()), ds.fixpoint());
        assert!(*flag_x.borrow());
        assert!(!*flag_y.borrow());
        assert!(!*flag_z.borrow());
        *flag_x.borrow_mut() = false;

        // constraint y is created at first level but not attached until
        // level 2. reverting back to level 1 from level 2 must not drop the
        // propagator but it should make it stop reacting to changes in the
        // domain of y
        let rc_flag_y = flag_y.clone();
        let constraint_y = ds.post(Box::new(move |_: &mut dyn PropagationContext| {
            *rc_flag_y.borrow_mut() = true;
            Ok(())
        }));
        ds.save_state();

        assert_eq!(2, ds.propagators.len());
        assert_eq!(1, ds.watches.len());

        ds.propagate_on(constraint_y, DomainCondition::DomainChanged(y));

        // constraint z is created and installed at level 2. it must be
        // deleted completely upon restoration
        let rc_flag_z = flag_z.clone();
        let constraint_z = ds.post(Box::new(move |_: &mut dyn PropagationContext| {
            *rc_flag_z.borrow_mut() = true;
            Ok(())
        }));
        ds.propagate_on(constraint_z, DomainCondition::IsFixed(z));
        ds.save_state();

        ds.propagate_on(constraint_z, DomainCondition::DomainChanged(z));
        // we are at level 3 here
        assert_eq!(3, ds.propagators.len());
        assert_eq!(4, ds.watches.len());
        //
        assert_eq!(Ok(true), ds.remove(x, 7));
        assert_eq!(Ok(true), ds.remove(y, 7));
        assert_eq!(Ok(true), ds.remove(z, 7));
        assert_eq!(Ok(()), ds.fixpoint());
        assert!(*flag_x.borrow());
        assert!(*flag_y.borrow());
        assert!(*flag_z.borrow());
        *flag_x.borrow_mut() = false;
        *flag_y.borrow_mut() = false;
        *flag_z.borrow_mut() = false;

        ds.restore_state();
        // we are back at level 2 -> domain changed no longer attached to z
        assert_eq!(3, ds.propagators.len());
        assert_eq!(3, ds.watches.len());
        //
        assert_eq!(Ok(true), ds.remove(x, 8));
        assert_eq!(Ok(true), ds.remove(y, 8));
        assert_eq!(Ok(true), ds.remove(z, 8));
        assert_eq!(Ok(()), ds.fixpoint());
        assert!(*flag_x.borrow());
        assert!(*flag_y.borrow());
        assert!(!*flag_z.borrow());
        *flag_x.borrow_mut() = false;
        *flag_y.borrow_mut() = false;

        // still at level 2 -> fixed event still attached to z
        assert_eq!(Ok(true), ds.remove(x, 7));
        assert_eq!(Ok(true), ds.remove(y, 7));
        assert_eq!(Ok(true), ds.fix(z, 7));
        assert_eq!(Ok(()), ds.fixpoint());
        assert!(*flag_x.borrow());
        assert!(*flag_y.borrow());
        assert!(*flag_z.borrow());
        *flag_x.borrow_mut() = false;
        *flag_y.borrow_mut() = false;
        *flag_z.borrow_mut() = false;

        // level 1: there are two propagators left but only one is watching
        ds.restore_state();
        assert_eq!(2, ds.propagators.len());
        assert_eq!(1, ds.watches.len());
        //
        assert_eq!(Ok(true), ds.remove(x, 7));
        assert_eq!(Ok(true), ds.remove(y, 7));
        assert_eq!(Ok(true), ds.remove(z, 7));
        assert_eq!(Ok(()), ds.fixpoint());
        assert!(*flag_x.borrow());
        assert!(!*flag_y.borrow());
        assert!(!*flag_z.borrow());
        *flag_x.borrow_mut() = false;

        // level 0: there is only one propagator left
        ds.restore_state();
        assert_eq!(1, ds.propagators.len());
        assert_eq!(1, ds.watches.len());
        //
        assert_eq!(Ok(true), ds.remove(x, 7));
        assert_eq!(Ok(true), ds.remove(y, 7));
        assert_eq!(Ok(true), ds.remove(z, 7));
        assert_eq!(Ok(()), ds.fixpoint());
        assert!(*flag_x.borrow());
        assert!(!*flag_y.borrow());
        assert!(!*flag_z.borrow());
    }

    #[test]
    fn restore_empties_the_agenda() {
        let mut model = DefaultCpModel::default();
        let c = model.post(Box::new(move |_: &mut dyn PropagationContext| {
            Err(Inconsistency)
        }));
        model.save_state();
        model.schedule(c);
        model.restore_state();
        assert_eq!(Ok(()), model.fixpoint());
    }
}
