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

//! The state module comprises all traits and datastructures related to
//! the state (save and restore) management.
//!
//! # Note
//! The state manager have been thought of in terms of a visitor pattern.
//! While this might seem undesirable at first, this choice was operated for
//! * delivering the best possible performance at runtime
//! * getting over the absence of overloading in rust (which is good imho)
//! * maintaining the reversible objects themselves dead simple
//!
//! The state manager also plays the role of the *backtrack environment* of
//! the alldifferent filtering: the operations that shrink the universe of a
//! tracking list record a tagged entry on the trail, and the restoration
//! dispatches over these entries in LIFO order.

//~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~
//~~~~ MANAGED RESOURCES ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~
//~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~

/// The identifier of a managed integer resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ReversibleInt(pub(crate) usize);

/// The identifier of a managed bitset resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ReversibleBitSet(pub(crate) usize);

/// The identifier of a managed tracking list resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ReversibleTrackingList(pub(crate) usize);

//~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~
//~~~~ MANAGER TRAITS ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~
//~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~

/// A state manager is an object capable of saving and restoring the state of
/// all types of managed resources.
pub trait StateManager: SaveAndRestore + IntManager + BitSetManager + TrackingListManager {}

/// An implementation of this type is capable of saving and restoring the
/// state of the resources it manages.
pub trait SaveAndRestore {
    /// Saves the current state of all managed resources
    fn save_state(&mut self);
    /// Restores the previous state of all managed resources
    fn restore_state(&mut self);
}

/// All the operations that can be made on an integer resource
pub trait IntManager {
    /// creates a new managed integer
    fn manage_int(&mut self, value: isize) -> ReversibleInt;
    /// returns the value of a managed integer
    fn get_int(&self, id: ReversibleInt) -> isize;
    /// sets a managed integer's value and returns the new value
    fn set_int(&mut self, id: ReversibleInt, value: isize) -> isize;
    /// increments a managed integer's value
    fn increment(&mut self, id: ReversibleInt) -> isize;
    /// decrements a managed integer's value
    fn decrement(&mut self, id: ReversibleInt) -> isize;
}

/// All the operations that can be applied to a managed bitset. A bitset
/// stands for a set of integer values drawn from the interval
/// [val_offset, val_offset + n - 1]. Because it preserves the natural order
/// of the values it stores, it is the representation of choice for a
/// variable domain that must be iterated in ascending order.
pub trait BitSetManager {
    /// creates a new managed bitset holding the values
    /// [0 + val_offset, 1 + val_offset, ... , n-1 + val_offset]
    fn manage_bit_set(&mut self, n: usize, val_offset: isize) -> ReversibleBitSet;
    /// returns the number of values in the bitset
    fn bit_set_size(&self, id: ReversibleBitSet) -> usize;
    /// returns true iff the bitset is empty
    fn bit_set_is_empty(&self, id: ReversibleBitSet) -> bool;
    /// returns the minimum value of the bitset (if it exists)
    fn bit_set_get_min(&self, id: ReversibleBitSet) -> Option<isize>;
    /// returns the maximum value of the bitset (if it exists)
    fn bit_set_get_max(&self, id: ReversibleBitSet) -> Option<isize>;
    /// returns true iff the bitset contains the designated value
    fn bit_set_contains(&self, id: ReversibleBitSet, value: isize) -> bool;
    /// returns the smallest value of the bitset strictly greater than the
    /// given `value` (if there is one). The probe value needs not belong to
    /// the set
    fn bit_set_next_value(&self, id: ReversibleBitSet, value: isize) -> Option<isize>;
    /// removes the given value from the bitset and returns a boolean telling
    /// whether or not the value was actually deleted from the set
    fn bit_set_remove(&mut self, id: ReversibleBitSet, value: isize) -> bool;
    /// removes all values from the set
    fn bit_set_remove_all(&mut self, id: ReversibleBitSet);
    /// removes all values in the set except the given value (if it belongs
    /// to the set)
    fn bit_set_remove_all_but(&mut self, id: ReversibleBitSet, value: isize);
    /// remove from the set all the items having a value lower than the given
    /// `value`
    fn bit_set_remove_below(&mut self, id: ReversibleBitSet, value: isize);
    /// remove from the set all the items having a value greater than the
    /// given `value`
    fn bit_set_remove_above(&mut self, id: ReversibleBitSet, value: isize);
}

/// All the operations that can be applied to a managed tracking list.
///
/// A tracking list is a doubly linked list over the integer universe [a, b],
/// implemented by arrays, with an artificial source node before `a` and an
/// artificial sink node after `b`. The elements present in the list (the
/// "in-list") are always kept in ascending order. An element can be in one
/// of three states:
///
/// 1. present in the in-list,
/// 2. removed from the in-list but still in the universe (by
///    `tracking_list_remove`, undone in bulk by `tracking_list_refill`),
/// 3. removed from the universe itself (by
///    `tracking_list_remove_from_universe`, undone only by the trail when
///    the state manager backtracks -- and only for the trailed flavour).
///
/// The extra `track_left` operation returns the closest present element at
/// or before a given element, which lets a traversal skip over runs of
/// removed values cheaply.
pub trait TrackingListManager {
    /// creates a new managed tracking list over the universe [a, b]
    fn manage_tracking_list(&mut self, a: isize, b: isize) -> ReversibleTrackingList;
    /// returns the element following `e` in the in-list. When `e` was removed
    /// from the list, this returns the successor it had at removal time
    fn tracking_list_get_next(&self, id: ReversibleTrackingList, e: isize) -> isize;
    /// returns the element preceding `e` in the in-list. When `e` was removed
    /// from the list, this returns the predecessor it had at removal time
    fn tracking_list_get_previous(&self, id: ReversibleTrackingList, e: isize) -> isize;
    /// returns the artificial source element (a - 1)
    fn tracking_list_get_source(&self, id: ReversibleTrackingList) -> isize;
    /// returns the artificial sink element (b + 1)
    fn tracking_list_get_sink(&self, id: ReversibleTrackingList) -> isize;
    /// returns true iff `e` is not the last element of the in-list
    fn tracking_list_has_next(&self, id: ReversibleTrackingList, e: isize) -> bool;
    /// returns true iff `e` is not the first element of the in-list
    fn tracking_list_has_previous(&self, id: ReversibleTrackingList, e: isize) -> bool;
    /// returns true iff `e` is present in the in-list
    fn tracking_list_is_present(&self, id: ReversibleTrackingList, e: isize) -> bool;
    /// returns the number of elements present in the in-list
    fn tracking_list_get_size(&self, id: ReversibleTrackingList) -> usize;
    /// returns the number of elements in the universe
    fn tracking_list_get_universe_size(&self, id: ReversibleTrackingList) -> usize;
    /// returns true iff the in-list is empty
    fn tracking_list_is_empty(&self, id: ReversibleTrackingList) -> bool;
    /// unlinks `e` from the in-list and remembers it for the next refill.
    /// `e` must be present and must be neither the source nor the sink
    fn tracking_list_remove(&mut self, id: ReversibleTrackingList, e: isize);
    /// relinks all the elements unlinked by `tracking_list_remove` since the
    /// last refill, in reverse removal order. Afterwards the in-list is
    /// exactly the current universe
    fn tracking_list_refill(&mut self, id: ReversibleTrackingList);
    /// permanently removes `e` from the universe of the list. This must only
    /// be called when the in-list equals the universe (no pending removal)
    fn tracking_list_remove_from_universe(&mut self, id: ReversibleTrackingList, e: isize);
    /// removes `e` from the universe of the list like
    /// `tracking_list_remove_from_universe` does, but additionally records
    /// the removal on the trail so that the element is relinked (at the very
    /// same position) when the state manager backtracks past this point
    fn tracking_list_remove_from_universe_trailed(&mut self, id: ReversibleTrackingList, e: isize);
    /// returns the first present element encountered when walking from `e`
    /// (inclusive) towards the predecessors, or the source when there is
    /// none. `e` must not be the sink
    fn tracking_list_track_left(&self, id: ReversibleTrackingList, e: isize) -> isize;
}

/// The state manager is in charge of storing and restoring the data from
/// and to the trail
mod trailed;

pub use trailed::*;
