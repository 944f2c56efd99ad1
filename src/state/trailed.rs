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

//! This module defines the data structures and utilities that are used to
//! save and restore data from the solver trail.
use super::*;

//~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~
//~~~~ TRAIL DATA ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~
//~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~

/// This structure keeps track of the information about one given level: the
/// length of its trail and the count of each kind of resources that are
/// managed by the state manager
#[derive(Debug, Clone, Copy, Default)]
struct Level {
    /// the length of the trail at the moment this layer was started
    trail_size: usize,

    /// how many integers have already been recorded ?
    integers: usize,

    /// how many bitsets have already been recorded ?
    bit_sets: usize,
    /// length of the bitsets words storage
    bit_set_words: usize,

    /// how many tracking lists have already been recorded ?
    tracking_lists: usize,
    /// length of the tracking lists link storage (succ and pred)
    tracking_links: usize,
    /// length of the tracking lists cell storage (present and removed)
    tracking_cells: usize,
}

/// An entry that is used to save/restore data from the trail. The
/// restoration loop dispatches over these tagged entries in LIFO order,
/// which is how the engine implements the "undo actions" a backtrack
/// environment is expected to replay.
#[derive(Debug, Clone, Copy)]
enum TrailEntry {
    /// An entry related to the restoration of an integer value
    IntEntry(IntState),
    /// An entry related to the restoration of an element inside the
    /// universe of a tracking list
    ListUniverseEntry {
        /// position of the impacted tracking list
        list: usize,
        /// index (not value) of the element to relink
        index: isize,
    },
}

//~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~
//~~~~ STATE MANAGER ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~
//~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~

/// A simple state manager that can manage integers, bitsets and tracking
/// lists (basically any reversible data structure ends up being managed by
/// this struct)
#[derive(Debug, Clone)]
pub struct TrailedStateManager {
    /// At what 'time' was this data modified to the point where it needed
    /// being saved ? This clock is bumped on every `save_state` and lets the
    /// manager skip trailing a datum that was already saved within the
    /// current level.
    clock: usize,
    /// The previous values that are saved on the trail
    trail: Vec<TrailEntry>,
    /// Some book keeping to track what needs and what doesn't need
    /// to be restored upon manager `pop`
    levels: Vec<Level>,

    /// The current value of the various managed data
    integers: Vec<IntState>,

    /// Holds the metadata about the managed bitsets
    bit_sets: Vec<BitSet>,
    /// Holds the words of the managed bitsets. Each word is a plain managed
    /// integer, which is how the bitsets inherit their trailing behavior.
    bit_set_words: Vec<ReversibleInt>,

    /// Holds the metadata about the managed tracking lists
    tracking_lists: Vec<TrackingListData>,
    /// successor links of the tracking lists. For a list whose link storage
    /// starts at `links`, the slot `links + i + 1` holds the successor of
    /// the element with index i (slot `links + 0` is the successor of the
    /// artificial source)
    tracking_succ: Vec<isize>,
    /// predecessor links of the tracking lists. The slot `links + i` holds
    /// the predecessor of the element with index i (slot
    /// `links + max_size` is the predecessor of the artificial sink)
    tracking_pred: Vec<isize>,
    /// the per-list stack of indices unlinked by `tracking_list_remove`
    tracking_removed: Vec<isize>,
    /// presence bit of each element of each tracking list
    tracking_present: Vec<bool>,
}
impl Default for TrailedStateManager {
    fn default() -> Self {
        Self::new()
    }
}
impl TrailedStateManager {
    /// Creates a new manager
    pub fn new() -> Self {
        Self {
            clock: 0,
            trail: vec![],
            //
            integers: vec![],
            //
            bit_sets: vec![],
            bit_set_words: vec![],
            //
            tracking_lists: vec![],
            tracking_succ: vec![],
            tracking_pred: vec![],
            tracking_removed: vec![],
            tracking_present: vec![],

            levels: vec![Level::default()],
        }
    }
}
impl StateManager for TrailedStateManager {}

//------------------------------------------------------------------------------
// Save and Restore management
//------------------------------------------------------------------------------
impl SaveAndRestore for TrailedStateManager {
    /// Saves the current state
    fn save_state(&mut self) {
        self.clock += 1;

        // additional book keeping
        self.levels.push(Level {
            trail_size: self.trail.len(),
            //
            integers: self.integers.len(),
            //
            bit_sets: self.bit_sets.len(),
            bit_set_words: self.bit_set_words.len(),
            //
            tracking_lists: self.tracking_lists.len(),
            tracking_links: self.tracking_succ.len(),
            tracking_cells: self.tracking_present.len(),
        })
    }
    /// Restores the previous state
    fn restore_state(&mut self) {
        let level = self
            .levels
            .pop()
            .expect("cannot pop above the root level of the state manager");

        // restore whatever needs to be restored. The trail is replayed in
        // LIFO order, which is what makes nested universe removals of the
        // tracking lists come back in the right sequence.
        for entry in self.trail.iter().skip(level.trail_size).rev().copied() {
            match entry {
                TrailEntry::IntEntry(state) => self.integers[state.id.0] = state,
                TrailEntry::ListUniverseEntry { list, index } => {
                    let ls = self.tracking_lists[list];
                    let i = index;
                    // the element own slots were left untouched when it was
                    // unlinked, hence they still identify its position
                    let pi = self.tracking_pred[ls.links + i as usize];
                    let si = self.tracking_succ[ls.links + (i + 1) as usize];
                    self.tracking_succ[ls.links + (pi + 1) as usize] = i;
                    self.tracking_pred[ls.links + si as usize] = i;
                    self.tracking_lists[list].universe_size += 1;
                    self.tracking_present[ls.cells + i as usize] = true;
                }
            }
        }
        // drop stale trail entries
        self.trail.truncate(level.trail_size);

        // integers book keeping
        self.integers.truncate(level.integers);
        // bitsets book keeping
        self.bit_sets.truncate(level.bit_sets);
        self.bit_set_words.truncate(level.bit_set_words);
        // tracking lists book keeping
        self.tracking_lists.truncate(level.tracking_lists);
        self.tracking_succ.truncate(level.tracking_links);
        self.tracking_pred.truncate(level.tracking_links);
        self.tracking_removed.truncate(level.tracking_cells);
        self.tracking_present.truncate(level.tracking_cells);
    }
}

//------------------------------------------------------------------------------
// Int management
//------------------------------------------------------------------------------
/// The state of an integer that can be saved and restored
#[derive(Debug, Clone, Copy)]
struct IntState {
    /// The identifier of the managed resource
    id: ReversibleInt,
    /// At what 'time' was this data modified to the point where it needed
    /// being saved ?
    clock: usize,
    /// The value that will be restored in the managed data
    value: isize,
}

impl IntManager for TrailedStateManager {
    /// creates a new managed integer
    fn manage_int(&mut self, value: isize) -> ReversibleInt {
        let id = ReversibleInt(self.integers.len());
        self.integers.push(IntState {
            id,
            clock: self.clock,
            value,
        });
        id
    }
    /// returns the value of a managed integer
    fn get_int(&self, id: ReversibleInt) -> isize {
        self.integers[id.0].value
    }
    /// sets a managed integer's value and returns the new value
    fn set_int(&mut self, id: ReversibleInt, value: isize) -> isize {
        let curr = self.integers[id.0];
        // if the value is unchanged there is no need to do anything
        if value != curr.value {
            // do i need to trail this data ?
            if curr.clock < self.clock {
                self.trail.push(TrailEntry::IntEntry(curr));
                self.integers[id.0] = IntState {
                    id,
                    clock: self.clock,
                    value,
                }
            // apparently i don't need to save it on the trail. i can modify
            // it right away
            } else {
                self.integers[id.0].value = value;
            }
        }
        value
    }
    /// increments a managed integer's value
    fn increment(&mut self, id: ReversibleInt) -> isize {
        self.set_int(id, self.get_int(id) + 1)
    }
    /// decrements a managed integer's value
    fn decrement(&mut self, id: ReversibleInt) -> isize {
        self.set_int(id, self.get_int(id) - 1)
    }
}

//------------------------------------------------------------------------------
// Bitsets management
//------------------------------------------------------------------------------
/// The information that needs to be maintained in order to deal with a
/// managed bitset
#[derive(Debug, Clone, Copy)]
struct BitSet {
    /// offset of the values
    val_offset: isize,
    /// capacity of the bitset (number of indexable values)
    capa: usize,
    /// start index of this bitset inside the shared words storage
    words: usize,
    /// number of 64 bits words used by this bitset
    n_words: usize,
    /// the current number of values in the set
    size: ReversibleInt,
    /// the index (0 based, not the value) of the minimum item in the set
    min: ReversibleInt,
    /// the index (0 based, not the value) of the maximum item in the set
    max: ReversibleInt,
}

impl BitSetManager for TrailedStateManager {
    fn manage_bit_set(&mut self, n: usize, val_offset: isize) -> ReversibleBitSet {
        assert!(n > 0, "a bitset must hold at least one value");
        let id = self.bit_sets.len();
        let words = self.bit_set_words.len();
        let n_words = (n + 63) / 64;

        for w in 0..n_words {
            let word = if (w + 1) * 64 <= n {
                !0_u64
            } else {
                (1_u64 << (n - w * 64)) - 1
            };
            let word = self.manage_int(word as isize);
            self.bit_set_words.push(word);
        }
        let size = self.manage_int(n as isize);
        let min = self.manage_int(0);
        let max = self.manage_int(n as isize - 1);

        self.bit_sets.push(BitSet {
            val_offset,
            capa: n,
            words,
            n_words,
            size,
            min,
            max,
        });
        ReversibleBitSet(id)
    }

    fn bit_set_size(&self, id: ReversibleBitSet) -> usize {
        self.get_int(self.bit_sets[id.0].size) as usize
    }

    fn bit_set_is_empty(&self, id: ReversibleBitSet) -> bool {
        self.bit_set_size(id) == 0
    }

    fn bit_set_get_min(&self, id: ReversibleBitSet) -> Option<isize> {
        let bs = self.bit_sets[id.0];
        if self.get_int(bs.size) <= 0 {
            None
        } else {
            Some(self.get_int(bs.min) + bs.val_offset)
        }
    }

    fn bit_set_get_max(&self, id: ReversibleBitSet) -> Option<isize> {
        let bs = self.bit_sets[id.0];
        if self.get_int(bs.size) <= 0 {
            None
        } else {
            Some(self.get_int(bs.max) + bs.val_offset)
        }
    }

    fn bit_set_contains(&self, id: ReversibleBitSet, value: isize) -> bool {
        let bs = self.bit_sets[id.0];
        let v = value - bs.val_offset;
        if v < 0 || v >= bs.capa as isize {
            false
        } else {
            let v = v as usize;
            (self.word(bs, v / 64) >> (v % 64)) & 1 == 1
        }
    }

    fn bit_set_next_value(&self, id: ReversibleBitSet, value: isize) -> Option<isize> {
        let bs = self.bit_sets[id.0];
        let v = value - bs.val_offset + 1;
        let from = if v < 0 { 0 } else { v as usize };
        self.next_set_bit(bs, from).map(|i| i as isize + bs.val_offset)
    }

    fn bit_set_remove(&mut self, id: ReversibleBitSet, value: isize) -> bool {
        if !self.bit_set_contains(id, value) {
            false
        } else {
            let bs = self.bit_sets[id.0];
            let v = (value - bs.val_offset) as usize;
            let word = self.word(bs, v / 64) & !(1_u64 << (v % 64));
            self.set_word(bs, v / 64, word);
            let size = self.decrement(bs.size);

            // maintain the bounds
            if size > 0 {
                if self.get_int(bs.min) == v as isize {
                    // this is guaranteed to be ok since the set is not empty
                    let min = self.next_set_bit(bs, v + 1).unwrap();
                    self.set_int(bs.min, min as isize);
                }
                if self.get_int(bs.max) == v as isize {
                    // same here: the set is not empty and min < v
                    let max = self.prev_set_bit(bs, v - 1).unwrap();
                    self.set_int(bs.max, max as isize);
                }
            }
            true
        }
    }

    fn bit_set_remove_all(&mut self, id: ReversibleBitSet) {
        let bs = self.bit_sets[id.0];
        for w in 0..bs.n_words {
            self.set_word(bs, w, 0);
        }
        self.set_int(bs.size, 0);
    }

    fn bit_set_remove_all_but(&mut self, id: ReversibleBitSet, value: isize) {
        if self.bit_set_contains(id, value) {
            let bs = self.bit_sets[id.0];
            let v = (value - bs.val_offset) as usize;
            for w in 0..bs.n_words {
                let word = if w == v / 64 { 1_u64 << (v % 64) } else { 0 };
                self.set_word(bs, w, word);
            }
            self.set_int(bs.size, 1);
            self.set_int(bs.min, v as isize);
            self.set_int(bs.max, v as isize);
        } else {
            self.bit_set_remove_all(id);
        }
    }

    fn bit_set_remove_below(&mut self, id: ReversibleBitSet, value: isize) {
        let bs = self.bit_sets[id.0];
        if self.get_int(bs.size) == 0 {
            return;
        }
        let v = value - bs.val_offset;
        if v <= self.get_int(bs.min) {
            return;
        }
        if v > self.get_int(bs.max) {
            self.bit_set_remove_all(id);
            return;
        }
        // here min < v <= max, hence 0 < v < capa
        let v = v as usize;
        for w in 0..v / 64 {
            self.set_word(bs, w, 0);
        }
        let bit = v % 64;
        if bit > 0 {
            let word = self.word(bs, v / 64) & (!0_u64 << bit);
            self.set_word(bs, v / 64, word);
        }
        let size = self.popcount(bs);
        self.set_int(bs.size, size as isize);
        // the old maximum survived, hence the set is not empty
        let min = self.next_set_bit(bs, v).unwrap();
        self.set_int(bs.min, min as isize);
    }

    fn bit_set_remove_above(&mut self, id: ReversibleBitSet, value: isize) {
        let bs = self.bit_sets[id.0];
        if self.get_int(bs.size) == 0 {
            return;
        }
        let v = value - bs.val_offset;
        if v >= self.get_int(bs.max) {
            return;
        }
        if v < self.get_int(bs.min) {
            self.bit_set_remove_all(id);
            return;
        }
        // here min <= v < max, hence 0 <= v < capa - 1
        let v = v as usize;
        for w in v / 64 + 1..bs.n_words {
            self.set_word(bs, w, 0);
        }
        let bit = v % 64;
        if bit < 63 {
            let word = self.word(bs, v / 64) & ((1_u64 << (bit + 1)) - 1);
            self.set_word(bs, v / 64, word);
        }
        let size = self.popcount(bs);
        self.set_int(bs.size, size as isize);
        // the old minimum survived, hence the set is not empty
        let max = self.prev_set_bit(bs, v).unwrap();
        self.set_int(bs.max, max as isize);
    }
}

//------------------------------------------------------------------------------
// Tracking lists management
//------------------------------------------------------------------------------
/// The information that needs to be maintained in order to deal with a
/// managed tracking list
#[derive(Debug, Clone, Copy)]
struct TrackingListData {
    /// the lowest element of the universe
    min_value: isize,
    /// number of elements of the initial universe [a, b]
    max_size: usize,
    /// start index of this list inside the shared link storages
    links: usize,
    /// start index of this list inside the shared cell storages
    cells: usize,
    /// number of indices unlinked by `remove` and not refilled yet
    top_removed: usize,
    /// current number of elements in the universe
    universe_size: usize,
}

impl TrackingListManager for TrailedStateManager {
    fn manage_tracking_list(&mut self, a: isize, b: isize) -> ReversibleTrackingList {
        assert!(a <= b, "the universe of a tracking list cannot be empty");
        let id = self.tracking_lists.len();
        let max_size = (b - a + 1) as usize;
        let links = self.tracking_succ.len();
        let cells = self.tracking_present.len();

        // slot 0 holds the successor of the source, slot max_size holds the
        // predecessor of the sink
        for i in 0..=max_size {
            self.tracking_succ.push(i as isize);
            self.tracking_pred.push(i as isize - 1);
        }
        for _ in 0..max_size {
            self.tracking_removed.push(0);
            self.tracking_present.push(true);
        }

        self.tracking_lists.push(TrackingListData {
            min_value: a,
            max_size,
            links,
            cells,
            top_removed: 0,
            universe_size: max_size,
        });
        ReversibleTrackingList(id)
    }

    fn tracking_list_get_next(&self, id: ReversibleTrackingList, e: isize) -> isize {
        let ls = self.tracking_lists[id.0];
        let i = e - ls.min_value;
        ls.min_value + self.tracking_succ[ls.links + (i + 1) as usize]
    }

    fn tracking_list_get_previous(&self, id: ReversibleTrackingList, e: isize) -> isize {
        let ls = self.tracking_lists[id.0];
        let i = e - ls.min_value;
        ls.min_value + self.tracking_pred[ls.links + i as usize]
    }

    fn tracking_list_get_source(&self, id: ReversibleTrackingList) -> isize {
        self.tracking_lists[id.0].min_value - 1
    }

    fn tracking_list_get_sink(&self, id: ReversibleTrackingList) -> isize {
        let ls = self.tracking_lists[id.0];
        ls.min_value + ls.max_size as isize
    }

    fn tracking_list_has_next(&self, id: ReversibleTrackingList, e: isize) -> bool {
        self.tracking_list_get_next(id, e) != self.tracking_list_get_sink(id)
    }

    fn tracking_list_has_previous(&self, id: ReversibleTrackingList, e: isize) -> bool {
        self.tracking_list_get_previous(id, e) != self.tracking_list_get_source(id)
    }

    fn tracking_list_is_present(&self, id: ReversibleTrackingList, e: isize) -> bool {
        let ls = self.tracking_lists[id.0];
        self.tracking_present[ls.cells + (e - ls.min_value) as usize]
    }

    fn tracking_list_get_size(&self, id: ReversibleTrackingList) -> usize {
        let ls = self.tracking_lists[id.0];
        ls.universe_size - ls.top_removed
    }

    fn tracking_list_get_universe_size(&self, id: ReversibleTrackingList) -> usize {
        self.tracking_lists[id.0].universe_size
    }

    fn tracking_list_is_empty(&self, id: ReversibleTrackingList) -> bool {
        let ls = self.tracking_lists[id.0];
        ls.top_removed == ls.universe_size
    }

    fn tracking_list_remove(&mut self, id: ReversibleTrackingList, e: isize) {
        let ls = self.tracking_lists[id.0];
        let i = e - ls.min_value;
        assert!(
            self.tracking_present[ls.cells + i as usize],
            "cannot remove an element which is not present in the in-list"
        );
        let pi = self.tracking_pred[ls.links + i as usize];
        let si = self.tracking_succ[ls.links + (i + 1) as usize];
        self.tracking_succ[ls.links + (pi + 1) as usize] = si;
        self.tracking_pred[ls.links + si as usize] = pi;
        self.tracking_removed[ls.cells + ls.top_removed] = i;
        self.tracking_lists[id.0].top_removed += 1;
        self.tracking_present[ls.cells + i as usize] = false;
    }

    fn tracking_list_refill(&mut self, id: ReversibleTrackingList) {
        let ls = self.tracking_lists[id.0];
        let mut top = ls.top_removed;
        while top != 0 {
            let i = self.tracking_removed[ls.cells + top - 1];
            let pi = self.tracking_pred[ls.links + i as usize];
            let si = self.tracking_succ[ls.links + (i + 1) as usize];
            self.tracking_succ[ls.links + (pi + 1) as usize] = i;
            self.tracking_pred[ls.links + si as usize] = i;
            top -= 1;
            self.tracking_present[ls.cells + i as usize] = true;
        }
        self.tracking_lists[id.0].top_removed = 0;
    }

    fn tracking_list_remove_from_universe(&mut self, id: ReversibleTrackingList, e: isize) {
        let ls = self.tracking_lists[id.0];
        assert!(
            ls.top_removed == 0,
            "the universe can only shrink while the in-list equals the universe"
        );
        let i = e - ls.min_value;
        assert!(
            self.tracking_present[ls.cells + i as usize],
            "cannot remove an element which is not present in the in-list"
        );
        let pi = self.tracking_pred[ls.links + i as usize];
        let si = self.tracking_succ[ls.links + (i + 1) as usize];
        self.tracking_succ[ls.links + (pi + 1) as usize] = si;
        self.tracking_pred[ls.links + si as usize] = pi;
        self.tracking_lists[id.0].universe_size -= 1;
        self.tracking_present[ls.cells + i as usize] = false;
    }

    fn tracking_list_remove_from_universe_trailed(
        &mut self,
        id: ReversibleTrackingList,
        e: isize,
    ) {
        let ls = self.tracking_lists[id.0];
        let i = e - ls.min_value;
        self.tracking_list_remove_from_universe(id, e);
        self.trail.push(TrailEntry::ListUniverseEntry { list: id.0, index: i });
    }

    fn tracking_list_track_left(&self, id: ReversibleTrackingList, e: isize) -> isize {
        let ls = self.tracking_lists[id.0];
        let mut i = e - ls.min_value;
        while i >= 0 && !self.tracking_present[ls.cells + i as usize] {
            i = self.tracking_pred[ls.links + i as usize];
        }
        ls.min_value + i
    }
}

//~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~
// private methods
//~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~
impl TrailedStateManager {
    /// reads the w-th word of the given bitset
    fn word(&self, bs: BitSet, w: usize) -> u64 {
        self.get_int(self.bit_set_words[bs.words + w]) as u64
    }
    /// overwrites the w-th word of the given bitset
    fn set_word(&mut self, bs: BitSet, w: usize, word: u64) {
        let id = self.bit_set_words[bs.words + w];
        self.set_int(id, word as isize);
    }
    /// counts the items of the given bitset
    fn popcount(&self, bs: BitSet) -> usize {
        (0..bs.n_words)
            .map(|w| self.word(bs, w).count_ones() as usize)
            .sum()
    }
    /// index of the first set bit at position >= from (if any)
    fn next_set_bit(&self, bs: BitSet, from: usize) -> Option<usize> {
        let mut w = from / 64;
        if w >= bs.n_words {
            return None;
        }
        let mut cur = self.word(bs, w) & (!0_u64 << (from % 64));
        loop {
            if cur != 0 {
                return Some(w * 64 + cur.trailing_zeros() as usize);
            }
            w += 1;
            if w >= bs.n_words {
                return None;
            }
            cur = self.word(bs, w);
        }
    }
    /// index of the last set bit at position <= from (if any)
    fn prev_set_bit(&self, bs: BitSet, from: usize) -> Option<usize> {
        let mut w = from / 64;
        let bit = from % 64;
        let mask = if bit == 63 { !0_u64 } else { (1_u64 << (bit + 1)) - 1 };
        let mut cur = self.word(bs, w) & mask;
        loop {
            if cur != 0 {
                return Some(w * 64 + 63 - cur.leading_zeros() as usize);
            }
            if w == 0 {
                return None;
            }
            w -= 1;
            cur = self.word(bs, w);
        }
    }
}

// #############################################################################
// ### UNIT TESTS ##############################################################
// #############################################################################
