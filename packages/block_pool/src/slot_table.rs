use std::num::NonZero;

use crate::ReleaseProblem;

/// Bookkeeping for which slots of a pool are free and which are issued.
///
/// The table knows nothing about the memory behind the slots. It tracks occupancy in a side
/// table with one entry per slot, so membership checks are a single index operation.
///
/// Free slots form an intrusive stack threaded through the side table: every free entry stores
/// the index of the next free slot and `next_free_index` is the top of the stack. Releasing a
/// slot pushes it, acquiring pops it, which makes the most recently released slot the next one
/// to be issued. A fresh table issues slots in ascending index order.
#[derive(Debug)]
pub(crate) struct SlotTable {
    entries: Vec<SlotEntry>,

    /// Top of the free stack. Equal to the number of slots when no slot is free.
    next_free_index: usize,

    issued_count: usize,
}

/// Identifies one issue of a slot: the slot index plus the generation it was issued in.
///
/// The generation advances every time the slot is released, so a ticket kept around after its
/// slot was released (and perhaps issued again) no longer matches the table.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) struct SlotTicket {
    index: usize,
    generation: u64,
}

impl SlotTicket {
    #[must_use]
    pub(crate) fn index(&self) -> usize {
        self.index
    }

    #[cfg(test)]
    #[must_use]
    pub(crate) fn generation(&self) -> u64 {
        self.generation
    }
}

#[derive(Debug)]
struct SlotEntry {
    generation: u64,
    state: SlotState,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum SlotState {
    Free { next_free_index: usize },
    Issued,
}

impl SlotTable {
    #[must_use]
    pub(crate) fn new(slot_count: NonZero<usize>) -> Self {
        let entries = (0..slot_count.get())
            .map(|index| SlotEntry {
                generation: 0,
                state: SlotState::Free {
                    // Cannot overflow, the table would not fit in memory.
                    next_free_index: index.wrapping_add(1),
                },
            })
            .collect();

        Self {
            entries,
            next_free_index: 0,
            issued_count: 0,
        }
    }

    #[must_use]
    pub(crate) fn slot_count(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub(crate) fn issued_count(&self) -> usize {
        self.issued_count
    }

    #[must_use]
    pub(crate) fn free_count(&self) -> usize {
        // The issued count never exceeds the slot count.
        self.slot_count().wrapping_sub(self.issued_count)
    }

    #[must_use]
    pub(crate) fn is_exhausted(&self) -> bool {
        self.next_free_index >= self.slot_count()
    }

    /// Pops the most recently freed slot off the free stack and marks it issued.
    ///
    /// Returns `None` if every slot is already issued.
    #[must_use]
    pub(crate) fn acquire(&mut self) -> Option<SlotTicket> {
        let index = self.next_free_index;
        let entry = self.entries.get_mut(index)?;

        let SlotState::Free { next_free_index } = entry.state else {
            panic!("top of the free stack {index} points to an issued slot");
        };

        entry.state = SlotState::Issued;
        let generation = entry.generation;

        self.next_free_index = next_free_index;

        // Cannot overflow, we just took a slot that was not counted yet.
        self.issued_count = self.issued_count.wrapping_add(1);

        #[cfg(debug_assertions)]
        self.integrity_check();

        Some(SlotTicket { index, generation })
    }

    /// Checks whether `ticket` may be released, without changing anything.
    pub(crate) fn validate(&self, ticket: SlotTicket) -> Result<(), ReleaseProblem> {
        // An index we never handed out cannot have come from this table.
        let entry = self
            .entries
            .get(ticket.index)
            .ok_or(ReleaseProblem::ForeignPool)?;

        match entry.state {
            SlotState::Free { .. } => Err(ReleaseProblem::NotIssued),
            SlotState::Issued if entry.generation != ticket.generation => {
                Err(ReleaseProblem::StaleHandle)
            }
            SlotState::Issued => Ok(()),
        }
    }

    #[must_use]
    pub(crate) fn is_issued(&self, ticket: SlotTicket) -> bool {
        self.validate(ticket).is_ok()
    }

    /// Marks the slot free and pushes it on top of the free stack.
    ///
    /// On error, the table is left untouched.
    pub(crate) fn release(&mut self, ticket: SlotTicket) -> Result<(), ReleaseProblem> {
        self.validate(ticket)?;

        let next_free_index = self.next_free_index;

        let entry = self
            .entries
            .get_mut(ticket.index)
            .expect("validated tickets always point into the table");

        entry.state = SlotState::Free { next_free_index };
        entry.generation = entry.generation.wrapping_add(1);

        self.next_free_index = ticket.index;

        // Cannot underflow, the slot we just freed was counted as issued.
        self.issued_count = self.issued_count.wrapping_sub(1);

        #[cfg(debug_assertions)]
        self.integrity_check();

        Ok(())
    }

    /// Verifies that the free stack and the issued count agree with the per-slot states.
    #[cfg_attr(test, mutants::skip)] // This is essentially test logic, mutation is meaningless.
    #[cfg(debug_assertions)]
    #[allow(
        clippy::indexing_slicing,
        clippy::arithmetic_side_effects,
        reason = "integrity check needs array access"
    )]
    pub(crate) fn integrity_check(&self) {
        let slot_count = self.slot_count();

        let observed_issued = self
            .entries
            .iter()
            .filter(|entry| entry.state == SlotState::Issued)
            .count();

        assert_eq!(
            self.issued_count, observed_issued,
            "issued count {} does not match {observed_issued} observed issued slots out of {slot_count}",
            self.issued_count
        );

        // Walk the free stack. Every slot on it must be free and appear exactly once.
        let mut seen_on_stack = vec![false; slot_count];
        let mut stack_len = 0;
        let mut cursor = self.next_free_index;

        while cursor < slot_count {
            assert!(
                !seen_on_stack[cursor],
                "free stack visits slot {cursor} twice in a table of {slot_count} slots"
            );
            seen_on_stack[cursor] = true;
            stack_len += 1;

            match self.entries[cursor].state {
                SlotState::Free { next_free_index } => cursor = next_free_index,
                SlotState::Issued => {
                    panic!("free stack reaches issued slot {cursor} in a table of {slot_count} slots")
                }
            }
        }

        assert_eq!(
            cursor, slot_count,
            "free stack ends at out-of-bounds index {cursor} in a table of {slot_count} slots"
        );

        assert_eq!(
            stack_len + observed_issued,
            slot_count,
            "free stack of {stack_len} slots and {observed_issued} issued slots do not cover all {slot_count} slots"
        );
    }
}

#[cfg(test)]
#[allow(
    clippy::indexing_slicing,
    clippy::arithmetic_side_effects,
    clippy::modulo_arithmetic,
    reason = "tests focus on succinct code and do not need to tick all the boxes"
)]
mod tests {
    use new_zealand::nz;

    use super::*;

    #[test]
    fn smoke_test() {
        let mut table = SlotTable::new(nz!(3));

        assert_eq!(table.slot_count(), 3);
        assert_eq!(table.free_count(), 3);
        assert_eq!(table.issued_count(), 0);

        let a = table.acquire().unwrap();
        let b = table.acquire().unwrap();

        assert_eq!(table.issued_count(), 2);
        assert_eq!(table.free_count(), 1);
        assert!(table.is_issued(a));
        assert!(table.is_issued(b));

        table.release(a).unwrap();

        assert_eq!(table.issued_count(), 1);
        assert!(!table.is_issued(a));
        assert!(table.is_issued(b));
    }

    #[test]
    fn fresh_table_issues_in_ascending_order() {
        let mut table = SlotTable::new(nz!(4));

        let indexes: Vec<_> = (0..4).map(|_| table.acquire().unwrap().index()).collect();

        assert_eq!(indexes, vec![0, 1, 2, 3]);
    }

    #[test]
    fn most_recently_freed_is_issued_first() {
        let mut table = SlotTable::new(nz!(5));

        let a = table.acquire().unwrap();
        let b = table.acquire().unwrap();
        let c = table.acquire().unwrap();

        table.release(b).unwrap();
        table.release(c).unwrap();

        assert_eq!(table.acquire().unwrap().index(), c.index());
        assert_eq!(table.acquire().unwrap().index(), b.index());

        // a is still issued and the untouched tail comes next.
        assert!(table.is_issued(a));
        assert_eq!(table.acquire().unwrap().index(), 3);
    }

    #[test]
    fn exhausted_table_returns_none() {
        let mut table = SlotTable::new(nz!(2));

        let first = table.acquire().unwrap();
        _ = table.acquire().unwrap();

        assert!(table.is_exhausted());
        assert!(table.acquire().is_none());
        assert_eq!(table.issued_count(), 2);

        table.release(first).unwrap();

        assert!(!table.is_exhausted());
        assert_eq!(table.acquire().unwrap().index(), first.index());
    }

    #[test]
    fn double_release_is_rejected() {
        let mut table = SlotTable::new(nz!(3));

        let ticket = table.acquire().unwrap();
        table.release(ticket).unwrap();

        assert_eq!(table.release(ticket), Err(ReleaseProblem::NotIssued));
        assert_eq!(table.issued_count(), 0);
        assert_eq!(table.free_count(), 3);
    }

    #[test]
    fn stale_ticket_is_rejected_after_reissue() {
        let mut table = SlotTable::new(nz!(3));

        let old = table.acquire().unwrap();
        table.release(old).unwrap();

        let new = table.acquire().unwrap();
        assert_eq!(new.index(), old.index());
        assert_ne!(new.generation(), old.generation());

        assert_eq!(table.release(old), Err(ReleaseProblem::StaleHandle));
        assert!(table.is_issued(new));
        assert_eq!(table.issued_count(), 1);

        table.release(new).unwrap();
    }

    #[test]
    fn out_of_range_ticket_is_foreign() {
        let mut big = SlotTable::new(nz!(8));
        let mut small = SlotTable::new(nz!(2));

        let tickets: Vec<_> = (0..8).map(|_| big.acquire().unwrap()).collect();

        assert_eq!(small.release(tickets[7]), Err(ReleaseProblem::ForeignPool));
        assert_eq!(small.issued_count(), 0);
    }

    #[test]
    fn counts_always_cover_all_slots() {
        let mut table = SlotTable::new(nz!(7));
        let mut live = Vec::new();

        for round in 0_usize..50 {
            if round % 3 == 2 {
                if let Some(ticket) = live.pop() {
                    table.release(ticket).unwrap();
                }
            } else if let Some(ticket) = table.acquire() {
                live.push(ticket);
            }

            assert_eq!(table.free_count() + table.issued_count(), 7);
            assert_eq!(table.issued_count(), live.len());

            #[cfg(debug_assertions)]
            table.integrity_check();
        }
    }
}
