//! Hierarchical timing wheel: the pure data structure, independent of
//! any clock or background thread so its cascading logic can be tested
//! by advancing it directly.
//!
//! Six levels of 64 slots each (the same shape a kernel timer wheel
//! uses): a deadline's slot at level `L` is bits `[6L, 6L+6)` of its
//! absolute tick count. Advancing the wheel drains level 0's current
//! slot every tick, and re-buckets ("cascades") a higher level's slot
//! into finer-grained slots whenever the level below it wraps.

use std::task::Waker;

use crate::config::defaults::{TIMER_LEVELS, TIMER_SLOTS_PER_LEVEL};

const SLOT_BITS: u32 = 6; // log2(TIMER_SLOTS_PER_LEVEL)
const SLOT_MASK: u64 = (TIMER_SLOTS_PER_LEVEL - 1) as u64;

pub(crate) struct Entry {
    pub(crate) waker: Waker,
}

struct Scheduled {
    deadline_tick: u64,
    entry: Entry,
}

pub(crate) struct Wheel {
    levels: Vec<Vec<Vec<Scheduled>>>,
    current_tick: u64,
}

impl Wheel {
    pub(crate) fn new() -> Self {
        let levels = (0..TIMER_LEVELS)
            .map(|_| (0..TIMER_SLOTS_PER_LEVEL).map(|_| Vec::new()).collect())
            .collect();
        Wheel {
            levels,
            current_tick: 0,
        }
    }

    fn classify(&self, deadline_tick: u64) -> (usize, usize) {
        let xor = deadline_tick ^ self.current_tick;
        let level = if xor == 0 {
            0
        } else {
            ((63 - xor.leading_zeros()) / SLOT_BITS) as usize
        };
        let level = level.min(TIMER_LEVELS - 1);
        let slot = ((deadline_tick >> (SLOT_BITS as u64 * level as u64)) & SLOT_MASK) as usize;
        (level, slot)
    }

    /// Register `entry` to fire once `current_tick` reaches
    /// `deadline_tick` (clamped to at least one tick in the future, so a
    /// past-due deadline still fires on the very next `advance_to`).
    pub(crate) fn insert(&mut self, deadline_tick: u64, entry: Entry) {
        let deadline_tick = deadline_tick.max(self.current_tick + 1);
        let (level, slot) = self.classify(deadline_tick);
        self.levels[level][slot].push(Scheduled {
            deadline_tick,
            entry,
        });
    }

    /// Advance to `target_tick`, returning every entry whose deadline
    /// has now been reached, in no particular order.
    pub(crate) fn advance_to(&mut self, target_tick: u64) -> Vec<Entry> {
        let mut fired = Vec::new();
        while self.current_tick < target_tick {
            self.current_tick += 1;
            let slot0 = (self.current_tick & SLOT_MASK) as usize;
            for scheduled in self.levels[0][slot0].drain(..) {
                fired.push(scheduled.entry);
            }
            if slot0 == 0 {
                self.cascade(1, &mut fired);
            }
        }
        fired
    }

    fn cascade(&mut self, level: usize, fired: &mut Vec<Entry>) {
        if level >= TIMER_LEVELS {
            return;
        }
        let slot = ((self.current_tick >> (SLOT_BITS as u64 * level as u64)) & SLOT_MASK) as usize;
        let wrapped = slot == 0;
        let scheduled = std::mem::take(&mut self.levels[level][slot]);
        for item in scheduled {
            if item.deadline_tick <= self.current_tick {
                fired.push(item.entry);
            } else {
                let (l, s) = self.classify(item.deadline_tick);
                self.levels[l][s].push(item);
            }
        }
        if wrapped {
            self.cascade(level + 1, fired);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::task::{RawWaker, RawWakerVTable, Waker};

    fn flag_waker(flag: Arc<AtomicBool>) -> Waker {
        fn clone(ptr: *const ()) -> RawWaker {
            unsafe { Arc::increment_strong_count(ptr as *const AtomicBool) };
            RawWaker::new(ptr, &VTABLE)
        }
        fn wake(ptr: *const ()) {
            let flag = unsafe { Arc::from_raw(ptr as *const AtomicBool) };
            flag.store(true, Ordering::SeqCst);
        }
        fn wake_by_ref(ptr: *const ()) {
            let flag = unsafe { &*(ptr as *const AtomicBool) };
            flag.store(true, Ordering::SeqCst);
        }
        fn drop_fn(ptr: *const ()) {
            unsafe { drop(Arc::from_raw(ptr as *const AtomicBool)) };
        }
        static VTABLE: RawWakerVTable = RawWakerVTable::new(clone, wake, wake_by_ref, drop_fn);
        let ptr = Arc::into_raw(flag) as *const ();
        unsafe { Waker::from_raw(RawWaker::new(ptr, &VTABLE)) }
    }

    #[test]
    fn fires_on_exact_tick() {
        let mut wheel = Wheel::new();
        let flag = Arc::new(AtomicBool::new(false));
        wheel.insert(10, Entry { waker: flag_waker(flag.clone()) });

        assert!(wheel.advance_to(9).is_empty());
        let fired = wheel.advance_to(10);
        assert_eq!(fired.len(), 1);
        fired.into_iter().for_each(|e| e.waker.wake());
        assert!(flag.load(Ordering::SeqCst));
    }

    #[test]
    fn cascades_from_higher_level() {
        let mut wheel = Wheel::new();
        let flag = Arc::new(AtomicBool::new(false));
        // Past slot 0's 64-tick span: lands in level 1 initially, must
        // cascade down to level 0 before it can fire.
        let deadline = 200;
        wheel.insert(deadline, Entry { waker: flag_waker(flag.clone()) });

        assert!(wheel.advance_to(deadline - 1).is_empty());
        let fired = wheel.advance_to(deadline);
        assert_eq!(fired.len(), 1);
    }

    #[test]
    fn many_timers_fire_exactly_once() {
        let mut wheel = Wheel::new();
        let mut flags = Vec::new();
        for i in 1..=500u64 {
            let flag = Arc::new(AtomicBool::new(false));
            wheel.insert(i, Entry { waker: flag_waker(flag.clone()) });
            flags.push(flag);
        }
        let fired = wheel.advance_to(500);
        assert_eq!(fired.len(), 500);
        for f in &fired {
            f.waker.wake_by_ref();
        }
        assert!(flags.iter().all(|f| f.load(Ordering::SeqCst)));
    }
}
