//! Two statically held slots with a toggling "current" selector.

/// Which of the two slots is current this frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum HistorySlot {
    #[default]
    First,
    Second,
}

impl HistorySlot {
    pub fn other(self) -> Self {
        match self {
            HistorySlot::First => HistorySlot::Second,
            HistorySlot::Second => HistorySlot::First,
        }
    }

    pub fn index(self) -> usize {
        match self {
            HistorySlot::First => 0,
            HistorySlot::Second => 1,
        }
    }
}

/// A pair of values where one is "current" and the other "history".
///
/// Nothing is ever swapped or moved; [`toggle`](Self::toggle) flips which
/// slot each accessor resolves to.
#[derive(Clone, Debug)]
pub struct PingPong<T> {
    slots: [T; 2],
    current: HistorySlot,
}

impl<T> PingPong<T> {
    pub fn new(first: T, second: T) -> Self {
        Self {
            slots: [first, second],
            current: HistorySlot::First,
        }
    }

    /// Builds both slots with `make`, which receives the slot being built.
    pub fn from_fn(mut make: impl FnMut(HistorySlot) -> T) -> Self {
        Self::new(make(HistorySlot::First), make(HistorySlot::Second))
    }

    pub fn current_slot(&self) -> HistorySlot {
        self.current
    }

    pub fn current(&self) -> &T {
        &self.slots[self.current.index()]
    }

    pub fn current_mut(&mut self) -> &mut T {
        &mut self.slots[self.current.index()]
    }

    pub fn history(&self) -> &T {
        &self.slots[self.current.other().index()]
    }

    /// History, or the current value when history must not be used.
    pub fn history_or_current(&self, invalidated: bool) -> &T {
        if invalidated { self.current() } else { self.history() }
    }

    pub fn get(&self, slot: HistorySlot) -> &T {
        &self.slots[slot.index()]
    }

    pub fn toggle(&mut self) {
        self.current = self.current.other();
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.slots.iter()
    }
}
