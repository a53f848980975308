use core::cell::Cell;

use critical_section::Mutex;

use crate::mod_params::RadioState;

/// Radio state shared between calling context and interrupt bottom half.
///
/// Reads and writes run inside a critical section so neither side can
/// observe a transition half done.
pub(crate) struct StateCell {
    inner: Mutex<Cell<RadioState>>,
}

impl StateCell {
    pub const fn new(state: RadioState) -> Self {
        Self {
            inner: Mutex::new(Cell::new(state)),
        }
    }

    pub fn get(&self) -> RadioState {
        critical_section::with(|cs| self.inner.borrow(cs).get())
    }

    pub fn set(&self, state: RadioState) {
        critical_section::with(|cs| {
            let cell = self.inner.borrow(cs);
            if cell.get() != state {
                trace!("radio state {} -> {}", cell.get(), state);
            }
            cell.set(state)
        })
    }

    /// Commit `to` only if the current state satisfies `allowed`.
    /// Returns the state observed.
    pub fn transition(&self, allowed: impl Fn(RadioState) -> bool, to: RadioState) -> Result<RadioState, RadioState> {
        critical_section::with(|cs| {
            let cell = self.inner.borrow(cs);
            let from = cell.get();
            if allowed(from) {
                cell.set(to);
                Ok(from)
            } else {
                Err(from)
            }
        })
    }
}
