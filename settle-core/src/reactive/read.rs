//! Read-only access shared by every readable cell.

use super::memo::Memo;
use super::signal::{ReadSignal, Signal};

/// A readable reactive cell.
///
/// Components that only observe a value (the commit scheduler's gate and
/// watched value, for instance) accept any `ReadCell` so callers can pass a
/// signal, a read-only view, or a memo.
pub trait ReadCell<T>: Send + Sync + 'static {
    /// Read the value, tracking it inside a reactive context.
    fn get(&self) -> T;

    /// Read the value without tracking.
    fn get_untracked(&self) -> T;
}

impl<T> ReadCell<T> for Signal<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn get(&self) -> T {
        Signal::get(self)
    }

    fn get_untracked(&self) -> T {
        Signal::get_untracked(self)
    }
}

impl<T> ReadCell<T> for ReadSignal<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn get(&self) -> T {
        ReadSignal::get(self)
    }

    fn get_untracked(&self) -> T {
        ReadSignal::get_untracked(self)
    }
}

impl<T> ReadCell<T> for Memo<T>
where
    T: Clone + Send + Sync + PartialEq + 'static,
{
    fn get(&self) -> T {
        Memo::get(self)
    }

    fn get_untracked(&self) -> T {
        Memo::get_untracked(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn read_twice<C: ReadCell<i32>>(cell: &C) -> (i32, i32) {
        (cell.get(), cell.get_untracked())
    }

    #[test]
    fn all_cells_read_through_the_trait() {
        let signal = Signal::new(4);
        let memo = Memo::new({
            let signal = signal.clone();
            move || signal.get() + 1
        });

        assert_eq!(read_twice(&signal), (4, 4));
        assert_eq!(read_twice(&signal.read_only()), (4, 4));
        assert_eq!(read_twice(&memo), (5, 5));
    }
}
