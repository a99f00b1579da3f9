use std::num::NonZeroUsize;

use crate::error::SessionError;

/// Keeps the current question index inside `[0, count - 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Navigator {
    current: usize,
    count: NonZeroUsize,
}

impl Navigator {
    #[must_use]
    pub fn new(count: NonZeroUsize) -> Self {
        Self { current: 0, count }
    }

    #[must_use]
    pub fn current(&self) -> usize {
        self.current
    }

    #[must_use]
    pub fn count(&self) -> usize {
        self.count.get()
    }

    #[must_use]
    pub fn is_last(&self) -> bool {
        self.current + 1 == self.count.get()
    }

    /// Move forward one question; stays put on the last one.
    pub fn next(&mut self) -> usize {
        if !self.is_last() {
            self.current += 1;
        }
        self.current
    }

    /// Move back one question; stays put on the first one.
    pub fn previous(&mut self) -> usize {
        self.current = self.current.saturating_sub(1);
        self.current
    }

    /// Jump to `index`.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::IndexOutOfRange` and keeps the current index if
    /// `index >= count`.
    pub fn go_to(&mut self, index: usize) -> Result<usize, SessionError> {
        if index >= self.count.get() {
            return Err(SessionError::IndexOutOfRange {
                index,
                count: self.count.get(),
            });
        }
        self.current = index;
        Ok(self.current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn navigator(count: usize) -> Navigator {
        Navigator::new(NonZeroUsize::new(count).unwrap())
    }

    #[test]
    fn clamps_at_both_ends() {
        let mut nav = navigator(2);
        assert_eq!(nav.previous(), 0);
        assert_eq!(nav.next(), 1);
        assert!(nav.is_last());
        assert_eq!(nav.next(), 1);
    }

    #[test]
    fn go_to_out_of_range_keeps_index() {
        let mut nav = navigator(4);
        nav.go_to(2).unwrap();

        let err = nav.go_to(99).unwrap_err();

        assert!(matches!(
            err,
            SessionError::IndexOutOfRange { index: 99, count: 4 }
        ));
        assert_eq!(nav.current(), 2);
    }

    #[test]
    fn single_question_exam_never_moves() {
        let mut nav = navigator(1);
        assert!(nav.is_last());
        assert_eq!(nav.next(), 0);
        assert_eq!(nav.previous(), 0);
    }

    proptest! {
        #[test]
        fn index_stays_in_bounds(count in 1_usize..20, steps in proptest::collection::vec(any::<bool>(), 0..100)) {
            let mut nav = navigator(count);
            for forward in steps {
                let index = if forward { nav.next() } else { nav.previous() };
                prop_assert!(index < count);
                prop_assert_eq!(index, nav.current());
            }
        }
    }
}
