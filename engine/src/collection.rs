use std::collections::VecDeque;

use log::warn;

use crate::{COLLECTION_CAPACITY, media::Release};

/// The most recent results of one feature, newest first.
///
/// Holds at most [`COLLECTION_CAPACITY`] items. Pushing onto a full
/// collection evicts the oldest item, and the evicted item is released
/// before `push` returns.
#[derive(Debug, Clone)]
pub struct BoundedCollection<T: Release> {
    items: VecDeque<T>,
}

impl<T: Release> Default for BoundedCollection<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Release> BoundedCollection<T> {
    pub const CAPACITY: usize = COLLECTION_CAPACITY;

    pub fn new() -> Self {
        Self {
            items: VecDeque::with_capacity(Self::CAPACITY + 1),
        }
    }

    pub fn push(&mut self, item: T) {
        self.items.push_front(item);
        while self.items.len() > Self::CAPACITY {
            if let Some(mut evicted) = self.items.pop_back() {
                if !evicted.release() {
                    warn!("evicted an item whose resources were already released");
                }
            }
        }
    }

    /// Removes everything, releasing each item
    pub fn clear(&mut self) {
        for mut item in self.items.drain(..) {
            item.release();
        }
    }

    pub fn newest(&self) -> Option<&T> {
        self.items.front()
    }

    pub fn get(&self, index: usize) -> Option<&T> {
        self.items.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.items.iter()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::{cell::RefCell, rc::Rc};

    use super::*;

    /// Records every release in a shared log
    struct Tracked {
        id: usize,
        live: bool,
        log: Rc<RefCell<Vec<usize>>>,
    }

    impl Release for Tracked {
        fn release(&mut self) -> bool {
            self.log.borrow_mut().push(self.id);
            std::mem::replace(&mut self.live, false)
        }
    }

    fn tracked(id: usize, log: &Rc<RefCell<Vec<usize>>>) -> Tracked {
        Tracked {
            id,
            live: true,
            log: log.clone(),
        }
    }

    #[test]
    fn keeps_the_five_newest_newest_first() {
        let log = Rc::new(RefCell::new(vec![]));
        let mut collection = BoundedCollection::new();

        for push_count in 1..=12 {
            collection.push(tracked(push_count, &log));
            assert_eq!(collection.len(), push_count.min(5));

            let ids: Vec<_> = collection.iter().map(|t| t.id).collect();
            let expected: Vec<_> = (1..=push_count).rev().take(5).collect();
            assert_eq!(ids, expected);
        }
    }

    #[test]
    fn eviction_releases_each_item_exactly_once() {
        let log = Rc::new(RefCell::new(vec![]));
        let mut collection = BoundedCollection::new();

        for id in 1..=5 {
            collection.push(tracked(id, &log));
        }
        assert!(log.borrow().is_empty());

        collection.push(tracked(6, &log));
        assert_eq!(*log.borrow(), vec![1]);

        collection.push(tracked(7, &log));
        collection.push(tracked(8, &log));
        assert_eq!(*log.borrow(), vec![1, 2, 3]);
        assert_eq!(collection.newest().map(|t| t.id), Some(8));
        assert_eq!(collection.get(4).map(|t| t.id), Some(4));
    }

    #[test]
    fn clear_releases_everything() {
        let log = Rc::new(RefCell::new(vec![]));
        let mut collection = BoundedCollection::new();
        for id in 1..=3 {
            collection.push(tracked(id, &log));
        }

        collection.clear();
        assert!(collection.is_empty());
        assert_eq!(*log.borrow(), vec![3, 2, 1]);
    }
}
