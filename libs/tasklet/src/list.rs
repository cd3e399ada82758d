// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! An index-based circular doubly-linked list of tasks.
//!
//! The links live inside the task control blocks (see [`Links`]), the list itself only stores
//! the head and the length. Since every task is a member of at most one queue at any point in
//! time (the run queue or a single channel's wait queue) one pair of links per task suffices.
//!
//! The list is circular: `head.prev` is the tail, and rotating the list by one is just moving the
//! head pointer forward. This is how round-robin scheduling is implemented.

use crate::task::Id;

/// Links to other tasks in the same queue.
///
/// Both links are `None` iff the task is not linked into any queue.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Links {
    pub(crate) next: Option<Id>,
    pub(crate) prev: Option<Id>,
}

impl Links {
    pub(crate) fn is_linked(&self) -> bool {
        self.next.is_some()
    }
}

/// Storage that can resolve a task [`Id`] to its [`Links`].
pub(crate) trait Linked {
    fn links(&self, id: Id) -> &Links;
    fn links_mut(&mut self, id: Id) -> &mut Links;
}

#[derive(Debug, Default)]
pub(crate) struct List {
    head: Option<Id>,
    len: usize,
}

impl List {
    pub(crate) const fn new() -> Self {
        Self { head: None, len: 0 }
    }

    pub(crate) fn head(&self) -> Option<Id> {
        self.head
    }

    pub(crate) fn len(&self) -> usize {
        self.len
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.head.is_none()
    }

    pub(crate) fn push_back<L: Linked>(&mut self, arena: &mut L, id: Id) {
        debug_assert!(
            !arena.links(id).is_linked(),
            "task {id} is already linked into a queue"
        );

        match self.head {
            None => {
                *arena.links_mut(id) = Links {
                    next: Some(id),
                    prev: Some(id),
                };
                self.head = Some(id);
                self.len += 1;
            }
            Some(head) => {
                let tail = arena.links(head).prev.expect("linked task must have a prev link");
                self.link_between(arena, tail, head, id);
            }
        }
    }

    /// Links `id` as the new head.
    pub(crate) fn push_front<L: Linked>(&mut self, arena: &mut L, id: Id) {
        self.push_back(arena, id);
        self.head = Some(id);
    }

    /// Links `id` directly after `anchor`, which must be a member of this list.
    pub(crate) fn insert_after<L: Linked>(&mut self, arena: &mut L, anchor: Id, id: Id) {
        debug_assert!(
            !arena.links(id).is_linked(),
            "task {id} is already linked into a queue"
        );

        let next = arena
            .links(anchor)
            .next
            .expect("anchor must be linked into the list");
        self.link_between(arena, anchor, next, id);
    }

    fn link_between<L: Linked>(&mut self, arena: &mut L, prev: Id, next: Id, id: Id) {
        *arena.links_mut(id) = Links {
            next: Some(next),
            prev: Some(prev),
        };
        arena.links_mut(prev).next = Some(id);
        arena.links_mut(next).prev = Some(id);
        self.len += 1;
    }

    /// Unlinks `id`, which must be a member of this list.
    pub(crate) fn remove<L: Linked>(&mut self, arena: &mut L, id: Id) {
        let Links { next, prev } = core::mem::take(arena.links_mut(id));
        let (Some(next), Some(prev)) = (next, prev) else {
            panic!("task {id} is not linked into a queue");
        };

        if next == id {
            debug_assert_eq!(self.head, Some(id));
            self.head = None;
        } else {
            arena.links_mut(prev).next = Some(next);
            arena.links_mut(next).prev = Some(prev);
            if self.head == Some(id) {
                self.head = Some(next);
            }
        }
        self.len -= 1;
    }

    pub(crate) fn pop_front<L: Linked>(&mut self, arena: &mut L) -> Option<Id> {
        let head = self.head?;
        self.remove(arena, head);
        Some(head)
    }

    /// Moves the head to the tail, making the second element the new head.
    pub(crate) fn rotate<L: Linked>(&mut self, arena: &L) {
        if let Some(head) = self.head {
            self.head = arena.links(head).next;
        }
    }

    pub(crate) fn iter<'a, L: Linked>(&self, arena: &'a L) -> Iter<'a, L> {
        Iter {
            arena,
            next: self.head,
            remaining: self.len,
        }
    }
}

pub(crate) struct Iter<'a, L> {
    arena: &'a L,
    next: Option<Id>,
    remaining: usize,
}

impl<L: Linked> Iterator for Iter<'_, L> {
    type Item = Id;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        let id = self.next?;
        self.next = self.arena.links(id).next;
        self.remaining -= 1;
        Some(id)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

#[cfg(test)]
mod tests {
    use hashbrown::HashMap;

    use super::*;

    #[derive(Default)]
    struct Arena(HashMap<Id, Links>);

    impl Arena {
        fn spawn(&mut self) -> Id {
            let id = Id::next();
            self.0.insert(id, Links::default());
            id
        }
    }

    impl Linked for Arena {
        fn links(&self, id: Id) -> &Links {
            &self.0[&id]
        }

        fn links_mut(&mut self, id: Id) -> &mut Links {
            self.0.get_mut(&id).unwrap()
        }
    }

    fn collect(list: &List, arena: &Arena) -> Vec<Id> {
        list.iter(arena).collect()
    }

    #[test]
    fn push_back_is_fifo() {
        let mut arena = Arena::default();
        let mut list = List::new();
        let ids: Vec<_> = (0..4).map(|_| arena.spawn()).collect();

        for id in &ids {
            list.push_back(&mut arena, *id);
        }

        assert_eq!(list.len(), 4);
        assert_eq!(collect(&list, &arena), ids);
        assert_eq!(list.head(), Some(ids[0]));
        assert_eq!(arena.links(ids[0]).prev, Some(ids[3]));

        for id in &ids {
            assert_eq!(list.pop_front(&mut arena), Some(*id));
            assert!(!arena.links(*id).is_linked());
        }
        assert!(list.is_empty());
        assert_eq!(list.pop_front(&mut arena), None);
    }

    #[test]
    fn single_element_is_its_own_neighbour() {
        let mut arena = Arena::default();
        let mut list = List::new();
        let a = arena.spawn();

        list.push_back(&mut arena, a);
        assert_eq!(arena.links(a).next, Some(a));
        assert_eq!(arena.links(a).prev, Some(a));

        list.rotate(&arena);
        assert_eq!(list.head(), Some(a));

        list.remove(&mut arena, a);
        assert!(list.is_empty());
        assert_eq!(list.len(), 0);
    }

    #[test]
    fn rotate_round_robins() {
        let mut arena = Arena::default();
        let mut list = List::new();
        let [a, b, c] = [arena.spawn(), arena.spawn(), arena.spawn()];
        for id in [a, b, c] {
            list.push_back(&mut arena, id);
        }

        list.rotate(&arena);
        assert_eq!(collect(&list, &arena), [b, c, a]);
        list.rotate(&arena);
        assert_eq!(collect(&list, &arena), [c, a, b]);
        list.rotate(&arena);
        assert_eq!(collect(&list, &arena), [a, b, c]);
    }

    #[test]
    fn insert_after() {
        let mut arena = Arena::default();
        let mut list = List::new();
        let [a, b, c, d] = [arena.spawn(), arena.spawn(), arena.spawn(), arena.spawn()];

        list.push_back(&mut arena, a);
        list.push_back(&mut arena, b);
        list.insert_after(&mut arena, a, c);
        assert_eq!(collect(&list, &arena), [a, c, b]);

        // inserting after the tail appends
        list.insert_after(&mut arena, b, d);
        assert_eq!(collect(&list, &arena), [a, c, b, d]);
        assert_eq!(arena.links(a).prev, Some(d));
    }

    #[test]
    fn push_front() {
        let mut arena = Arena::default();
        let mut list = List::new();
        let [a, b, c] = [arena.spawn(), arena.spawn(), arena.spawn()];

        list.push_front(&mut arena, a);
        assert_eq!(collect(&list, &arena), [a]);
        list.push_back(&mut arena, b);
        list.push_front(&mut arena, c);
        assert_eq!(collect(&list, &arena), [c, a, b]);
        assert_eq!(arena.links(c).prev, Some(b));
        assert_eq!(list.len(), 3);
    }

    #[test]
    fn remove_head_and_middle() {
        let mut arena = Arena::default();
        let mut list = List::new();
        let [a, b, c] = [arena.spawn(), arena.spawn(), arena.spawn()];
        for id in [a, b, c] {
            list.push_back(&mut arena, id);
        }

        list.remove(&mut arena, b);
        assert_eq!(collect(&list, &arena), [a, c]);
        list.remove(&mut arena, a);
        assert_eq!(collect(&list, &arena), [c]);
        assert_eq!(list.head(), Some(c));
        assert_eq!(arena.links(c).prev, Some(c));
    }

    #[test]
    #[should_panic(expected = "is not linked")]
    fn removing_unlinked_task_panics() {
        let mut arena = Arena::default();
        let mut list = List::new();
        let a = arena.spawn();
        list.remove(&mut arena, a);
    }
}
