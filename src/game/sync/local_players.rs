//! Locally tracked players
//!
//! The set of peers a client currently renders. Iteration order is the
//! order peers were added, which is the order their movement records
//! appear in every update message, so it must never be reshuffled.

use std::collections::HashSet;

/// Maximum number of local players a client can track
pub const MAX_LOCAL_PLAYERS: usize = 255;

/// Insertion-ordered, bounded set of player indices
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LocalPlayers {
    order: Vec<u16>,
    members: HashSet<u16>,
}

impl LocalPlayers {
    pub fn new() -> Self {
        Self {
            order: Vec::with_capacity(MAX_LOCAL_PLAYERS),
            members: HashSet::with_capacity(MAX_LOCAL_PLAYERS),
        }
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.order.len() >= MAX_LOCAL_PLAYERS
    }

    pub fn contains(&self, index: u16) -> bool {
        self.members.contains(&index)
    }

    /// Track a player; returns false if already tracked or the set is full
    pub fn add(&mut self, index: u16) -> bool {
        if self.is_full() || !self.members.insert(index) {
            return false;
        }
        self.order.push(index);
        true
    }

    /// Stop tracking a player
    pub fn remove(&mut self, index: u16) -> bool {
        if !self.members.remove(&index) {
            return false;
        }
        self.order.retain(|&i| i != index);
        true
    }

    /// Tracked indices in insertion order
    pub fn iter(&self) -> impl Iterator<Item = u16> + '_ {
        self.order.iter().copied()
    }

    /// Visit every tracked index in order, dropping those for which `keep`
    /// returns `Ok(false)`. Stops at the first error.
    pub fn retain_with<E>(
        &mut self,
        mut keep: impl FnMut(u16) -> Result<bool, E>,
    ) -> Result<(), E> {
        let mut i = 0;
        while i < self.order.len() {
            let index = self.order[i];
            if keep(index)? {
                i += 1;
            } else {
                self.order.remove(i);
                self.members.remove(&index);
            }
        }
        Ok(())
    }

    pub fn clear(&mut self) {
        self.order.clear();
        self.members.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insertion_order() {
        let mut local = LocalPlayers::new();
        assert!(local.add(9));
        assert!(local.add(2));
        assert!(local.add(5));
        assert!(!local.add(2));
        assert_eq!(local.iter().collect::<Vec<_>>(), vec![9, 2, 5]);
    }

    #[test]
    fn test_bounded() {
        let mut local = LocalPlayers::new();
        for i in 1..=MAX_LOCAL_PLAYERS as u16 {
            assert!(local.add(i));
        }
        assert!(local.is_full());
        assert!(!local.add(1000));
        assert_eq!(local.len(), MAX_LOCAL_PLAYERS);
    }

    #[test]
    fn test_retain_with_removes_mid_scan() {
        let mut local = LocalPlayers::new();
        for i in [4, 7, 1, 8] {
            local.add(i);
        }

        let mut seen = Vec::new();
        local
            .retain_with::<()>(|i| {
                seen.push(i);
                Ok(i % 2 == 0)
            })
            .unwrap();

        assert_eq!(seen, vec![4, 7, 1, 8]);
        assert_eq!(local.iter().collect::<Vec<_>>(), vec![4, 8]);
        assert!(!local.contains(7));
    }

    #[test]
    fn test_remove() {
        let mut local = LocalPlayers::new();
        local.add(3);
        assert!(local.remove(3));
        assert!(!local.remove(3));
        assert!(local.is_empty());
    }
}
