//! # Heap de Timers
//! src/timer/heap.rs
//!
//! Min-heap binario sobre un `Vec` más un mapa `id → índice` que se
//! actualiza en cada swap. Así `adjust` y `remove` son O(log n) sin
//! recorrer el heap buscando el nodo.

use std::collections::HashMap;
use std::hash::Hash;
use std::time::{Duration, Instant};

/// Callback que se ejecuta al expirar un timer
pub type ExpireCallback = Box<dyn FnMut() + Send>;

/// Errores del heap de timers
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TimerError {
    #[error("timer not found")]
    NotFound,

    #[error("timer heap is empty")]
    Empty,
}

struct TimerNode<K> {
    id: K,
    expires: Instant,
    on_expire: ExpireCallback,
}

/// Min-heap de timers indexado por id
pub struct TimerHeap<K> {
    heap: Vec<TimerNode<K>>,
    index: HashMap<K, usize>,
}

impl<K: Hash + Eq + Copy> TimerHeap<K> {
    pub fn new() -> Self {
        Self {
            heap: Vec::with_capacity(64),
            index: HashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    pub fn contains(&self, id: &K) -> bool {
        self.index.contains_key(id)
    }

    /// Agrega un timer o, si `id` ya existe, actualiza su deadline y callback
    pub fn add<F>(&mut self, id: K, timeout: Duration, on_expire: F)
    where
        F: FnMut() + Send + 'static,
    {
        self.add_at(id, Instant::now() + timeout, Box::new(on_expire));
    }

    fn add_at(&mut self, id: K, expires: Instant, on_expire: ExpireCallback) {
        match self.index.get(&id).copied() {
            Some(i) => {
                self.heap[i].expires = expires;
                self.heap[i].on_expire = on_expire;
                self.reheap(i);
            }
            None => {
                let i = self.heap.len();
                self.index.insert(id, i);
                self.heap.push(TimerNode {
                    id,
                    expires,
                    on_expire,
                });
                self.sift_up(i);
            }
        }
    }

    /// Mueve el deadline de un timer existente a `now + timeout`
    ///
    /// # Errores
    ///
    /// `TimerError::NotFound` si el id no está en el heap.
    pub fn adjust(&mut self, id: K, timeout: Duration) -> Result<(), TimerError> {
        let i = *self.index.get(&id).ok_or(TimerError::NotFound)?;
        self.heap[i].expires = Instant::now() + timeout;
        self.reheap(i);
        Ok(())
    }

    /// Quita un timer sin ejecutar su callback
    pub fn remove(&mut self, id: K) -> Result<(), TimerError> {
        let i = *self.index.get(&id).ok_or(TimerError::NotFound)?;
        self.delete(i).map(|_| ()).ok_or(TimerError::NotFound)
    }

    /// Quita el timer con el deadline más cercano, sin ejecutar su callback
    pub fn pop(&mut self) -> Result<(K, Instant), TimerError> {
        let node = self.delete(0).ok_or(TimerError::Empty)?;
        Ok((node.id, node.expires))
    }

    /// Ejecuta los callbacks de los timers vencidos
    ///
    /// # Retorna
    ///
    /// Cuántos timers expiraron.
    pub fn tick(&mut self) -> usize {
        self.tick_at(Instant::now())
    }

    /// Igual que `tick` pero con un `now` explícito
    pub fn tick_at(&mut self, now: Instant) -> usize {
        let mut fired = 0;
        while self.heap.first().is_some_and(|front| front.expires <= now) {
            let Some(mut node) = self.delete(0) else {
                break;
            };
            (node.on_expire)();
            fired += 1;
        }
        fired
    }

    /// Tiempo hasta el próximo deadline, `None` si no hay timers
    ///
    /// Un timer ya vencido devuelve `Duration::ZERO`.
    pub fn next_deadline(&self) -> Option<Duration> {
        self.heap
            .first()
            .map(|node| node.expires.saturating_duration_since(Instant::now()))
    }

    /// Quita el nodo en la posición `i` y repara el heap
    fn delete(&mut self, i: usize) -> Option<TimerNode<K>> {
        let last = self.heap.len().checked_sub(1)?;
        if i < last {
            self.swap(i, last);
        }
        let node = self.heap.pop()?;
        self.index.remove(&node.id);
        if i < self.heap.len() {
            self.reheap(i);
        }
        Some(node)
    }

    fn reheap(&mut self, i: usize) {
        if !self.sift_down(i) {
            self.sift_up(i);
        }
    }

    fn sift_up(&mut self, mut i: usize) {
        while i > 0 {
            let parent = (i - 1) / 2;
            if self.heap[parent].expires <= self.heap[i].expires {
                break;
            }
            self.swap(i, parent);
            i = parent;
        }
    }

    /// Retorna true si el nodo bajó al menos una posición
    fn sift_down(&mut self, start: usize) -> bool {
        let n = self.heap.len();
        let mut i = start;
        loop {
            let left = 2 * i + 1;
            if left >= n {
                break;
            }
            let right = left + 1;
            let child = if right < n && self.heap[right].expires < self.heap[left].expires {
                right
            } else {
                left
            };
            if self.heap[i].expires <= self.heap[child].expires {
                break;
            }
            self.swap(i, child);
            i = child;
        }
        i > start
    }

    fn swap(&mut self, a: usize, b: usize) {
        self.heap.swap(a, b);
        self.index.insert(self.heap[a].id, a);
        self.index.insert(self.heap[b].id, b);
    }

    #[cfg(test)]
    fn check_invariants(&self) {
        assert_eq!(self.heap.len(), self.index.len());
        for (i, node) in self.heap.iter().enumerate() {
            assert_eq!(self.index[&node.id], i);
            if i > 0 {
                assert!(self.heap[(i - 1) / 2].expires <= node.expires);
            }
        }
    }
}

impl<K: Hash + Eq + Copy> Default for TimerHeap<K> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    fn noop() -> ExpireCallback {
        Box::new(|| {})
    }

    // ==================== Orden ====================

    #[test]
    fn test_pop_returns_non_decreasing_expiries() {
        let base = Instant::now();
        let mut heap = TimerHeap::new();
        let offsets = [50u64, 10, 90, 30, 70, 20, 80, 60, 40, 0];
        for (id, ms) in offsets.iter().enumerate() {
            heap.add_at(id, base + Duration::from_millis(*ms), noop());
            heap.check_invariants();
        }

        let mut last = base;
        while let Ok((_, expires)) = heap.pop() {
            assert!(expires >= last);
            last = expires;
            heap.check_invariants();
        }
        assert_eq!(heap.pop(), Err(TimerError::Empty));
    }

    #[test]
    fn test_add_existing_id_updates_without_duplicate() {
        let base = Instant::now();
        let mut heap = TimerHeap::new();
        heap.add_at(1u32, base + Duration::from_millis(10), noop());
        heap.add_at(2u32, base + Duration::from_millis(20), noop());
        heap.add_at(1u32, base + Duration::from_millis(30), noop());
        heap.check_invariants();

        assert_eq!(heap.len(), 2);
        assert_eq!(heap.pop().unwrap().0, 2);
        assert_eq!(heap.pop().unwrap().0, 1);
    }

    #[test]
    fn test_adjust_moves_only_that_id() {
        let mut heap = TimerHeap::new();
        for id in 0..8u32 {
            heap.add(id, Duration::from_millis(10 + id as u64), || {});
        }
        heap.adjust(0, Duration::from_secs(60)).unwrap();
        heap.check_invariants();
        assert_eq!(heap.len(), 8);

        let order: Vec<u32> = std::iter::from_fn(|| heap.pop().ok().map(|(id, _)| id)).collect();
        assert_eq!(order.last(), Some(&0));
        assert_eq!(order.len(), 8);
    }

    #[test]
    fn test_adjust_unknown_id_fails() {
        let mut heap: TimerHeap<u32> = TimerHeap::new();
        assert_eq!(heap.adjust(9, Duration::from_secs(1)), Err(TimerError::NotFound));
        assert_eq!(heap.remove(9), Err(TimerError::NotFound));
    }

    #[test]
    fn test_remove_from_middle_keeps_invariants() {
        let base = Instant::now();
        let mut heap = TimerHeap::new();
        for id in 0..16u32 {
            heap.add_at(id, base + Duration::from_millis((id as u64 * 37) % 101), noop());
        }
        for id in [3u32, 0, 15, 7, 8] {
            heap.remove(id).unwrap();
            heap.check_invariants();
            assert!(!heap.contains(&id));
        }
        assert_eq!(heap.len(), 11);
    }

    // ==================== Expiración ====================

    #[test]
    fn test_tick_fires_expired_once() {
        let fired = Arc::new(Mutex::new(Vec::new()));
        let base = Instant::now();
        let mut heap = TimerHeap::new();

        for (id, ms) in [(1u32, 5u64), (2, 10), (3, 1000)] {
            let fired = Arc::clone(&fired);
            heap.add_at(
                id,
                base + Duration::from_millis(ms),
                Box::new(move || fired.lock().unwrap().push(id)),
            );
        }

        assert_eq!(heap.tick_at(base + Duration::from_millis(20)), 2);
        assert_eq!(heap.tick_at(base + Duration::from_millis(20)), 0);
        assert_eq!(*fired.lock().unwrap(), vec![1, 2]);
        assert!(heap.contains(&3));
        heap.check_invariants();
    }

    #[test]
    fn test_callback_runs_with_real_clock() {
        let count = Arc::new(AtomicUsize::new(0));
        let mut heap = TimerHeap::new();
        let c = Arc::clone(&count);
        heap.add(7u64, Duration::ZERO, move || {
            c.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(heap.tick(), 1);
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(heap.is_empty());
    }

    #[test]
    fn test_next_deadline() {
        let mut heap = TimerHeap::new();
        assert_eq!(heap.next_deadline(), None);

        heap.add(1u32, Duration::from_secs(10), || {});
        heap.add(2u32, Duration::from_millis(100), || {});
        let next = heap.next_deadline().unwrap();
        assert!(next <= Duration::from_millis(100));

        heap.add_at(3, Instant::now() - Duration::from_millis(5), noop());
        assert_eq!(heap.next_deadline(), Some(Duration::ZERO));
    }
}
