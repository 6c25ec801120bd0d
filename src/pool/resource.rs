//! # Pool Acotado de Recursos
//! src/pool/resource.rs
//!
//! Un conjunto fijo de recursos (p. ej. sesiones contra el almacén de
//! usuarios) que se prestan con `acquire` y vuelven al pool cuando el
//! `Checkout` sale de scope, incluso si el código que lo usa falla.

use super::PoolError;
use std::ops::{Deref, DerefMut};
use std::sync::{Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

/// Pool acotado con adquisición bloqueante
pub struct ResourcePool<T> {
    idle: Mutex<Vec<T>>,
    available: Condvar,
    capacity: usize,
}

impl<T> ResourcePool<T> {
    /// Crea el pool con `size` recursos construidos por `make`
    pub fn new<F>(size: usize, mut make: F) -> Result<Self, PoolError>
    where
        F: FnMut(usize) -> T,
    {
        if size == 0 {
            return Err(PoolError::InvalidSize);
        }
        Ok(Self {
            idle: Mutex::new((0..size).map(&mut make).collect()),
            available: Condvar::new(),
            capacity: size,
        })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Recursos libres en este momento
    pub fn idle(&self) -> usize {
        self.lock().len()
    }

    /// Toma un recurso, esperando como máximo `timeout`
    ///
    /// # Errores
    ///
    /// `PoolError::Timeout` si no se liberó ninguno a tiempo.
    pub fn acquire(&self, timeout: Duration) -> Result<Checkout<'_, T>, PoolError> {
        let deadline = Instant::now() + timeout;
        let mut idle = self.lock();
        loop {
            if let Some(resource) = idle.pop() {
                return Ok(Checkout {
                    pool: self,
                    resource: Some(resource),
                });
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(PoolError::Timeout);
            }
            let (guard, _) = self
                .available
                .wait_timeout(idle, remaining)
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            idle = guard;
        }
    }

    /// Toma un recurso sin esperar
    pub fn try_acquire(&self) -> Option<Checkout<'_, T>> {
        self.lock().pop().map(|resource| Checkout {
            pool: self,
            resource: Some(resource),
        })
    }

    fn release(&self, resource: T) {
        self.lock().push(resource);
        self.available.notify_one();
    }

    fn lock(&self) -> MutexGuard<'_, Vec<T>> {
        self.idle
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Préstamo de un recurso; lo devuelve al pool en `drop`
pub struct Checkout<'a, T> {
    pool: &'a ResourcePool<T>,
    resource: Option<T>,
}

impl<T> Deref for Checkout<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        match &self.resource {
            Some(resource) => resource,
            None => unreachable!("checkout used after release"),
        }
    }
}

impl<T> DerefMut for Checkout<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        match &mut self.resource {
            Some(resource) => resource,
            None => unreachable!("checkout used after release"),
        }
    }
}

impl<T> Drop for Checkout<'_, T> {
    fn drop(&mut self) {
        if let Some(resource) = self.resource.take() {
            self.pool.release(resource);
        }
    }
}
