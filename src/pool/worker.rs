//! # Pool de Workers
//! src/pool/worker.rs
//!
//! Cola FIFO única protegida por un `Mutex` + `Condvar`. Cada worker:
//! espera mientras la cola esté vacía y abierta → saca una tarea →
//! la ejecuta fuera del lock → vuelve a empezar.

use super::PoolError;
use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use tracing::{debug, warn};

/// Unidad de trabajo
pub type Task = Box<dyn FnOnce() + Send + 'static>;

struct QueueState {
    tasks: VecDeque<Task>,
    closed: bool,
}

struct Shared {
    state: Mutex<QueueState>,
    cond: Condvar,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Pool de tamaño fijo con shutdown que espera a todos los workers
pub struct WorkerPool {
    shared: Arc<Shared>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    size: usize,
}

impl WorkerPool {
    /// Crea el pool y arranca `size` workers
    ///
    /// # Errores
    ///
    /// - `PoolError::InvalidSize` si `size == 0`
    /// - `PoolError::Spawn` si el sistema no deja crear un thread
    pub fn new(size: usize) -> Result<Self, PoolError> {
        if size == 0 {
            return Err(PoolError::InvalidSize);
        }

        let shared = Arc::new(Shared {
            state: Mutex::new(QueueState {
                tasks: VecDeque::new(),
                closed: false,
            }),
            cond: Condvar::new(),
        });

        let pool = Self {
            shared,
            workers: Mutex::new(Vec::with_capacity(size)),
            size,
        };

        for id in 0..size {
            let shared = Arc::clone(&pool.shared);
            let handle = thread::Builder::new()
                .name(format!("worker-{}", id))
                .spawn(move || Self::worker_loop(id, shared))?;
            pool.lock_workers().push(handle);
        }

        debug!(workers = size, "worker pool started");
        Ok(pool)
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Tareas encoladas que todavía no toma ningún worker
    pub fn queued(&self) -> usize {
        self.shared.lock().tasks.len()
    }

    pub fn is_closed(&self) -> bool {
        self.shared.lock().closed
    }

    /// Encola una tarea
    ///
    /// # Errores
    ///
    /// `PoolError::Closed` si el pool ya se cerró; la tarea se descarta.
    pub fn submit<F>(&self, task: F) -> Result<(), PoolError>
    where
        F: FnOnce() + Send + 'static,
    {
        {
            let mut state = self.shared.lock();
            if state.closed {
                return Err(PoolError::Closed);
            }
            state.tasks.push_back(Box::new(task));
        }
        self.shared.cond.notify_one();
        Ok(())
    }

    /// Cierra el pool y espera a que terminen las tareas en curso
    ///
    /// Las tareas encoladas que nadie empezó se descartan. Llamarlo más de
    /// una vez es seguro.
    pub fn shutdown(&self) {
        let discarded = {
            let mut state = self.shared.lock();
            state.closed = true;
            let discarded = state.tasks.len();
            state.tasks.clear();
            discarded
        };
        self.shared.cond.notify_all();

        if discarded > 0 {
            debug!(discarded, "queued tasks dropped at shutdown");
        }

        let handles: Vec<JoinHandle<()>> = self.lock_workers().drain(..).collect();
        let current = thread::current().id();
        for handle in handles {
            // Un worker que dispara el shutdown no puede esperarse a sí mismo
            if handle.thread().id() == current {
                continue;
            }
            if handle.join().is_err() {
                warn!("worker thread panicked");
            }
        }
    }

    fn worker_loop(id: usize, shared: Arc<Shared>) {
        loop {
            let task = {
                let mut state = shared.lock();
                loop {
                    if state.closed {
                        debug!(worker = id, "worker exiting");
                        return;
                    }
                    if let Some(task) = state.tasks.pop_front() {
                        break task;
                    }
                    state = shared
                        .cond
                        .wait(state)
                        .unwrap_or_else(|poisoned| poisoned.into_inner());
                }
            };
            task();
        }
    }

    fn lock_workers(&self) -> MutexGuard<'_, Vec<JoinHandle<()>>> {
        self.workers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}
