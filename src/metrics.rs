//! Lightweight global metrics for e2walk.
//!
//! Потокобезопасные атомарные счётчики для подсистем:
//! - Callback handles (alloc/free нативных ячеек)
//! - Обходы каталогов и dispatch через трамплин
//! - Блочный ввод/вывод движка
//! - Открытие ФС
//!
//! Счётчики процессные; для строгого баланса alloc/free в пределах потока
//! см. `registry::handle_stats()`.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

// ----- Callback handles -----
static CB_HANDLES_ALLOCATED: AtomicU64 = AtomicU64::new(0);
static CB_HANDLES_FREED: AtomicU64 = AtomicU64::new(0);
static CB_HANDLE_ALLOC_FAILURES: AtomicU64 = AtomicU64::new(0);

// ----- Walks / dispatch -----
static WALKS_STARTED: AtomicU64 = AtomicU64::new(0);
static WALKS_FAILED: AtomicU64 = AtomicU64::new(0);
static DISPATCH_CALLS: AtomicU64 = AtomicU64::new(0);
static DISPATCH_MISSES: AtomicU64 = AtomicU64::new(0);

// ----- Engine I/O -----
static BLOCKS_READ: AtomicU64 = AtomicU64::new(0);
static BLOCKS_WRITTEN: AtomicU64 = AtomicU64::new(0);
static DIR_BLOCKS_READ: AtomicU64 = AtomicU64::new(0);
static DIR_BLOCKS_WRITTEN: AtomicU64 = AtomicU64::new(0);

// ----- Open -----
static OPEN_FAILURES: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, Clone, Default, Serialize)]
pub struct MetricsSnapshot {
    // Callback handles
    pub cb_handles_allocated: u64,
    pub cb_handles_freed: u64,
    pub cb_handle_alloc_failures: u64,

    // Walks / dispatch
    pub walks_started: u64,
    pub walks_failed: u64,
    pub dispatch_calls: u64,
    pub dispatch_misses: u64,

    // Engine I/O
    pub blocks_read: u64,
    pub blocks_written: u64,
    pub dir_blocks_read: u64,
    pub dir_blocks_written: u64,

    // Open
    pub open_failures: u64,
}

impl MetricsSnapshot {
    /// Ячейки, выделенные и ещё не освобождённые (по всему процессу).
    pub fn cb_handles_live(&self) -> u64 {
        self.cb_handles_allocated.saturating_sub(self.cb_handles_freed)
    }

    pub fn avg_dispatch_per_walk(&self) -> f64 {
        if self.walks_started == 0 {
            0.0
        } else {
            self.dispatch_calls as f64 / self.walks_started as f64
        }
    }
}

// ----- Recorders (callback handles) -----
pub fn record_cb_handle_alloc() {
    CB_HANDLES_ALLOCATED.fetch_add(1, Ordering::Relaxed);
}
pub fn record_cb_handle_free() {
    CB_HANDLES_FREED.fetch_add(1, Ordering::Relaxed);
}
pub fn record_cb_handle_alloc_failure() {
    CB_HANDLE_ALLOC_FAILURES.fetch_add(1, Ordering::Relaxed);
}

// ----- Recorders (walks) -----
pub fn record_walk_started() {
    WALKS_STARTED.fetch_add(1, Ordering::Relaxed);
}
pub fn record_walk_failed() {
    WALKS_FAILED.fetch_add(1, Ordering::Relaxed);
}
pub fn record_dispatch() {
    DISPATCH_CALLS.fetch_add(1, Ordering::Relaxed);
}
pub fn record_dispatch_miss() {
    DISPATCH_MISSES.fetch_add(1, Ordering::Relaxed);
}

// ----- Recorders (engine I/O) -----
pub fn record_block_read() {
    BLOCKS_READ.fetch_add(1, Ordering::Relaxed);
}
pub fn record_block_written() {
    BLOCKS_WRITTEN.fetch_add(1, Ordering::Relaxed);
}
pub fn record_dir_block_read() {
    DIR_BLOCKS_READ.fetch_add(1, Ordering::Relaxed);
}
pub fn record_dir_block_written() {
    DIR_BLOCKS_WRITTEN.fetch_add(1, Ordering::Relaxed);
}

// ----- Recorders (open) -----
pub fn record_open_failure() {
    OPEN_FAILURES.fetch_add(1, Ordering::Relaxed);
}

// ----- Snapshot / Reset -----
pub fn snapshot() -> MetricsSnapshot {
    MetricsSnapshot {
        cb_handles_allocated: CB_HANDLES_ALLOCATED.load(Ordering::Relaxed),
        cb_handles_freed: CB_HANDLES_FREED.load(Ordering::Relaxed),
        cb_handle_alloc_failures: CB_HANDLE_ALLOC_FAILURES.load(Ordering::Relaxed),

        walks_started: WALKS_STARTED.load(Ordering::Relaxed),
        walks_failed: WALKS_FAILED.load(Ordering::Relaxed),
        dispatch_calls: DISPATCH_CALLS.load(Ordering::Relaxed),
        dispatch_misses: DISPATCH_MISSES.load(Ordering::Relaxed),

        blocks_read: BLOCKS_READ.load(Ordering::Relaxed),
        blocks_written: BLOCKS_WRITTEN.load(Ordering::Relaxed),
        dir_blocks_read: DIR_BLOCKS_READ.load(Ordering::Relaxed),
        dir_blocks_written: DIR_BLOCKS_WRITTEN.load(Ordering::Relaxed),

        open_failures: OPEN_FAILURES.load(Ordering::Relaxed),
    }
}

pub fn reset() {
    CB_HANDLES_ALLOCATED.store(0, Ordering::Relaxed);
    CB_HANDLES_FREED.store(0, Ordering::Relaxed);
    CB_HANDLE_ALLOC_FAILURES.store(0, Ordering::Relaxed);

    WALKS_STARTED.store(0, Ordering::Relaxed);
    WALKS_FAILED.store(0, Ordering::Relaxed);
    DISPATCH_CALLS.store(0, Ordering::Relaxed);
    DISPATCH_MISSES.store(0, Ordering::Relaxed);

    BLOCKS_READ.store(0, Ordering::Relaxed);
    BLOCKS_WRITTEN.store(0, Ordering::Relaxed);
    DIR_BLOCKS_READ.store(0, Ordering::Relaxed);
    DIR_BLOCKS_WRITTEN.store(0, Ordering::Relaxed);

    OPEN_FAILURES.store(0, Ordering::Relaxed);
}
