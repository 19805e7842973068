//! e2walk — обход каталогов ext2/3/4 через C-ABI трамплин со стабильными
//! callback-хэндлами.
//!
//! Ядро: `registry` (ячейка id в нативной куче + таблица замыканий),
//! `trampoline` (фиксированный extern "C" callback для движка),
//! `session` (открытие ФС и скоупный обход). Движок — `fs` поверх `io`.

// Базовые модули
pub mod consts;
pub mod errcode;
pub mod metrics;
pub mod config;

// Движок: ввод/вывод и on-disk структуры
pub mod io;     // src/io/{mod,unix,mem}.rs
pub mod fs;     // src/fs/{mod,superblock,group,inode,blockmap,dir_iterate,scan}.rs

// Протокол callback'ов
pub mod entry;
pub mod registry;
pub mod trampoline;
pub mod session;

// Поиск объектов по inode/блокам
pub mod lookup;

// FFI (C ABI) — включается фичей "ffi"
#[cfg(feature = "ffi")]
pub mod ffi;

// Удобные реэкспорты
pub use config::{E2Config, SessionBuilder};
pub use entry::{DirEntry, DirEntryInfo, FileType, Outcome};
pub use errcode::ErrCode;
pub use fs::Filsys;
pub use io::{unix_io_manager, IoManager, MemIoManager};
pub use lookup::{lookup_filesystem_objects, BlockKind, BlockRange, FilesystemObject, Lookup, LookupResult, Stats};
pub use registry::{alloc_callback, free_callback, CallbackHandle};
pub use session::{Session, WalkError, WalkSummary};
pub use trampoline::iterate;
