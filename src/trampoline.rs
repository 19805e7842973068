//! Трамплин обхода каталога.
//!
//! `walk_func` — единственная C-ABI функция, которую получает движок. По
//! `private` она достаёт id из ячейки хэндла, находит замыкание в таблице
//! реестра и переводит его `Outcome` во флаги движка.
//!
//! Если id в таблице текущего потока нет, а установлен внешний диспетчер
//! (`set_foreign_dispatch`, его ставит FFI-слой), запись отдаётся ему.
//! Иначе — DIRENT_ERROR: движок прервёт обход с EXT2_ET_CALLBACK_ABORTED.

use std::os::raw::{c_char, c_int, c_void};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};

use log::debug;

use crate::consts::DIRENT_ERROR;
use crate::entry::{DirEntry, Outcome};
use crate::errcode::ErrCode;
use crate::fs::{Filsys, RawDirEntry};
use crate::metrics;
use crate::registry::{self, CallbackHandle};

/// Внешний диспетчер: (id, dirent, offset, blocksize, buf) -> код Outcome
/// (0 continue, 1 stop, 2 modified, 3 abort).
pub type ForeignDispatch = unsafe extern "C" fn(
    id: c_int,
    dirent: *mut RawDirEntry,
    offset: c_int,
    blocksize: c_int,
    buf: *mut c_char,
) -> c_int;

// 0 = не установлен
static FOREIGN: AtomicUsize = AtomicUsize::new(0);

/// Установить (или снять, `None`) внешний диспетчер.
pub fn set_foreign_dispatch(f: Option<ForeignDispatch>) {
    FOREIGN.store(f.map_or(0, |f| f as usize), Ordering::Release);
}

fn foreign_dispatch() -> Option<ForeignDispatch> {
    match FOREIGN.load(Ordering::Acquire) {
        0 => None,
        // SAFETY: ненулевое значение записано только из ForeignDispatch.
        p => Some(unsafe { std::mem::transmute::<usize, ForeignDispatch>(p) }),
    }
}

/// Фиксированный callback для `Filsys::dir_iterate`.
///
/// # Safety
/// Вызывается движком: `buf` — блок каталога размером `blocksize`,
/// `private` — null или адрес живой ячейки `CallbackHandle`.
pub unsafe extern "C" fn walk_func(
    dirent: *mut RawDirEntry,
    offset: c_int,
    blocksize: c_int,
    buf: *mut c_char,
    private: *mut c_void,
) -> c_int {
    metrics::record_dispatch();
    if private.is_null() {
        metrics::record_dispatch_miss();
        return DIRENT_ERROR;
    }
    let id = *(private as *const c_int);

    if registry::is_registered(id) {
        let Some(mut entry) = DirEntry::from_raw(buf, offset, blocksize) else {
            metrics::record_dispatch_miss();
            return DIRENT_ERROR;
        };
        // Паника не должна пересечь extern "C".
        return match catch_unwind(AssertUnwindSafe(|| registry::dispatch(id, &mut entry))) {
            Ok(Some(outcome)) => outcome.to_flags(),
            Ok(None) => {
                metrics::record_dispatch_miss();
                DIRENT_ERROR
            }
            Err(_) => DIRENT_ERROR,
        };
    }

    if let Some(foreign) = foreign_dispatch() {
        let code = foreign(id, dirent, offset, blocksize, buf);
        return match Outcome::from_code(code) {
            Some(outcome) => outcome.to_flags(),
            None => DIRENT_ERROR,
        };
    }

    metrics::record_dispatch_miss();
    DIRENT_ERROR
}

/// Обойти каталог `dir`, направляя записи в callback, зарегистрированный
/// под id хэндла. Статус движка возвращается без изменений.
pub fn iterate(
    fs: &Filsys,
    dir: u32,
    flags: c_int,
    scratch: Option<&mut [u8]>,
    handle: &CallbackHandle,
) -> Result<(), ErrCode> {
    metrics::record_walk_started();
    // SAFETY: ячейка хэндла жива, пока заимствован `handle`, т.е. весь обход.
    let res = unsafe { fs.dir_iterate(dir, flags, scratch, walk_func, handle.as_private()) };
    if let Err(e) = res {
        metrics::record_walk_failed();
        debug!("iterate: dir={} callback={} -> {}", dir, handle.id(), e);
    }
    res
}
