// src/ffi.rs
#![cfg(feature = "ffi")]

//! C FFI для e2walk: те же четыре операции границы, что и в Rust API.
//!
//! Модель:
//! - Opaque-хэндл E2wFs владеет открытой Session.
//! - Статусы — errcode_t движка (0 = OK) без переинтерпретации.
//! - Callback-хэндл — ячейка int в нативной куче (e2w_alloc_callback /
//!   e2w_free_callback). Её адрес передаётся в e2w_dir_iterate как private.
//! - Записи каталога уходят во внешний диспетчер (e2w_set_dispatch),
//!   который получает id из ячейки и возвращает код решения:
//!   0 continue, 1 stop, 2 modified, 3 abort.
//!
//! Правила:
//! - Все указатели проверяются на NULL.
//! - Строки, выделенные здесь, освобождаются e2w_string_free.
//! - Хэндл E2wFs используется из одного потока за раз.
//!
//! Компиляция:
//!   cargo build --release --features ffi

use std::ffi::{CStr, CString};
use std::ptr;
use std::slice;

use libc::{c_char, c_int, c_long, c_uint, size_t};

use crate::errcode::ErrCode;
use crate::io::unix_io_manager;
use crate::registry;
use crate::session::Session;
use crate::trampoline::{self, ForeignDispatch};

// ---------- Opaque handle ----------

#[repr(C)]
pub struct E2wFs {
    inner: *mut Session,
}

impl E2wFs {
    fn from_box(b: Box<Session>) -> *mut E2wFs {
        let h = E2wFs { inner: Box::into_raw(b) };
        Box::into_raw(Box::new(h))
    }
    unsafe fn as_session<'a>(&self) -> Option<&'a Session> {
        self.inner.as_ref()
    }
}

#[inline]
fn code(c: ErrCode) -> c_long {
    c.0 as c_long
}

// ---------- API ----------

/// Открыть образ (ext2fs_open с unix I/O manager).
#[no_mangle]
pub unsafe extern "C" fn e2w_open(
    path: *const c_char,
    flags: c_int,
    superblock: c_uint,
    block_size: c_uint,
    out_fs: *mut *mut E2wFs,
) -> c_long {
    if path.is_null() || out_fs.is_null() {
        return code(ErrCode::INVALID_ARGUMENT);
    }
    *out_fs = ptr::null_mut();
    let Ok(p) = CStr::from_ptr(path).to_str() else {
        return code(ErrCode::INVALID_ARGUMENT);
    };
    match Session::open(p, flags, superblock, block_size, unix_io_manager()) {
        Ok(s) => {
            *out_fs = E2wFs::from_box(Box::new(s));
            0
        }
        Err(e) => code(e),
    }
}

/// Закрыть и освободить хэндл. NULL — OK.
#[no_mangle]
pub unsafe extern "C" fn e2w_close(fs: *mut E2wFs) -> c_long {
    if fs.is_null() {
        return 0;
    }
    let h: Box<E2wFs> = Box::from_raw(fs);
    if h.inner.is_null() {
        return 0;
    }
    let s: Box<Session> = Box::from_raw(h.inner);
    match s.close() {
        Ok(()) => 0,
        Err(e) => code(e),
    }
}

/// ext2fs_dir_iterate с фиксированным трамплином.
/// `block_buf` может быть NULL (буфер выделит движок).
#[no_mangle]
pub unsafe extern "C" fn e2w_dir_iterate(
    fs: *mut E2wFs,
    dir: c_uint,
    flags: c_int,
    block_buf: *mut c_char,
    block_buf_len: size_t,
    private: *mut c_int,
) -> c_long {
    let Some(session) = fs.as_ref().and_then(|h| h.as_session()) else {
        return code(ErrCode::MAGIC_EXT2FS_FILSYS);
    };
    let scratch = if block_buf.is_null() {
        None
    } else {
        Some(slice::from_raw_parts_mut(block_buf as *mut u8, block_buf_len))
    };
    // private — ячейка из e2w_alloc_callback или NULL, по контракту вызывающего.
    match session
        .fs()
        .dir_iterate(dir, flags, scratch, trampoline::walk_func, private as *mut libc::c_void)
    {
        Ok(()) => 0,
        Err(e) => code(e),
    }
}

/// Свежий id для callback'а.
#[no_mangle]
pub extern "C" fn e2w_next_id() -> c_int {
    registry::next_id()
}

/// Ячейка с id в нативной куче; NULL при нехватке памяти.
#[no_mangle]
pub extern "C" fn e2w_alloc_callback(id: c_int) -> *mut c_int {
    registry::alloc_callback(id)
}

/// Освободить ячейку из e2w_alloc_callback. NULL — no-op.
#[no_mangle]
pub unsafe extern "C" fn e2w_free_callback(cell: *mut c_int) {
    registry::free_callback(cell)
}

/// Установить внешний диспетчер (NULL снимает).
#[no_mangle]
pub extern "C" fn e2w_set_dispatch(f: Option<ForeignDispatch>) {
    trampoline::set_foreign_dispatch(f)
}

/// Текст для кода статуса; освобождать через e2w_string_free.
#[no_mangle]
pub extern "C" fn e2w_error_message(c: c_long) -> *mut c_char {
    let msg = ErrCode(c as i64).to_string();
    match CString::new(msg) {
        Ok(s) => s.into_raw(),
        Err(_) => ptr::null_mut(),
    }
}

#[no_mangle]
pub unsafe extern "C" fn e2w_string_free(s: *mut c_char) {
    if !s.is_null() {
        let _ = CString::from_raw(s); // drop → free
    }
}

/// Версия библиотеки (статическая строка, не освобождать).
#[no_mangle]
pub extern "C" fn e2w_version() -> *const c_char {
    concat!(env!("CARGO_PKG_VERSION"), "\0").as_ptr() as *const c_char
}
