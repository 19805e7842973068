//! Сессия файловой системы и скоупный обход каталога.
//!
//! `Session` владеет открытым `Filsys`. `walk_dir` делает весь протокол
//! за вызывающего: id -> хэндл -> регистрация -> iterate -> освобождение,
//! на любом пути выхода (включая панику в callback'е).

use std::any::Any;
use std::os::raw::c_int;
use std::panic::{catch_unwind, resume_unwind, AssertUnwindSafe};

use log::debug;
use serde::Serialize;
use thiserror::Error;

use crate::config::SessionBuilder;
use crate::consts::*;
use crate::entry::{DirEntry, DirEntryInfo, Outcome};
use crate::errcode::ErrCode;
use crate::fs::{Filsys, Superblock};
use crate::io::IoManager;
use crate::registry::{self, CallbackHandle};
use crate::trampoline;

/// Ошибка обхода: сбой движка, отказ callback'а или отсутствие хэндла.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum WalkError {
    #[error("engine error: {0}")]
    Engine(ErrCode),
    #[error("walk aborted by callback after {dispatched} entries")]
    Aborted { dispatched: u64 },
    #[error("callback handle unavailable: {0}")]
    HandleUnavailable(ErrCode),
}

impl WalkError {
    /// Код движка для этой ошибки (Aborted -> EXT2_ET_CALLBACK_ABORTED).
    pub fn code(&self) -> ErrCode {
        match self {
            WalkError::Engine(c) | WalkError::HandleUnavailable(c) => *c,
            WalkError::Aborted { .. } => ErrCode::CALLBACK_ABORTED,
        }
    }
}

impl From<ErrCode> for WalkError {
    fn from(c: ErrCode) -> Self {
        WalkError::Engine(c)
    }
}

/// Итог успешного обхода.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct WalkSummary {
    /// Сколько записей получил callback.
    pub dispatched: u64,
    /// Обход остановлен callback'ом (Outcome::Stop).
    pub stopped: bool,
    /// Сколько раз callback вернул Modified.
    pub modified: u64,
}

// Фиксирует higher-ranked сигнатуру замыкания.
fn entry_callback<F>(f: F) -> F
where
    F: FnMut(&mut DirEntry<'_>) -> Outcome,
{
    f
}

pub struct Session {
    fs: Filsys,
}

impl Session {
    /// Открыть образ. Ошибки движка возвращаются как есть, без повторов.
    pub fn open(
        path: &str,
        flags: c_int,
        superblock: u32,
        block_size: u32,
        io: &dyn IoManager,
    ) -> Result<Session, ErrCode> {
        let fs = Filsys::open(path, flags, superblock, block_size, io)?;
        debug!(
            "session open: {} (superblock={}, block_size={}, rw={})",
            path,
            superblock,
            fs.block_size(),
            fs.is_rw()
        );
        Ok(Session { fs })
    }

    /// Builder поверх `E2Config::from_env()`.
    pub fn builder() -> SessionBuilder {
        SessionBuilder::new()
    }

    #[inline]
    pub fn fs(&self) -> &Filsys {
        &self.fs
    }

    pub fn path(&self) -> &str {
        self.fs.device_name()
    }

    pub fn superblock(&self) -> &Superblock {
        self.fs.superblock()
    }

    pub fn close(self) -> Result<(), ErrCode> {
        debug!("session close: {}", self.fs.device_name());
        self.fs.close()
    }

    /// Обойти каталог `dir`; движок сам выделит буфер блока.
    pub fn walk_dir<F>(&self, dir: u32, flags: c_int, f: F) -> Result<WalkSummary, WalkError>
    where
        F: FnMut(&mut DirEntry<'_>) -> Outcome,
    {
        self.run_walk(dir, flags, None, f)
    }

    /// То же, но с рабочим буфером вызывающего (не меньше блока).
    pub fn walk_dir_with_buf<F>(
        &self,
        dir: u32,
        flags: c_int,
        scratch: &mut [u8],
        f: F,
    ) -> Result<WalkSummary, WalkError>
    where
        F: FnMut(&mut DirEntry<'_>) -> Outcome,
    {
        self.run_walk(dir, flags, Some(scratch), f)
    }

    fn run_walk<F>(
        &self,
        dir: u32,
        flags: c_int,
        scratch: Option<&mut [u8]>,
        mut f: F,
    ) -> Result<WalkSummary, WalkError>
    where
        F: FnMut(&mut DirEntry<'_>) -> Outcome,
    {
        let handle = CallbackHandle::acquire(registry::next_id()).map_err(WalkError::HandleUnavailable)?;

        let mut summary = WalkSummary::default();
        let mut panicked: Option<Box<dyn Any + Send>> = None;
        let res = {
            let mut wrapper = entry_callback(|e: &mut DirEntry<'_>| {
                summary.dispatched += 1;
                match catch_unwind(AssertUnwindSafe(|| f(e))) {
                    Ok(outcome) => {
                        match outcome {
                            Outcome::Stop => summary.stopped = true,
                            Outcome::Modified => summary.modified += 1,
                            Outcome::Continue | Outcome::Abort => {}
                        }
                        outcome
                    }
                    Err(payload) => {
                        panicked = Some(payload);
                        Outcome::Abort
                    }
                }
            });
            registry::with_registration(handle.id(), &mut wrapper, |_| {
                trampoline::iterate(&self.fs, dir, flags, scratch, &handle)
            })
            .map_err(WalkError::HandleUnavailable)?
        };
        handle.release();

        if let Some(payload) = panicked {
            resume_unwind(payload);
        }
        match res {
            Ok(()) => Ok(summary),
            Err(ErrCode::CALLBACK_ABORTED) => Err(WalkError::Aborted {
                dispatched: summary.dispatched,
            }),
            Err(e) => Err(WalkError::Engine(e)),
        }
    }

    /// Все записи каталога (без пустых), в порядке на диске.
    pub fn read_dir(&self, dir: u32) -> Result<Vec<DirEntryInfo>, WalkError> {
        self.read_dir_flags(dir, 0)
    }

    /// `read_dir` с флагами движка (INCLUDE_EMPTY / INCLUDE_REMOVED).
    pub fn read_dir_flags(&self, dir: u32, flags: c_int) -> Result<Vec<DirEntryInfo>, WalkError> {
        let mut out = Vec::new();
        self.walk_dir(dir, flags, |e| {
            out.push(e.to_info());
            Outcome::Continue
        })?;
        Ok(out)
    }

    /// Найти запись `name` в каталоге `dir` (ext2fs_lookup).
    pub fn lookup_name(&self, dir: u32, name: &[u8]) -> Result<Option<DirEntryInfo>, WalkError> {
        let mut found = None;
        self.walk_dir(dir, 0, |e| {
            if e.name() == name {
                found = Some(e.to_info());
                Outcome::Stop
            } else {
                Outcome::Continue
            }
        })?;
        Ok(found)
    }

    /// Разрешить абсолютный путь от корня в номер inode (ext2fs_namei без симлинков).
    pub fn resolve_path(&self, path: &str) -> Result<u32, WalkError> {
        let mut cur = EXT2_ROOT_INO;
        for comp in path.split('/').filter(|c| !c.is_empty()) {
            match self.lookup_name(cur, comp.as_bytes())? {
                Some(e) => cur = e.inode,
                None => return Err(WalkError::Engine(ErrCode(libc::ENOENT as i64))),
            }
        }
        Ok(cur)
    }

    /// Путь каталога `dir` от корня (ext2fs_get_pathname): подъём по "..",
    /// на каждом уровне — поиск имени ребёнка в родителе. Имя, которое не
    /// нашлось, выводится как `<ino>`.
    pub fn pathname(&self, dir: u32) -> Result<String, WalkError> {
        if dir == EXT2_ROOT_INO {
            return Ok("/".to_string());
        }
        let mut parts: Vec<String> = Vec::new();
        let mut cur = dir;
        while cur != EXT2_ROOT_INO {
            if parts.len() >= MAX_PATH_DEPTH {
                return Err(WalkError::Engine(ErrCode::DIR_CORRUPTED));
            }
            let parent = self
                .lookup_name(cur, b"..")?
                .map(|e| e.inode)
                .ok_or(WalkError::Engine(ErrCode::DIR_CORRUPTED))?;
            if parent == cur || parent == 0 {
                return Err(WalkError::Engine(ErrCode::DIR_CORRUPTED));
            }
            parts.push(self.child_name(parent, cur)?);
            cur = parent;
        }
        parts.reverse();
        Ok(format!("/{}", parts.join("/")))
    }

    fn child_name(&self, parent: u32, child: u32) -> Result<String, WalkError> {
        let mut name = None;
        self.walk_dir(parent, 0, |e| {
            if e.inode() == child && !e.is_dot() && !e.is_dotdot() {
                name = Some(e.name_lossy().into_owned());
                Outcome::Stop
            } else {
                Outcome::Continue
            }
        })?;
        Ok(name.unwrap_or_else(|| format!("<{}>", child)))
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("path", &self.fs.device_name())
            .field("block_size", &self.fs.block_size())
            .field("rw", &self.fs.is_rw())
            .finish()
    }
}
