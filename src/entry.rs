//! Запись каталога в том виде, в каком её видит callback, и решение по ней.
//!
//! `DirEntry` — заимствованное окно в буфер блока движка; живёт ровно один
//! вызов трамплина. Для хранения дальше — `DirEntryInfo` (owned копия).

use std::borrow::Cow;
use std::os::raw::{c_char, c_int};

use byteorder::{ByteOrder, LittleEndian};
use serde::Serialize;

use crate::consts::*;
use crate::errcode::ErrCode;
use crate::fs::dir_iterate::get_rec_len;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum FileType {
    Unknown,
    Regular,
    Directory,
    CharDevice,
    BlockDevice,
    Fifo,
    Socket,
    Symlink,
    Other(u8),
}

impl FileType {
    pub fn from_raw(v: u8) -> Self {
        match v {
            EXT2_FT_UNKNOWN => FileType::Unknown,
            EXT2_FT_REG_FILE => FileType::Regular,
            EXT2_FT_DIR => FileType::Directory,
            EXT2_FT_CHRDEV => FileType::CharDevice,
            EXT2_FT_BLKDEV => FileType::BlockDevice,
            EXT2_FT_FIFO => FileType::Fifo,
            EXT2_FT_SOCK => FileType::Socket,
            EXT2_FT_SYMLINK => FileType::Symlink,
            other => FileType::Other(other),
        }
    }

    pub fn as_raw(self) -> u8 {
        match self {
            FileType::Unknown => EXT2_FT_UNKNOWN,
            FileType::Regular => EXT2_FT_REG_FILE,
            FileType::Directory => EXT2_FT_DIR,
            FileType::CharDevice => EXT2_FT_CHRDEV,
            FileType::BlockDevice => EXT2_FT_BLKDEV,
            FileType::Fifo => EXT2_FT_FIFO,
            FileType::Socket => EXT2_FT_SOCK,
            FileType::Symlink => EXT2_FT_SYMLINK,
            FileType::Other(v) => v,
        }
    }

    /// Однобуквенная метка в стиле `ls -l`.
    pub fn tag(self) -> char {
        match self {
            FileType::Regular => '-',
            FileType::Directory => 'd',
            FileType::CharDevice => 'c',
            FileType::BlockDevice => 'b',
            FileType::Fifo => 'p',
            FileType::Socket => 's',
            FileType::Symlink => 'l',
            FileType::Unknown | FileType::Other(_) => '?',
        }
    }
}

/// Решение callback'а по одной записи.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Дальше.
    Continue,
    /// Остановить обход; статус обхода — успех.
    Stop,
    /// Запись изменена на месте; блок будет записан обратно, обход продолжается.
    Modified,
    /// Прервать обход с ошибкой (отличимо от сбоя движка).
    Abort,
}

impl Outcome {
    /// Флаги возврата для движка (DIRENT_*).
    pub fn to_flags(self) -> c_int {
        match self {
            Outcome::Continue => 0,
            Outcome::Stop => DIRENT_ABORT,
            Outcome::Modified => DIRENT_CHANGED,
            Outcome::Abort => DIRENT_ERROR,
        }
    }

    /// Код из внешнего (FFI) callback'а: 0..=3 в порядке объявления.
    pub fn from_code(code: c_int) -> Option<Outcome> {
        match code {
            0 => Some(Outcome::Continue),
            1 => Some(Outcome::Stop),
            2 => Some(Outcome::Modified),
            3 => Some(Outcome::Abort),
            _ => None,
        }
    }
}

pub struct DirEntry<'a> {
    block: &'a mut [u8],
    offset: usize,
}

impl<'a> DirEntry<'a> {
    /// Окно на запись по смещению `offset` внутри блока.
    /// `None`, если заголовок или имя не помещаются в блок.
    pub fn new(block: &'a mut [u8], offset: usize) -> Option<Self> {
        if offset.checked_add(EXT2_DIR_ENTRY_HDR)? > block.len() {
            return None;
        }
        let name_len = block[offset + 6] as usize;
        if offset + EXT2_DIR_ENTRY_HDR + name_len > block.len() {
            return None;
        }
        Some(Self { block, offset })
    }

    /// Построить из аргументов C-callback'а движка.
    ///
    /// # Safety
    /// `buf` должен указывать на `blocksize` байт, доступных на запись в течение `'a`.
    pub unsafe fn from_raw(buf: *mut c_char, offset: c_int, blocksize: c_int) -> Option<Self> {
        if buf.is_null() || offset < 0 || blocksize <= 0 {
            return None;
        }
        let block = std::slice::from_raw_parts_mut(buf as *mut u8, blocksize as usize);
        Self::new(block, offset as usize)
    }

    #[inline]
    pub fn inode(&self) -> u32 {
        LittleEndian::read_u32(&self.block[self.offset..self.offset + 4])
    }

    #[inline]
    pub fn rec_len(&self) -> usize {
        get_rec_len(self.block, self.offset)
    }

    #[inline]
    pub fn name_len(&self) -> usize {
        self.block[self.offset + 6] as usize
    }

    #[inline]
    pub fn file_type(&self) -> FileType {
        FileType::from_raw(self.block[self.offset + 7])
    }

    pub fn name(&self) -> &[u8] {
        let start = self.offset + EXT2_DIR_ENTRY_HDR;
        &self.block[start..start + self.name_len()]
    }

    pub fn name_lossy(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(self.name())
    }

    #[inline]
    pub fn offset(&self) -> usize {
        self.offset
    }

    #[inline]
    pub fn block_size(&self) -> usize {
        self.block.len()
    }

    pub fn is_dot(&self) -> bool {
        self.name() == b"."
    }

    pub fn is_dotdot(&self) -> bool {
        self.name() == b".."
    }

    pub fn set_inode(&mut self, ino: u32) {
        LittleEndian::write_u32(&mut self.block[self.offset..self.offset + 4], ino);
    }

    pub fn set_file_type(&mut self, ft: FileType) {
        self.block[self.offset + 7] = ft.as_raw();
    }

    /// Переименовать на месте; новое имя обязано влезть в rec_len.
    pub fn set_name(&mut self, name: &[u8]) -> Result<(), ErrCode> {
        if name.is_empty() || name.len() > EXT2_NAME_LEN || name.len() + EXT2_DIR_ENTRY_HDR > self.rec_len() {
            return Err(ErrCode::INVALID_ARGUMENT);
        }
        let start = self.offset + EXT2_DIR_ENTRY_HDR;
        if start + name.len() > self.block.len() {
            return Err(ErrCode::INVALID_ARGUMENT);
        }
        self.block[self.offset + 6] = name.len() as u8;
        self.block[start..start + name.len()].copy_from_slice(name);
        Ok(())
    }

    pub fn to_info(&self) -> DirEntryInfo {
        DirEntryInfo {
            inode: self.inode(),
            name: self.name_lossy().into_owned(),
            file_type: self.file_type(),
            rec_len: self.rec_len(),
            offset: self.offset,
        }
    }
}

impl std::fmt::Debug for DirEntry<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DirEntry")
            .field("inode", &self.inode())
            .field("name", &self.name_lossy())
            .field("file_type", &self.file_type())
            .field("rec_len", &self.rec_len())
            .field("offset", &self.offset)
            .finish()
    }
}

/// Owned снимок записи.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DirEntryInfo {
    pub inode: u32,
    pub name: String,
    pub file_type: FileType,
    pub rec_len: usize,
    pub offset: usize,
}
