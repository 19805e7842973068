//! io — менеджеры ввода/вывода блоков (аналог io_manager/io_channel).
//!
//! Движок не знает, откуда берутся блоки: сессия выбирает менеджер,
//! менеджер открывает канал, канал читает/пишет блоки размера `blksize`.
//!
//! - `unix`: файл или блочное устройство (std::fs + advisory lock через fs2)
//! - `mem`: образ в памяти (тесты, встраивание)

use std::os::raw::c_int;

use crate::errcode::ErrCode;

pub mod mem;
pub mod unix;

pub use mem::MemIoManager;
pub use unix::{unix_io_manager, UnixIoManager};

/// Режим открытия канала (выводится из флагов ext2fs_open).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ChannelFlags {
    pub rw: bool,
    pub exclusive: bool,
}

impl ChannelFlags {
    pub fn from_open_flags(flags: c_int) -> Self {
        Self {
            rw: flags & crate::consts::EXT2_FLAG_RW != 0,
            exclusive: flags & crate::consts::EXT2_FLAG_EXCLUSIVE != 0,
        }
    }
}

/// Выбор способа физического доступа к блокам.
pub trait IoManager {
    fn name(&self) -> &'static str;
    fn open(&self, name: &str, flags: ChannelFlags) -> Result<Box<dyn IoChannel>, ErrCode>;
}

/// Открытый канал к образу. Блок = `blksize` байт, адресация от нуля.
pub trait IoChannel: Send {
    fn name(&self) -> &str;

    fn blksize(&self) -> u32;
    fn set_blksize(&mut self, blksize: u32);

    /// Прочитать `buf.len()` байт с байтового смещения `offset`.
    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<(), ErrCode>;
    /// Записать `buf` по байтовому смещению `offset`.
    fn write_at(&mut self, offset: u64, buf: &[u8]) -> Result<(), ErrCode>;

    fn flush(&mut self) -> Result<(), ErrCode> {
        Ok(())
    }

    /// Прочитать `buf.len()` байт начиная с блока `block`.
    fn read_blk64(&mut self, block: u64, buf: &mut [u8]) -> Result<(), ErrCode> {
        let off = block
            .checked_mul(self.blksize() as u64)
            .ok_or(ErrCode::BAD_BLOCK_NUM)?;
        self.read_at(off, buf)
    }

    fn write_blk64(&mut self, block: u64, buf: &[u8]) -> Result<(), ErrCode> {
        let off = block
            .checked_mul(self.blksize() as u64)
            .ok_or(ErrCode::BAD_BLOCK_NUM)?;
        self.write_at(off, buf)
    }
}
