//! unix_io — канал поверх файла образа или блочного устройства.
//!
//! EXT2_FLAG_EXCLUSIVE => advisory exclusive lock (fs2) на сам файл образа.
//! Lock снимается на Drop канала.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};

use fs2::FileExt;
use log::debug;

use super::{ChannelFlags, IoChannel, IoManager};
use crate::consts::SUPERBLOCK_OFFSET;
use crate::errcode::ErrCode;

#[derive(Debug, Default)]
pub struct UnixIoManager;

static UNIX_IO_MANAGER: UnixIoManager = UnixIoManager;

/// Глобальный менеджер по умолчанию (как unix_io_manager в libext2fs).
pub fn unix_io_manager() -> &'static UnixIoManager {
    &UNIX_IO_MANAGER
}

impl IoManager for UnixIoManager {
    fn name(&self) -> &'static str {
        "Unix I/O Manager"
    }

    fn open(&self, name: &str, flags: ChannelFlags) -> Result<Box<dyn IoChannel>, ErrCode> {
        let file = OpenOptions::new()
            .read(true)
            .write(flags.rw)
            .open(name)
            .map_err(|e| ErrCode::from_io(&e))?;

        let locked = if flags.exclusive {
            file.try_lock_exclusive().map_err(|e| {
                debug!("unix_io: exclusive lock on {} failed: {}", name, e);
                ErrCode(libc::EBUSY as i64)
            })?;
            true
        } else {
            false
        };

        debug!(
            "unix_io: opened {} (rw={}, exclusive={})",
            name, flags.rw, flags.exclusive
        );
        Ok(Box::new(UnixChannel {
            file,
            name: name.to_string(),
            blksize: SUPERBLOCK_OFFSET as u32,
            rw: flags.rw,
            locked,
        }))
    }
}

pub struct UnixChannel {
    file: File,
    name: String,
    blksize: u32,
    rw: bool,
    locked: bool,
}

impl IoChannel for UnixChannel {
    fn name(&self) -> &str {
        &self.name
    }

    fn blksize(&self) -> u32 {
        self.blksize
    }

    fn set_blksize(&mut self, blksize: u32) {
        self.blksize = blksize;
    }

    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<(), ErrCode> {
        self.file
            .seek(SeekFrom::Start(offset))
            .map_err(|e| ErrCode::from_io(&e))?;
        self.file.read_exact(buf).map_err(|e| ErrCode::from_io(&e))
    }

    fn write_at(&mut self, offset: u64, buf: &[u8]) -> Result<(), ErrCode> {
        if !self.rw {
            return Err(ErrCode::RO_FILSYS);
        }
        self.file
            .seek(SeekFrom::Start(offset))
            .map_err(|e| ErrCode::from_io(&e))?;
        self.file.write_all(buf).map_err(|e| ErrCode::from_io(&e))
    }

    fn flush(&mut self) -> Result<(), ErrCode> {
        if self.rw {
            self.file.sync_all().map_err(|e| ErrCode::from_io(&e))?;
        }
        Ok(())
    }
}

impl Drop for UnixChannel {
    fn drop(&mut self) {
        if self.locked {
            // ошибки unlock на Drop игнорируем
            let _ = self.file.unlock();
        }
    }
}
