//! fs — read-only движок ext2/3/4 (внешний по отношению к трамплину).
//!
//! Наружу торчат четыре вещи, через которые его гоняет ядро:
//! - `Filsys::open`      (ext2fs_open)
//! - `Filsys::dir_iterate` с C-ABI callback'ом и непрозрачным `private`
//! - чтение inode / карты блоков / inode scan — для lookup
//! - `Filsys::close`
//!
//! Внутреннее состояние (канал ввода/вывода) — под RefCell: вложенные обходы
//! из callback'а допустимы, канал не удерживается через вызов callback'а.

use std::cell::RefCell;
use std::os::raw::c_int;

use log::debug;

use crate::consts::*;
use crate::errcode::ErrCode;
use crate::io::{ChannelFlags, IoChannel, IoManager};
use crate::metrics;

pub mod blockmap;
pub mod dir_iterate;
pub mod group;
pub mod inode;
pub mod scan;
pub mod superblock;

pub use blockmap::Extent;
pub use dir_iterate::{DirIterateFn, RawDirEntry};
pub use group::GroupDesc;
pub use inode::Inode;
pub use scan::InodeScan;
pub use superblock::Superblock;

/// Открытая файловая система (ext2_filsys).
pub struct Filsys {
    io: RefCell<Box<dyn IoChannel>>,
    sb: Superblock,
    groups: Vec<GroupDesc>,
    flags: c_int,
    device_name: String,
    /// Номер блока, из которого прочитан суперблок (0 = основной).
    superblock_block: u64,
}

impl Filsys {
    /// Открыть образ `name` через `manager`.
    ///
    /// `superblock` = 0 — основной суперблок (байт 1024); иначе номер блока
    /// резервной копии, и тогда `block_size` обязателен. `block_size` = 0 —
    /// взять из суперблока, иначе он должен совпасть.
    pub fn open(
        name: &str,
        flags: c_int,
        superblock: u32,
        block_size: u32,
        manager: &dyn IoManager,
    ) -> Result<Filsys, ErrCode> {
        let res = Self::open_inner(name, flags, superblock, block_size, manager);
        if let Err(e) = &res {
            metrics::record_open_failure();
            debug!("ext2fs_open {} failed: {}", name, e);
        }
        res
    }

    fn open_inner(
        name: &str,
        flags: c_int,
        superblock: u32,
        block_size: u32,
        manager: &dyn IoManager,
    ) -> Result<Filsys, ErrCode> {
        if superblock != 0 && block_size == 0 {
            return Err(ErrCode::INVALID_ARGUMENT);
        }
        if block_size != 0
            && (!block_size.is_power_of_two()
                || block_size < (1 << EXT2_MIN_BLOCK_LOG_SIZE)
                || block_size > (1 << EXT2_MAX_BLOCK_LOG_SIZE))
        {
            return Err(ErrCode::INVALID_ARGUMENT);
        }

        let mut io = manager.open(name, ChannelFlags::from_open_flags(flags))?;

        let sb_offset = if superblock != 0 {
            io.set_blksize(block_size);
            superblock as u64 * block_size as u64
        } else {
            io.set_blksize(SUPERBLOCK_OFFSET as u32);
            SUPERBLOCK_OFFSET
        };

        let mut raw = vec![0u8; SUPERBLOCK_SIZE];
        io.read_at(sb_offset, &mut raw)?;
        let sb = Superblock::parse(&raw)?;

        if sb.has_metadata_csum()
            && flags & EXT2_FLAG_IGNORE_CSUM_ERRORS == 0
            && !superblock::superblock_csum_verify(&raw)
        {
            return Err(ErrCode::SB_CSUM_INVALID);
        }

        if flags & EXT2_FLAG_FORCE == 0 {
            if sb.unsupported_incompat() != 0 {
                debug!(
                    "ext2fs_open {}: unsupported incompat features {:#x}",
                    name,
                    sb.unsupported_incompat()
                );
                return Err(ErrCode::UNSUPP_FEATURE);
            }
            if flags & EXT2_FLAG_RW != 0 && sb.unsupported_ro_compat() != 0 {
                return Err(ErrCode::RO_UNSUPP_FEATURE);
            }
        }

        let bs = sb.block_size();
        if block_size != 0 && block_size != bs {
            return Err(ErrCode::UNEXPECTED_BLOCK_SIZE);
        }
        io.set_blksize(bs);

        // Дескрипторы групп лежат сразу за выбранным суперблоком.
        let gd_block = if superblock != 0 {
            superblock as u64 + 1
        } else {
            sb.first_data_block as u64 + 1
        };
        let count = sb.group_count();
        let desc_size = sb.desc_size();
        let gd_bytes = count as usize * desc_size;
        let gd_blocks = gd_bytes.div_ceil(bs as usize);
        let mut gd_raw = vec![0u8; gd_blocks * bs as usize];
        io.read_blk64(gd_block, &mut gd_raw)
            .map_err(|_| ErrCode::GDESC_READ)?;
        let groups = group::parse_group_table(&gd_raw, desc_size, count);

        if flags & EXT2_FLAG_FORCE == 0 {
            for g in &groups {
                if g.inode_table < sb.first_data_block as u64 || g.inode_table >= sb.blocks_count {
                    return Err(ErrCode::GDESC_BAD_INODE_TABLE);
                }
            }
        }

        debug!(
            "ext2fs_open {}: {} blocks of {} B, {} groups, {} inodes, io={}",
            name,
            sb.blocks_count,
            bs,
            count,
            sb.inodes_count,
            manager.name()
        );

        Ok(Filsys {
            io: RefCell::new(io),
            sb,
            groups,
            flags,
            device_name: name.to_string(),
            superblock_block: superblock as u64,
        })
    }

    /// Закрыть (ext2fs_close): сбросить канал. Ошибка сброса пробрасывается.
    pub fn close(self) -> Result<(), ErrCode> {
        debug!("ext2fs_close {}", self.device_name);
        self.io.borrow_mut().flush()
    }

    #[inline]
    pub fn superblock(&self) -> &Superblock {
        &self.sb
    }

    #[inline]
    pub fn groups(&self) -> &[GroupDesc] {
        &self.groups
    }

    #[inline]
    pub fn block_size(&self) -> u32 {
        self.sb.block_size()
    }

    #[inline]
    pub fn flags(&self) -> c_int {
        self.flags
    }

    #[inline]
    pub fn is_rw(&self) -> bool {
        self.flags & EXT2_FLAG_RW != 0
    }

    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    pub fn superblock_block(&self) -> u64 {
        self.superblock_block
    }

    /// Прочитать один или несколько блоков (buf.len() кратен размеру блока).
    pub fn read_block(&self, block: u64, buf: &mut [u8]) -> Result<(), ErrCode> {
        if block >= self.sb.blocks_count {
            return Err(ErrCode::BAD_BLOCK_NUM);
        }
        self.io.borrow_mut().read_blk64(block, buf)?;
        metrics::record_block_read();
        Ok(())
    }

    /// Записать блок. Только для сессий, открытых с EXT2_FLAG_RW.
    pub fn write_block(&self, block: u64, buf: &[u8]) -> Result<(), ErrCode> {
        if !self.is_rw() {
            return Err(ErrCode::RO_FILSYS);
        }
        if block >= self.sb.blocks_count {
            return Err(ErrCode::BAD_BLOCK_NUM);
        }
        self.io.borrow_mut().write_blk64(block, buf)?;
        metrics::record_block_written();
        Ok(())
    }

    /// Прочитать `buf.len()` байт по смещению внутри блока.
    pub(crate) fn read_bytes(&self, block: u64, offset: usize, buf: &mut [u8]) -> Result<(), ErrCode> {
        if block >= self.sb.blocks_count {
            return Err(ErrCode::BAD_BLOCK_NUM);
        }
        let base = block * self.block_size() as u64 + offset as u64;
        self.io.borrow_mut().read_at(base, buf)
    }
}
