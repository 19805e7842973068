// src/fs/scan.rs — последовательный проход по таблицам inode'ов (inode scan)
//
// Группы с флагом INODE_UNINIT (при gdt_csum/metadata_csum) пропускаются:
// их таблица не инициализирована и содержит мусор.

use super::{Filsys, Inode};
use crate::consts::*;
use crate::errcode::ErrCode;

pub struct InodeScan<'a> {
    fs: &'a Filsys,
    next_ino: u32,
    buf: Vec<u8>,
    buf_block: Option<u64>,
    skip_uninit: bool,
}

impl Filsys {
    /// ext2fs_open_inode_scan
    pub fn open_inode_scan(&self) -> InodeScan<'_> {
        let skip_uninit = self.sb.has_ro_compat(EXT4_FEATURE_RO_COMPAT_GDT_CSUM) || self.sb.has_metadata_csum();
        InodeScan {
            fs: self,
            next_ino: 1,
            buf: vec![0u8; self.block_size() as usize],
            buf_block: None,
            skip_uninit,
        }
    }
}

impl<'a> InodeScan<'a> {
    /// ext2fs_get_next_inode: `Ok(None)` в конце таблицы.
    pub fn next_inode(&mut self) -> Result<Option<(u32, Inode)>, ErrCode> {
        let sb = self.fs.superblock();
        let ipg = sb.inodes_per_group;
        loop {
            let ino = self.next_ino;
            if ino == 0 || ino > sb.inodes_count {
                return Ok(None);
            }
            let group = ((ino - 1) / ipg) as usize;
            if self.skip_uninit && self.fs.groups()[group].inode_uninit() {
                self.next_ino = (group as u32 + 1) * ipg + 1;
                continue;
            }
            self.next_ino = ino + 1;

            let (block, offset) = self.fs.inode_location(ino)?;
            if self.buf_block != Some(block) {
                self.buf_block = None;
                self.fs.read_block(block, &mut self.buf)?;
                self.buf_block = Some(block);
            }
            let raw = &self.buf[offset..offset + EXT2_GOOD_OLD_INODE_SIZE as usize];
            return Ok(Some((ino, Inode::parse(raw))));
        }
    }
}

impl<'a> Iterator for InodeScan<'a> {
    type Item = Result<(u32, Inode), ErrCode>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.next_inode() {
            Ok(Some(v)) => Some(Ok(v)),
            Ok(None) => None,
            Err(e) => {
                // после ошибки дальше не идём
                self.next_ino = 0;
                Some(Err(e))
            }
        }
    }
}
