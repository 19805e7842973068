// src/fs/inode.rs — чтение inode (первые 128 байт, «good old» часть)

use byteorder::{ByteOrder, LittleEndian};

use super::Filsys;
use crate::consts::*;
use crate::errcode::ErrCode;

#[derive(Debug, Clone)]
pub struct Inode {
    pub mode: u16,
    pub uid: u16,
    pub gid: u16,
    pub size: u64,
    pub dtime: u32,
    pub links_count: u16,
    pub blocks: u32,
    pub flags: u32,
    pub block: [u32; EXT2_N_BLOCKS],
    pub generation: u32,
    /// i_block как есть (корень дерева extent'ов / inline-данные).
    pub block_raw: [u8; EXT2_N_BLOCKS * 4],
}

impl Inode {
    pub fn parse(raw: &[u8]) -> Self {
        let u16_at = |off: usize| LittleEndian::read_u16(&raw[off..off + 2]);
        let u32_at = |off: usize| LittleEndian::read_u32(&raw[off..off + 4]);

        let mut block = [0u32; EXT2_N_BLOCKS];
        let mut block_raw = [0u8; EXT2_N_BLOCKS * 4];
        block_raw.copy_from_slice(&raw[INODE_OFF_BLOCK..INODE_OFF_BLOCK + EXT2_N_BLOCKS * 4]);
        for (i, b) in block.iter_mut().enumerate() {
            *b = u32_at(INODE_OFF_BLOCK + i * 4);
        }

        Inode {
            mode: u16_at(INODE_OFF_MODE),
            uid: u16_at(INODE_OFF_UID),
            gid: u16_at(INODE_OFF_GID),
            size: u32_at(INODE_OFF_SIZE_LO) as u64 | ((u32_at(INODE_OFF_SIZE_HIGH) as u64) << 32),
            dtime: u32_at(INODE_OFF_DTIME),
            links_count: u16_at(INODE_OFF_LINKS_COUNT),
            blocks: u32_at(INODE_OFF_BLOCKS_LO),
            flags: u32_at(INODE_OFF_FLAGS),
            block,
            generation: u32_at(INODE_OFF_GENERATION),
            block_raw,
        }
    }

    #[inline]
    pub fn is_dir(&self) -> bool {
        self.mode & LINUX_S_IFMT == LINUX_S_IFDIR
    }

    #[inline]
    pub fn is_reg(&self) -> bool {
        self.mode & LINUX_S_IFMT == LINUX_S_IFREG
    }

    #[inline]
    pub fn is_symlink(&self) -> bool {
        self.mode & LINUX_S_IFMT == LINUX_S_IFLNK
    }

    #[inline]
    pub fn uses_extents(&self) -> bool {
        self.flags & EXT4_EXTENTS_FL != 0
    }

    #[inline]
    pub fn has_inline_data(&self) -> bool {
        self.flags & EXT4_INLINE_DATA_FL != 0
    }

    /// «Быстрая» ссылка: цель хранится прямо в i_block, блоков нет.
    pub fn is_fast_symlink(&self) -> bool {
        self.is_symlink() && !self.uses_extents() && self.size < (EXT2_N_BLOCKS * 4) as u64 && self.blocks == 0
    }
}

impl Filsys {
    /// (блок, смещение) inode'а в таблице inode'ов его группы.
    pub(crate) fn inode_location(&self, ino: u32) -> Result<(u64, usize), ErrCode> {
        if ino == 0 || ino > self.sb.inodes_count {
            return Err(ErrCode::BAD_INODE_NUM);
        }
        let ipg = self.sb.inodes_per_group;
        let group = ((ino - 1) / ipg) as usize;
        let index = ((ino - 1) % ipg) as u64;
        let gd = self.groups.get(group).ok_or(ErrCode::BAD_INODE_NUM)?;
        let bs = self.block_size() as u64;
        let byte_off = index * self.sb.inode_size as u64;
        Ok((gd.inode_table + byte_off / bs, (byte_off % bs) as usize))
    }

    /// ext2fs_read_inode
    pub fn read_inode(&self, ino: u32) -> Result<Inode, ErrCode> {
        let (block, offset) = self.inode_location(ino)?;
        let mut raw = [0u8; EXT2_GOOD_OLD_INODE_SIZE as usize];
        self.read_bytes(block, offset, &mut raw)?;
        Ok(Inode::parse(&raw))
    }

    /// ext2fs_check_directory: Ok(()) если `ino` — каталог.
    pub fn check_directory(&self, ino: u32) -> Result<(), ErrCode> {
        let inode = self.read_inode(ino)?;
        if !inode.is_dir() {
            return Err(ErrCode::NO_DIRECTORY);
        }
        Ok(())
    }
}
