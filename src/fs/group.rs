// src/fs/group.rs — дескрипторы групп блоков (32 байта; 64+ при 64bit)

use byteorder::{ByteOrder, LittleEndian};
use serde::Serialize;

use crate::consts::*;

#[derive(Debug, Clone, Serialize)]
pub struct GroupDesc {
    pub block_bitmap: u64,
    pub inode_bitmap: u64,
    pub inode_table: u64,
    pub free_blocks_count: u16,
    pub free_inodes_count: u16,
    pub used_dirs_count: u16,
    pub flags: u16,
    pub itable_unused: u16,
}

impl GroupDesc {
    /// `raw` — ровно один дескриптор длиной desc_size.
    pub fn parse(raw: &[u8]) -> Self {
        let u16_at = |off: usize| LittleEndian::read_u16(&raw[off..off + 2]);
        let u32_at = |off: usize| LittleEndian::read_u32(&raw[off..off + 4]) as u64;
        let wide = raw.len() >= EXT2_MIN_DESC_SIZE_64BIT;
        let hi = |off: usize| if wide { u32_at(off) << 32 } else { 0 };

        GroupDesc {
            block_bitmap: u32_at(GD_OFF_BLOCK_BITMAP_LO) | hi(GD_OFF_BLOCK_BITMAP_HI),
            inode_bitmap: u32_at(GD_OFF_INODE_BITMAP_LO) | hi(GD_OFF_INODE_BITMAP_HI),
            inode_table: u32_at(GD_OFF_INODE_TABLE_LO) | hi(GD_OFF_INODE_TABLE_HI),
            free_blocks_count: u16_at(GD_OFF_FREE_BLOCKS_LO),
            free_inodes_count: u16_at(GD_OFF_FREE_INODES_LO),
            used_dirs_count: u16_at(GD_OFF_USED_DIRS_LO),
            flags: u16_at(GD_OFF_FLAGS),
            itable_unused: u16_at(GD_OFF_ITABLE_UNUSED_LO),
        }
    }

    #[inline]
    pub fn inode_uninit(&self) -> bool {
        self.flags & EXT2_BG_INODE_UNINIT != 0
    }
}

/// Разобрать таблицу дескрипторов подряд.
pub fn parse_group_table(raw: &[u8], desc_size: usize, count: u32) -> Vec<GroupDesc> {
    (0..count as usize)
        .map(|g| GroupDesc::parse(&raw[g * desc_size..(g + 1) * desc_size]))
        .collect()
}
