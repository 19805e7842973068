// src/fs/blockmap.rs — логическая -> физическая карта блоков inode'а
//
// Два формата:
// - дерево extent'ов (EXT4_EXTENTS_FL): заголовок 0xF30A + индексы/листья
// - классическая адресация: 12 прямых + ind + dind + tind
// Результат — отсортированный по logical список непрерывных отрезков.

use byteorder::{ByteOrder, LittleEndian};
use serde::Serialize;

use super::{Filsys, Inode};
use crate::consts::*;
use crate::errcode::ErrCode;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Extent {
    pub logical: u64,
    pub physical: u64,
    pub len: u32,
    /// Неинициализированный extent (выделен, но не записан).
    pub uninit: bool,
}

impl Extent {
    #[inline]
    pub fn physical_end(&self) -> u64 {
        self.physical + self.len as u64 - 1
    }
}

impl Filsys {
    /// Карта блоков данных inode'а. Дыры в карту не попадают.
    pub fn block_map(&self, inode: &Inode) -> Result<Vec<Extent>, ErrCode> {
        if inode.has_inline_data() {
            return Err(ErrCode::INLINE_DATA_CANT_ITERATE);
        }
        if inode.is_fast_symlink() {
            return Ok(Vec::new());
        }
        let mut out = Vec::new();
        if inode.uses_extents() {
            self.walk_extent_node(&inode.block_raw, None, &mut out)?;
            out.sort_by_key(|e| e.logical);
        } else {
            let bs = self.block_size() as u64;
            let nblocks = inode.size.div_ceil(bs);
            let mut acc = Coalescer::new(&mut out);
            for (i, &b) in inode.block[..EXT2_NDIR_BLOCKS].iter().enumerate() {
                if i as u64 >= nblocks {
                    break;
                }
                if b != 0 {
                    acc.push(i as u64, b as u64);
                }
            }
            let mut logical = EXT2_NDIR_BLOCKS as u64;
            for (level, slot) in [(1u32, EXT2_IND_BLOCK), (2, EXT2_DIND_BLOCK), (3, EXT2_TIND_BLOCK)] {
                if logical >= nblocks {
                    break;
                }
                let span = self.indirect_span(level);
                let ptr = inode.block[slot];
                if ptr != 0 {
                    self.walk_indirect(ptr as u64, level, logical, nblocks, &mut acc)?;
                }
                logical += span;
            }
        }
        Ok(out)
    }

    /// Сколько логических блоков покрывает указатель уровня `level`.
    fn indirect_span(&self, level: u32) -> u64 {
        let per = (self.block_size() / 4) as u64;
        per.pow(level)
    }

    fn walk_indirect(
        &self,
        blk: u64,
        level: u32,
        logical: u64,
        nblocks: u64,
        acc: &mut Coalescer<'_>,
    ) -> Result<(), ErrCode> {
        let bs = self.block_size() as usize;
        let mut buf = vec![0u8; bs];
        self.read_block(blk, &mut buf)?;
        let child_span = self.indirect_span(level - 1);
        for i in 0..bs / 4 {
            let start = logical + i as u64 * child_span;
            if start >= nblocks {
                break;
            }
            let ptr = LittleEndian::read_u32(&buf[i * 4..i * 4 + 4]) as u64;
            if ptr == 0 {
                continue;
            }
            if level == 1 {
                acc.push(start, ptr);
            } else {
                self.walk_indirect(ptr, level - 1, start, nblocks, acc)?;
            }
        }
        Ok(())
    }

    fn walk_extent_node(
        &self,
        node: &[u8],
        expect_depth: Option<u16>,
        out: &mut Vec<Extent>,
    ) -> Result<(), ErrCode> {
        if node.len() < EXT3_EXT_HEADER_SIZE {
            return Err(ErrCode::EXTENT_HEADER_BAD);
        }
        let magic = LittleEndian::read_u16(&node[0..2]);
        let entries = LittleEndian::read_u16(&node[2..4]) as usize;
        let max = LittleEndian::read_u16(&node[4..6]) as usize;
        let depth = LittleEndian::read_u16(&node[6..8]);
        let fits = (node.len() - EXT3_EXT_HEADER_SIZE) / EXT3_EXT_ENTRY_SIZE;
        if magic != EXT3_EXT_MAGIC
            || entries > max
            || max > fits
            || depth > EXT_MAX_DEPTH
            || expect_depth.is_some_and(|d| d != depth)
        {
            return Err(ErrCode::EXTENT_HEADER_BAD);
        }

        for i in 0..entries {
            let e = &node[EXT3_EXT_HEADER_SIZE + i * EXT3_EXT_ENTRY_SIZE..][..EXT3_EXT_ENTRY_SIZE];
            let lblk = LittleEndian::read_u32(&e[0..4]) as u64;
            if depth == 0 {
                let raw_len = LittleEndian::read_u16(&e[4..6]);
                let start_hi = LittleEndian::read_u16(&e[6..8]) as u64;
                let start_lo = LittleEndian::read_u32(&e[8..12]) as u64;
                let (len, uninit) = if raw_len > EXT_INIT_MAX_LEN {
                    (raw_len - EXT_INIT_MAX_LEN, true)
                } else {
                    (raw_len, false)
                };
                if len == 0 {
                    continue;
                }
                out.push(Extent {
                    logical: lblk,
                    physical: (start_hi << 32) | start_lo,
                    len: len as u32,
                    uninit,
                });
            } else {
                let leaf_lo = LittleEndian::read_u32(&e[4..8]) as u64;
                let leaf_hi = LittleEndian::read_u16(&e[8..10]) as u64;
                let child = (leaf_hi << 32) | leaf_lo;
                let mut buf = vec![0u8; self.block_size() as usize];
                self.read_block(child, &mut buf)?;
                self.walk_extent_node(&buf, Some(depth - 1), out)?;
            }
        }
        Ok(())
    }
}

/// Склеивает подряд идущие (logical, physical) в отрезки.
struct Coalescer<'a> {
    out: &'a mut Vec<Extent>,
}

impl<'a> Coalescer<'a> {
    fn new(out: &'a mut Vec<Extent>) -> Self {
        Self { out }
    }

    fn push(&mut self, logical: u64, physical: u64) {
        if let Some(last) = self.out.last_mut() {
            if last.logical + last.len as u64 == logical && last.physical + last.len as u64 == physical {
                last.len += 1;
                return;
            }
        }
        self.out.push(Extent { logical, physical, len: 1, uninit: false });
    }
}
