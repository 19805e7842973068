// tests/common/mod.rs
//
// Сборщик маленьких образов ext2/ext4 в памяти для интеграционных тестов.
//
// Геометрия (блок 1 KiB, одна группа, 128 inode'ов по 128 байт):
//   0        boot
//   1        superblock
//   2        дескрипторы групп
//   3, 4     bitmaps (движок их не читает, остаются нулевыми)
//   5..=20   таблица inode'ов
//   24..     данные (каталоги и файлы, выделяются подряд)
#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap};

use byteorder::{ByteOrder, LittleEndian};

use e2walk::consts::*;
use e2walk::fs::superblock::superblock_csum;
use e2walk::{ErrCode, MemIoManager, Session};

pub const BS: usize = 1024;
pub const BLOCKS: u64 = 1024;
pub const INODES: u32 = 128;
pub const INODE_SIZE: usize = 128;
pub const ITABLE: u64 = 5;
pub const FIRST_DATA: u64 = 24;
pub const IMAGE_NAME: &str = "test.img";

/// Как адресованы блоки inode'а.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Mapping {
    /// 12 прямых + ind
    Direct,
    /// дерево extent'ов глубины 0 (корень в i_block)
    Extents,
    /// дерево глубины 1: индекс в i_block, лист в отдельном блоке
    ExtentsIndexed,
}

#[derive(Clone, Debug)]
struct Ent {
    ino: u32,
    name: Vec<u8>,
    ft: u8,
    removed: bool,
}

enum Kind {
    Dir { entries: Vec<Ent> },
    File { runs: Vec<u32> },
}

struct Node {
    mode: u16,
    links: u16,
    mapping: Mapping,
    kind: Kind,
}

pub struct ImageBuilder {
    nodes: BTreeMap<u32, Node>,
    next_ino: u32,
    metadata_csum: bool,
    backup_at: Option<u64>,
    volume: String,
}

fn rec_size(name_len: usize) -> usize {
    (EXT2_DIR_ENTRY_HDR + name_len + 3) & !3
}

impl ImageBuilder {
    /// Пустая ФС: только корень с "." и "..".
    pub fn new() -> Self {
        let mut nodes = BTreeMap::new();
        nodes.insert(
            EXT2_ROOT_INO,
            Node {
                mode: LINUX_S_IFDIR | 0o755,
                links: 2,
                mapping: Mapping::Direct,
                kind: Kind::Dir {
                    entries: vec![
                        Ent { ino: EXT2_ROOT_INO, name: b".".to_vec(), ft: EXT2_FT_DIR, removed: false },
                        Ent { ino: EXT2_ROOT_INO, name: b"..".to_vec(), ft: EXT2_FT_DIR, removed: false },
                    ],
                },
            },
        );
        Self {
            nodes,
            next_ino: EXT2_GOOD_OLD_FIRST_INO,
            metadata_csum: false,
            backup_at: None,
            volume: "e2walk-test".to_string(),
        }
    }

    pub fn metadata_csum(mut self, on: bool) -> Self {
        self.metadata_csum = on;
        self
    }

    /// Копия суперблока и дескрипторов в блоках `blk`, `blk + 1`.
    pub fn backup_superblock_at(mut self, blk: u64) -> Self {
        self.backup_at = Some(blk);
        self
    }

    pub fn root_mapping(&mut self, mapping: Mapping) {
        if let Some(n) = self.nodes.get_mut(&EXT2_ROOT_INO) {
            n.mapping = mapping;
        }
    }

    fn alloc_ino(&mut self) -> u32 {
        let ino = self.next_ino;
        assert!(ino <= INODES, "out of inodes");
        self.next_ino += 1;
        ino
    }

    fn entries_mut(&mut self, dir: u32) -> &mut Vec<Ent> {
        match &mut self.nodes.get_mut(&dir).expect("no such dir").kind {
            Kind::Dir { entries } => entries,
            Kind::File { .. } => panic!("inode {} is not a directory", dir),
        }
    }

    /// Запись `name` -> `ino` в каталоге `dir`.
    pub fn link(&mut self, dir: u32, name: &str, ino: u32, ft: u8) {
        self.entries_mut(dir).push(Ent {
            ino,
            name: name.as_bytes().to_vec(),
            ft,
            removed: false,
        });
    }

    pub fn mkdir(&mut self, parent: u32, name: &str) -> u32 {
        self.mkdir_with(parent, name, Mapping::Direct)
    }

    pub fn mkdir_with(&mut self, parent: u32, name: &str, mapping: Mapping) -> u32 {
        let ino = self.alloc_ino();
        self.nodes.insert(
            ino,
            Node {
                mode: LINUX_S_IFDIR | 0o755,
                links: 2,
                mapping,
                kind: Kind::Dir {
                    entries: vec![
                        Ent { ino, name: b".".to_vec(), ft: EXT2_FT_DIR, removed: false },
                        Ent { ino: parent, name: b"..".to_vec(), ft: EXT2_FT_DIR, removed: false },
                    ],
                },
            },
        );
        self.link(parent, name, ino, EXT2_FT_DIR);
        if let Some(p) = self.nodes.get_mut(&parent) {
            p.links += 1;
        }
        ino
    }

    /// Обычный файл из `nblocks` подряд идущих блоков.
    pub fn add_file(&mut self, parent: u32, name: &str, nblocks: u32) -> u32 {
        self.add_file_runs(parent, name, &[nblocks], Mapping::Direct)
    }

    /// Файл из нескольких отрезков; между отрезками на диске дыра в 1 блок.
    pub fn add_file_runs(&mut self, parent: u32, name: &str, runs: &[u32], mapping: Mapping) -> u32 {
        let ino = self.alloc_ino();
        self.nodes.insert(
            ino,
            Node {
                mode: LINUX_S_IFREG | 0o644,
                links: 1,
                mapping,
                kind: Kind::File { runs: runs.to_vec() },
            },
        );
        self.link(parent, name, ino, EXT2_FT_REG_FILE);
        ino
    }

    /// Удалить запись так, как это делает ext2: предыдущая запись в блоке
    /// поглощает её rec_len, байты остаются на месте.
    pub fn remove_entry(&mut self, dir: u32, name: &str) {
        for e in self.entries_mut(dir).iter_mut() {
            if e.name == name.as_bytes() {
                e.removed = true;
            }
        }
    }

    /// Обнулить inode у записи (запись остаётся, становится «пустой»).
    pub fn clear_entry(&mut self, dir: u32, name: &str) {
        for e in self.entries_mut(dir).iter_mut() {
            if e.name == name.as_bytes() {
                e.ino = 0;
            }
        }
    }

    pub fn build(self) -> Image {
        let mut img = Image {
            bytes: vec![0u8; BLOCKS as usize * BS],
            dir_blocks: HashMap::new(),
            file_blocks: HashMap::new(),
        };
        let mut next_block = FIRST_DATA;
        let mut used_dirs = 0u16;
        let mut uses_extents = false;

        for (&ino, node) in &self.nodes {
            let (runs, size) = match &node.kind {
                Kind::Dir { entries } => {
                    used_dirs += 1;
                    let blocks = layout_dir(entries, self.metadata_csum);
                    let start = next_block;
                    for (i, b) in blocks.iter().enumerate() {
                        img.write_block(start + i as u64, b);
                    }
                    next_block += blocks.len() as u64;
                    let phys: Vec<u64> = (start..next_block).collect();
                    img.dir_blocks.insert(ino, phys.clone());
                    (vec![phys], (blocks.len() * BS) as u64)
                }
                Kind::File { runs } => {
                    let mut out = Vec::new();
                    let mut all = Vec::new();
                    for &n in runs {
                        let phys: Vec<u64> = (next_block..next_block + n as u64).collect();
                        for &p in &phys {
                            // содержимое: номер блока, чтобы было что сравнить
                            let mut b = vec![0u8; BS];
                            LittleEndian::write_u64(&mut b[0..8], p);
                            img.write_block(p, &b);
                        }
                        next_block += n as u64 + 1;
                        all.extend_from_slice(&phys);
                        out.push(phys);
                    }
                    let total = all.len();
                    img.file_blocks.insert(ino, all);
                    (out, (total * BS) as u64)
                }
            };

            let mut raw = [0u8; INODE_SIZE];
            LittleEndian::write_u16(&mut raw[INODE_OFF_MODE..], node.mode);
            LittleEndian::write_u32(&mut raw[INODE_OFF_SIZE_LO..], size as u32);
            LittleEndian::write_u16(&mut raw[INODE_OFF_LINKS_COUNT..], node.links);

            let nblocks: usize = runs.iter().map(|r| r.len()).sum();
            let mut meta_blocks = 0usize;
            match node.mapping {
                Mapping::Direct => {
                    let flat: Vec<u64> = runs.iter().flatten().copied().collect();
                    for (i, &p) in flat.iter().take(EXT2_NDIR_BLOCKS).enumerate() {
                        LittleEndian::write_u32(&mut raw[INODE_OFF_BLOCK + i * 4..], p as u32);
                    }
                    if flat.len() > EXT2_NDIR_BLOCKS {
                        assert!(flat.len() <= EXT2_NDIR_BLOCKS + BS / 4, "dind not supported here");
                        let ind = next_block;
                        next_block += 1;
                        meta_blocks += 1;
                        let mut b = vec![0u8; BS];
                        for (i, &p) in flat[EXT2_NDIR_BLOCKS..].iter().enumerate() {
                            LittleEndian::write_u32(&mut b[i * 4..], p as u32);
                        }
                        img.write_block(ind, &b);
                        LittleEndian::write_u32(&mut raw[INODE_OFF_BLOCK + EXT2_IND_BLOCK * 4..], ind as u32);
                    }
                }
                Mapping::Extents | Mapping::ExtentsIndexed => {
                    uses_extents = true;
                    LittleEndian::write_u32(&mut raw[INODE_OFF_FLAGS..], EXT4_EXTENTS_FL);
                    let mut extents = Vec::new();
                    let mut logical = 0u32;
                    for r in runs.iter().filter(|r| !r.is_empty()) {
                        extents.push((logical, r[0], r.len() as u16));
                        logical += r.len() as u32;
                    }
                    if node.mapping == Mapping::Extents {
                        assert!(extents.len() <= 4, "too many extents for the inode root");
                        write_extent_node(&mut raw[INODE_OFF_BLOCK..INODE_OFF_BLOCK + 60], 4, &extents);
                    } else {
                        let leaf = next_block;
                        next_block += 1;
                        meta_blocks += 1;
                        let mut b = vec![0u8; BS];
                        write_extent_node(&mut b, ((BS - 12) / 12) as u16, &extents);
                        img.write_block(leaf, &b);
                        let root = &mut raw[INODE_OFF_BLOCK..INODE_OFF_BLOCK + 60];
                        LittleEndian::write_u16(&mut root[0..], EXT3_EXT_MAGIC);
                        LittleEndian::write_u16(&mut root[2..], 1);
                        LittleEndian::write_u16(&mut root[4..], 4);
                        LittleEndian::write_u16(&mut root[6..], 1);
                        // ext4_extent_idx: ei_block, ei_leaf_lo, ei_leaf_hi
                        LittleEndian::write_u32(&mut root[12..], 0);
                        LittleEndian::write_u32(&mut root[16..], leaf as u32);
                        LittleEndian::write_u16(&mut root[20..], 0);
                    }
                }
            }
            LittleEndian::write_u32(&mut raw[INODE_OFF_BLOCKS_LO..], ((nblocks + meta_blocks) * BS / 512) as u32);

            let off = ITABLE as usize * BS + (ino as usize - 1) * INODE_SIZE;
            img.bytes[off..off + INODE_SIZE].copy_from_slice(&raw);
        }
        assert!(next_block <= BLOCKS, "image too small");

        // Дескриптор группы
        let gd = 2 * BS;
        LittleEndian::write_u32(&mut img.bytes[gd + GD_OFF_BLOCK_BITMAP_LO..], 3);
        LittleEndian::write_u32(&mut img.bytes[gd + GD_OFF_INODE_BITMAP_LO..], 4);
        LittleEndian::write_u32(&mut img.bytes[gd + GD_OFF_INODE_TABLE_LO..], ITABLE as u32);
        LittleEndian::write_u16(&mut img.bytes[gd + GD_OFF_FREE_BLOCKS_LO..], (BLOCKS - next_block) as u16);
        LittleEndian::write_u16(
            &mut img.bytes[gd + GD_OFF_FREE_INODES_LO..],
            (INODES - self.nodes.len() as u32) as u16,
        );
        LittleEndian::write_u16(&mut img.bytes[gd + GD_OFF_USED_DIRS_LO..], used_dirs);

        // Суперблок
        let mut sb = vec![0u8; SUPERBLOCK_SIZE];
        LittleEndian::write_u32(&mut sb[SB_OFF_INODES_COUNT..], INODES);
        LittleEndian::write_u32(&mut sb[SB_OFF_BLOCKS_COUNT_LO..], BLOCKS as u32);
        LittleEndian::write_u32(&mut sb[SB_OFF_FREE_BLOCKS_LO..], (BLOCKS - next_block) as u32);
        LittleEndian::write_u32(&mut sb[SB_OFF_FREE_INODES..], INODES - self.nodes.len() as u32);
        LittleEndian::write_u32(&mut sb[SB_OFF_FIRST_DATA_BLOCK..], 1);
        LittleEndian::write_u32(&mut sb[SB_OFF_LOG_BLOCK_SIZE..], 0);
        LittleEndian::write_u32(&mut sb[SB_OFF_BLOCKS_PER_GROUP..], 8192);
        LittleEndian::write_u32(&mut sb[SB_OFF_BLOCKS_PER_GROUP + 4..], 8192);
        LittleEndian::write_u32(&mut sb[SB_OFF_INODES_PER_GROUP..], INODES);
        LittleEndian::write_u16(&mut sb[SB_OFF_MAGIC..], EXT2_SUPER_MAGIC);
        LittleEndian::write_u16(&mut sb[SB_OFF_STATE..], 1);
        LittleEndian::write_u32(&mut sb[SB_OFF_REV_LEVEL..], EXT2_DYNAMIC_REV);
        LittleEndian::write_u32(&mut sb[SB_OFF_FIRST_INO..], EXT2_GOOD_OLD_FIRST_INO);
        LittleEndian::write_u16(&mut sb[SB_OFF_INODE_SIZE..], INODE_SIZE as u16);

        let mut incompat = EXT2_FEATURE_INCOMPAT_FILETYPE;
        if uses_extents {
            incompat |= EXT3_FEATURE_INCOMPAT_EXTENTS;
        }
        let mut ro_compat = EXT2_FEATURE_RO_COMPAT_SPARSE_SUPER | EXT2_FEATURE_RO_COMPAT_LARGE_FILE;
        if self.metadata_csum {
            ro_compat |= EXT4_FEATURE_RO_COMPAT_METADATA_CSUM;
            sb[SB_OFF_CHECKSUM_TYPE] = EXT2_CRC32C_CHKSUM;
        }
        LittleEndian::write_u32(&mut sb[SB_OFF_FEATURE_INCOMPAT..], incompat);
        LittleEndian::write_u32(&mut sb[SB_OFF_FEATURE_RO_COMPAT..], ro_compat);
        for (i, b) in sb[SB_OFF_UUID..SB_OFF_UUID + 16].iter_mut().enumerate() {
            *b = 0xA0 + i as u8;
        }
        let vol = self.volume.as_bytes();
        sb[SB_OFF_VOLUME_NAME..SB_OFF_VOLUME_NAME + vol.len()].copy_from_slice(vol);
        if self.metadata_csum {
            let c = superblock_csum(&sb);
            LittleEndian::write_u32(&mut sb[SB_OFF_CHECKSUM..], c);
        }
        img.bytes[SUPERBLOCK_OFFSET as usize..SUPERBLOCK_OFFSET as usize + SUPERBLOCK_SIZE].copy_from_slice(&sb);

        if let Some(blk) = self.backup_at {
            assert!(blk >= next_block && blk + 1 < BLOCKS, "backup overlaps data");
            let gd_copy = img.bytes[2 * BS..3 * BS].to_vec();
            let at = blk as usize * BS;
            img.bytes[at..at + SUPERBLOCK_SIZE].copy_from_slice(&sb);
            img.bytes[at + BS..at + 2 * BS].copy_from_slice(&gd_copy);
        }
        img
    }
}

impl Default for ImageBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn write_extent_node(node: &mut [u8], max: u16, extents: &[(u32, u64, u16)]) {
    LittleEndian::write_u16(&mut node[0..], EXT3_EXT_MAGIC);
    LittleEndian::write_u16(&mut node[2..], extents.len() as u16);
    LittleEndian::write_u16(&mut node[4..], max);
    LittleEndian::write_u16(&mut node[6..], 0);
    for (i, &(lblk, pblk, len)) in extents.iter().enumerate() {
        let e = &mut node[12 + i * 12..12 + (i + 1) * 12];
        LittleEndian::write_u32(&mut e[0..], lblk);
        LittleEndian::write_u16(&mut e[4..], len);
        LittleEndian::write_u16(&mut e[6..], (pblk >> 32) as u16);
        LittleEndian::write_u32(&mut e[8..], pblk as u32);
    }
}

// Разложить записи по блокам. Удалённые записи лежат на месте, их байты
// покрывает rec_len предыдущей видимой записи.
fn layout_dir(entries: &[Ent], csum: bool) -> Vec<Vec<u8>> {
    let usable = if csum { BS - EXT2_DIR_TAIL_SIZE } else { BS };

    // (блок, смещение) каждой записи
    let mut placed: Vec<Vec<(usize, &Ent)>> = vec![Vec::new()];
    let mut off = 0usize;
    for e in entries {
        let need = rec_size(e.name.len());
        if off + need > usable {
            placed.push(Vec::new());
            off = 0;
        }
        let cur = placed.last_mut().expect("at least one block");
        assert!(!(e.removed && cur.is_empty()), "removed entry cannot start a block");
        cur.push((off, e));
        off += need;
    }

    let mut out = Vec::with_capacity(placed.len());
    for blk in &placed {
        let mut b = vec![0u8; BS];
        for (i, &(o, e)) in blk.iter().enumerate() {
            let next_any = blk.get(i + 1).map_or(usable, |&(n, _)| n);
            let next_visible = blk[i + 1..]
                .iter()
                .find(|(_, n)| !n.removed)
                .map_or(usable, |&(n, _)| n);
            let rec_len = if e.removed { next_any - o } else { next_visible - o };
            LittleEndian::write_u32(&mut b[o..], e.ino);
            LittleEndian::write_u16(&mut b[o + 4..], rec_len as u16);
            b[o + 6] = e.name.len() as u8;
            b[o + 7] = e.ft;
            b[o + 8..o + 8 + e.name.len()].copy_from_slice(&e.name);
        }
        if blk.is_empty() {
            LittleEndian::write_u16(&mut b[4..], usable as u16);
        }
        if csum {
            let t = BS - EXT2_DIR_TAIL_SIZE;
            LittleEndian::write_u32(&mut b[t..], 0);
            LittleEndian::write_u16(&mut b[t + 4..], EXT2_DIR_TAIL_SIZE as u16);
            LittleEndian::write_u16(&mut b[t + 6..], EXT2_DIR_NAME_LEN_CSUM);
            let c = crc32c::crc32c(&b[..t]);
            LittleEndian::write_u32(&mut b[t + 8..], c);
        }
        out.push(b);
    }
    out
}

/// Собранный образ.
pub struct Image {
    pub bytes: Vec<u8>,
    dir_blocks: HashMap<u32, Vec<u64>>,
    file_blocks: HashMap<u32, Vec<u64>>,
}

impl Image {
    fn write_block(&mut self, blk: u64, data: &[u8]) {
        let at = blk as usize * BS;
        self.bytes[at..at + data.len()].copy_from_slice(data);
    }

    pub fn dir_blocks(&self, ino: u32) -> &[u64] {
        &self.dir_blocks[&ino]
    }

    pub fn file_blocks(&self, ino: u32) -> &[u64] {
        &self.file_blocks[&ino]
    }

    pub fn block(&self, blk: u64) -> &[u8] {
        &self.bytes[blk as usize * BS..(blk as usize + 1) * BS]
    }

    pub fn block_mut(&mut self, blk: u64) -> &mut [u8] {
        &mut self.bytes[blk as usize * BS..(blk as usize + 1) * BS]
    }

    pub fn corrupt_primary_magic(&mut self) {
        let at = SUPERBLOCK_OFFSET as usize + SB_OFF_MAGIC;
        self.bytes[at] = 0;
        self.bytes[at + 1] = 0;
    }

    pub fn manager(&self) -> MemIoManager {
        let m = MemIoManager::new();
        m.insert(IMAGE_NAME, self.bytes.clone());
        m
    }

    /// Открыть только на чтение.
    pub fn open(&self) -> Session {
        self.open_with(0, 0, 0).expect("open test image").1
    }

    /// Открыть с флагами; менеджер возвращается, чтобы видеть записи.
    pub fn open_with(&self, flags: i32, superblock: u32, block_size: u32) -> Result<(MemIoManager, Session), ErrCode> {
        let m = self.manager();
        let s = Session::open(IMAGE_NAME, flags, superblock, block_size, &m)?;
        Ok((m, s))
    }
}
