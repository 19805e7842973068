//! Константы on-disk формата ext2/3/4 и флаги движка (open / dir_iterate).
//!
//! Смещения полей — в байтах от начала соответствующей структуры, всё LE.

use std::os::raw::c_int;

// -------- Superblock --------
pub const SUPERBLOCK_OFFSET: u64 = 1024;
pub const SUPERBLOCK_SIZE: usize = 1024;
pub const EXT2_SUPER_MAGIC: u16 = 0xEF53;

pub const EXT2_GOOD_OLD_REV: u32 = 0;
pub const EXT2_DYNAMIC_REV: u32 = 1;
pub const EXT2_GOOD_OLD_INODE_SIZE: u16 = 128;
pub const EXT2_GOOD_OLD_FIRST_INO: u32 = 11;

pub const EXT2_MIN_BLOCK_LOG_SIZE: u32 = 10; // 1 KiB
pub const EXT2_MAX_BLOCK_LOG_SIZE: u32 = 16; // 64 KiB

pub const SB_OFF_INODES_COUNT: usize = 0;
pub const SB_OFF_BLOCKS_COUNT_LO: usize = 4;
pub const SB_OFF_FREE_BLOCKS_LO: usize = 12;
pub const SB_OFF_FREE_INODES: usize = 16;
pub const SB_OFF_FIRST_DATA_BLOCK: usize = 20;
pub const SB_OFF_LOG_BLOCK_SIZE: usize = 24;
pub const SB_OFF_BLOCKS_PER_GROUP: usize = 32;
pub const SB_OFF_INODES_PER_GROUP: usize = 40;
pub const SB_OFF_MAGIC: usize = 56;
pub const SB_OFF_STATE: usize = 58;
pub const SB_OFF_REV_LEVEL: usize = 76;
pub const SB_OFF_FIRST_INO: usize = 84;
pub const SB_OFF_INODE_SIZE: usize = 88;
pub const SB_OFF_BLOCK_GROUP_NR: usize = 90;
pub const SB_OFF_FEATURE_COMPAT: usize = 92;
pub const SB_OFF_FEATURE_INCOMPAT: usize = 96;
pub const SB_OFF_FEATURE_RO_COMPAT: usize = 100;
pub const SB_OFF_UUID: usize = 104;
pub const SB_OFF_VOLUME_NAME: usize = 120;
pub const SB_OFF_DESC_SIZE: usize = 254;
pub const SB_OFF_BLOCKS_COUNT_HI: usize = 336;
pub const SB_OFF_CHECKSUM_TYPE: usize = 0x175;
pub const SB_OFF_CHECKSUM_SEED: usize = 0x270;
pub const SB_OFF_CHECKSUM: usize = 0x3FC;

pub const EXT2_CRC32C_CHKSUM: u8 = 1;

// -------- Feature flags --------
pub const EXT3_FEATURE_COMPAT_HAS_JOURNAL: u32 = 0x0004;
pub const EXT2_FEATURE_COMPAT_DIR_INDEX: u32 = 0x0020;

pub const EXT2_FEATURE_INCOMPAT_FILETYPE: u32 = 0x0002;
pub const EXT3_FEATURE_INCOMPAT_RECOVER: u32 = 0x0004;
pub const EXT2_FEATURE_INCOMPAT_META_BG: u32 = 0x0010;
pub const EXT3_FEATURE_INCOMPAT_EXTENTS: u32 = 0x0040;
pub const EXT4_FEATURE_INCOMPAT_64BIT: u32 = 0x0080;
pub const EXT4_FEATURE_INCOMPAT_MMP: u32 = 0x0100;
pub const EXT4_FEATURE_INCOMPAT_FLEX_BG: u32 = 0x0200;
pub const EXT4_FEATURE_INCOMPAT_EA_INODE: u32 = 0x0400;
pub const EXT4_FEATURE_INCOMPAT_CSUM_SEED: u32 = 0x2000;
pub const EXT4_FEATURE_INCOMPAT_LARGEDIR: u32 = 0x4000;
pub const EXT4_FEATURE_INCOMPAT_INLINE_DATA: u32 = 0x8000;

pub const EXT2_FEATURE_RO_COMPAT_SPARSE_SUPER: u32 = 0x0001;
pub const EXT2_FEATURE_RO_COMPAT_LARGE_FILE: u32 = 0x0002;
pub const EXT4_FEATURE_RO_COMPAT_HUGE_FILE: u32 = 0x0008;
pub const EXT4_FEATURE_RO_COMPAT_GDT_CSUM: u32 = 0x0010;
pub const EXT4_FEATURE_RO_COMPAT_DIR_NLINK: u32 = 0x0020;
pub const EXT4_FEATURE_RO_COMPAT_EXTRA_ISIZE: u32 = 0x0040;
pub const EXT4_FEATURE_RO_COMPAT_METADATA_CSUM: u32 = 0x0400;

/// incompat-фичи, с которыми движок умеет читать каталоги.
pub const SUPPORTED_INCOMPAT: u32 = EXT2_FEATURE_INCOMPAT_FILETYPE
    | EXT3_FEATURE_INCOMPAT_RECOVER
    | EXT3_FEATURE_INCOMPAT_EXTENTS
    | EXT4_FEATURE_INCOMPAT_64BIT
    | EXT4_FEATURE_INCOMPAT_MMP
    | EXT4_FEATURE_INCOMPAT_FLEX_BG
    | EXT4_FEATURE_INCOMPAT_EA_INODE
    | EXT4_FEATURE_INCOMPAT_CSUM_SEED
    | EXT4_FEATURE_INCOMPAT_LARGEDIR
    | EXT4_FEATURE_INCOMPAT_INLINE_DATA;

/// ro_compat-фичи, допустимые при открытии на запись.
/// metadata_csum сюда не входит: пересчёт csum каталожных блоков не реализован.
pub const SUPPORTED_RO_COMPAT: u32 = EXT2_FEATURE_RO_COMPAT_SPARSE_SUPER
    | EXT2_FEATURE_RO_COMPAT_LARGE_FILE
    | EXT4_FEATURE_RO_COMPAT_HUGE_FILE
    | EXT4_FEATURE_RO_COMPAT_GDT_CSUM
    | EXT4_FEATURE_RO_COMPAT_DIR_NLINK
    | EXT4_FEATURE_RO_COMPAT_EXTRA_ISIZE;

// -------- Group descriptors --------
pub const EXT2_MIN_DESC_SIZE: usize = 32;
pub const EXT2_MIN_DESC_SIZE_64BIT: usize = 64;
pub const EXT2_MAX_DESC_SIZE: usize = 1024;

pub const GD_OFF_BLOCK_BITMAP_LO: usize = 0;
pub const GD_OFF_INODE_BITMAP_LO: usize = 4;
pub const GD_OFF_INODE_TABLE_LO: usize = 8;
pub const GD_OFF_FREE_BLOCKS_LO: usize = 12;
pub const GD_OFF_FREE_INODES_LO: usize = 14;
pub const GD_OFF_USED_DIRS_LO: usize = 16;
pub const GD_OFF_FLAGS: usize = 18;
pub const GD_OFF_ITABLE_UNUSED_LO: usize = 28;
pub const GD_OFF_BLOCK_BITMAP_HI: usize = 0x20;
pub const GD_OFF_INODE_BITMAP_HI: usize = 0x24;
pub const GD_OFF_INODE_TABLE_HI: usize = 0x28;

pub const EXT2_BG_INODE_UNINIT: u16 = 0x0001;

// -------- Inodes --------
pub const EXT2_BAD_INO: u32 = 1;
pub const EXT2_ROOT_INO: u32 = 2;

pub const INODE_OFF_MODE: usize = 0;
pub const INODE_OFF_UID: usize = 2;
pub const INODE_OFF_SIZE_LO: usize = 4;
pub const INODE_OFF_DTIME: usize = 20;
pub const INODE_OFF_GID: usize = 24;
pub const INODE_OFF_LINKS_COUNT: usize = 26;
pub const INODE_OFF_BLOCKS_LO: usize = 28;
pub const INODE_OFF_FLAGS: usize = 32;
pub const INODE_OFF_BLOCK: usize = 40;
pub const INODE_OFF_GENERATION: usize = 100;
pub const INODE_OFF_SIZE_HIGH: usize = 108;

pub const EXT2_N_BLOCKS: usize = 15;
pub const EXT2_NDIR_BLOCKS: usize = 12;
pub const EXT2_IND_BLOCK: usize = 12;
pub const EXT2_DIND_BLOCK: usize = 13;
pub const EXT2_TIND_BLOCK: usize = 14;

pub const LINUX_S_IFMT: u16 = 0o170000;
pub const LINUX_S_IFDIR: u16 = 0o040000;
pub const LINUX_S_IFREG: u16 = 0o100000;
pub const LINUX_S_IFLNK: u16 = 0o120000;

pub const EXT4_EXTENTS_FL: u32 = 0x0008_0000;
pub const EXT4_INLINE_DATA_FL: u32 = 0x1000_0000;

// -------- Extent tree --------
pub const EXT3_EXT_MAGIC: u16 = 0xF30A;
pub const EXT3_EXT_HEADER_SIZE: usize = 12;
pub const EXT3_EXT_ENTRY_SIZE: usize = 12;
pub const EXT_INIT_MAX_LEN: u16 = 1 << 15;
pub const EXT_MAX_DEPTH: u16 = 5;

// -------- Directory entries --------
pub const EXT2_NAME_LEN: usize = 255;
pub const EXT2_DIR_ENTRY_HDR: usize = 8;
pub const EXT2_DIR_TAIL_SIZE: usize = 12;
/// name_len (u16) хвостовой записи с checksum'ом: name_len=0, file_type=0xDE.
pub const EXT2_DIR_NAME_LEN_CSUM: u16 = 0xDE00;

pub const EXT2_FT_UNKNOWN: u8 = 0;
pub const EXT2_FT_REG_FILE: u8 = 1;
pub const EXT2_FT_DIR: u8 = 2;
pub const EXT2_FT_CHRDEV: u8 = 3;
pub const EXT2_FT_BLKDEV: u8 = 4;
pub const EXT2_FT_FIFO: u8 = 5;
pub const EXT2_FT_SOCK: u8 = 6;
pub const EXT2_FT_SYMLINK: u8 = 7;

// -------- ext2fs_open flags --------
pub const EXT2_FLAG_RW: c_int = 0x01;
pub const EXT2_FLAG_FORCE: c_int = 0x400;
pub const EXT2_FLAG_EXCLUSIVE: c_int = 0x4000;
pub const EXT2_FLAG_64BITS: c_int = 0x20000;
pub const EXT2_FLAG_IGNORE_CSUM_ERRORS: c_int = 0x200000;

// -------- dir_iterate flags --------
pub const DIRENT_FLAG_INCLUDE_EMPTY: c_int = 0x1;
pub const DIRENT_FLAG_INCLUDE_REMOVED: c_int = 0x2;

// Возврат callback'а (битовая маска)
pub const DIRENT_CHANGED: c_int = 0x1;
pub const DIRENT_ABORT: c_int = 0x2;
/// Остановить обход с ошибкой: движок вернёт EXT2_ET_CALLBACK_ABORTED.
pub const DIRENT_ERROR: c_int = 0x4;

/// Предел глубины при восстановлении пути по "..".
pub const MAX_PATH_DEPTH: usize = 4096;
