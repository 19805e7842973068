// src/fs/superblock.rs — разбор и проверка суперблока ext2/3/4
//
// Проверки (в порядке libext2fs):
// - magic 0xEF53                        -> BAD_MAGIC
// - rev_level <= EXT2_DYNAMIC_REV       -> REV_TOO_HIGH
// - геометрия (log_block_size, per-group счётчики, inode_size) -> CORRUPT_SUPERBLOCK
// Проверка checksum'а (metadata_csum) делается в open, т.к. зависит от флагов.

use byteorder::{ByteOrder, LittleEndian};
use serde::Serialize;

use crate::consts::*;
use crate::errcode::ErrCode;

#[derive(Debug, Clone, Serialize)]
pub struct Superblock {
    pub inodes_count: u32,
    pub blocks_count: u64,
    pub free_blocks_count: u32,
    pub free_inodes_count: u32,
    pub first_data_block: u32,
    pub log_block_size: u32,
    pub blocks_per_group: u32,
    pub inodes_per_group: u32,
    pub magic: u16,
    pub state: u16,
    pub rev_level: u32,
    pub first_ino: u32,
    pub inode_size: u16,
    pub block_group_nr: u16,
    pub feature_compat: u32,
    pub feature_incompat: u32,
    pub feature_ro_compat: u32,
    pub uuid: [u8; 16],
    pub volume_name: String,
    pub desc_size: u16,
    pub checksum_type: u8,
    pub checksum_seed: u32,
    pub checksum: u32,
}

impl Superblock {
    /// Разобрать 1024 байта суперблока.
    pub fn parse(raw: &[u8]) -> Result<Self, ErrCode> {
        if raw.len() < SUPERBLOCK_SIZE {
            return Err(ErrCode::SHORT_READ);
        }
        let u16_at = |off: usize| LittleEndian::read_u16(&raw[off..off + 2]);
        let u32_at = |off: usize| LittleEndian::read_u32(&raw[off..off + 4]);

        let magic = u16_at(SB_OFF_MAGIC);
        if magic != EXT2_SUPER_MAGIC {
            return Err(ErrCode::BAD_MAGIC);
        }
        let rev_level = u32_at(SB_OFF_REV_LEVEL);
        if rev_level > EXT2_DYNAMIC_REV {
            return Err(ErrCode::REV_TOO_HIGH);
        }

        let feature_incompat = u32_at(SB_OFF_FEATURE_INCOMPAT);
        let mut blocks_count = u32_at(SB_OFF_BLOCKS_COUNT_LO) as u64;
        if feature_incompat & EXT4_FEATURE_INCOMPAT_64BIT != 0 {
            blocks_count |= (u32_at(SB_OFF_BLOCKS_COUNT_HI) as u64) << 32;
        }

        let (first_ino, inode_size) = if rev_level == EXT2_GOOD_OLD_REV {
            (EXT2_GOOD_OLD_FIRST_INO, EXT2_GOOD_OLD_INODE_SIZE)
        } else {
            (u32_at(SB_OFF_FIRST_INO), u16_at(SB_OFF_INODE_SIZE))
        };

        let mut uuid = [0u8; 16];
        uuid.copy_from_slice(&raw[SB_OFF_UUID..SB_OFF_UUID + 16]);
        let vol = &raw[SB_OFF_VOLUME_NAME..SB_OFF_VOLUME_NAME + 16];
        let vol_end = vol.iter().position(|&b| b == 0).unwrap_or(vol.len());
        let volume_name = String::from_utf8_lossy(&vol[..vol_end]).into_owned();

        let sb = Superblock {
            inodes_count: u32_at(SB_OFF_INODES_COUNT),
            blocks_count,
            free_blocks_count: u32_at(SB_OFF_FREE_BLOCKS_LO),
            free_inodes_count: u32_at(SB_OFF_FREE_INODES),
            first_data_block: u32_at(SB_OFF_FIRST_DATA_BLOCK),
            log_block_size: u32_at(SB_OFF_LOG_BLOCK_SIZE),
            blocks_per_group: u32_at(SB_OFF_BLOCKS_PER_GROUP),
            inodes_per_group: u32_at(SB_OFF_INODES_PER_GROUP),
            magic,
            state: u16_at(SB_OFF_STATE),
            rev_level,
            first_ino,
            inode_size,
            block_group_nr: u16_at(SB_OFF_BLOCK_GROUP_NR),
            feature_compat: u32_at(SB_OFF_FEATURE_COMPAT),
            feature_incompat,
            feature_ro_compat: u32_at(SB_OFF_FEATURE_RO_COMPAT),
            uuid,
            volume_name,
            desc_size: u16_at(SB_OFF_DESC_SIZE),
            checksum_type: raw[SB_OFF_CHECKSUM_TYPE],
            checksum_seed: u32_at(SB_OFF_CHECKSUM_SEED),
            checksum: u32_at(SB_OFF_CHECKSUM),
        };
        sb.check_geometry()?;
        Ok(sb)
    }

    fn check_geometry(&self) -> Result<(), ErrCode> {
        if self.log_block_size > EXT2_MAX_BLOCK_LOG_SIZE - EXT2_MIN_BLOCK_LOG_SIZE {
            return Err(ErrCode::CORRUPT_SUPERBLOCK);
        }
        let bs = self.block_size() as u64;
        if self.blocks_per_group == 0
            || self.inodes_per_group == 0
            || self.blocks_per_group as u64 > bs * 8
            || self.inodes_per_group as u64 > bs * 8
        {
            return Err(ErrCode::CORRUPT_SUPERBLOCK);
        }
        if self.first_data_block as u64 >= self.blocks_count {
            return Err(ErrCode::CORRUPT_SUPERBLOCK);
        }
        let isz = self.inode_size;
        if isz < EXT2_GOOD_OLD_INODE_SIZE || isz as u64 > bs || !isz.is_power_of_two() {
            return Err(ErrCode::CORRUPT_SUPERBLOCK);
        }
        if self.inodes_count as u64 > self.inodes_per_group as u64 * self.group_count() as u64 {
            return Err(ErrCode::CORRUPT_SUPERBLOCK);
        }
        if self.has_incompat(EXT4_FEATURE_INCOMPAT_64BIT) {
            let ds = self.desc_size as usize;
            if ds < EXT2_MIN_DESC_SIZE_64BIT || ds > EXT2_MAX_DESC_SIZE || !ds.is_power_of_two() {
                return Err(ErrCode::CORRUPT_SUPERBLOCK);
            }
        }
        Ok(())
    }

    #[inline]
    pub fn block_size(&self) -> u32 {
        1024u32 << self.log_block_size
    }

    #[inline]
    pub fn has_compat(&self, f: u32) -> bool {
        self.feature_compat & f != 0
    }

    #[inline]
    pub fn has_incompat(&self, f: u32) -> bool {
        self.feature_incompat & f != 0
    }

    #[inline]
    pub fn has_ro_compat(&self, f: u32) -> bool {
        self.feature_ro_compat & f != 0
    }

    pub fn group_count(&self) -> u32 {
        let data = self.blocks_count - self.first_data_block as u64;
        data.div_ceil(self.blocks_per_group as u64) as u32
    }

    /// Фактический размер дескриптора группы.
    pub fn desc_size(&self) -> usize {
        if self.has_incompat(EXT4_FEATURE_INCOMPAT_64BIT) {
            self.desc_size as usize
        } else {
            EXT2_MIN_DESC_SIZE
        }
    }

    /// Каталоги хранят тип файла в старшем байте name_len.
    pub fn has_filetype(&self) -> bool {
        self.has_incompat(EXT2_FEATURE_INCOMPAT_FILETYPE)
    }

    pub fn has_metadata_csum(&self) -> bool {
        self.has_ro_compat(EXT4_FEATURE_RO_COMPAT_METADATA_CSUM)
    }

    /// incompat-биты, которые движок не поддерживает.
    pub fn unsupported_incompat(&self) -> u32 {
        self.feature_incompat & !SUPPORTED_INCOMPAT
    }

    pub fn unsupported_ro_compat(&self) -> u32 {
        self.feature_ro_compat & !SUPPORTED_RO_COMPAT
    }

    /// Шестнадцатеричный UUID в каноническом виде 8-4-4-4-12.
    pub fn uuid_string(&self) -> String {
        let h: Vec<String> = self.uuid.iter().map(|b| format!("{:02x}", b)).collect();
        format!(
            "{}-{}-{}-{}-{}",
            h[0..4].concat(),
            h[4..6].concat(),
            h[6..8].concat(),
            h[8..10].concat(),
            h[10..16].concat()
        )
    }
}

/// crc32c суперблока (metadata_csum): сырой crc32c(~0) по первым 1020 байтам.
pub fn superblock_csum(raw: &[u8]) -> u32 {
    !crc32c::crc32c(&raw[..SB_OFF_CHECKSUM])
}

/// Совпадает ли s_checksum с содержимым.
pub fn superblock_csum_verify(raw: &[u8]) -> bool {
    if raw.len() < SUPERBLOCK_SIZE {
        return false;
    }
    let stored = LittleEndian::read_u32(&raw[SB_OFF_CHECKSUM..SB_OFF_CHECKSUM + 4]);
    stored == superblock_csum(raw)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_raw() -> Vec<u8> {
        let mut raw = vec![0u8; SUPERBLOCK_SIZE];
        LittleEndian::write_u32(&mut raw[SB_OFF_INODES_COUNT..], 32);
        LittleEndian::write_u32(&mut raw[SB_OFF_BLOCKS_COUNT_LO..], 128);
        LittleEndian::write_u32(&mut raw[SB_OFF_FIRST_DATA_BLOCK..], 1);
        LittleEndian::write_u32(&mut raw[SB_OFF_BLOCKS_PER_GROUP..], 8192);
        LittleEndian::write_u32(&mut raw[SB_OFF_INODES_PER_GROUP..], 32);
        LittleEndian::write_u16(&mut raw[SB_OFF_MAGIC..], EXT2_SUPER_MAGIC);
        LittleEndian::write_u32(&mut raw[SB_OFF_REV_LEVEL..], 1);
        LittleEndian::write_u32(&mut raw[SB_OFF_FIRST_INO..], 11);
        LittleEndian::write_u16(&mut raw[SB_OFF_INODE_SIZE..], 128);
        raw[SB_OFF_VOLUME_NAME..SB_OFF_VOLUME_NAME + 4].copy_from_slice(b"test");
        raw
    }

    #[test]
    fn parse_minimal() {
        let sb = Superblock::parse(&minimal_raw()).unwrap();
        assert_eq!(sb.block_size(), 1024);
        assert_eq!(sb.group_count(), 1);
        assert_eq!(sb.desc_size(), EXT2_MIN_DESC_SIZE);
        assert_eq!(sb.volume_name, "test");
    }

    #[test]
    fn rejects_bad_magic_and_revision() {
        let mut raw = minimal_raw();
        raw[SB_OFF_MAGIC] = 0;
        assert_eq!(Superblock::parse(&raw).unwrap_err(), ErrCode::BAD_MAGIC);

        let mut raw = minimal_raw();
        LittleEndian::write_u32(&mut raw[SB_OFF_REV_LEVEL..], 7);
        assert_eq!(Superblock::parse(&raw).unwrap_err(), ErrCode::REV_TOO_HIGH);
    }

    #[test]
    fn rejects_zero_inodes_per_group() {
        let mut raw = minimal_raw();
        LittleEndian::write_u32(&mut raw[SB_OFF_INODES_PER_GROUP..], 0);
        assert_eq!(Superblock::parse(&raw).unwrap_err(), ErrCode::CORRUPT_SUPERBLOCK);
    }

    #[test]
    fn checksum_roundtrip() {
        let mut raw = minimal_raw();
        let c = superblock_csum(&raw);
        LittleEndian::write_u32(&mut raw[SB_OFF_CHECKSUM..], c);
        assert!(superblock_csum_verify(&raw));
        raw[SB_OFF_VOLUME_NAME] ^= 0xFF;
        assert!(!superblock_csum_verify(&raw));
    }
}
