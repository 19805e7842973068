//! Коды статуса движка (errcode_t).
//!
//! Пространство кодов устроено как в com_err: `EXT2_ET_BASE + offset` для
//! собственных ошибок движка и «сырые» errno (< базы) для ошибок ввода/вывода.
//! Ядро (сессия, трамплин) пробрасывает код как есть, без переинтерпретации.

use std::fmt;
use std::io;

pub const EXT2_ET_BASE: i64 = 2133571328;

/// Статус операции движка. `ErrCode::OK` (0) — успех.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ErrCode(pub i64);

macro_rules! codes {
    ($( $name:ident = $off:expr, $msg:expr; )*) => {
        impl ErrCode {
            $( pub const $name: ErrCode = ErrCode(EXT2_ET_BASE + $off); )*

            fn table_lookup(self) -> Option<(&'static str, &'static str)> {
                match self {
                    $( ErrCode::$name => Some((concat!("EXT2_ET_", stringify!($name)), $msg)), )*
                    _ => None,
                }
            }
        }
    };
}

codes! {
    MAGIC_EXT2FS_FILSYS = 1, "Wrong magic number for ext2_filsys structure";
    MAGIC_IO_CHANNEL = 5, "Wrong magic number for io_channel structure";
    MAGIC_IO_MANAGER = 7, "Wrong magic number for io_manager structure";
    BAD_MAGIC = 19, "Bad magic number in super-block";
    REV_TOO_HIGH = 20, "Filesystem revision too high";
    RO_FILSYS = 21, "Attempt to write to filesystem opened read-only";
    GDESC_READ = 22, "Can't read group descriptors";
    GDESC_BAD_INODE_TABLE = 26, "Corrupt group descriptor: bad block for inode table";
    DIR_CORRUPTED = 33, "Ext2 directory corrupted";
    SHORT_READ = 34, "Attempt to read block from filesystem resulted in short read";
    SHORT_WRITE = 35, "Attempt to write block to filesystem resulted in short write";
    BAD_BLOCK_NUM = 41, "Illegal block number";
    BAD_INODE_NUM = 42, "Illegal inode number";
    CORRUPT_SUPERBLOCK = 46, "The ext2 superblock is corrupt";
    NO_DIRECTORY = 52, "Ext2 inode is not a directory";
    NO_MEMORY = 53, "Memory allocation failed";
    INVALID_ARGUMENT = 54, "Invalid argument passed to ext2 library";
    UNSUPP_FEATURE = 59, "Filesystem has unsupported feature(s)";
    RO_UNSUPP_FEATURE = 60, "Filesystem has unsupported read-only feature(s)";
    UNEXPECTED_BLOCK_SIZE = 73, "Wrong block size for filesystem";
    EXTENT_HEADER_BAD = 118, "Corrupt extent header";
    SB_CSUM_INVALID = 159, "Superblock checksum does not match superblock";
    INLINE_DATA_CANT_ITERATE = 172, "Cannot iterate data blocks of an inode containing inline data";
    CALLBACK_ABORTED = 200, "Directory walk aborted by callback";
}

impl ErrCode {
    pub const OK: ErrCode = ErrCode(0);

    #[inline]
    pub fn is_ok(self) -> bool {
        self.0 == 0
    }

    /// `Ok(())` для нулевого статуса, иначе `Err(self)`.
    #[inline]
    pub fn into_result(self) -> Result<(), ErrCode> {
        if self.is_ok() {
            Ok(())
        } else {
            Err(self)
        }
    }

    /// Код относится к собственному пространству движка (а не errno).
    pub fn is_engine_code(self) -> bool {
        self.0 >= EXT2_ET_BASE && self.0 < EXT2_ET_BASE + 256
    }

    /// Символическое имя (EXT2_ET_*), если код из таблицы.
    pub fn name(self) -> Option<&'static str> {
        self.table_lookup().map(|(n, _)| n)
    }

    /// ErrCode из std::io::Error: errno, если есть, иначе короткое чтение/EIO.
    pub fn from_io(e: &io::Error) -> Self {
        if let Some(errno) = e.raw_os_error() {
            return ErrCode(errno as i64);
        }
        match e.kind() {
            io::ErrorKind::UnexpectedEof => ErrCode::SHORT_READ,
            io::ErrorKind::WriteZero => ErrCode::SHORT_WRITE,
            io::ErrorKind::InvalidInput => ErrCode::INVALID_ARGUMENT,
            _ => ErrCode(libc::EIO as i64),
        }
    }
}

impl fmt::Display for ErrCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some((_, msg)) = self.table_lookup() {
            return write!(f, "{} ({})", msg, self.0);
        }
        if self.0 == 0 {
            return write!(f, "Success");
        }
        if self.0 > 0 && self.0 < EXT2_ET_BASE {
            let e = io::Error::from_raw_os_error(self.0 as i32);
            return write!(f, "{} ({})", e, self.0);
        }
        write!(f, "Unknown code ext2 {}", self.0)
    }
}

impl std::error::Error for ErrCode {}

impl From<ErrCode> for i64 {
    fn from(c: ErrCode) -> i64 {
        c.0
    }
}
