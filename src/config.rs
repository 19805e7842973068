//! Centralized configuration and builder for e2walk sessions.
//!
//! - E2Config::from_env() собирает флаги открытия из переменных окружения.
//! - Fluent setters (with_*) перекрывают отдельные поля.
//! - SessionBuilder открывает Session по итоговой конфигурации.
//!
//! Env:
//! - E2W_RW           = 0|1  открыть на запись (нужно для Outcome::Modified)
//! - E2W_EXCLUSIVE    = 0|1  эксклюзивная advisory-блокировка образа
//! - E2W_FORCE        = 0|1  игнорировать неподдерживаемые фичи
//! - E2W_IGNORE_CSUM  = 0|1  не проверять checksum суперблока
//! - E2W_SUPERBLOCK   = N    номер блока резервного суперблока (0 = основной)
//! - E2W_BLOCK_SIZE   = N    размер блока (0 = из суперблока)

use std::fmt;
use std::os::raw::c_int;

use crate::consts::*;
use crate::errcode::ErrCode;
use crate::io::{unix_io_manager, IoManager};
use crate::session::Session;

/// Параметры открытия файловой системы.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct E2Config {
    /// Env: E2W_RW (default false)
    pub read_write: bool,

    /// Env: E2W_EXCLUSIVE (default false)
    pub exclusive: bool,

    /// Env: E2W_FORCE (default false)
    pub force: bool,

    /// Env: E2W_IGNORE_CSUM (default false)
    pub ignore_csum_errors: bool,

    /// Резервный суперблок: номер блока; 0 — основной.
    /// Env: E2W_SUPERBLOCK (default 0)
    pub superblock: u32,

    /// 0 — взять из суперблока. Обязателен при superblock != 0.
    /// Env: E2W_BLOCK_SIZE (default 0)
    pub block_size: u32,
}

fn env_flag(name: &str) -> Option<bool> {
    std::env::var(name).ok().map(|v| {
        let s = v.trim().to_ascii_lowercase();
        s == "1" || s == "true" || s == "on" || s == "yes"
    })
}

fn env_u32(name: &str) -> Option<u32> {
    std::env::var(name).ok().and_then(|v| v.trim().parse::<u32>().ok())
}

impl E2Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let mut cfg = Self::default();

        if let Some(on) = env_flag("E2W_RW") {
            cfg.read_write = on;
        }
        if let Some(on) = env_flag("E2W_EXCLUSIVE") {
            cfg.exclusive = on;
        }
        if let Some(on) = env_flag("E2W_FORCE") {
            cfg.force = on;
        }
        if let Some(on) = env_flag("E2W_IGNORE_CSUM") {
            cfg.ignore_csum_errors = on;
        }
        if let Some(n) = env_u32("E2W_SUPERBLOCK") {
            cfg.superblock = n;
        }
        if let Some(n) = env_u32("E2W_BLOCK_SIZE") {
            cfg.block_size = n;
        }

        cfg
    }

    pub fn with_read_write(mut self, on: bool) -> Self {
        self.read_write = on;
        self
    }

    pub fn with_exclusive(mut self, on: bool) -> Self {
        self.exclusive = on;
        self
    }

    pub fn with_force(mut self, on: bool) -> Self {
        self.force = on;
        self
    }

    pub fn with_ignore_csum_errors(mut self, on: bool) -> Self {
        self.ignore_csum_errors = on;
        self
    }

    /// Открыть через резервный суперблок (block_size обязателен).
    pub fn with_backup_superblock(mut self, superblock: u32, block_size: u32) -> Self {
        self.superblock = superblock;
        self.block_size = block_size;
        self
    }

    pub fn with_block_size(mut self, block_size: u32) -> Self {
        self.block_size = block_size;
        self
    }

    /// Флаги для ext2fs_open. 64BITS выставлен всегда.
    pub fn open_flags(&self) -> c_int {
        let mut flags = EXT2_FLAG_64BITS;
        if self.read_write {
            flags |= EXT2_FLAG_RW;
        }
        if self.exclusive {
            flags |= EXT2_FLAG_EXCLUSIVE;
        }
        if self.force {
            flags |= EXT2_FLAG_FORCE;
        }
        if self.ignore_csum_errors {
            flags |= EXT2_FLAG_IGNORE_CSUM_ERRORS;
        }
        flags
    }
}

impl fmt::Display for E2Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "E2Config {{ \
             rw: {}, \
             exclusive: {}, \
             force: {}, \
             ignore_csum: {}, \
             superblock: {}, \
             block_size: {} \
             }}",
            self.read_write,
            self.exclusive,
            self.force,
            self.ignore_csum_errors,
            if self.superblock == 0 {
                "primary".to_string()
            } else {
                self.superblock.to_string()
            },
            if self.block_size == 0 {
                "auto".to_string()
            } else {
                self.block_size.to_string()
            },
        )
    }
}

/// Builder, открывающий Session. Стартует с env, дальше — перекрытия.
#[derive(Clone, Debug)]
pub struct SessionBuilder {
    cfg: E2Config,
}

impl Default for SessionBuilder {
    fn default() -> Self {
        Self {
            cfg: E2Config::from_env(),
        }
    }
}

impl SessionBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from a clean default (without reading env).
    pub fn from_default() -> Self {
        Self {
            cfg: E2Config::default(),
        }
    }

    pub fn from_config(cfg: E2Config) -> Self {
        Self { cfg }
    }

    pub fn read_write(mut self, on: bool) -> Self {
        self.cfg.read_write = on;
        self
    }

    pub fn exclusive(mut self, on: bool) -> Self {
        self.cfg.exclusive = on;
        self
    }

    pub fn force(mut self, on: bool) -> Self {
        self.cfg.force = on;
        self
    }

    pub fn ignore_csum_errors(mut self, on: bool) -> Self {
        self.cfg.ignore_csum_errors = on;
        self
    }

    pub fn backup_superblock(mut self, superblock: u32, block_size: u32) -> Self {
        self.cfg.superblock = superblock;
        self.cfg.block_size = block_size;
        self
    }

    pub fn block_size(mut self, block_size: u32) -> Self {
        self.cfg.block_size = block_size;
        self
    }

    pub fn config(&self) -> &E2Config {
        &self.cfg
    }

    /// Открыть файл/устройство через unix I/O manager.
    pub fn open(self, path: &str) -> Result<Session, ErrCode> {
        self.open_with(path, unix_io_manager())
    }

    pub fn open_with(self, path: &str, io: &dyn IoManager) -> Result<Session, ErrCode> {
        Session::open(
            path,
            self.cfg.open_flags(),
            self.cfg.superblock,
            self.cfg.block_size,
            io,
        )
    }
}
