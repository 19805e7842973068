use anyhow::{Context, Result};

use e2walk::{E2Config, Session, SessionBuilder};

use crate::cli::OpenArgs;

/// Открыть сессию: E2W_* из окружения, поверх — аргументы командной строки.
pub fn open_session(args: &OpenArgs) -> Result<Session> {
    let mut cfg = E2Config::from_env();
    if let Some(sb) = args.superblock {
        cfg.superblock = sb;
    }
    if let Some(bs) = args.block_size {
        cfg.block_size = bs;
    }
    if args.force {
        cfg.force = true;
    }
    if args.ignore_csum {
        cfg.ignore_csum_errors = true;
    }
    log::debug!("{}", cfg);

    let path = args.device.to_string_lossy();
    SessionBuilder::from_config(cfg)
        .open(&path)
        .with_context(|| format!("open filesystem {}", path))
}

/// Размер в человекочитаемом виде (KiB/MiB/GiB).
pub fn human_bytes(n: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KiB", "MiB", "GiB"];
    let mut v = n as f64;
    let mut i = 0;
    while v >= 1024.0 && i + 1 < UNITS.len() {
        v /= 1024.0;
        i += 1;
    }
    if i == 0 {
        format!("{} {}", n, UNITS[0])
    } else {
        format!("{:.1} {}", v, UNITS[i])
    }
}
