// tests/config_builder.rs
//
// Запуск только этого файла:
//   cargo test --test config_builder -- --nocapture
//
// Покрываем:
// 1) E2Config::from_env (все переменные E2W_*), единственный тест, трогающий env.
// 2) with_* перекрытия и флаги открытия.
// 3) Display.
// 4) SessionBuilder: open_with на образе в памяти (RW, резервный суперблок).

mod common;

use anyhow::Result;

use common::{ImageBuilder, BS, IMAGE_NAME};
use e2walk::consts::*;
use e2walk::{E2Config, ErrCode, Outcome, SessionBuilder};

#[test]
fn config_from_env_reads_all_vars() -> Result<()> {
    std::env::set_var("E2W_RW", "1");
    std::env::set_var("E2W_EXCLUSIVE", "true");
    std::env::set_var("E2W_FORCE", "0");
    std::env::set_var("E2W_IGNORE_CSUM", "yes");
    std::env::set_var("E2W_SUPERBLOCK", "8193");
    std::env::set_var("E2W_BLOCK_SIZE", " 4096 ");

    let cfg = E2Config::from_env();

    for k in [
        "E2W_RW",
        "E2W_EXCLUSIVE",
        "E2W_FORCE",
        "E2W_IGNORE_CSUM",
        "E2W_SUPERBLOCK",
        "E2W_BLOCK_SIZE",
    ] {
        std::env::remove_var(k);
    }

    assert!(cfg.read_write);
    assert!(cfg.exclusive);
    assert!(!cfg.force);
    assert!(cfg.ignore_csum_errors);
    assert_eq!(cfg.superblock, 8193);
    assert_eq!(cfg.block_size, 4096);
    Ok(())
}

#[test]
fn overrides_and_open_flags() -> Result<()> {
    let base = E2Config::default();
    assert_eq!(base.open_flags(), EXT2_FLAG_64BITS);

    let cfg = base
        .clone()
        .with_read_write(true)
        .with_force(true)
        .with_ignore_csum_errors(true)
        .with_backup_superblock(32768, 4096);
    assert_eq!(
        cfg.open_flags(),
        EXT2_FLAG_64BITS | EXT2_FLAG_RW | EXT2_FLAG_FORCE | EXT2_FLAG_IGNORE_CSUM_ERRORS
    );
    assert_eq!(cfg.open_flags() & EXT2_FLAG_EXCLUSIVE, 0);
    assert_eq!((cfg.superblock, cfg.block_size), (32768, 4096));

    let cfg = cfg.with_exclusive(true).with_read_write(false).with_block_size(1024);
    assert_ne!(cfg.open_flags() & EXT2_FLAG_EXCLUSIVE, 0);
    assert_eq!(cfg.open_flags() & EXT2_FLAG_RW, 0);
    assert_eq!(cfg.block_size, 1024);
    assert_eq!(cfg.superblock, 32768);

    let b = SessionBuilder::from_config(cfg.clone()).read_write(true);
    assert!(b.config().read_write);
    assert_eq!(b.config().superblock, cfg.superblock);
    Ok(())
}

#[test]
fn display_is_compact() {
    let s = E2Config::default().to_string();
    assert!(s.starts_with("E2Config {"));
    assert!(s.contains("rw: false"));
    assert!(s.contains("superblock: primary"));
    assert!(s.contains("block_size: auto"));

    let s = E2Config::default()
        .with_backup_superblock(8193, 1024)
        .to_string();
    assert!(s.contains("superblock: 8193"));
    assert!(s.contains("block_size: 1024"));
}

#[test]
fn builder_opens_read_write_and_backup() -> Result<()> {
    let mut b = ImageBuilder::new().backup_superblock_at(900);
    b.add_file(EXT2_ROOT_INO, "foo.txt", 1);
    let img = b.build();
    let m = img.manager();

    let s = SessionBuilder::from_default().open_with(IMAGE_NAME, &m)?;
    assert!(!s.fs().is_rw());
    assert_eq!(s.fs().superblock_block(), 0);
    s.close()?;

    let s = SessionBuilder::from_default()
        .read_write(true)
        .open_with(IMAGE_NAME, &m)?;
    assert!(s.fs().is_rw());
    s.close()?;

    // резервный суперблок без размера блока не адресуется
    let err = SessionBuilder::from_default()
        .backup_superblock(900, 0)
        .open_with(IMAGE_NAME, &m)
        .unwrap_err();
    assert_eq!(err, ErrCode::INVALID_ARGUMENT);

    let s = SessionBuilder::from_default()
        .backup_superblock(900, BS as u32)
        .open_with(IMAGE_NAME, &m)?;
    assert_eq!(s.fs().superblock_block(), 900);
    let mut names = Vec::new();
    s.walk_dir(EXT2_ROOT_INO, 0, |e| {
        names.push(e.name_lossy().into_owned());
        Outcome::Continue
    })?;
    assert_eq!(names, vec![".", "..", "foo.txt"]);
    Ok(())
}
