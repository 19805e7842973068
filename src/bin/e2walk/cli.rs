use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// e2walk — обход каталогов и поиск объектов в образах ext2/3/4
#[derive(Parser, Debug)]
#[command(name = "e2walk", version, about = "ext2/3/4 directory walker")]
pub struct Cli {
    #[command(subcommand)]
    pub cmd: Cmd,
}

impl Cli {
    pub fn parse_args() -> Self {
        <Self as Parser>::parse()
    }
}

/// Общие параметры открытия образа (перекрывают E2W_* из окружения).
#[derive(Args, Debug, Clone)]
pub struct OpenArgs {
    /// Path to ext2/3/4 filesystem image or block device
    #[arg(long)]
    pub device: PathBuf,
    /// Backup superblock block number (requires --block-size)
    #[arg(long)]
    pub superblock: Option<u32>,
    /// Filesystem block size (0 = from superblock)
    #[arg(long)]
    pub block_size: Option<u32>,
    /// Ignore unsupported features
    #[arg(long)]
    pub force: bool,
    /// Do not verify the superblock checksum
    #[arg(long)]
    pub ignore_csum: bool,
}

#[derive(Subcommand, Debug)]
pub enum Cmd {
    /// Superblock summary
    Info {
        #[command(flatten)]
        open: OpenArgs,
        #[arg(long)]
        json: bool,
    },
    /// List directory entries in on-disk order
    Ls {
        #[command(flatten)]
        open: OpenArgs,
        /// Directory inode (default: root)
        #[arg(long)]
        inode: Option<u32>,
        /// Directory path from root (alternative to --inode)
        #[arg(long, conflicts_with = "inode")]
        path: Option<String>,
        /// Include empty entries (inode 0)
        #[arg(long)]
        empty: bool,
        /// Include removed entries hidden in rec_len slack
        #[arg(long)]
        removed: bool,
        #[arg(long)]
        json: bool,
    },
    /// Find filesystem objects owning the given inodes/blocks
    Lookup {
        #[command(flatten)]
        open: OpenArgs,
        /// Physical block to look up (repeatable)
        #[arg(long = "block")]
        blocks: Vec<u64>,
        /// Inode to look up (repeatable)
        #[arg(long = "inode")]
        inodes: Vec<u32>,
        /// Do not print header
        #[arg(short = 'H')]
        no_header: bool,
        /// Print statistics
        #[arg(short = 's')]
        stats: bool,
        #[arg(long)]
        json: bool,
    },
}
