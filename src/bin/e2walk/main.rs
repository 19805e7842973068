use anyhow::Result;
use env_logger::{Builder, Env};
use log::error;

mod cli;
mod util;
mod cmd_info;
mod cmd_ls;
mod cmd_lookup;

fn init_logger() {
    // Уровень берём из RUST_LOG, иначе дефолт — info.
    // Пример: RUST_LOG=debug e2walk ls --device disk.img
    Builder::from_env(Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();
}

fn main() {
    init_logger();

    if let Err(e) = run() {
        error!("{:#}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = cli::Cli::parse_args();
    match cli.cmd {
        cli::Cmd::Info { open, json } => cmd_info::exec(open, json),

        cli::Cmd::Ls {
            open,
            inode,
            path,
            empty,
            removed,
            json,
        } => cmd_ls::exec(open, inode, path, empty, removed, json),

        cli::Cmd::Lookup {
            open,
            blocks,
            inodes,
            no_header,
            stats,
            json,
        } => cmd_lookup::exec(open, blocks, inodes, no_header, stats, json),
    }
}
