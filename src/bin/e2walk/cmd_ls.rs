use anyhow::{Context, Result};

use e2walk::consts::*;
use e2walk::Outcome;

use crate::cli::OpenArgs;
use crate::util::open_session;

pub fn exec(
    open: OpenArgs,
    inode: Option<u32>,
    path: Option<String>,
    empty: bool,
    removed: bool,
    json: bool,
) -> Result<()> {
    let session = open_session(&open)?;

    let dir = match (inode, path.as_deref()) {
        (Some(ino), _) => ino,
        (None, Some(p)) => session
            .resolve_path(p)
            .with_context(|| format!("resolve path {}", p))?,
        (None, None) => EXT2_ROOT_INO,
    };

    let mut flags = 0;
    if empty {
        flags |= DIRENT_FLAG_INCLUDE_EMPTY;
    }
    if removed {
        flags |= DIRENT_FLAG_INCLUDE_REMOVED;
    }

    if json {
        let entries = session
            .read_dir_flags(dir, flags)
            .with_context(|| format!("walk directory inode {}", dir))?;
        println!("{}", serde_json::to_string_pretty(&entries)?);
    } else {
        let summary = session
            .walk_dir(dir, flags, |e| {
                println!(
                    "{:>10}  {}  {:>5}  {}",
                    e.inode(),
                    e.file_type().tag(),
                    e.rec_len(),
                    e.name_lossy()
                );
                Outcome::Continue
            })
            .with_context(|| format!("walk directory inode {}", dir))?;
        log::debug!("ls: {} entries", summary.dispatched);
    }

    session.close()?;
    Ok(())
}
