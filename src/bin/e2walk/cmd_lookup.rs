use anyhow::{bail, Result};

use e2walk::lookup::{Lookup, TABLE_HEADER};

use crate::cli::OpenArgs;
use crate::util::open_session;

pub fn exec(
    open: OpenArgs,
    blocks: Vec<u64>,
    inodes: Vec<u32>,
    no_header: bool,
    stats: bool,
    json: bool,
) -> Result<()> {
    if blocks.is_empty() && inodes.is_empty() {
        bail!("nothing to look up: pass --block and/or --inode");
    }
    let session = open_session(&open)?;

    let res = Lookup::new(&session).inodes(inodes).blocks(blocks).run()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&res)?);
    } else {
        if stats {
            println!("{}", res.stats_line());
        }
        if !no_header {
            println!("{}", TABLE_HEADER);
        }
        for obj in &res.objects {
            println!("{}", obj);
        }
    }

    session.close()?;
    Ok(())
}
