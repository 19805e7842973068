use anyhow::Result;

use e2walk::consts::*;
use e2walk::metrics;

use crate::cli::OpenArgs;
use crate::util::{human_bytes, open_session};

fn feature_names(sb: &e2walk::fs::Superblock) -> Vec<&'static str> {
    let mut out = Vec::new();
    if sb.has_compat(EXT3_FEATURE_COMPAT_HAS_JOURNAL) {
        out.push("has_journal");
    }
    if sb.has_compat(EXT2_FEATURE_COMPAT_DIR_INDEX) {
        out.push("dir_index");
    }
    if sb.has_incompat(EXT2_FEATURE_INCOMPAT_FILETYPE) {
        out.push("filetype");
    }
    if sb.has_incompat(EXT3_FEATURE_INCOMPAT_EXTENTS) {
        out.push("extent");
    }
    if sb.has_incompat(EXT4_FEATURE_INCOMPAT_64BIT) {
        out.push("64bit");
    }
    if sb.has_incompat(EXT4_FEATURE_INCOMPAT_FLEX_BG) {
        out.push("flex_bg");
    }
    if sb.has_incompat(EXT4_FEATURE_INCOMPAT_INLINE_DATA) {
        out.push("inline_data");
    }
    if sb.has_ro_compat(EXT2_FEATURE_RO_COMPAT_SPARSE_SUPER) {
        out.push("sparse_super");
    }
    if sb.has_ro_compat(EXT2_FEATURE_RO_COMPAT_LARGE_FILE) {
        out.push("large_file");
    }
    if sb.has_ro_compat(EXT4_FEATURE_RO_COMPAT_HUGE_FILE) {
        out.push("huge_file");
    }
    if sb.has_ro_compat(EXT4_FEATURE_RO_COMPAT_GDT_CSUM) {
        out.push("uninit_bg");
    }
    if sb.has_metadata_csum() {
        out.push("metadata_csum");
    }
    out
}

pub fn exec(open: OpenArgs, json: bool) -> Result<()> {
    let session = open_session(&open)?;
    let sb = session.superblock().clone();
    let groups = session.fs().groups().len();
    let features = feature_names(&sb);

    if json {
        let obj = serde_json::json!({
            "device": session.path(),
            "superblock_block": session.fs().superblock_block(),
            "superblock": sb,
            "block_size": sb.block_size(),
            "groups": groups,
            "uuid": sb.uuid_string(),
            "features": features,
            "metrics": metrics::snapshot(),
        });
        println!("{}", serde_json::to_string_pretty(&obj)?);
    } else {
        let bs = sb.block_size() as u64;
        println!("Device:        {}", session.path());
        println!("Volume name:   {}", if sb.volume_name.is_empty() { "<none>" } else { sb.volume_name.as_str() });
        println!("UUID:          {}", sb.uuid_string());
        println!("Revision:      {}", sb.rev_level);
        println!("Block size:    {}", bs);
        println!(
            "Blocks:        {} ({}), free {}",
            sb.blocks_count,
            human_bytes(sb.blocks_count * bs),
            sb.free_blocks_count
        );
        println!("Inodes:        {}, free {}", sb.inodes_count, sb.free_inodes_count);
        println!("Inode size:    {}", sb.inode_size);
        println!("Groups:        {} ({} blocks/group)", groups, sb.blocks_per_group);
        println!("Features:      {}", features.join(" "));
    }

    session.close()?;
    Ok(())
}
