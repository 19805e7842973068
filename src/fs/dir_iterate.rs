// src/fs/dir_iterate.rs — ext2fs_dir_iterate
//
// Контракт callback'а (C ABI, как у libext2fs):
//   int func(struct ext2_dir_entry *dirent, int offset, int blocksize,
//            char *buf, void *private)
// - `dirent` указывает внутрь `buf` (buf + offset), `buf` — блок каталога
// - `private` передаётся без изменений, движок его не разыменовывает
// - возврат: битовая маска DIRENT_CHANGED | DIRENT_ABORT | DIRENT_ERROR
//
// Блоки обходятся в логическом порядке, записи — в порядке хранения в блоке.
// Если callback вернул DIRENT_CHANGED, блок записывается обратно после обработки.

use std::os::raw::{c_char, c_int, c_void};

use byteorder::{ByteOrder, LittleEndian};
use log::debug;

use super::Filsys;
use crate::consts::*;
use crate::errcode::ErrCode;
use crate::metrics;

/// struct ext2_dir_entry (заголовок + имя; в блоке имя короче 255 байт).
#[repr(C)]
pub struct RawDirEntry {
    pub inode: u32,
    pub rec_len: u16,
    pub name_len: u16,
    pub name: [c_char; EXT2_NAME_LEN],
}

pub type DirIterateFn = unsafe extern "C" fn(
    dirent: *mut RawDirEntry,
    offset: c_int,
    blocksize: c_int,
    buf: *mut c_char,
    private: *mut c_void,
) -> c_int;

/// ext2fs_get_rec_len: для блоков 64 KiB длина кодируется особо.
pub fn get_rec_len(buf: &[u8], offset: usize) -> usize {
    let len = LittleEndian::read_u16(&buf[offset + 4..offset + 6]) as usize;
    let bs = buf.len();
    if bs < 65536 {
        len
    } else if len == 65535 || len == 0 {
        bs
    } else {
        (len & 65532) | ((len & 3) << 16)
    }
}

/// ext2fs_validate_entry: цепочка записей от `offset` ровно доходит до `final_offset`.
fn validate_entry(buf: &[u8], mut offset: usize, final_offset: usize) -> bool {
    let bs = buf.len();
    while offset < final_offset && offset + 12 <= bs {
        let rec_len = get_rec_len(buf, offset);
        let name_len = buf[offset + 6] as usize;
        offset += rec_len;
        if rec_len < 8 || rec_len % 4 != 0 || name_len + 8 > rec_len {
            return false;
        }
    }
    offset == final_offset
}

fn entry_is_sane(buf: &[u8], offset: usize, rec_len: usize) -> bool {
    let name_len = buf[offset + 6] as usize;
    offset + rec_len <= buf.len() && rec_len >= EXT2_DIR_ENTRY_HDR && rec_len % 4 == 0 && name_len + 8 <= rec_len
}

enum BlockEnd {
    Continue,
    Abort,
}

impl Filsys {
    /// Обойти каталог `dir`, вызывая `func` на каждую запись.
    ///
    /// `block_buf` — рабочий буфер не меньше одного блока; `None` — движок
    /// выделит свой. `DIRENT_ABORT` завершает обход со статусом OK,
    /// `DIRENT_ERROR` — со статусом `EXT2_ET_CALLBACK_ABORTED`.
    ///
    /// Безопасная обёртка — `trampoline::iterate`, которая передаёт сюда
    /// `walk_func` и ячейку живого `CallbackHandle`.
    ///
    /// # Safety
    /// `func` вызывается с `private` как есть, на каждую запись. Вызывающий
    /// гарантирует, что `private` удовлетворяет контракту `func` на всё
    /// время обхода: для `trampoline::walk_func` это null или адрес
    /// выделенной и не освобождённой ячейки `c_int`.
    ///
    /// Без `unsafe` вызов не компилируется:
    ///
    /// ```compile_fail
    /// use e2walk::consts::EXT2_ROOT_INO;
    /// use e2walk::trampoline::walk_func;
    /// use e2walk::Session;
    ///
    /// fn walk(s: &Session) {
    ///     let _ = s.fs().dir_iterate(EXT2_ROOT_INO, 0, None, walk_func, 0x10 as *mut _);
    /// }
    /// ```
    pub unsafe fn dir_iterate(
        &self,
        dir: u32,
        flags: c_int,
        block_buf: Option<&mut [u8]>,
        func: DirIterateFn,
        private: *mut c_void,
    ) -> Result<(), ErrCode> {
        let inode = self.read_inode(dir)?;
        if !inode.is_dir() {
            return Err(ErrCode::NO_DIRECTORY);
        }
        let map = self.block_map(&inode)?;

        let bs = self.block_size() as usize;
        let mut owned: Vec<u8>;
        let buf: &mut [u8] = match block_buf {
            Some(b) => {
                if b.len() < bs {
                    return Err(ErrCode::INVALID_ARGUMENT);
                }
                &mut b[..bs]
            }
            None => {
                owned = vec![0u8; bs];
                &mut owned[..]
            }
        };

        let nblocks = inode.size.div_ceil(bs as u64);
        let csum_size = if self.sb.has_metadata_csum() { EXT2_DIR_TAIL_SIZE } else { 0 };
        debug!(
            "dir_iterate: dir={} size={} blocks={} extents={} flags={:#x}",
            dir,
            inode.size,
            nblocks,
            map.len(),
            flags
        );

        for ext in map.iter().filter(|e| !e.uninit) {
            for i in 0..ext.len as u64 {
                if ext.logical + i >= nblocks {
                    break;
                }
                let pblk = ext.physical + i;
                self.read_block(pblk, buf)?;
                metrics::record_dir_block_read();
                match self.process_dir_block(buf, pblk, flags, csum_size, func, private)? {
                    BlockEnd::Continue => {}
                    BlockEnd::Abort => return Ok(()),
                }
            }
        }
        Ok(())
    }

    fn process_dir_block(
        &self,
        buf: &mut [u8],
        pblk: u64,
        flags: c_int,
        csum_size: usize,
        func: DirIterateFn,
        private: *mut c_void,
    ) -> Result<BlockEnd, ErrCode> {
        let bs = buf.len();
        let mut offset = 0usize;
        let mut changed = false;
        let mut end = BlockEnd::Continue;
        let mut err: Option<ErrCode> = None;

        while offset + EXT2_DIR_ENTRY_HDR < bs {
            let mut rec_len = get_rec_len(buf, offset);
            if !entry_is_sane(buf, offset, rec_len) {
                err = Some(ErrCode::DIR_CORRUPTED);
                break;
            }

            let ino = LittleEndian::read_u32(&buf[offset..offset + 4]);
            let mut skip = false;
            if ino == 0 {
                let name_len_raw = LittleEndian::read_u16(&buf[offset + 6..offset + 8]);
                let is_tail = csum_size != 0
                    && offset == bs - csum_size
                    && rec_len == csum_size
                    && name_len_raw == EXT2_DIR_NAME_LEN_CSUM;
                skip = is_tail || flags & DIRENT_FLAG_INCLUDE_EMPTY == 0;
            }

            if !skip {
                let base = buf.as_mut_ptr();
                // SAFETY: offset + rec_len <= bs проверено выше; callback получает
                // указатели внутрь buf только на время вызова.
                let ret = unsafe {
                    func(
                        base.add(offset) as *mut RawDirEntry,
                        offset as c_int,
                        bs as c_int,
                        base as *mut c_char,
                        private,
                    )
                };
                if ret & DIRENT_CHANGED != 0 {
                    rec_len = get_rec_len(buf, offset);
                    if !entry_is_sane(buf, offset, rec_len) {
                        err = Some(ErrCode::DIR_CORRUPTED);
                        changed = false;
                        break;
                    }
                    changed = true;
                }
                if ret & DIRENT_ERROR != 0 {
                    err = Some(ErrCode::CALLBACK_ABORTED);
                    break;
                }
                if ret & DIRENT_ABORT != 0 {
                    end = BlockEnd::Abort;
                    break;
                }
            }

            if flags & DIRENT_FLAG_INCLUDE_REMOVED != 0 {
                let name_len = buf[offset + 6] as usize;
                let size = (name_len + 11) & !3;
                if rec_len != size {
                    let final_offset = offset + rec_len;
                    offset += size;
                    while offset < final_offset && !validate_entry(buf, offset, final_offset) {
                        offset += 4;
                    }
                    continue;
                }
            }
            offset += rec_len;
        }

        if changed {
            self.write_block(pblk, buf)?;
            metrics::record_dir_block_written();
        }
        match err {
            Some(e) => Err(e),
            None => Ok(end),
        }
    }
}
