//! mem_io — образы в памяти, адресуемые по имени.
//!
//! Менеджер хранит именованные образы; канал держит общий (Arc) буфер,
//! поэтому записи видны через `MemIoManager::image()` после обхода.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use super::{ChannelFlags, IoChannel, IoManager};
use crate::consts::SUPERBLOCK_OFFSET;
use crate::errcode::ErrCode;

type SharedImage = Arc<Mutex<Vec<u8>>>;

fn lock_image(img: &SharedImage) -> MutexGuard<'_, Vec<u8>> {
    img.lock().unwrap_or_else(|p| p.into_inner())
}

#[derive(Debug, Default)]
pub struct MemIoManager {
    images: Mutex<HashMap<String, SharedImage>>,
}

impl MemIoManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Зарегистрировать (или заменить) образ под именем `name`.
    pub fn insert(&self, name: &str, image: Vec<u8>) {
        let mut m = self.images.lock().unwrap_or_else(|p| p.into_inner());
        m.insert(name.to_string(), Arc::new(Mutex::new(image)));
    }

    /// Копия текущего содержимого образа.
    pub fn image(&self, name: &str) -> Option<Vec<u8>> {
        let m = self.images.lock().unwrap_or_else(|p| p.into_inner());
        m.get(name).map(|img| lock_image(img).clone())
    }
}

impl IoManager for MemIoManager {
    fn name(&self) -> &'static str {
        "Memory I/O Manager"
    }

    fn open(&self, name: &str, flags: ChannelFlags) -> Result<Box<dyn IoChannel>, ErrCode> {
        let m = self.images.lock().unwrap_or_else(|p| p.into_inner());
        let image = m
            .get(name)
            .cloned()
            .ok_or(ErrCode(libc::ENOENT as i64))?;
        Ok(Box::new(MemChannel {
            image,
            name: name.to_string(),
            blksize: SUPERBLOCK_OFFSET as u32,
            rw: flags.rw,
        }))
    }
}

pub struct MemChannel {
    image: SharedImage,
    name: String,
    blksize: u32,
    rw: bool,
}

impl MemChannel {
    fn range(len: usize, offset: u64, n: usize) -> Option<std::ops::Range<usize>> {
        let start = usize::try_from(offset).ok()?;
        let end = start.checked_add(n)?;
        if end > len {
            return None;
        }
        Some(start..end)
    }
}

impl IoChannel for MemChannel {
    fn name(&self) -> &str {
        &self.name
    }

    fn blksize(&self) -> u32 {
        self.blksize
    }

    fn set_blksize(&mut self, blksize: u32) {
        self.blksize = blksize;
    }

    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<(), ErrCode> {
        let img = lock_image(&self.image);
        let r = Self::range(img.len(), offset, buf.len()).ok_or(ErrCode::SHORT_READ)?;
        buf.copy_from_slice(&img[r]);
        Ok(())
    }

    fn write_at(&mut self, offset: u64, buf: &[u8]) -> Result<(), ErrCode> {
        if !self.rw {
            return Err(ErrCode::RO_FILSYS);
        }
        let mut img = lock_image(&self.image);
        let r = Self::range(img.len(), offset, buf.len()).ok_or(ErrCode::SHORT_WRITE)?;
        img[r].copy_from_slice(buf);
        Ok(())
    }
}
