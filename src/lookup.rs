//! Поиск объектов ФС по номерам inode'ов и/или физических блоков.
//!
//! Проход: inode scan -> для каждого живого каталога (links > 0) считаем путь
//! и обходим его записи через `Session::walk_dir`. Для каждого файла строим
//! диапазоны физических блоков и сверяем с искомыми inode/блоками. Как только
//! искать больше нечего — обход останавливается (Outcome::Stop).
//!
//! Без целей (пустые списки) проход идёт до конца и даёт только статистику.

use std::collections::BTreeSet;
use std::fmt;

use anyhow::{Context, Result};
use log::{debug, warn};
use serde::Serialize;

use crate::entry::Outcome;
use crate::errcode::ErrCode;
use crate::fs::{Extent, Filsys, Inode};
use crate::session::Session;

/// Как адресованы блоки объекта.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BlockKind {
    /// Классическая адресация (прямые/косвенные блоки).
    Data,
    /// Дерево extent'ов.
    Extent,
    /// Каталог.
    Dir,
}

impl BlockKind {
    /// Флаг в табличном выводе: d / e / D.
    pub fn flag(self) -> &'static str {
        match self {
            BlockKind::Data => "d",
            BlockKind::Extent => "e",
            BlockKind::Dir => "D",
        }
    }
}

/// Непрерывный диапазон физических блоков, границы включительно.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BlockRange {
    pub start: u64,
    pub end: u64,
}

impl BlockRange {
    #[inline]
    pub fn contains(&self, block: u64) -> bool {
        block >= self.start && block <= self.end
    }

    /// Число блоков в диапазоне.
    #[inline]
    pub fn count(&self) -> u64 {
        self.end - self.start + 1
    }
}

impl fmt::Display for BlockRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}

/// Заголовок табличного вывода; строки таблицы — `Display` объекта.
pub const TABLE_HEADER: &str = "Inode\tFilename\t[flags]\t#Blocks\tBlocks";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FilesystemObject {
    pub inode: u32,
    pub kind: BlockKind,
    pub blocks: Vec<BlockRange>,
    pub path: String,
}

impl FilesystemObject {
    pub fn block_count(&self) -> u64 {
        self.blocks.iter().map(|r| r.count()).sum()
    }
}

/// Строка таблицы: `inode\tpath\t[flag]\t#count\tstart-end ...`.
/// Без блоков (inline data) — только первые три колонки.
impl fmt::Display for FilesystemObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}\t{}\t[{}]", self.inode, self.path, self.kind.flag())?;
        if self.blocks.is_empty() {
            return Ok(());
        }
        write!(f, "\t#{}\t", self.block_count())?;
        for (i, r) in self.blocks.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            write!(f, "{}", r)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Stats {
    pub dirs: u64,
    pub files: u64,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct LookupResult {
    pub objects: Vec<FilesystemObject>,
    pub stats: Stats,
}

impl LookupResult {
    /// Строка статистики для `lookup -s`.
    pub fn stats_line(&self) -> String {
        format!(
            "Processed {} dirs, {} files, {} matches",
            self.stats.dirs,
            self.stats.files,
            self.objects.len()
        )
    }
}

/// Свернуть карту блоков в диапазоны по физическим номерам
/// (соседние по диску отрезки склеиваются).
pub fn block_ranges(map: &[Extent]) -> Vec<BlockRange> {
    let mut phys: Vec<(u64, u64)> = map
        .iter()
        .filter(|e| e.len > 0)
        .map(|e| (e.physical, e.physical_end()))
        .collect();
    phys.sort_unstable();
    let mut out: Vec<BlockRange> = Vec::with_capacity(phys.len());
    for (start, end) in phys {
        match out.last_mut() {
            Some(last) if start <= last.end.saturating_add(1) => {
                last.end = last.end.max(end);
            }
            _ => out.push(BlockRange { start, end }),
        }
    }
    out
}

fn object_blocks(fs: &Filsys, inode: &Inode) -> Vec<BlockRange> {
    match fs.block_map(inode) {
        Ok(map) => block_ranges(&map),
        // inline data: блоков нет
        Err(ErrCode::INLINE_DATA_CANT_ITERATE) => Vec::new(),
        Err(e) => {
            debug!("lookup: block map failed: {}", e);
            Vec::new()
        }
    }
}

fn join_path(parent: &str, name: &str) -> String {
    if parent.ends_with('/') {
        format!("{}{}", parent, name)
    } else {
        format!("{}/{}", parent, name)
    }
}

/// Состояние поиска: что ещё осталось найти и что уже найдено.
pub struct Lookup<'s> {
    session: &'s Session,
    inodes: BTreeSet<u32>,
    blocks: BTreeSet<u64>,
    result: LookupResult,
}

impl<'s> Lookup<'s> {
    pub fn new(session: &'s Session) -> Self {
        Self {
            session,
            inodes: BTreeSet::new(),
            blocks: BTreeSet::new(),
            result: LookupResult::default(),
        }
    }

    pub fn inodes<I: IntoIterator<Item = u32>>(mut self, inodes: I) -> Self {
        self.inodes.extend(inodes);
        self
    }

    pub fn blocks<I: IntoIterator<Item = u64>>(mut self, blocks: I) -> Self {
        self.blocks.extend(blocks);
        self
    }

    fn pending(&self) -> usize {
        self.inodes.len() + self.blocks.len()
    }

    pub fn run(mut self) -> Result<LookupResult> {
        let session = self.session;
        let fs = session.fs();
        let has_targets = self.pending() > 0;

        for item in fs.open_inode_scan() {
            let (ino, inode) = item.with_context(|| format!("inode scan on {}", session.path()))?;
            if inode.links_count == 0 || !inode.is_dir() {
                continue;
            }
            self.result.stats.dirs += 1;

            let parent = match session.pathname(ino) {
                Ok(p) => p,
                Err(e) => {
                    debug!("lookup: pathname of dir {} failed: {}", ino, e);
                    String::new()
                }
            };

            self.match_dir(fs, ino, &inode, &parent);

            let walk = {
                let Lookup {
                    inodes,
                    blocks,
                    result,
                    ..
                } = &mut self;
                session.walk_dir(ino, 0, |e| {
                    if e.is_dot() || e.is_dotdot() {
                        return Outcome::Continue;
                    }
                    let child = e.inode();
                    let child_inode = match fs.read_inode(child) {
                        Ok(i) => i,
                        Err(_) => return Outcome::Continue,
                    };
                    // подкаталоги обработаются своим проходом
                    if child_inode.is_dir() {
                        return Outcome::Continue;
                    }
                    result.stats.files += 1;
                    if inodes.is_empty() && blocks.is_empty() {
                        return if has_targets { Outcome::Stop } else { Outcome::Continue };
                    }

                    let kind = if child_inode.uses_extents() {
                        BlockKind::Extent
                    } else {
                        BlockKind::Data
                    };
                    let ranges = object_blocks(fs, &child_inode);
                    let path = join_path(&parent, &e.name_lossy());

                    if inodes.remove(&child) {
                        result.objects.push(FilesystemObject {
                            inode: child,
                            kind,
                            blocks: ranges.clone(),
                            path: path.clone(),
                        });
                    }
                    let hits: Vec<u64> = blocks
                        .iter()
                        .copied()
                        .filter(|b| ranges.iter().any(|r| r.contains(*b)))
                        .collect();
                    for b in hits {
                        blocks.remove(&b);
                        result.objects.push(FilesystemObject {
                            inode: child,
                            kind,
                            blocks: ranges.clone(),
                            path: path.clone(),
                        });
                    }

                    if has_targets && inodes.is_empty() && blocks.is_empty() {
                        Outcome::Stop
                    } else {
                        Outcome::Continue
                    }
                })
            };
            if let Err(e) = walk {
                warn!("lookup: skipping directory {} ({}): {}", ino, parent, e);
                continue;
            }

            if has_targets && self.pending() == 0 {
                break;
            }
        }

        debug!(
            "lookup: {} dirs, {} files, {} matches, {} unresolved",
            self.result.stats.dirs,
            self.result.stats.files,
            self.result.objects.len(),
            self.pending()
        );
        Ok(self.result)
    }

    // Сам каталог: совпадение по inode или по одному из его блоков.
    fn match_dir(&mut self, fs: &Filsys, ino: u32, inode: &Inode, path: &str) {
        let by_inode = self.inodes.remove(&ino);
        let ranges = if by_inode || !self.blocks.is_empty() {
            object_blocks(fs, inode)
        } else {
            Vec::new()
        };
        if by_inode {
            self.result.objects.push(FilesystemObject {
                inode: ino,
                kind: BlockKind::Dir,
                blocks: ranges.clone(),
                path: path.to_string(),
            });
        }
        let hits: Vec<u64> = self
            .blocks
            .iter()
            .copied()
            .filter(|b| ranges.iter().any(|r| r.contains(*b)))
            .collect();
        for b in hits {
            self.blocks.remove(&b);
            self.result.objects.push(FilesystemObject {
                inode: ino,
                kind: BlockKind::Dir,
                blocks: ranges.clone(),
                path: path.to_string(),
            });
        }
    }
}

/// Удобная обёртка над `Lookup`.
pub fn lookup_filesystem_objects(session: &Session, inodes: &[u32], blocks: &[u64]) -> Result<LookupResult> {
    Lookup::new(session)
        .inodes(inodes.iter().copied())
        .blocks(blocks.iter().copied())
        .run()
}
