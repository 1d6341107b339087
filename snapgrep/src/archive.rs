/// Random-access repository snapshots.
///
/// The scanner never fetches or caches snapshots itself. It sees an
/// [`Archive`]: a fixed list of entries (name and declared size) whose bytes
/// can be read by index into a caller-owned buffer. Reads of distinct entries
/// may happen concurrently from several workers, so implementations must be
/// `Sync` and must not rely on a shared cursor.
///
/// Two archives ship with the crate:
///
/// - [`ZipSnapshot`], a memory-mapped zip file, opened through [`ZipStore`]
///   from `<root>/<repo>/<commit>.zip`.
/// - [`MemoryArchive`], built up in memory, mostly for tests and benchmarks.
use memmap2::Mmap;
use std::fs::File;
use std::io::{self, Cursor, Read};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tracing::debug;
use zip::ZipArchive;

use crate::errors::{SearchError, SearchResult};

/// Name and declared length of one file in an archive
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    pub name: String,
    pub size: usize,
}

/// A read-only snapshot of a repository's files
pub trait Archive: Sync {
    /// All files, in enumeration order
    fn entries(&self) -> &[ArchiveEntry];

    /// Reads entry `index` into `buf` and returns the number of bytes read.
    ///
    /// `buf` is exactly the entry's declared size. Returning fewer bytes means
    /// the entry was shorter than declared.
    fn read_entry(&self, index: usize, buf: &mut [u8]) -> io::Result<usize>;
}

/// Opens archives for a repository at a resolved commit
pub trait ArchiveProvider {
    type Archive: Archive;

    fn open(&self, repo: &str, commit: &str) -> SearchResult<Self::Archive>;
}

/// Fills `buf` from `reader`, retrying short and interrupted reads.
///
/// Returns the number of bytes read, which is less than `buf.len()` only if
/// the reader ran dry first. Fails if the reader holds more bytes than `buf`
/// can take.
pub fn read_all<R: Read + ?Sized>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => return Ok(filled),
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }

    // A full buffer may still leave data behind
    let mut probe = [0u8; 1];
    loop {
        match reader.read(&mut probe) {
            Ok(0) => return Ok(filled),
            Ok(_) => {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("content is larger than the {} byte buffer", buf.len()),
                ))
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
}

fn missing_entry(index: usize) -> io::Error {
    io::Error::new(
        io::ErrorKind::NotFound,
        format!("no archive entry at index {}", index),
    )
}

/// An archive held entirely in memory
#[derive(Debug, Clone, Default)]
pub struct MemoryArchive {
    entries: Vec<ArchiveEntry>,
    contents: Vec<Vec<u8>>,
}

impl MemoryArchive {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a file whose declared size is its content length
    pub fn add(&mut self, name: impl Into<String>, content: impl Into<Vec<u8>>) {
        let content = content.into();
        let size = content.len();
        self.add_with_size(name, content, size);
    }

    /// Appends a file that claims to be `size` bytes long regardless of its content
    pub fn add_with_size(
        &mut self,
        name: impl Into<String>,
        content: impl Into<Vec<u8>>,
        size: usize,
    ) {
        self.entries.push(ArchiveEntry {
            name: name.into(),
            size,
        });
        self.contents.push(content.into());
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<N, C> FromIterator<(N, C)> for MemoryArchive
where
    N: Into<String>,
    C: Into<Vec<u8>>,
{
    fn from_iter<I: IntoIterator<Item = (N, C)>>(iter: I) -> Self {
        let mut archive = Self::new();
        for (name, content) in iter {
            archive.add(name, content);
        }
        archive
    }
}

impl Archive for MemoryArchive {
    fn entries(&self) -> &[ArchiveEntry] {
        &self.entries
    }

    fn read_entry(&self, index: usize, buf: &mut [u8]) -> io::Result<usize> {
        let content = self.contents.get(index).ok_or_else(|| missing_entry(index))?;
        read_all(&mut content.as_slice(), buf)
    }
}

/// Bytes behind a zip snapshot
#[derive(Clone)]
enum Backing {
    Mapped(Arc<Mmap>),
    Owned(Arc<[u8]>),
}

impl AsRef<[u8]> for Backing {
    fn as_ref(&self) -> &[u8] {
        match self {
            Backing::Mapped(mmap) => mmap,
            Backing::Owned(bytes) => bytes,
        }
    }
}

/// A zip file snapshot. Directory entries are not listed.
pub struct ZipSnapshot {
    zip: ZipArchive<Cursor<Backing>>,
    entries: Vec<ArchiveEntry>,
    // Position of each listed entry inside the zip directory
    zip_indices: Vec<usize>,
}

impl ZipSnapshot {
    /// Memory maps and indexes the zip file at `path`
    pub fn open(path: &Path) -> SearchResult<Self> {
        let file = File::open(path).map_err(|e| {
            SearchError::archive_access(format!("{}: {}", path.display(), e))
        })?;
        let mmap = unsafe { Mmap::map(&file) }
            .map_err(|e| SearchError::archive_access(format!("{}: {}", path.display(), e)))?;
        Self::from_backing(Backing::Mapped(Arc::new(mmap)))
            .map_err(|e| SearchError::archive_access(format!("{}: {}", path.display(), e)))
    }

    /// Indexes a zip file already in memory
    pub fn from_bytes(bytes: impl Into<Arc<[u8]>>) -> SearchResult<Self> {
        Self::from_backing(Backing::Owned(bytes.into()))
            .map_err(|e| SearchError::archive_access(e.to_string()))
    }

    fn from_backing(backing: Backing) -> zip::result::ZipResult<Self> {
        let mut zip = ZipArchive::new(Cursor::new(backing))?;
        let mut entries = Vec::with_capacity(zip.len());
        let mut zip_indices = Vec::with_capacity(zip.len());

        for i in 0..zip.len() {
            let file = zip.by_index_raw(i)?;
            if file.is_dir() {
                continue;
            }
            entries.push(ArchiveEntry {
                name: file.name().to_string(),
                size: file.size() as usize,
            });
            zip_indices.push(i);
        }

        debug!("Indexed zip snapshot with {} files", entries.len());
        Ok(Self {
            zip,
            entries,
            zip_indices,
        })
    }
}

impl Archive for ZipSnapshot {
    fn entries(&self) -> &[ArchiveEntry] {
        &self.entries
    }

    fn read_entry(&self, index: usize, buf: &mut [u8]) -> io::Result<usize> {
        let zip_index = *self
            .zip_indices
            .get(index)
            .ok_or_else(|| missing_entry(index))?;

        // Clones share the backing bytes and the parsed directory
        let mut zip = self.zip.clone();
        let mut file = zip.by_index(zip_index).map_err(io::Error::other)?;
        read_all(&mut file, buf)
    }
}

/// Zip snapshots stored on disk as `<root>/<repo>/<commit>.zip`
#[derive(Debug, Clone)]
pub struct ZipStore {
    root: PathBuf,
}

impl ZipStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Location of the snapshot for `repo` at `commit`
    pub fn snapshot_path(&self, repo: &str, commit: &str) -> SearchResult<PathBuf> {
        let repo_path = Path::new(repo);
        if !repo_path
            .components()
            .all(|c| matches!(c, Component::Normal(_)))
        {
            return Err(SearchError::archive_access(format!(
                "invalid repository name {:?}",
                repo
            )));
        }
        if commit.contains(['/', '\\']) || commit.starts_with('.') {
            return Err(SearchError::archive_access(format!(
                "invalid commit {:?}",
                commit
            )));
        }
        Ok(self.root.join(repo_path).join(format!("{}.zip", commit)))
    }
}

impl ArchiveProvider for ZipStore {
    type Archive = ZipSnapshot;

    fn open(&self, repo: &str, commit: &str) -> SearchResult<ZipSnapshot> {
        let path = self.snapshot_path(repo, commit)?;
        debug!("Opening snapshot {}", path.display());
        ZipSnapshot::open(&path)
    }
}
