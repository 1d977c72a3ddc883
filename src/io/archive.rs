use crate::io::naming::{derive_working_key, BandSelector};
use crate::types::{Resolution, S2Error, S2Result};
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use zip::ZipArchive;

/// Index of compressed Sentinel-2 product archives in a directory
///
/// Archives are enumerated once at construction time, in directory
/// iteration order. The index never mutates the archives it points at.
pub struct ArchiveIndex {
    zipdir: PathBuf,
    archives: Vec<String>,
}

impl ArchiveIndex {
    /// Scan `zipdir` for `.zip` product archives.
    ///
    /// A missing or unreadable directory is a fatal startup error, no
    /// recovery is attempted.
    pub fn new<P: AsRef<Path>>(zipdir: P) -> S2Result<Self> {
        let zipdir = zipdir.as_ref().to_path_buf();

        let entries = fs::read_dir(&zipdir).map_err(|e| {
            if e.kind() == io::ErrorKind::NotFound {
                S2Error::ArchiveNotFound(zipdir.display().to_string())
            } else {
                S2Error::Io(e)
            }
        })?;

        let mut archives = Vec::new();
        for entry in entries {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.ends_with(".zip") {
                archives.push(name);
            }
        }

        log::info!("found {} product archives in {}", archives.len(), zipdir.display());
        Ok(Self { zipdir, archives })
    }

    pub fn zipdir(&self) -> &Path {
        &self.zipdir
    }

    /// Archive names in directory iteration order (not guaranteed sorted)
    pub fn archives(&self) -> &[String] {
        &self.archives
    }

    /// Absolute path of a named archive under the index directory
    pub fn archive_path(&self, name: &str) -> PathBuf {
        self.zipdir.join(name)
    }

    /// List the internal entry paths of one archive
    pub fn list_entries(&self, name: &str) -> S2Result<Vec<String>> {
        let path = self.archive_path(name);
        if !path.exists() {
            return Err(S2Error::ArchiveNotFound(path.display().to_string()));
        }

        let file = File::open(&path)?;
        let mut archive = ZipArchive::new(file)?;

        let mut entries = Vec::with_capacity(archive.len());
        for i in 0..archive.len() {
            let entry = archive.by_index(i)?;
            entries.push(entry.name().to_string());
        }

        Ok(entries)
    }
}

/// Streams band-selected entries out of product archives into per-product
/// working directories.
pub struct Extractor {
    index: ArchiveIndex,
    work_root: PathBuf,
}

impl Extractor {
    /// Extractor writing working directories under the current directory
    pub fn new(index: ArchiveIndex) -> Self {
        Self::with_work_root(index, ".")
    }

    pub fn with_work_root<P: AsRef<Path>>(index: ArchiveIndex, work_root: P) -> Self {
        Self {
            index,
            work_root: work_root.as_ref().to_path_buf(),
        }
    }

    pub fn index(&self) -> &ArchiveIndex {
        &self.index
    }

    /// Create the working directory for a derived key, or report that it
    /// already exists.
    ///
    /// The atomic `create_dir` is the mutual-exclusion primitive: under
    /// concurrent callers exactly one sees `already_existed == false` and
    /// performs the extraction. A partially-extracted directory is never
    /// overwritten; the caller removes it and re-runs from scratch.
    pub fn ensure_working_dir(&self, key: &str) -> S2Result<(PathBuf, bool)> {
        fs::create_dir_all(&self.work_root)?;

        let path = self.work_root.join(key);
        match fs::create_dir(&path) {
            Ok(()) => Ok((path, false)),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => Ok((path, true)),
            Err(e) => Err(S2Error::WriteFailure { path, source: e }),
        }
    }

    /// Extract every band file of one archive matching `resolution` into
    /// the working directory derived from the archive name.
    ///
    /// Returns the working-directory path. If the directory already exists
    /// the whole extraction is skipped with zero I/O.
    pub fn extract(&self, archive_name: &str, resolution: Resolution) -> S2Result<PathBuf> {
        let key = derive_working_key(archive_name)?;

        let path = self.index.archive_path(archive_name);
        if !path.exists() {
            return Err(S2Error::ArchiveNotFound(path.display().to_string()));
        }

        let (workdir, already_existed) = self.ensure_working_dir(&key)?;
        if already_existed {
            log::info!("{} already exists, skipping {}", workdir.display(), archive_name);
            return Ok(workdir);
        }

        log::info!("{} did not exist, created", workdir.display());
        log::info!("managing images for {}", key);

        let selector = BandSelector::new(resolution)?;

        let file = File::open(&path)?;
        let mut archive = ZipArchive::new(file)?;

        for i in 0..archive.len() {
            let mut entry = archive.by_index(i)?;
            let member = entry.name().to_string();

            let basename = match member.rsplit('/').next() {
                Some(name) if !name.is_empty() => name.to_string(),
                _ => continue, // directory entry
            };

            if !selector.is_selected(&member) {
                log::debug!("skipping {}", member);
                continue;
            }

            let target = workdir.join(&basename);
            let mut output = File::create(&target).map_err(|e| S2Error::WriteFailure {
                path: target.clone(),
                source: e,
            })?;
            io::copy(&mut entry, &mut output).map_err(|e| S2Error::WriteFailure {
                path: target.clone(),
                source: e,
            })?;

            log::info!("extracted {}", basename);
        }

        Ok(workdir)
    }

    /// Extract all indexed archives for one resolution, fanning out across
    /// archives. Working-directory creation serializes concurrent runs per
    /// key, so the idempotence contract of `extract` is preserved.
    pub fn extract_all(&self, resolution: Resolution) -> Vec<(String, S2Result<PathBuf>)> {
        use rayon::prelude::*;

        self.index
            .archives()
            .par_iter()
            .map(|name| (name.clone(), self.extract(name, resolution)))
            .collect()
    }
}
