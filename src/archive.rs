//! Jar scanning: enumerate `.class` entries, scan them in parallel and fold
//! the results into the archive unit.

use memmap2::Mmap;
use rayon::prelude::*;
use std::fs::File;
use std::io::{Cursor, Read};
use std::ops::Deref;
use std::path::Path;
use std::sync::Arc;
use zip::ZipArchive;

use crate::detect::{Detector, hash_bytes};
use crate::status::{Content, ScanEvent, ScanUnit};

enum ArchiveBytes {
    Mapped(Mmap),
    Shared(Arc<[u8]>),
}

impl Deref for ArchiveBytes {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        match self {
            ArchiveBytes::Mapped(mmap) => mmap,
            ArchiveBytes::Shared(bytes) => bytes,
        }
    }
}

fn map_file(path: &Path) -> Result<ArchiveBytes, String> {
    let file =
        File::open(path).map_err(|err| format!("Unable to open {}: {err}", path.display()))?;
    // SAFETY: The file is opened read-only and remains valid for the lifetime of the mmap.
    // The mmap is dropped before the file, ensuring memory safety.
    let mmap = unsafe { Mmap::map(&file) }
        .map_err(|err| format!("Unable to map {}: {err}", path.display()))?;
    Ok(ArchiveBytes::Mapped(mmap))
}

type Archive<'b> = ZipArchive<Cursor<&'b [u8]>>;

/// Scan every class entry of the archive behind `unit` and settle it.
pub(crate) fn scan_archive(detector: &Detector<'_>, unit: ScanUnit) -> ScanUnit {
    let bytes = match &unit.content {
        Content::File(path) => map_file(path),
        Content::Memory(bytes) => Ok(ArchiveBytes::Shared(bytes.clone())),
        Content::Entry(_) => Err("Nested archives are not scanned".to_string()),
        Content::Missing => Err("File in jar is missing".to_string()),
    };
    let bytes = match bytes {
        Ok(bytes) => bytes,
        Err(message) => return unit.fail(message),
    };

    let mut unit = unit;
    unit.sha256 = Some(hash_bytes(&bytes));

    let mut archive = match ZipArchive::new(Cursor::new(&bytes[..])) {
        Ok(archive) => archive,
        Err(err) => {
            log::warn!("{} is not a readable archive: {err}", unit.name);
            return unit.fail(format!("Unable to read archive: {err}"));
        }
    };

    let entries = class_entries(&mut archive);
    let unit = unit.advance(ScanEvent::Scan);
    log::info!("{}: scanning {} class entries", unit.name, entries.len());

    let settled: Vec<ScanUnit> = entries
        .into_par_iter()
        .map_init(|| archive.clone(), |archive, entry| scan_entry(detector, archive, entry))
        .collect();

    unit.advance(ScanEvent::Settle(settled))
}

/// Class entries in central-directory order. An entry whose local header
/// cannot be read is kept under a placeholder name; its read fails again in
/// `scan_entry` and it settles as `error`.
fn class_entries(archive: &mut Archive<'_>) -> Vec<ScanUnit> {
    let mut entries = Vec::new();
    for i in 0..archive.len() {
        let header = archive
            .by_index_raw(i)
            .map(|entry| (entry.is_dir(), entry.name().to_string()));
        match header {
            Ok((false, name)) if name.ends_with(".class") => {
                entries.push(ScanUnit::discovered(name, Content::Entry(i)));
            }
            Ok(_) => {}
            Err(err) => {
                log::warn!("unreadable header for archive entry #{i}: {err}");
                entries.push(ScanUnit::discovered(format!("entry #{i}"), Content::Entry(i)));
            }
        }
    }
    entries
}

fn scan_entry(detector: &Detector<'_>, archive: &mut Archive<'_>, unit: ScanUnit) -> ScanUnit {
    let Content::Entry(index) = unit.content else {
        return unit.fail("File in jar has wrong type");
    };

    let mut bytes = Vec::new();
    let read = archive
        .by_index(index)
        .and_then(|mut entry| Ok(entry.read_to_end(&mut bytes)?));
    if let Err(err) = read {
        log::warn!("failed to read {}: {err}", unit.name);
        return unit.fail(format!("Unable to read entry: {err}"));
    }
    if bytes.is_empty() {
        return unit.fail("File is empty");
    }

    detector.scan_class(unit, &bytes)
}
