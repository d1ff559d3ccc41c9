use anyhow::{Context, Result};
use ignore::WalkBuilder;
use std::path::{Path, PathBuf};
use std::sync::mpsc;

use crate::status::{Content, ScanUnit};

fn is_scannable(path: &Path) -> bool {
    path.extension().is_some_and(|e| e == "jar" || e == "class")
}

/// Every `.jar` and `.class` file under `base_path`, sorted.
pub fn find_targets(base_path: &Path) -> Result<Vec<PathBuf>> {
    let (tx, rx) = mpsc::channel();

    let walker = WalkBuilder::new(base_path)
        .hidden(false)
        .git_ignore(false)
        .git_global(false)
        .git_exclude(false)
        .ignore(false)
        .build_parallel();

    walker.run(|| {
        let tx = tx.clone();
        Box::new(move |entry| {
            match entry {
                Ok(entry) => {
                    let path = entry.path();
                    if entry.file_type().is_some_and(|t| t.is_file()) && is_scannable(path) {
                        let _ = tx.send(path.to_path_buf());
                    }
                }
                Err(err) => log::warn!("skipping unreadable path: {err}"),
            }
            ignore::WalkState::Continue
        })
    });

    drop(tx);
    let mut targets: Vec<PathBuf> = rx.iter().collect();
    targets.sort();
    Ok(targets)
}

/// Turn command-line paths into scan units. Directories expand to the files
/// found beneath them; plain files are taken as given and left for `detect`
/// to accept or reject.
pub fn collect_units(paths: &[PathBuf]) -> Result<Vec<ScanUnit>> {
    let mut units = Vec::new();
    for path in paths {
        let metadata = std::fs::metadata(path)
            .with_context(|| format!("Unable to access {}", path.display()))?;
        if metadata.is_dir() {
            let found = find_targets(path)?;
            log::info!("{}: {} file(s) to scan", path.display(), found.len());
            units.extend(found.into_iter().map(file_unit));
        } else {
            units.push(file_unit(path.clone()));
        }
    }
    Ok(units)
}

fn file_unit(path: PathBuf) -> ScanUnit {
    let name = path.to_string_lossy().into_owned();
    ScanUnit::new(name, Content::File(path))
}
