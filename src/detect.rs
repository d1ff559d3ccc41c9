use sha2::{Digest, Sha256};
use std::sync::Arc;

use crate::archive;
use crate::bytecode;
use crate::classfile::ClassFile;
use crate::error::DecodeError;
use crate::instruction;
use crate::matcher::{self, Match, MatchOptions};
use crate::signature::{self, Signature};
use crate::status::{Content, ScanEvent, ScanUnit, StatusKind, UnitKind};

/// Scan one unit with the built-in catalog.
///
/// Safe to call concurrently on distinct units. Whatever goes wrong ends up
/// in the returned unit's `error` state; this never fails as a whole.
pub fn detect(unit: ScanUnit, options: &MatchOptions) -> ScanUnit {
    Detector::new(*options).detect(unit)
}

/// A signature set paired with matching options.
#[derive(Debug, Clone, Copy)]
pub struct Detector<'a> {
    pub signatures: &'a [Signature],
    pub options: MatchOptions,
}

impl Detector<'static> {
    pub fn new(options: MatchOptions) -> Self {
        Self {
            signatures: signature::catalog(),
            options,
        }
    }
}

impl<'a> Detector<'a> {
    pub fn with_signatures(signatures: &'a [Signature], options: MatchOptions) -> Self {
        Self {
            signatures,
            options,
        }
    }

    pub fn detect(&self, unit: ScanUnit) -> ScanUnit {
        let unit = match unit.status() {
            StatusKind::Added => unit.advance(ScanEvent::Load),
            status if status.is_terminal() => return unit,
            _ => unit,
        };

        match unit.kind() {
            Some(UnitKind::Archive) => archive::scan_archive(self, unit),
            Some(UnitKind::Class) => match load(&unit.content) {
                Ok(bytes) => self.scan_class(unit, &bytes),
                Err(message) => unit.fail(message),
            },
            None => unit.fail("File is not a .jar or .class file"),
        }
    }

    /// Decode and match one class file's bytes, settling `unit`.
    pub fn scan_class(&self, unit: ScanUnit, bytes: &[u8]) -> ScanUnit {
        let unit = match unit.status() {
            StatusKind::Added => unit.advance(ScanEvent::Load),
            _ => unit,
        };
        let mut unit = unit.advance(ScanEvent::Scan);
        unit.sha256 = Some(hash_bytes(bytes));

        match self.find_matches(bytes) {
            Ok(matches) => {
                if !matches.is_empty() {
                    log::info!("{}: {} signature match(es)", unit.name, matches.len());
                }
                unit.advance(ScanEvent::Complete(matches))
            }
            Err(err) => {
                log::warn!("failed to decode {}: {err}", unit.name);
                unit.fail(err.to_string())
            }
        }
    }

    pub fn find_matches(&self, bytes: &[u8]) -> Result<Vec<Match>, DecodeError> {
        let class = ClassFile::parse(bytes)?;
        let mut matches = Vec::new();

        for method in &class.methods {
            let Some(code) = method.code.as_deref() else {
                continue;
            };
            let name = class.method_name(method);
            let instructions = bytecode::decode(code)?;
            let stream = instruction::resolve_all(&instructions, &class.constant_pool);
            matches.extend(matcher::scan_method(
                &name,
                &stream,
                self.signatures,
                &self.options,
            ));
        }

        Ok(matches)
    }
}

fn load(content: &Content) -> Result<Arc<[u8]>, String> {
    match content {
        Content::File(path) => std::fs::read(path)
            .map(Arc::from)
            .map_err(|err| format!("Unable to read {}: {err}", path.display())),
        Content::Memory(bytes) => Ok(bytes.clone()),
        Content::Entry(_) => Err("Archive entry cannot be read outside its archive".to_string()),
        Content::Missing => Err("File is missing".to_string()),
    }
}

pub fn hash_bytes(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}
