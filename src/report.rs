use serde::Serialize;
use std::fmt::Write;

use crate::matcher::Match;
use crate::status::{ScanUnit, StatusKind};

#[derive(Debug, Clone, Serialize)]
pub struct UnitReport {
    pub name: String,
    pub status: StatusKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub matches: Vec<Match>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<UnitReport>,
}

impl From<&ScanUnit> for UnitReport {
    fn from(unit: &ScanUnit) -> Self {
        Self {
            name: unit.name.clone(),
            status: unit.status(),
            sha256: unit.sha256.clone(),
            matches: unit.matches().map(<[Match]>::to_vec).unwrap_or_default(),
            error: unit.error().map(str::to_string),
            children: unit.children.iter().map(UnitReport::from).collect(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct Summary {
    pub scanned: usize,
    pub clean: usize,
    pub infected: usize,
    pub error: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScanReport {
    pub summary: Summary,
    pub units: Vec<UnitReport>,
}

impl ScanReport {
    pub fn new(units: &[ScanUnit]) -> Self {
        let mut summary = Summary {
            scanned: units.len(),
            ..Summary::default()
        };
        for unit in units {
            match unit.status() {
                StatusKind::Clean => summary.clean += 1,
                StatusKind::Infected => summary.infected += 1,
                StatusKind::Error => summary.error += 1,
                _ => {}
            }
        }
        Self {
            summary,
            units: units.iter().map(UnitReport::from).collect(),
        }
    }

    pub fn any_infected(&self) -> bool {
        self.summary.infected > 0
    }

    /// Plain text rendering: one line per unit, children indented under
    /// their archive. Clean children are left out to keep large jars readable.
    pub fn to_text(&self) -> String {
        let mut out = String::new();
        for unit in &self.units {
            render(&mut out, unit, 0);
        }
        let s = &self.summary;
        let _ = writeln!(
            out,
            "scanned: {}, clean: {}, infected: {}, error: {}",
            s.scanned, s.clean, s.infected, s.error
        );
        out
    }
}

fn render(out: &mut String, unit: &UnitReport, depth: usize) {
    let indent = "  ".repeat(depth);
    let _ = writeln!(out, "{indent}{}: {}", unit.name, unit.status);
    if let Some(error) = &unit.error {
        let _ = writeln!(out, "{indent}  error: {error}");
    }
    if unit.children.is_empty() {
        for m in &unit.matches {
            let _ = writeln!(
                out,
                "{indent}  - {} in {} at {} (distance {})",
                m.signature, m.method, m.offset, m.distance
            );
        }
    }
    for child in unit
        .children
        .iter()
        .filter(|c| c.status != StatusKind::Clean)
    {
        render(out, child, depth + 1);
    }
}
