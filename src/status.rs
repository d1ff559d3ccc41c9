//! Scan units and their lifecycle.
//!
//! A unit moves `added -> loading -> scanning` and settles in exactly one of
//! `clean`, `infected` or `error`. Transitions go through [`ScanUnit::apply`],
//! which hands back the unit's successor without touching it; the payload of each
//! terminal state lives in its enum variant, so an infected unit without
//! matches or an error without a message cannot be built.

use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use crate::error::TransitionError;
use crate::matcher::Match;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusKind {
    Added,
    Loading,
    Scanning,
    Clean,
    Infected,
    Error,
}

impl StatusKind {
    pub fn is_terminal(self) -> bool {
        self.rank().is_some()
    }

    pub fn rank(self) -> Option<Rank> {
        match self {
            StatusKind::Clean => Some(Rank::Clean),
            StatusKind::Error => Some(Rank::Error),
            StatusKind::Infected => Some(Rank::Infected),
            StatusKind::Added | StatusKind::Loading | StatusKind::Scanning => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            StatusKind::Added => "added",
            StatusKind::Loading => "loading",
            StatusKind::Scanning => "scanning",
            StatusKind::Clean => "clean",
            StatusKind::Infected => "infected",
            StatusKind::Error => "error",
        }
    }
}

impl fmt::Display for StatusKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal statuses ordered from best to worst.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Rank {
    Clean,
    Error,
    Infected,
}

/// Worst of two ranks. A non-terminal status (`None`) yields to any terminal one.
pub fn combine(a: Option<Rank>, b: Option<Rank>) -> Option<Rank> {
    a.max(b)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanState {
    Added,
    Loading,
    Scanning,
    Clean,
    Infected(Vec<Match>),
    Error(String),
}

impl ScanState {
    pub fn kind(&self) -> StatusKind {
        match self {
            ScanState::Added => StatusKind::Added,
            ScanState::Loading => StatusKind::Loading,
            ScanState::Scanning => StatusKind::Scanning,
            ScanState::Clean => StatusKind::Clean,
            ScanState::Infected(_) => StatusKind::Infected,
            ScanState::Error(_) => StatusKind::Error,
        }
    }
}

/// Where a unit's bytes come from.
#[derive(Debug, Clone)]
pub enum Content {
    File(PathBuf),
    Memory(Arc<[u8]>),
    /// Entry index inside the parent archive.
    Entry(usize),
    Missing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitKind {
    Class,
    Archive,
}

#[derive(Debug, Clone)]
pub enum ScanEvent {
    Load,
    Scan,
    Complete(Vec<Match>),
    Fail(String),
    Settle(Vec<ScanUnit>),
}

#[derive(Debug, Clone)]
pub struct ScanUnit {
    pub name: String,
    pub content: Content,
    pub state: ScanState,
    pub children: Vec<ScanUnit>,
    pub sha256: Option<String>,
}

impl ScanUnit {
    pub fn new(name: impl Into<String>, content: Content) -> Self {
        Self {
            name: name.into(),
            content,
            state: ScanState::Added,
            children: Vec::new(),
            sha256: None,
        }
    }

    /// A unit found while enumerating a container starts out loading.
    pub fn discovered(name: impl Into<String>, content: Content) -> Self {
        Self {
            state: ScanState::Loading,
            ..Self::new(name, content)
        }
    }

    pub fn kind(&self) -> Option<UnitKind> {
        if self.name.ends_with(".jar") {
            Some(UnitKind::Archive)
        } else if self.name.ends_with(".class") {
            Some(UnitKind::Class)
        } else {
            None
        }
    }

    pub fn status(&self) -> StatusKind {
        self.state.kind()
    }

    pub fn matches(&self) -> Option<&[Match]> {
        match &self.state {
            ScanState::Infected(matches) => Some(matches),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match &self.state {
            ScanState::Error(message) => Some(message),
            _ => None,
        }
    }

    /// Successor of this unit after `event`. The unit itself is left as is,
    /// so a rejected event costs the caller nothing.
    pub fn apply(&self, event: ScanEvent) -> Result<Self, TransitionError> {
        let from = self.status();
        if from.is_terminal() {
            return Err(TransitionError::AlreadySettled {
                name: self.name.clone(),
                status: from,
            });
        }

        let mut children = self.children.clone();
        let state = match event {
            ScanEvent::Load if from == StatusKind::Added => ScanState::Loading,
            ScanEvent::Load => return Err(self.illegal(StatusKind::Loading)),
            ScanEvent::Scan if from == StatusKind::Loading => ScanState::Scanning,
            ScanEvent::Scan => return Err(self.illegal(StatusKind::Scanning)),
            ScanEvent::Complete(matches) if from == StatusKind::Scanning => {
                if matches.is_empty() {
                    ScanState::Clean
                } else {
                    ScanState::Infected(matches)
                }
            }
            ScanEvent::Complete(matches) => {
                let to = if matches.is_empty() {
                    StatusKind::Clean
                } else {
                    StatusKind::Infected
                };
                return Err(self.illegal(to));
            }
            ScanEvent::Fail(message) => ScanState::Error(message),
            ScanEvent::Settle(settled) => {
                if from == StatusKind::Added {
                    return Err(self.illegal(aggregate(&settled).kind()));
                }
                if let Some(child) = settled.iter().find(|c| !c.status().is_terminal()) {
                    return Err(TransitionError::UnsettledChild {
                        name: self.name.clone(),
                        child: child.name.clone(),
                    });
                }
                let state = aggregate(&settled);
                children = settled;
                state
            }
        };

        Ok(Self {
            name: self.name.clone(),
            content: self.content.clone(),
            state,
            children,
            sha256: self.sha256.clone(),
        })
    }

    /// [`apply`](Self::apply) for callers driving a known-legal sequence. A
    /// rejected event is logged and the unit comes back unchanged.
    pub fn advance(self, event: ScanEvent) -> Self {
        match self.apply(event) {
            Ok(next) => next,
            Err(err) => {
                log::error!("{err}");
                self
            }
        }
    }

    pub fn fail(self, message: impl Into<String>) -> Self {
        self.advance(ScanEvent::Fail(message.into()))
    }

    fn illegal(&self, to: StatusKind) -> TransitionError {
        TransitionError::Illegal {
            name: self.name.clone(),
            from: self.status(),
            to,
        }
    }
}

/// Fold settled children into their parent's state: the worst child rank
/// decides, infected parents carry every child match, and a parent with no
/// children is clean.
pub fn aggregate(children: &[ScanUnit]) -> ScanState {
    let worst = children
        .iter()
        .map(|child| child.status().rank())
        .fold(None, combine);

    match worst {
        Some(Rank::Infected) => ScanState::Infected(
            children
                .iter()
                .filter_map(ScanUnit::matches)
                .flatten()
                .cloned()
                .collect(),
        ),
        Some(Rank::Error) => {
            let failed = children
                .iter()
                .filter(|child| child.status() == StatusKind::Error)
                .count();
            ScanState::Error(format!(
                "{failed} of {} entries could not be scanned",
                children.len()
            ))
        }
        Some(Rank::Clean) | None => ScanState::Clean,
    }
}
