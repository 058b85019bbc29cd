//! Diagnostics recorded while marshalling.
//!
//! Every condition the marshaller recovers from is logged through the `log`
//! facade (target `flowvalue`) and kept on the session so the host can
//! surface it. Type-filter narrowing is not a diagnostic and is never
//! recorded.

use std::collections::VecDeque;
use std::fmt;

use serde::Serialize;

/// What went wrong.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum DiagnosticKind {
    /// A host value with no slot representation (encode → `Null`).
    UnsupportedValue,
    /// A host value whose shape disagrees with its declared catalog type
    /// (encode → `Null`).
    TypeMismatch,
    /// A type index or name missing from the catalog.
    UnknownType,
    /// A slot tag byte with no host mapping (decode → `Undefined`).
    UnknownTag,
    /// An array block with fewer slots than its object type has fields.
    InvalidArraySize,
    /// A read outside runtime memory.
    MemoryFault,
    /// A stream handle never issued by this session.
    UnknownResource,
    /// Decode nesting deeper than [`MAX_DECODE_DEPTH`](crate::MAX_DECODE_DEPTH).
    DepthExceeded,
}

impl DiagnosticKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::UnsupportedValue => "unsupported value",
            Self::TypeMismatch => "type mismatch",
            Self::UnknownType => "unknown type",
            Self::UnknownTag => "unknown tag",
            Self::InvalidArraySize => "invalid array size",
            Self::MemoryFault => "memory fault",
            Self::UnknownResource => "unknown resource",
            Self::DepthExceeded => "depth exceeded",
        }
    }
}

impl fmt::Display for DiagnosticKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub message: String,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

/// Most diagnostics a session keeps before discarding the oldest.
pub const MAX_DIAGNOSTICS: usize = 1024;

/// Diagnostics collected over a session, oldest first.
///
/// Hosts should drain this with [`take`](Self::take) after each step. Past
/// [`MAX_DIAGNOSTICS`] entries the oldest are discarded (they were already
/// logged) and counted in [`dropped`](Self::dropped).
#[derive(Debug, Clone, Default)]
pub struct Diagnostics {
    entries: VecDeque<Diagnostic>,
    dropped: usize,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Log and record a diagnostic.
    pub fn report(&mut self, kind: DiagnosticKind, message: impl Into<String>) {
        let diagnostic = Diagnostic {
            kind,
            message: message.into(),
        };
        log::error!(target: "flowvalue", "{diagnostic}");
        if self.entries.len() == MAX_DIAGNOSTICS {
            self.entries.pop_front();
            self.dropped += 1;
        }
        self.entries.push_back(diagnostic);
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries discarded since the last `take` or `clear`.
    pub fn dropped(&self) -> usize {
        self.dropped
    }

    /// Number of diagnostics of `kind`.
    pub fn count(&self, kind: DiagnosticKind) -> usize {
        self.entries.iter().filter(|d| d.kind == kind).count()
    }

    pub fn contains(&self, kind: DiagnosticKind) -> bool {
        self.count(kind) > 0
    }

    /// Remove and return everything recorded so far.
    pub fn take(&mut self) -> Vec<Diagnostic> {
        self.dropped = 0;
        std::mem::take(&mut self.entries).into()
    }

    pub fn clear(&mut self) {
        self.dropped = 0;
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_and_take() {
        let mut diags = Diagnostics::new();
        diags.report(DiagnosticKind::UnknownTag, "tag 99");
        diags.report(DiagnosticKind::UnknownTag, "tag 98");
        diags.report(DiagnosticKind::MemoryFault, "read past end");
        assert_eq!(diags.count(DiagnosticKind::UnknownTag), 2);
        assert!(diags.contains(DiagnosticKind::MemoryFault));
        assert!(!diags.contains(DiagnosticKind::TypeMismatch));

        let taken = diags.take();
        assert_eq!(taken.len(), 3);
        assert_eq!(taken[0].to_string(), "unknown tag: tag 99");
        assert!(diags.is_empty());
    }

    #[test]
    fn test_oldest_entries_are_discarded_past_the_cap() {
        let mut diags = Diagnostics::new();
        for i in 0..MAX_DIAGNOSTICS + 5 {
            diags.report(DiagnosticKind::UnknownTag, format!("tag {i}"));
        }
        assert_eq!(diags.len(), MAX_DIAGNOSTICS);
        assert_eq!(diags.dropped(), 5);
        assert_eq!(diags.iter().next().unwrap().message, "tag 5");

        let taken = diags.take();
        assert_eq!(taken.len(), MAX_DIAGNOSTICS);
        assert_eq!(diags.dropped(), 0);
    }

    #[test]
    fn test_serializes_camel_case_kind() {
        let d = Diagnostic {
            kind: DiagnosticKind::InvalidArraySize,
            message: "2 < 3".to_string(),
        };
        let json = serde_json::to_string(&d).unwrap();
        assert_eq!(json, r#"{"kind":"invalidArraySize","message":"2 < 3"}"#);
    }
}
