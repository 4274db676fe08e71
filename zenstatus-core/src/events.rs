//! Progress events emitted while a run is in flight, and their
//! server-sent-events framing.

use serde::Serialize;
use zenstatus_scanner::{AuditRecord, SitemapDiagnostic};

pub const KEEP_ALIVE: &str = ": keep-alive\n\n";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ProgressEvent {
    pub completed: usize,
    pub total: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AuditEvent {
    /// One more page finished, in completion order.
    Progress(ProgressEvent),
    /// Keep-alive marker for idle stretches. Carries nothing.
    Heartbeat,
    /// Terminal event with every result in final order.
    Complete {
        results: Vec<AuditRecord>,
        sitemap_debug: Vec<SitemapDiagnostic>,
    },
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum WireEvent<'a> {
    Progress {
        completed: usize,
        total: usize,
    },
    Complete {
        results: &'a [AuditRecord],
        sitemap_debug: &'a [SitemapDiagnostic],
    },
}

impl AuditEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(self, AuditEvent::Complete { .. })
    }

    /// Frame this event for a `text/event-stream` response.
    pub fn to_sse(&self) -> Result<String, serde_json::Error> {
        let wire = match self {
            AuditEvent::Heartbeat => return Ok(KEEP_ALIVE.to_string()),
            AuditEvent::Progress(p) => WireEvent::Progress {
                completed: p.completed,
                total: p.total,
            },
            AuditEvent::Complete {
                results,
                sitemap_debug,
            } => WireEvent::Complete {
                results,
                sitemap_debug,
            },
        };
        Ok(format!("data: {}\n\n", serde_json::to_string(&wire)?))
    }
}
