pub mod audit;
pub mod error;
pub mod events;
pub mod pipeline;
pub mod report;

pub use audit::{AuditOptions, AuditOutcome, AuditRequest, AuditService, ExpandedTargets};
pub use error::PipelineError;
pub use events::{AuditEvent, ProgressEvent};
pub use pipeline::{AuditPipeline, PipelineConfig, RunOutcome, sort_results};
pub use report::{ReportData, ReportFormat};
