pub mod case_flow;
pub mod format_check;

pub use case_flow::{CaseFlow, CaseProcessor, CaseRetryPolicy};
pub use format_check::{FormatWarning, FORMAT_WARNING_MARKER};
