pub mod case_outcome;
pub mod case_record;
pub mod loaders;
pub mod run_summary;

pub use case_outcome::{CaseOutcome, CaseStatus};
pub use case_record::CaseRecord;
pub use loaders::{load_dataset, load_dataset_async, Dataset};
pub use run_summary::RunSummary;
