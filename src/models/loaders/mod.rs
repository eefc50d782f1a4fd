pub mod table_loader;

pub use table_loader::{load_dataset, load_dataset_async, Dataset};
