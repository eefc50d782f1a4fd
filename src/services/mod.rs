pub mod request_executor;
pub mod result_writer;
pub mod template_renderer;

pub use request_executor::{BackoffPolicy, RequestExecutor};
pub use result_writer::{Cell, ResultWriter, WriteTarget};
pub use template_renderer::TemplateRenderer;
