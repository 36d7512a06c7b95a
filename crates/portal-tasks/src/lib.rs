//! portal-tasks - what a portal conversation actually runs
//!
//! - `classifier` - splitting the latest request into typed tasks
//! - `registry` - task kind to executor lookup with a fallback
//! - `executors` - search, document, sheet and plain chat executors
//! - `extract` - tagged-section and code-fence extraction from replies
//! - `portal` - the analysis task and sequence assembly
//! - `demo` - provider-free demo stream

pub mod classifier;
pub mod demo;
pub mod executors;
pub mod extract;
pub mod portal;
pub mod registry;

#[cfg(test)]
mod testing;

pub use classifier::{Classifier, LlmClassifier, TaskSpec};
pub use demo::{default_items, demo_sequence, DemoGenerator, DemoItem};
pub use executors::{
    ChatExecutor, DocumentExecutor, ExecutorBackend, SearchExecutor, SheetExecutor,
};
pub use portal::Portal;
pub use registry::{kinds, RegistryError, SharedExecutor, TaskExecutor, TaskRegistry};
