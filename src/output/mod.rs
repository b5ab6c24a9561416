//! Job workspace output: status store, caption documents and metadata

pub mod documents;
pub mod history;
pub mod layout;
pub mod metadata;
pub mod status;
pub mod writer;

pub use documents::{DocumentWriter, RebuildReport};
pub use history::JobHistory;
pub use layout::{JobLock, JobWorkspace};
pub use status::{StatusMap, StatusStore};
pub use writer::OutputWriter;
