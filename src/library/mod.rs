//! Media library discovery: recursive walk, classification and episode keys

pub mod walker;

pub use walker::{LibraryEntry, LibraryScan, LibraryWalker};
