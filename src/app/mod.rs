// Application layer - Use case interactors and host interface

pub mod container;
pub mod index_interactor;
pub mod job_controller;

// Re-export interactors
pub use container::{AppContainer, DefaultAppContainer};
pub use index_interactor::IndexInteractor;
pub use job_controller::{CancelReport, IndexService};
