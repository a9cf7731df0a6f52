// Core models
pub mod draw;
pub mod match_model;
pub mod participant;
pub mod standing;

// Re-export commonly used types
pub use draw::*;
pub use match_model::*;
pub use participant::*;
pub use standing::*;
