// Domain layer - Core value types and rules

pub mod errors;
pub mod model;
pub mod rules;
