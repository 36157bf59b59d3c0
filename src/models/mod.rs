pub mod conversation;
pub mod correction;
pub mod enums;
pub mod patient;
pub mod retraining;
pub mod scan;
pub mod symptom;

pub use conversation::*;
pub use correction::*;
pub use enums::*;
pub use patient::*;
pub use retraining::*;
pub use scan::*;
pub use symptom::*;

#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("Invalid value for {field}: {value}")]
    InvalidEnum { field: String, value: String },
}
