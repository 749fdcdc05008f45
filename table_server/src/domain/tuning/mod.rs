pub mod drag;
pub mod ground;
pub mod interpolation;
pub mod sync;
pub mod token;

pub use drag::DragTuning;
pub use ground::GroundTuning;
pub use interpolation::InterpolationTuning;
pub use sync::SyncTuning;
pub use token::TokenTuning;
