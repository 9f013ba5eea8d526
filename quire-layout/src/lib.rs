pub mod engine;
pub mod storage;

pub use engine::{LayoutEngine, LayoutState, PointerListeners, PointerPosition, Side};
pub use storage::LayoutStorage;
