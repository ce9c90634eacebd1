pub mod directory;
pub mod locator;
pub mod normalize;
pub mod orchestrator;
