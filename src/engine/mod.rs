mod engine;
mod machine;
mod preview;
mod types;


pub use engine::{BoothEngine, BoothEngineBuilder};
pub use machine::{MachineEvent, StateMachine};
pub use types::{Effect, EngineSnapshot, EngineState, SessionPhase};
