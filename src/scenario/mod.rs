pub mod hints;
pub mod model;
pub mod synthesizer;

pub use self::hints::{LabelHeuristic, LabelRegistry};
pub use self::model::{ProtocolScenario, ScenarioStep, StepAction};
pub use self::synthesizer::{ConversionOptions, ScenarioSynthesizer};
