mod embedding;
mod preference;
mod score;
mod validation;

pub use embedding::{BatchStats, EmbeddingService};
pub use preference::PreferenceService;
pub use score::{ScoreService, ScoringParams};
pub use validation::{VALIDATION_TEXT, ValidationOutcome, ValidationService};
