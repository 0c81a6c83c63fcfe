pub mod committer;
pub mod orchestrator;
pub mod ranker;
pub mod score;
pub mod selector;

pub use committer::{CommitOutcome, MatchCommitter};
pub use orchestrator::{Collaborators, MatchOrchestrator, MatchOutcome};
pub use ranker::{Ranker, TopK, DEFAULT_TOP_K};
pub use score::{score, ScoringContainer, ScoringPolicy, ZeroDistancePolicy};
pub use selector::CandidateSelector;
