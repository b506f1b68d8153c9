pub mod playlist;
pub mod progress;
pub mod task;
pub mod track;

pub use playlist::{MatchResult, PlaylistResult};
pub use progress::ProgressEvent;
pub use track::Track;
