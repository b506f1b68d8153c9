pub mod credentials;
pub mod destinations;
pub mod error;
pub mod export;
pub mod http;
pub mod matching;
pub mod orchestrator;
pub mod parsing;
pub mod progress;
pub mod services;
pub mod sources;
pub mod traits;

pub use credentials::{CredentialStore, Credentials, JsonFileCredentialStore, MemoryCredentialStore};
pub use error::{DiggerError, Result};
pub use orchestrator::{Orchestrator, OrchestratorBuilder, SyncRequest};
pub use progress::{ProgressReceiver, ProgressSender};
pub use services::{Services, ServicesBuilder};
pub use traits::{CreatedPlaylist, DestinationFactory, MusicSource, PlaylistDestination};
