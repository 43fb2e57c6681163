pub mod external;
pub mod metadata_cache;
pub mod presence;

pub use external::{DetachedStream, ExternalStream};
pub use metadata_cache::{InMemoryMetadataCache, MetadataCache, TrackMetadata};
pub use presence::{LogPresenceReporter, Presence, PresenceReporter, PresenceSnapshot, PresenceTracker};
