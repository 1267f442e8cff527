//! Chat transcript and the streaming itinerary consumer that fills it.

pub mod stream;
pub mod transcript;

pub use stream::{APOLOGY_MESSAGE, ItineraryStreamConsumer, StreamOutcome, StreamStatus};
pub use transcript::{ChatMessage, Role, Transcript};
