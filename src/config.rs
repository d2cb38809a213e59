//! Configuration of an [`EventStore`][crate::EventStore], usually loaded
//! from the process environment through [`Envconfig::init_from_env`].

use envconfig::Envconfig;

use crate::serde::SerializerOptions;

/// Names of the containers used by the event store, and output options.
#[derive(Debug, Clone, PartialEq, Eq, Envconfig)]
pub struct Config {
    /// Container holding the Event Streams: events and stream metadata.
    #[envconfig(from = "EVENTSTORE_EVENTS_CONTAINER", default = "event-store")]
    pub events_container: String,

    /// Container holding the consumers checkpoints.
    #[envconfig(
        from = "EVENTSTORE_CHECKPOINTS_CONTAINER",
        default = "stream-checkpoints"
    )]
    pub checkpoints_container: String,

    /// Writes indented JSON documents, useful when inspecting the store by hand.
    #[envconfig(from = "EVENTSTORE_INDENTED_JSON", default = "false")]
    pub indented_json: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            events_container: "event-store".to_owned(),
            checkpoints_container: "stream-checkpoints".to_owned(),
            indented_json: false,
        }
    }
}

impl Config {
    pub(crate) fn serializer_options(&self) -> SerializerOptions {
        SerializerOptions {
            indented: self.indented_json,
        }
    }
}
