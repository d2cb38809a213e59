//! Contains the [`EventTypeRegistry`], the explicit mapping between
//! the discriminator names found in wire documents and the Rust payload types.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt::{Debug, Formatter, Result as FmtResult};
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::event::Payload;
use crate::serde::{DecodeError, EncodeError};

type EncodeFn = fn(&dyn Payload) -> Result<Value, EncodeError>;
type DecodeFn = fn(Value) -> Result<Arc<dyn Payload>, serde_json::Error>;

#[derive(Clone, Copy)]
struct Registration {
    type_name: &'static str,
    encode: EncodeFn,
    decode: DecodeFn,
}

fn encode_payload<T>(payload: &dyn Payload) -> Result<Value, EncodeError>
where
    T: Payload + Serialize,
{
    let value = payload
        .downcast_ref::<T>()
        .ok_or(EncodeError::UnregisteredType {
            type_name: payload.type_name(),
        })?;

    serde_json::to_value(value).map_err(EncodeError::Json)
}

fn decode_payload<T>(value: Value) -> Result<Arc<dyn Payload>, serde_json::Error>
where
    T: Payload + DeserializeOwned,
{
    let payload: T = serde_json::from_value(value)?;
    Ok(Arc::new(payload))
}

/// All possible error types returned by [`EventTypeRegistry::register`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    /// The discriminator name is empty.
    #[error("event type name must not be empty")]
    EmptyName,

    /// The discriminator name is already bound to another payload type.
    #[error("event type name '{0}' is already registered")]
    DuplicateName(String),

    /// The payload type is already bound to another discriminator name.
    #[error("payload type '{type_name}' is already registered as '{name}'")]
    DuplicateType {
        /// The Rust type name of the payload type.
        type_name: &'static str,
        /// The discriminator name the payload type is registered with.
        name: String,
    },
}

/// Bidirectional mapping between event type discriminators and payload types.
///
/// Events written to an Event Stream carry the discriminator of their payload type,
/// which is used to pick the type to instantiate when the event is read back.
/// Since old events must stay readable, discriminator names should never change
/// once events with them have been recorded.
///
/// ```
/// # use eventually_docstore::event::EventTypeRegistry;
/// # use serde::{Deserialize, Serialize};
/// #[derive(Debug, Serialize, Deserialize)]
/// #[serde(rename_all = "camelCase")]
/// struct OrderPlaced {
///     order_id: String,
/// }
///
/// let mut registry = EventTypeRegistry::new();
/// registry.register::<OrderPlaced>("order-placed").unwrap();
///
/// assert_eq!(Some("order-placed"), registry.name_for::<OrderPlaced>());
/// ```
#[derive(Clone, Default)]
pub struct EventTypeRegistry {
    by_name: HashMap<String, Registration>,
    names: HashMap<TypeId, String>,
}

impl Debug for EventTypeRegistry {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        let mut names: Vec<_> = self
            .by_name
            .iter()
            .map(|(name, registration)| (name.as_str(), registration.type_name))
            .collect();

        names.sort_unstable();

        f.debug_struct("EventTypeRegistry")
            .field("types", &names)
            .finish()
    }
}

impl EventTypeRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds the payload type `T` to the discriminator `name`.
    ///
    /// # Errors
    ///
    /// Fails if the name is empty, or if either the name or the type
    /// have already been registered.
    pub fn register<T>(&mut self, name: impl Into<String>) -> Result<&mut Self, RegistryError>
    where
        T: Payload + Serialize + DeserializeOwned,
    {
        let name = name.into();
        let type_id = TypeId::of::<T>();

        if name.is_empty() {
            return Err(RegistryError::EmptyName);
        }

        if self.by_name.contains_key(&name) {
            return Err(RegistryError::DuplicateName(name));
        }

        if let Some(existing) = self.names.get(&type_id) {
            return Err(RegistryError::DuplicateType {
                type_name: std::any::type_name::<T>(),
                name: existing.clone(),
            });
        }

        self.by_name.insert(
            name.clone(),
            Registration {
                type_name: std::any::type_name::<T>(),
                encode: encode_payload::<T>,
                decode: decode_payload::<T>,
            },
        );

        self.names.insert(type_id, name);

        Ok(self)
    }

    /// Same as [`EventTypeRegistry::register`], but consumes and returns the registry,
    /// to be used when building one in a single expression.
    ///
    /// # Errors
    ///
    /// See [`EventTypeRegistry::register`].
    pub fn with<T>(mut self, name: impl Into<String>) -> Result<Self, RegistryError>
    where
        T: Payload + Serialize + DeserializeOwned,
    {
        self.register::<T>(name)?;
        Ok(self)
    }

    /// Returns the discriminator name of the payload's concrete type, if registered.
    pub fn name_of(&self, payload: &dyn Payload) -> Option<&str> {
        self.names
            .get(&Any::type_id(payload.as_any()))
            .map(String::as_str)
    }

    /// Returns the discriminator name of the payload type `T`, if registered.
    pub fn name_for<T: Payload>(&self) -> Option<&str> {
        self.names.get(&TypeId::of::<T>()).map(String::as_str)
    }

    /// Returns `true` if a payload type is registered with the given discriminator.
    pub fn contains(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    /// Returns all the registered discriminator names, in no particular order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.by_name.keys().map(String::as_str)
    }

    /// Returns the number of registered payload types.
    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    /// Returns `true` if no payload type has been registered.
    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }

    /// Encodes the payload into its JSON value, returning it together with
    /// the discriminator name of its type.
    pub(crate) fn encode(&self, payload: &dyn Payload) -> Result<(&str, Value), EncodeError> {
        let name = self
            .name_of(payload)
            .ok_or(EncodeError::UnregisteredType {
                type_name: payload.type_name(),
            })?;

        let registration = self
            .by_name
            .get(name)
            .ok_or(EncodeError::UnregisteredType {
                type_name: payload.type_name(),
            })?;

        let value = (registration.encode)(payload)?;

        Ok((name, value))
    }

    /// Decodes a JSON value into the payload type registered for `name`.
    pub(crate) fn decode(&self, name: &str, value: Value) -> Result<Arc<dyn Payload>, DecodeError> {
        let registration = self
            .by_name
            .get(name)
            .ok_or_else(|| DecodeError::UnknownEventType(name.to_owned()))?;

        (registration.decode)(value).map_err(|source| DecodeError::Payload {
            event_type: name.to_owned(),
            source,
        })
    }
}
