//! # Middleware Boundary
//!
//! The harness treats the RTI as an opaque event source. This module defines
//! the two halves of that contract:
//!
//! - [`Rti`]: the calls the harness makes into the middleware
//! - [`FederateAmbassador`]: the notifications the middleware delivers back
//!
//! [`Callback`] is the closed set of notifications as a value, which lets an
//! implementation queue notifications and dispatch them later (evoked mode) or
//! on a delivery thread (immediate mode) without duplicating the dispatch
//! logic.

use crate::error::RtiError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

pub mod local;

pub use local::{LocalRti, LocalRtiHub};

macro_rules! handle_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(pub u64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

handle_type!(
    /// Identifier of a registered object instance, issued by the RTI
    ObjectHandle
);
handle_type!(
    /// Identifier of an object class
    ObjectClassHandle
);
handle_type!(
    /// Identifier of an attribute within an object class
    AttributeHandle
);
handle_type!(
    /// Identifier of an interaction class
    InteractionClassHandle
);
handle_type!(
    /// Identifier of a parameter within an interaction class
    ParameterHandle
);

/// Attribute values carried by a registration update or reflection
pub type AttributeMap = HashMap<AttributeHandle, Vec<u8>>;

/// Parameter values carried by an interaction
pub type ParameterMap = HashMap<ParameterHandle, Vec<u8>>;

/// How notifications reach the federate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CallbackMode {
    /// The RTI delivers notifications on its own thread as they arrive
    Immediate,
    /// Notifications are held until the federate calls [`Rti::evoke_callbacks`]
    Evoked,
}

impl fmt::Display for CallbackMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallbackMode::Immediate => write!(f, "immediate"),
            CallbackMode::Evoked => write!(f, "evoked"),
        }
    }
}

/// Calls the harness makes into the middleware
///
/// Every method takes `&self`: the driver thread and the notification path
/// (a ping being echoed from inside a callback, for example) may use the same
/// connection concurrently.
pub trait Rti: Send + Sync {
    /// Create a federation execution
    fn create_federation(&self, federation: &str) -> Result<(), RtiError>;

    /// Destroy a federation execution that has no joined federates
    fn destroy_federation(&self, federation: &str) -> Result<(), RtiError>;

    /// Join a federation execution under a unique federate name
    fn join(
        &self,
        federate: &str,
        federation: &str,
        ambassador: Arc<dyn FederateAmbassador>,
    ) -> Result<(), RtiError>;

    /// Leave the federation execution, deleting every object this federate owns
    fn resign(&self) -> Result<(), RtiError>;

    fn object_class_handle(&self, name: &str) -> Result<ObjectClassHandle, RtiError>;

    fn attribute_handle(
        &self,
        class: ObjectClassHandle,
        name: &str,
    ) -> Result<AttributeHandle, RtiError>;

    fn interaction_class_handle(&self, name: &str) -> Result<InteractionClassHandle, RtiError>;

    fn parameter_handle(
        &self,
        class: InteractionClassHandle,
        name: &str,
    ) -> Result<ParameterHandle, RtiError>;

    fn publish_object_class(
        &self,
        class: ObjectClassHandle,
        attributes: &[AttributeHandle],
    ) -> Result<(), RtiError>;

    fn subscribe_object_class(
        &self,
        class: ObjectClassHandle,
        attributes: &[AttributeHandle],
    ) -> Result<(), RtiError>;

    fn publish_interaction_class(&self, class: InteractionClassHandle) -> Result<(), RtiError>;

    fn subscribe_interaction_class(&self, class: InteractionClassHandle) -> Result<(), RtiError>;

    /// Register a new object instance of a published class
    fn register_object(
        &self,
        class: ObjectClassHandle,
        name: &str,
    ) -> Result<ObjectHandle, RtiError>;

    fn update_attributes(
        &self,
        object: ObjectHandle,
        attributes: AttributeMap,
    ) -> Result<(), RtiError>;

    fn send_interaction(
        &self,
        class: InteractionClassHandle,
        parameters: ParameterMap,
    ) -> Result<(), RtiError>;

    fn delete_object(&self, object: ObjectHandle) -> Result<(), RtiError>;

    /// Register a federation-wide synchronization point
    fn register_sync_point(&self, label: &str) -> Result<(), RtiError>;

    /// Tell the RTI this federate has reached an announced synchronization point
    fn achieve_sync_point(&self, label: &str) -> Result<(), RtiError>;

    /// Become time-regulating and time-constrained
    fn enable_time_management(&self) -> Result<(), RtiError>;

    fn request_time_advance(&self, time: f64) -> Result<(), RtiError>;

    /// Deliver queued notifications for at least `min` and at most `max`
    ///
    /// Returns `true` if notifications are still pending when it returns. Has
    /// no effect in [`CallbackMode::Immediate`] beyond waiting `min`.
    fn evoke_callbacks(&self, min: Duration, max: Duration) -> Result<bool, RtiError>;
}

/// Notifications the middleware delivers to a joined federate
///
/// Implementations must tolerate being called from a thread other than the
/// one driving the test.
pub trait FederateAmbassador: Send + Sync {
    fn on_discover(&self, object: ObjectHandle, class: ObjectClassHandle, name: &str);

    fn on_attribute_update(&self, object: ObjectHandle, attributes: &AttributeMap);

    fn on_interaction(&self, class: InteractionClassHandle, parameters: &ParameterMap);

    fn on_object_removed(&self, object: ObjectHandle);

    fn on_sync_point_announced(&self, label: &str);

    fn on_sync_point_achieved(&self, label: &str);

    fn on_time_advance(&self, time: f64);
}

/// One queued notification
#[derive(Debug, Clone, PartialEq)]
pub enum Callback {
    Discover {
        object: ObjectHandle,
        class: ObjectClassHandle,
        name: String,
    },
    AttributeUpdate {
        object: ObjectHandle,
        attributes: AttributeMap,
    },
    Interaction {
        class: InteractionClassHandle,
        parameters: ParameterMap,
    },
    ObjectRemoved {
        object: ObjectHandle,
    },
    SyncPointAnnounced {
        label: String,
    },
    SyncPointAchieved {
        label: String,
    },
    TimeAdvance {
        time: f64,
    },
}

impl Callback {
    /// Hand this notification to the matching ambassador method
    pub fn dispatch(&self, ambassador: &dyn FederateAmbassador) {
        match self {
            Callback::Discover {
                object,
                class,
                name,
            } => ambassador.on_discover(*object, *class, name),
            Callback::AttributeUpdate { object, attributes } => {
                ambassador.on_attribute_update(*object, attributes)
            }
            Callback::Interaction { class, parameters } => {
                ambassador.on_interaction(*class, parameters)
            }
            Callback::ObjectRemoved { object } => ambassador.on_object_removed(*object),
            Callback::SyncPointAnnounced { label } => ambassador.on_sync_point_announced(label),
            Callback::SyncPointAchieved { label } => ambassador.on_sync_point_achieved(label),
            Callback::TimeAdvance { time } => ambassador.on_time_advance(*time),
        }
    }
}
