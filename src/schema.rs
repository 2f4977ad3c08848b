//! # Object Model Schema
//!
//! Class, attribute and parameter handles used by the benchmark, resolved once
//! right after joining and then passed by reference to every component that
//! needs them.
//!
//! | Class                     | Fields                        |
//! |---------------------------|-------------------------------|
//! | `PerfFederate` (object)   | `FederateName`                |
//! | `TestObject` (object)     | `Creator`, `Payload`          |
//! | `TestInteraction`         | `Sender`, `Payload`           |
//! | `Ping`, `PingAck`         | `Serial`, `Sender`, `Payload` |
//!
//! Names travel as UTF-8 bytes and serials as big-endian `u64`.

use crate::error::RtiError;
use crate::rti::{
    AttributeHandle, InteractionClassHandle, ObjectClassHandle, ParameterHandle, ParameterMap, Rti,
};

pub const FEDERATE_CLASS: &str = "HLAobjectRoot.PerfFederate";
pub const TEST_OBJECT_CLASS: &str = "HLAobjectRoot.TestObject";
pub const TEST_INTERACTION_CLASS: &str = "HLAinteractionRoot.TestInteraction";
pub const PING_CLASS: &str = "HLAinteractionRoot.Ping";
pub const PING_ACK_CLASS: &str = "HLAinteractionRoot.PingAck";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FederateClass {
    pub class: ObjectClassHandle,
    pub federate_name: AttributeHandle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TestObjectClass {
    pub class: ObjectClassHandle,
    pub creator: AttributeHandle,
    pub payload: AttributeHandle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TestInteractionClass {
    pub class: InteractionClassHandle,
    pub sender: ParameterHandle,
    pub payload: ParameterHandle,
}

/// Parameters shared by `Ping` and `PingAck`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PingClass {
    pub class: InteractionClassHandle,
    pub serial: ParameterHandle,
    pub sender: ParameterHandle,
    pub payload: ParameterHandle,
}

/// Every handle the benchmark uses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Schema {
    pub federate: FederateClass,
    pub test_object: TestObjectClass,
    pub test_interaction: TestInteractionClass,
    pub ping: PingClass,
    pub ping_ack: PingClass,
}

impl Schema {
    /// Resolve all handles through the middleware
    pub fn resolve(rti: &dyn Rti) -> Result<Self, RtiError> {
        let federate_class = rti.object_class_handle(FEDERATE_CLASS)?;
        let object_class = rti.object_class_handle(TEST_OBJECT_CLASS)?;
        let interaction_class = rti.interaction_class_handle(TEST_INTERACTION_CLASS)?;

        Ok(Self {
            federate: FederateClass {
                class: federate_class,
                federate_name: rti.attribute_handle(federate_class, "FederateName")?,
            },
            test_object: TestObjectClass {
                class: object_class,
                creator: rti.attribute_handle(object_class, "Creator")?,
                payload: rti.attribute_handle(object_class, "Payload")?,
            },
            test_interaction: TestInteractionClass {
                class: interaction_class,
                sender: rti.parameter_handle(interaction_class, "Sender")?,
                payload: rti.parameter_handle(interaction_class, "Payload")?,
            },
            ping: PingClass::resolve(rti, PING_CLASS)?,
            ping_ack: PingClass::resolve(rti, PING_ACK_CLASS)?,
        })
    }

    /// Declare publication and subscription of every class the benchmark uses
    pub fn publish_and_subscribe(&self, rti: &dyn Rti) -> Result<(), RtiError> {
        let federate_attrs = [self.federate.federate_name];
        rti.publish_object_class(self.federate.class, &federate_attrs)?;
        rti.subscribe_object_class(self.federate.class, &federate_attrs)?;

        let object_attrs = [self.test_object.creator, self.test_object.payload];
        rti.publish_object_class(self.test_object.class, &object_attrs)?;
        rti.subscribe_object_class(self.test_object.class, &object_attrs)?;

        for class in [
            self.test_interaction.class,
            self.ping.class,
            self.ping_ack.class,
        ] {
            rti.publish_interaction_class(class)?;
            rti.subscribe_interaction_class(class)?;
        }
        Ok(())
    }
}

impl PingClass {
    fn resolve(rti: &dyn Rti, name: &str) -> Result<Self, RtiError> {
        let class = rti.interaction_class_handle(name)?;
        Ok(Self {
            class,
            serial: rti.parameter_handle(class, "Serial")?,
            sender: rti.parameter_handle(class, "Sender")?,
            payload: rti.parameter_handle(class, "Payload")?,
        })
    }

    /// Build the parameter map for one ping or acknowledgement
    pub fn encode(&self, serial: u64, sender: &str, payload: Vec<u8>) -> ParameterMap {
        ParameterMap::from([
            (self.serial, encode_serial(serial)),
            (self.sender, encode_name(sender)),
            (self.payload, payload),
        ])
    }

    /// Extract `(serial, sender)` from a received ping or acknowledgement
    pub fn decode(&self, parameters: &ParameterMap) -> Option<(u64, String)> {
        let serial = parameters.get(&self.serial).and_then(|b| decode_serial(b))?;
        let sender = parameters.get(&self.sender).and_then(|b| decode_name(b))?;
        Some((serial, sender))
    }
}

pub fn encode_name(name: &str) -> Vec<u8> {
    name.as_bytes().to_vec()
}

pub fn decode_name(bytes: &[u8]) -> Option<String> {
    String::from_utf8(bytes.to_vec()).ok()
}

pub fn encode_serial(serial: u64) -> Vec<u8> {
    serial.to_be_bytes().to_vec()
}

pub fn decode_serial(bytes: &[u8]) -> Option<u64> {
    let raw: [u8; 8] = bytes.try_into().ok()?;
    Some(u64::from_be_bytes(raw))
}
