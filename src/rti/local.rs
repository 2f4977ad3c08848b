//! # In-Process RTI
//!
//! A self-contained federation used to run several federates inside one
//! process, on separate threads. It implements enough of the RTI semantics for
//! the benchmark to be meaningful:
//!
//! - **Declaration**: subscribers discover every object of a subscribed class,
//!   including objects registered before they subscribed
//! - **Object and interaction delivery**: to every other interested federate,
//!   FIFO per receiving federate
//! - **Synchronization points**: announced to every joined member (late joiners
//!   included while the point is pending), synchronized when every member it
//!   was announced to has achieved it
//! - **Time management**: a requested time is granted once every time-managed
//!   member has requested at least that time
//!
//! Delivery follows the connection's [`CallbackMode`]: a dedicated thread per
//! federate in immediate mode, or only inside [`Rti::evoke_callbacks`] in
//! evoked mode.

use super::{
    AttributeHandle, AttributeMap, Callback, CallbackMode, FederateAmbassador,
    InteractionClassHandle, ObjectClassHandle, ObjectHandle, ParameterHandle, ParameterMap, Rti,
};
use crate::error::RtiError;
use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};
use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, info_span, warn};

type FederateId = u64;

/// Shared state of every federation execution in this process
#[derive(Clone, Default)]
pub struct LocalRtiHub {
    state: Arc<Mutex<HubState>>,
}

#[derive(Default)]
struct HubState {
    executions: HashMap<String, Execution>,
    names: NameTable,
}

/// Name to handle interning shared by every execution, so all federates
/// resolve the same names to the same handles.
#[derive(Default)]
struct NameTable {
    next: u64,
    object_classes: HashMap<String, u64>,
    attributes: HashMap<(u64, String), u64>,
    interaction_classes: HashMap<String, u64>,
    parameters: HashMap<(u64, String), u64>,
}

impl NameTable {
    fn intern<K: std::hash::Hash + Eq>(next: &mut u64, map: &mut HashMap<K, u64>, key: K) -> u64 {
        *map.entry(key).or_insert_with(|| {
            *next += 1;
            *next
        })
    }
}

#[derive(Default)]
struct Execution {
    next_federate: FederateId,
    next_object: u64,
    members: BTreeMap<FederateId, Member>,
    objects: BTreeMap<ObjectHandle, ObjectRecord>,
    object_names: HashSet<String>,
    sync_points: HashMap<String, PendingSyncPoint>,
}

struct Member {
    name: String,
    outbox: Sender<Callback>,
    subscribed_objects: HashSet<ObjectClassHandle>,
    subscribed_interactions: HashSet<InteractionClassHandle>,
    time: Option<TimeState>,
}

struct ObjectRecord {
    owner: FederateId,
    class: ObjectClassHandle,
    name: String,
    discovered_by: BTreeSet<FederateId>,
}

#[derive(Default)]
struct PendingSyncPoint {
    members: BTreeSet<FederateId>,
    achieved: BTreeSet<FederateId>,
}

#[derive(Clone, Copy)]
struct TimeState {
    current: f64,
    requested: Option<f64>,
}

impl Member {
    fn deliver(&self, callback: Callback) {
        // The receiver only disappears once the member has resigned.
        let _ = self.outbox.send(callback);
    }
}

impl Execution {
    fn join(&mut self, name: &str, outbox: Sender<Callback>) -> Result<FederateId, RtiError> {
        if self.members.values().any(|m| m.name == name) {
            return Err(RtiError::NameInUse(name.to_string()));
        }
        self.next_federate += 1;
        let id = self.next_federate;
        let member = Member {
            name: name.to_string(),
            outbox,
            subscribed_objects: HashSet::new(),
            subscribed_interactions: HashSet::new(),
            time: None,
        };

        for (label, point) in self.sync_points.iter_mut() {
            point.members.insert(id);
            member.deliver(Callback::SyncPointAnnounced {
                label: label.clone(),
            });
        }
        self.members.insert(id, member);
        Ok(id)
    }

    fn resign(&mut self, id: FederateId) {
        let owned: Vec<ObjectHandle> = self
            .objects
            .iter()
            .filter(|(_, record)| record.owner == id)
            .map(|(handle, _)| *handle)
            .collect();
        for object in owned {
            self.delete_object(object);
        }

        self.members.remove(&id);

        let labels: Vec<String> = self.sync_points.keys().cloned().collect();
        for label in labels {
            if let Some(point) = self.sync_points.get_mut(&label) {
                point.members.remove(&id);
                point.achieved.remove(&id);
            }
            self.check_synchronized(&label);
        }

        self.grant_time_advances();
    }

    fn subscribe_object_class(&mut self, id: FederateId, class: ObjectClassHandle) {
        let Some(member) = self.members.get_mut(&id) else {
            return;
        };
        if !member.subscribed_objects.insert(class) {
            return;
        }
        for (handle, record) in self.objects.iter_mut() {
            if record.class == class && record.owner != id && record.discovered_by.insert(id) {
                member.deliver(Callback::Discover {
                    object: *handle,
                    class,
                    name: record.name.clone(),
                });
            }
        }
    }

    fn register_object(
        &mut self,
        id: FederateId,
        class: ObjectClassHandle,
        name: &str,
    ) -> Result<ObjectHandle, RtiError> {
        if !self.object_names.insert(name.to_string()) {
            return Err(RtiError::NameInUse(name.to_string()));
        }
        self.next_object += 1;
        let handle = ObjectHandle(self.next_object);

        let mut discovered_by = BTreeSet::new();
        for (member_id, member) in &self.members {
            if *member_id != id && member.subscribed_objects.contains(&class) {
                member.deliver(Callback::Discover {
                    object: handle,
                    class,
                    name: name.to_string(),
                });
                discovered_by.insert(*member_id);
            }
        }

        self.objects.insert(
            handle,
            ObjectRecord {
                owner: id,
                class,
                name: name.to_string(),
                discovered_by,
            },
        );
        Ok(handle)
    }

    fn owned_record(&self, id: FederateId, object: ObjectHandle) -> Result<&ObjectRecord, RtiError> {
        let record = self
            .objects
            .get(&object)
            .ok_or(RtiError::UnknownObject(object.0))?;
        if record.owner != id {
            return Err(RtiError::NotOwner(object.0));
        }
        Ok(record)
    }

    fn update_attributes(
        &self,
        id: FederateId,
        object: ObjectHandle,
        attributes: AttributeMap,
    ) -> Result<(), RtiError> {
        let record = self.owned_record(id, object)?;
        for member_id in &record.discovered_by {
            if let Some(member) = self.members.get(member_id) {
                member.deliver(Callback::AttributeUpdate {
                    object,
                    attributes: attributes.clone(),
                });
            }
        }
        Ok(())
    }

    fn send_interaction(
        &self,
        id: FederateId,
        class: InteractionClassHandle,
        parameters: ParameterMap,
    ) {
        for (member_id, member) in &self.members {
            if *member_id != id && member.subscribed_interactions.contains(&class) {
                member.deliver(Callback::Interaction {
                    class,
                    parameters: parameters.clone(),
                });
            }
        }
    }

    fn delete_object(&mut self, object: ObjectHandle) {
        if let Some(record) = self.objects.remove(&object) {
            self.object_names.remove(&record.name);
            for member_id in &record.discovered_by {
                if let Some(member) = self.members.get(member_id) {
                    member.deliver(Callback::ObjectRemoved { object });
                }
            }
        }
    }

    fn register_sync_point(&mut self, label: &str) -> Result<(), RtiError> {
        if self.sync_points.contains_key(label) {
            return Err(RtiError::SyncPointExists(label.to_string()));
        }
        let point = PendingSyncPoint {
            members: self.members.keys().copied().collect(),
            achieved: BTreeSet::new(),
        };
        for member in self.members.values() {
            member.deliver(Callback::SyncPointAnnounced {
                label: label.to_string(),
            });
        }
        self.sync_points.insert(label.to_string(), point);
        Ok(())
    }

    fn achieve_sync_point(&mut self, id: FederateId, label: &str) -> Result<(), RtiError> {
        let point = self
            .sync_points
            .get_mut(label)
            .filter(|point| point.members.contains(&id))
            .ok_or_else(|| RtiError::UnknownSyncPoint(label.to_string()))?;
        point.achieved.insert(id);
        self.check_synchronized(label);
        Ok(())
    }

    fn check_synchronized(&mut self, label: &str) {
        let complete = self
            .sync_points
            .get(label)
            .map(|point| point.members.is_subset(&point.achieved))
            .unwrap_or(false);
        if !complete {
            return;
        }
        if let Some(point) = self.sync_points.remove(label) {
            debug!("Federation synchronized at '{}'", label);
            for member_id in &point.members {
                if let Some(member) = self.members.get(member_id) {
                    member.deliver(Callback::SyncPointAchieved {
                        label: label.to_string(),
                    });
                }
            }
        }
    }

    fn request_time_advance(&mut self, id: FederateId, time: f64) -> Result<(), RtiError> {
        let state = self
            .members
            .get_mut(&id)
            .and_then(|member| member.time.as_mut())
            .ok_or(RtiError::TimeManagementDisabled)?;
        state.requested = Some(time);
        self.grant_time_advances();
        Ok(())
    }

    fn grant_time_advances(&mut self) {
        let bound = self
            .members
            .values()
            .filter_map(|member| member.time)
            .map(|state| state.requested.unwrap_or(state.current))
            .fold(f64::INFINITY, f64::min);

        for member in self.members.values_mut() {
            let Some(state) = member.time.as_mut() else {
                continue;
            };
            if let Some(requested) = state.requested {
                if requested <= bound {
                    state.current = requested;
                    state.requested = None;
                    member.deliver(Callback::TimeAdvance { time: requested });
                }
            }
        }
    }
}

impl LocalRtiHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a new federate connection to this hub
    pub fn connect(&self, mode: CallbackMode) -> LocalRti {
        LocalRti {
            hub: self.clone(),
            mode,
            session: Mutex::new(None),
        }
    }

    /// Names of the federates currently joined to `federation`
    pub fn joined_federates(&self, federation: &str) -> Vec<String> {
        self.state
            .lock()
            .executions
            .get(federation)
            .map(|execution| execution.members.values().map(|m| m.name.clone()).collect())
            .unwrap_or_default()
    }
}

/// One federate's connection to a [`LocalRtiHub`]
pub struct LocalRti {
    hub: LocalRtiHub,
    mode: CallbackMode,
    session: Mutex<Option<Session>>,
}

struct Session {
    federation: String,
    federate: FederateId,
    inbox: Receiver<Callback>,
    ambassador: Arc<dyn FederateAmbassador>,
    delivery: Option<JoinHandle<()>>,
}

impl LocalRti {
    fn session_ids(&self) -> Result<(String, FederateId), RtiError> {
        self.session
            .lock()
            .as_ref()
            .map(|s| (s.federation.clone(), s.federate))
            .ok_or(RtiError::NotJoined)
    }

    /// Run `f` against this federate's execution with the hub locked
    fn with_execution<T>(
        &self,
        f: impl FnOnce(&mut Execution, FederateId) -> Result<T, RtiError>,
    ) -> Result<T, RtiError> {
        let (federation, federate) = self.session_ids()?;
        let mut state = self.hub.state.lock();
        let execution = state
            .executions
            .get_mut(&federation)
            .ok_or(RtiError::Disconnected)?;
        if !execution.members.contains_key(&federate) {
            return Err(RtiError::Disconnected);
        }
        f(execution, federate)
    }

    fn intern(&self, lookup: impl FnOnce(&mut NameTable) -> u64) -> u64 {
        let mut state = self.hub.state.lock();
        lookup(&mut state.names)
    }
}

impl Rti for LocalRti {
    fn create_federation(&self, federation: &str) -> Result<(), RtiError> {
        let mut state = self.hub.state.lock();
        if state.executions.contains_key(federation) {
            return Err(RtiError::FederationExists(federation.to_string()));
        }
        state
            .executions
            .insert(federation.to_string(), Execution::default());
        Ok(())
    }

    fn destroy_federation(&self, federation: &str) -> Result<(), RtiError> {
        let mut state = self.hub.state.lock();
        match state.executions.get(federation) {
            None => Err(RtiError::FederationNotFound(federation.to_string())),
            Some(execution) if !execution.members.is_empty() => {
                Err(RtiError::FederatesStillJoined(federation.to_string()))
            }
            Some(_) => {
                state.executions.remove(federation);
                Ok(())
            }
        }
    }

    fn join(
        &self,
        federate: &str,
        federation: &str,
        ambassador: Arc<dyn FederateAmbassador>,
    ) -> Result<(), RtiError> {
        let mut session = self.session.lock();
        if session.is_some() {
            return Err(RtiError::AlreadyJoined);
        }

        let (outbox, inbox) = channel::unbounded();
        let id = {
            let mut state = self.hub.state.lock();
            let execution = state
                .executions
                .get_mut(federation)
                .ok_or_else(|| RtiError::FederationNotFound(federation.to_string()))?;
            execution.join(federate, outbox)?
        };

        let delivery = match self.mode {
            CallbackMode::Immediate => {
                let inbox = inbox.clone();
                let ambassador = Arc::clone(&ambassador);
                let name = federate.to_string();
                let handle = std::thread::Builder::new()
                    .name(format!("rti-delivery-{}", federate))
                    .spawn(move || {
                        let _span = info_span!("federate", name = %name).entered();
                        for callback in inbox.iter() {
                            callback.dispatch(ambassador.as_ref());
                        }
                        debug!("Callback delivery stopped");
                    })
                    .map_err(|_| RtiError::Disconnected)?;
                Some(handle)
            }
            CallbackMode::Evoked => None,
        };

        debug!("Joined '{}' as federate {} ({})", federation, id, self.mode);
        *session = Some(Session {
            federation: federation.to_string(),
            federate: id,
            inbox,
            ambassador,
            delivery,
        });
        Ok(())
    }

    fn resign(&self) -> Result<(), RtiError> {
        let session = self.session.lock().take().ok_or(RtiError::NotJoined)?;
        {
            let mut state = self.hub.state.lock();
            if let Some(execution) = state.executions.get_mut(&session.federation) {
                execution.resign(session.federate);
            }
        }

        // Dropping the member closed the channel, so the delivery thread drains
        // what is left and exits.
        if let Some(handle) = session.delivery {
            if handle.join().is_err() {
                warn!("Callback delivery thread panicked");
            }
        }
        Ok(())
    }

    fn object_class_handle(&self, name: &str) -> Result<ObjectClassHandle, RtiError> {
        Ok(ObjectClassHandle(self.intern(|names| {
            NameTable::intern(&mut names.next, &mut names.object_classes, name.to_string())
        })))
    }

    fn attribute_handle(
        &self,
        class: ObjectClassHandle,
        name: &str,
    ) -> Result<AttributeHandle, RtiError> {
        Ok(AttributeHandle(self.intern(|names| {
            NameTable::intern(
                &mut names.next,
                &mut names.attributes,
                (class.0, name.to_string()),
            )
        })))
    }

    fn interaction_class_handle(&self, name: &str) -> Result<InteractionClassHandle, RtiError> {
        Ok(InteractionClassHandle(self.intern(|names| {
            NameTable::intern(
                &mut names.next,
                &mut names.interaction_classes,
                name.to_string(),
            )
        })))
    }

    fn parameter_handle(
        &self,
        class: InteractionClassHandle,
        name: &str,
    ) -> Result<ParameterHandle, RtiError> {
        Ok(ParameterHandle(self.intern(|names| {
            NameTable::intern(
                &mut names.next,
                &mut names.parameters,
                (class.0, name.to_string()),
            )
        })))
    }

    fn publish_object_class(
        &self,
        _class: ObjectClassHandle,
        _attributes: &[AttributeHandle],
    ) -> Result<(), RtiError> {
        self.with_execution(|_, _| Ok(()))
    }

    fn subscribe_object_class(
        &self,
        class: ObjectClassHandle,
        _attributes: &[AttributeHandle],
    ) -> Result<(), RtiError> {
        self.with_execution(|execution, id| {
            execution.subscribe_object_class(id, class);
            Ok(())
        })
    }

    fn publish_interaction_class(&self, _class: InteractionClassHandle) -> Result<(), RtiError> {
        self.with_execution(|_, _| Ok(()))
    }

    fn subscribe_interaction_class(&self, class: InteractionClassHandle) -> Result<(), RtiError> {
        self.with_execution(|execution, id| {
            if let Some(member) = execution.members.get_mut(&id) {
                member.subscribed_interactions.insert(class);
            }
            Ok(())
        })
    }

    fn register_object(
        &self,
        class: ObjectClassHandle,
        name: &str,
    ) -> Result<ObjectHandle, RtiError> {
        self.with_execution(|execution, id| execution.register_object(id, class, name))
    }

    fn update_attributes(
        &self,
        object: ObjectHandle,
        attributes: AttributeMap,
    ) -> Result<(), RtiError> {
        self.with_execution(|execution, id| execution.update_attributes(id, object, attributes))
    }

    fn send_interaction(
        &self,
        class: InteractionClassHandle,
        parameters: ParameterMap,
    ) -> Result<(), RtiError> {
        self.with_execution(|execution, id| {
            execution.send_interaction(id, class, parameters);
            Ok(())
        })
    }

    fn delete_object(&self, object: ObjectHandle) -> Result<(), RtiError> {
        self.with_execution(|execution, id| {
            execution.owned_record(id, object)?;
            execution.delete_object(object);
            Ok(())
        })
    }

    fn register_sync_point(&self, label: &str) -> Result<(), RtiError> {
        self.with_execution(|execution, _| execution.register_sync_point(label))
    }

    fn achieve_sync_point(&self, label: &str) -> Result<(), RtiError> {
        self.with_execution(|execution, id| execution.achieve_sync_point(id, label))
    }

    fn enable_time_management(&self) -> Result<(), RtiError> {
        self.with_execution(|execution, id| {
            if let Some(member) = execution.members.get_mut(&id) {
                member.time.get_or_insert(TimeState {
                    current: 0.0,
                    requested: None,
                });
            }
            Ok(())
        })
    }

    fn request_time_advance(&self, time: f64) -> Result<(), RtiError> {
        self.with_execution(|execution, id| execution.request_time_advance(id, time))
    }

    fn evoke_callbacks(&self, min: Duration, max: Duration) -> Result<bool, RtiError> {
        let (inbox, ambassador) = {
            let session = self.session.lock();
            let session = session.as_ref().ok_or(RtiError::NotJoined)?;
            (session.inbox.clone(), Arc::clone(&session.ambassador))
        };

        if self.mode == CallbackMode::Immediate {
            if !min.is_zero() {
                std::thread::sleep(min);
            }
            return Ok(false);
        }

        let max = max.max(min);
        let start = Instant::now();
        loop {
            let elapsed = start.elapsed();
            let next = if elapsed < min {
                inbox.recv_timeout(min - elapsed).map_err(|e| match e {
                    RecvTimeoutError::Timeout => None,
                    RecvTimeoutError::Disconnected => Some(RtiError::Disconnected),
                })
            } else {
                inbox.try_recv().map_err(|e| match e {
                    TryRecvError::Empty => None,
                    TryRecvError::Disconnected => Some(RtiError::Disconnected),
                })
            };

            match next {
                Ok(callback) => {
                    callback.dispatch(ambassador.as_ref());
                    if start.elapsed() >= max {
                        break;
                    }
                }
                Err(Some(e)) => return Err(e),
                Err(None) => {
                    if start.elapsed() >= min {
                        break;
                    }
                }
            }
        }
        Ok(!inbox.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Collector {
        seen: Mutex<Vec<Callback>>,
    }

    impl FederateAmbassador for Collector {
        fn on_discover(&self, object: ObjectHandle, class: ObjectClassHandle, name: &str) {
            self.seen.lock().push(Callback::Discover {
                object,
                class,
                name: name.to_string(),
            });
        }
        fn on_attribute_update(&self, object: ObjectHandle, attributes: &AttributeMap) {
            self.seen.lock().push(Callback::AttributeUpdate {
                object,
                attributes: attributes.clone(),
            });
        }
        fn on_interaction(&self, class: InteractionClassHandle, parameters: &ParameterMap) {
            self.seen.lock().push(Callback::Interaction {
                class,
                parameters: parameters.clone(),
            });
        }
        fn on_object_removed(&self, object: ObjectHandle) {
            self.seen.lock().push(Callback::ObjectRemoved { object });
        }
        fn on_sync_point_announced(&self, label: &str) {
            self.seen.lock().push(Callback::SyncPointAnnounced {
                label: label.to_string(),
            });
        }
        fn on_sync_point_achieved(&self, label: &str) {
            self.seen.lock().push(Callback::SyncPointAchieved {
                label: label.to_string(),
            });
        }
        fn on_time_advance(&self, time: f64) {
            self.seen.lock().push(Callback::TimeAdvance { time });
        }
    }

    fn evoked_pair(hub: &LocalRtiHub) -> (LocalRti, Arc<Collector>, LocalRti, Arc<Collector>) {
        let a = hub.connect(CallbackMode::Evoked);
        let b = hub.connect(CallbackMode::Evoked);
        let ca = Arc::new(Collector::default());
        let cb = Arc::new(Collector::default());
        a.create_federation("fed").unwrap();
        a.join("a", "fed", ca.clone()).unwrap();
        b.join("b", "fed", cb.clone()).unwrap();
        (a, ca, b, cb)
    }

    fn pump(rti: &LocalRti) {
        rti.evoke_callbacks(Duration::ZERO, Duration::from_millis(50))
            .unwrap();
        while rti
            .evoke_callbacks(Duration::ZERO, Duration::from_millis(50))
            .unwrap()
        {}
    }

    #[test]
    fn test_create_twice_reports_existing_federation() {
        let hub = LocalRtiHub::new();
        let rti = hub.connect(CallbackMode::Evoked);
        rti.create_federation("fed").unwrap();
        assert_eq!(
            rti.create_federation("fed"),
            Err(RtiError::FederationExists("fed".to_string()))
        );
    }

    #[test]
    fn test_destroy_refused_while_members_joined() {
        let hub = LocalRtiHub::new();
        let (a, _, b, _) = evoked_pair(&hub);
        assert_eq!(
            a.destroy_federation("fed"),
            Err(RtiError::FederatesStillJoined("fed".to_string()))
        );
        a.resign().unwrap();
        b.resign().unwrap();
        a.destroy_federation("fed").unwrap();
        assert!(hub.joined_federates("fed").is_empty());
    }

    #[test]
    fn test_duplicate_federate_name_rejected() {
        let hub = LocalRtiHub::new();
        let (_a, _, _b, _) = evoked_pair(&hub);
        let c = hub.connect(CallbackMode::Evoked);
        assert_eq!(
            c.join("a", "fed", Arc::new(Collector::default())),
            Err(RtiError::NameInUse("a".to_string()))
        );
    }

    #[test]
    fn test_handles_agree_across_connections() {
        let hub = LocalRtiHub::new();
        let a = hub.connect(CallbackMode::Evoked);
        let b = hub.connect(CallbackMode::Immediate);
        let class_a = a.object_class_handle("TestObject").unwrap();
        let class_b = b.object_class_handle("TestObject").unwrap();
        assert_eq!(class_a, class_b);
        assert_ne!(
            a.attribute_handle(class_a, "Creator").unwrap(),
            a.attribute_handle(class_a, "Payload").unwrap()
        );
    }

    #[test]
    fn test_late_subscriber_discovers_existing_objects() {
        let hub = LocalRtiHub::new();
        let (a, _, b, cb) = evoked_pair(&hub);
        let class = a.object_class_handle("TestObject").unwrap();

        let object = a.register_object(class, "obj-1").unwrap();
        b.subscribe_object_class(class, &[]).unwrap();
        pump(&b);

        assert_eq!(
            *cb.seen.lock(),
            vec![Callback::Discover {
                object,
                class,
                name: "obj-1".to_string()
            }]
        );
    }

    #[test]
    fn test_updates_reach_discoverers_only_and_not_owner() {
        let hub = LocalRtiHub::new();
        let (a, ca, b, cb) = evoked_pair(&hub);
        let class = a.object_class_handle("TestObject").unwrap();
        let attr = a.attribute_handle(class, "Payload").unwrap();
        a.subscribe_object_class(class, &[attr]).unwrap();
        b.subscribe_object_class(class, &[attr]).unwrap();

        let object = a.register_object(class, "obj-1").unwrap();
        a.update_attributes(object, AttributeMap::from([(attr, vec![1, 2])]))
            .unwrap();
        pump(&a);
        pump(&b);

        assert!(ca.seen.lock().is_empty());
        assert_eq!(cb.seen.lock().len(), 2);
        assert_eq!(
            b.update_attributes(object, AttributeMap::new()),
            Err(RtiError::NotOwner(object.0))
        );
    }

    #[test]
    fn test_sync_point_requires_every_member() {
        let hub = LocalRtiHub::new();
        let (a, ca, b, cb) = evoked_pair(&hub);

        a.register_sync_point("start").unwrap();
        assert_eq!(
            b.register_sync_point("start"),
            Err(RtiError::SyncPointExists("start".to_string()))
        );

        a.achieve_sync_point("start").unwrap();
        pump(&a);
        assert!(!ca
            .seen
            .lock()
            .contains(&Callback::SyncPointAchieved {
                label: "start".to_string()
            }));

        b.achieve_sync_point("start").unwrap();
        pump(&a);
        pump(&b);
        for collector in [&ca, &cb] {
            assert!(collector
                .seen
                .lock()
                .contains(&Callback::SyncPointAchieved {
                    label: "start".to_string()
                }));
        }
    }

    #[test]
    fn test_resigned_member_no_longer_blocks_sync_point() {
        let hub = LocalRtiHub::new();
        let (a, ca, b, _) = evoked_pair(&hub);
        a.register_sync_point("finish").unwrap();
        a.achieve_sync_point("finish").unwrap();
        b.resign().unwrap();
        pump(&a);
        assert!(ca
            .seen
            .lock()
            .contains(&Callback::SyncPointAchieved {
                label: "finish".to_string()
            }));
    }

    #[test]
    fn test_achieving_unannounced_point_is_rejected() {
        let hub = LocalRtiHub::new();
        let (a, _, _b, _) = evoked_pair(&hub);
        assert_eq!(
            a.achieve_sync_point("nope"),
            Err(RtiError::UnknownSyncPoint("nope".to_string()))
        );
    }

    #[test]
    fn test_time_advance_waits_for_slowest_member() {
        let hub = LocalRtiHub::new();
        let (a, ca, b, cb) = evoked_pair(&hub);
        a.enable_time_management().unwrap();
        b.enable_time_management().unwrap();

        a.request_time_advance(1.0).unwrap();
        pump(&a);
        assert!(ca.seen.lock().is_empty());

        b.request_time_advance(1.0).unwrap();
        pump(&a);
        pump(&b);
        assert_eq!(*ca.seen.lock(), vec![Callback::TimeAdvance { time: 1.0 }]);
        assert_eq!(*cb.seen.lock(), vec![Callback::TimeAdvance { time: 1.0 }]);
    }

    #[test]
    fn test_time_advance_requires_time_management() {
        let hub = LocalRtiHub::new();
        let (a, _, _b, _) = evoked_pair(&hub);
        assert_eq!(
            a.request_time_advance(1.0),
            Err(RtiError::TimeManagementDisabled)
        );
    }

    #[test]
    fn test_resign_removes_owned_objects() {
        let hub = LocalRtiHub::new();
        let (a, _, b, cb) = evoked_pair(&hub);
        let class = a.object_class_handle("TestObject").unwrap();
        b.subscribe_object_class(class, &[]).unwrap();
        let object = a.register_object(class, "obj-1").unwrap();
        a.resign().unwrap();
        pump(&b);
        assert_eq!(
            cb.seen.lock().last(),
            Some(&Callback::ObjectRemoved { object })
        );
    }

    #[test]
    fn test_immediate_mode_delivers_without_evoking() {
        let hub = LocalRtiHub::new();
        let a = hub.connect(CallbackMode::Immediate);
        let b = hub.connect(CallbackMode::Immediate);
        let cb = Arc::new(Collector::default());
        a.create_federation("fed").unwrap();
        a.join("a", "fed", Arc::new(Collector::default())).unwrap();
        b.join("b", "fed", cb.clone()).unwrap();

        let class = a.interaction_class_handle("TestInteraction").unwrap();
        b.subscribe_interaction_class(class).unwrap();
        a.send_interaction(class, ParameterMap::new()).unwrap();

        let start = Instant::now();
        while cb.seen.lock().is_empty() && start.elapsed() < Duration::from_secs(5) {
            std::thread::sleep(Duration::from_millis(1));
        }
        assert_eq!(cb.seen.lock().len(), 1);
        a.resign().unwrap();
        b.resign().unwrap();
    }
}
