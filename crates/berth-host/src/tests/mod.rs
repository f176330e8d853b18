//! Crate-level test support and behaviour tests.
//!
//! The fakes here stand in for a guest and for the host environment's
//! collaborators. [`FakeGuest`] speaks the wire protocol through the same
//! [`InboundEntryPoint`] a real guest receives; [`RecordingLoader`]
//! "executes" code by publishing a scripted guest into the shared
//! [`InterfaceRegistry`].

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet};
use std::rc::{Rc, Weak};

use async_trait::async_trait;
use futures::executor::LocalPool;
use futures::task::LocalSpawnExt;
use serde_json::{Value, json};

use crate::dispatcher::GuestHandle;
use crate::error::{GuestCallError, HostError, LoadError};
use crate::host::{GuestHost, HostServices};
use crate::loader::{
    CodeHandle, CodeLoader, DescriptorFetcher, GuestInterface, InterfaceKey, InterfaceRegistry,
    ModuleDescriptor,
};
use crate::protocol::{GET_APP_HANDLER_VERSION, GET_APP_PAYLOAD_VERSION, Request};
use crate::quirks::QuirksTable;
use crate::router::InboundEntryPoint;
use crate::sink::{ObservabilitySink, RecordingSink};
use crate::version::Version;

mod behaviour;

/// Scripted guest behaviour.
#[derive(Debug, Clone)]
pub(crate) struct GuestScript {
    /// Answer to `GET_APP_HANDLER_VERSION`; `None` rejects it like a
    /// legacy guest.
    pub protocol_version: Option<u32>,
    /// Answer to `GET_APP_PAYLOAD_VERSION`.
    pub payload_versions: HashMap<String, u32>,
    /// Answer callbacks inside the call instead of waiting for `flush`.
    pub answer_immediately: bool,
    /// Send `APP_READY` from inside the mount function.
    pub ready_on_mount: bool,
    /// Fail the mount function.
    pub refuse_mount: bool,
    /// Request types the guest rejects synchronously.
    pub rejected: HashSet<String>,
}

impl GuestScript {
    /// A current guest that negotiates and signals readiness on mount.
    pub(crate) fn modern() -> Self {
        Self {
            protocol_version: Some(2),
            payload_versions: HashMap::from([(String::from("SHOW_RESULTS"), 2)]),
            answer_immediately: true,
            ready_on_mount: true,
            refuse_mount: false,
            rejected: HashSet::new(),
        }
    }

    /// A legacy guest: no negotiation handler and no readiness signal.
    pub(crate) fn legacy() -> Self {
        Self {
            protocol_version: None,
            payload_versions: HashMap::new(),
            answer_immediately: true,
            ready_on_mount: false,
            refuse_mount: false,
            rejected: HashSet::new(),
        }
    }

    pub(crate) fn deferred(mut self) -> Self {
        self.answer_immediately = false;
        self
    }

    pub(crate) fn silent(mut self) -> Self {
        self.ready_on_mount = false;
        self
    }

    pub(crate) fn refusing_mount(mut self) -> Self {
        self.refuse_mount = true;
        self
    }

    pub(crate) fn rejecting(mut self, kind: &str) -> Self {
        self.rejected.insert(kind.to_owned());
        self
    }
}

/// In-memory guest implementing both sides of the protocol.
pub(crate) struct FakeGuest {
    me: Weak<Self>,
    script: GuestScript,
    inbound: RefCell<Option<InboundEntryPoint>>,
    received: RefCell<Vec<Request>>,
    deferred: RefCell<Vec<Request>>,
    mounts: Cell<usize>,
}

impl FakeGuest {
    pub(crate) fn new(script: GuestScript) -> Rc<Self> {
        Rc::new_cyclic(|me| Self {
            me: me.clone(),
            script,
            inbound: RefCell::new(None),
            received: RefCell::new(Vec::new()),
            deferred: RefCell::new(Vec::new()),
            mounts: Cell::new(0),
        })
    }

    pub(crate) fn interface(this: &Rc<Self>) -> Rc<dyn GuestInterface> {
        Rc::clone(this) as Rc<dyn GuestInterface>
    }

    pub(crate) fn handle(this: &Rc<Self>) -> Rc<dyn GuestHandle> {
        Rc::clone(this) as Rc<dyn GuestHandle>
    }

    /// Gives the guest an inbound entry point without mounting it.
    pub(crate) fn connect(&self, inbound: InboundEntryPoint) {
        *self.inbound.borrow_mut() = Some(inbound);
    }

    pub(crate) fn mount_count(&self) -> usize {
        self.mounts.get()
    }

    pub(crate) fn received_kinds(&self) -> Vec<String> {
        self.received
            .borrow()
            .iter()
            .map(|request| request.kind().to_owned())
            .collect()
    }

    pub(crate) fn received(&self) -> Vec<Request> {
        self.received.borrow().clone()
    }

    pub(crate) fn pending_answers(&self) -> usize {
        self.deferred.borrow().len()
    }

    /// Sends every answer held back by a deferred script.
    pub(crate) fn flush(&self) {
        let answers = std::mem::take(&mut *self.deferred.borrow_mut());
        for answer in &answers {
            self.send(answer);
        }
    }

    pub(crate) fn signal_ready(&self) {
        self.send(&Request::ready());
    }

    pub(crate) fn send(&self, request: &Request) {
        let inbound = self.inbound.borrow().clone();
        if let Some(entry_point) = inbound {
            entry_point.send(request);
        }
    }

    fn answer_for(&self, request: &Request) -> Result<Option<Value>, GuestCallError> {
        if self.script.rejected.contains(request.kind()) {
            return Err(GuestCallError::new(request.kind(), "no handler"));
        }
        match request.kind() {
            GET_APP_HANDLER_VERSION => self
                .script
                .protocol_version
                .map(|version| Some(json!(version)))
                .ok_or_else(|| GuestCallError::new(request.kind(), "no handler")),
            GET_APP_PAYLOAD_VERSION => Ok(Some(json!(self.script.payload_versions))),
            kind => Ok(Some(json!({ "echo": kind }))),
        }
    }
}

impl GuestHandle for FakeGuest {
    fn call(&self, request: &Request) -> Result<(), GuestCallError> {
        self.received.borrow_mut().push(request.clone());
        let answer = self.answer_for(request)?;
        let (Some(id), Some(value)) = (request.callback_id(), answer) else {
            return Ok(());
        };
        let reply = Request::callback_result(id, value);
        if self.script.answer_immediately {
            self.send(&reply);
        } else {
            self.deferred.borrow_mut().push(reply);
        }
        Ok(())
    }
}

impl GuestInterface for FakeGuest {
    fn mount(&self, inbound: InboundEntryPoint) -> Result<Rc<dyn GuestHandle>, GuestCallError> {
        self.mounts.set(self.mounts.get() + 1);
        if self.script.refuse_mount {
            return Err(GuestCallError::new("mount", "guest refused to mount"));
        }
        self.connect(inbound);
        if self.script.ready_on_mount {
            self.signal_ready();
        }
        let me = self.me.upgrade().expect("fake guest is alive while mounted");
        Ok(me as Rc<dyn GuestHandle>)
    }
}

/// Descriptor source backed by a map.
#[derive(Default)]
pub(crate) struct StaticFetcher {
    descriptors: RefCell<HashMap<(String, String), ModuleDescriptor>>,
    fetches: Cell<usize>,
}

impl StaticFetcher {
    pub(crate) fn insert(&self, guest_id: &str, version: &str, descriptor: ModuleDescriptor) {
        self.descriptors
            .borrow_mut()
            .insert((guest_id.to_owned(), version.to_owned()), descriptor);
    }

    pub(crate) fn fetch_count(&self) -> usize {
        self.fetches.get()
    }
}

#[async_trait(?Send)]
impl DescriptorFetcher for StaticFetcher {
    async fn fetch_module_descriptor(
        &self,
        guest_id: &str,
        version: &str,
    ) -> Result<ModuleDescriptor, LoadError> {
        self.fetches.set(self.fetches.get() + 1);
        self.descriptors
            .borrow()
            .get(&(guest_id.to_owned(), version.to_owned()))
            .cloned()
            .ok_or_else(|| LoadError::Transport {
                url: format!("descriptor://{guest_id}/{version}"),
                message: String::from("not found"),
            })
    }
}

/// Code loader that records loads and publishes scripted guests.
pub(crate) struct RecordingLoader {
    interfaces: Rc<InterfaceRegistry>,
    publishers: RefCell<HashMap<String, (InterfaceKey, Rc<FakeGuest>)>>,
    failing: RefCell<HashSet<String>>,
    loads: RefCell<Vec<(String, String)>>,
    removed: RefCell<Vec<CodeHandle>>,
    next_id: Cell<usize>,
}

impl RecordingLoader {
    pub(crate) fn new(interfaces: Rc<InterfaceRegistry>) -> Self {
        Self {
            interfaces,
            publishers: RefCell::new(HashMap::new()),
            failing: RefCell::new(HashSet::new()),
            loads: RefCell::new(Vec::new()),
            removed: RefCell::new(Vec::new()),
            next_id: Cell::new(0),
        }
    }

    /// Makes loading `url` publish `guest` under `key`.
    pub(crate) fn publish_on_load(&self, url: &str, key: InterfaceKey, guest: Rc<FakeGuest>) {
        self.publishers
            .borrow_mut()
            .insert(url.to_owned(), (key, guest));
    }

    pub(crate) fn fail_on(&self, url: &str) {
        self.failing.borrow_mut().insert(url.to_owned());
    }

    pub(crate) fn heal(&self, url: &str) {
        self.failing.borrow_mut().remove(url);
    }

    pub(crate) fn loads(&self) -> Vec<(String, String)> {
        self.loads.borrow().clone()
    }

    pub(crate) fn loaded_urls(&self) -> Vec<String> {
        self.loads.borrow().iter().map(|(url, _)| url.clone()).collect()
    }

    pub(crate) fn removed(&self) -> Vec<CodeHandle> {
        self.removed.borrow().clone()
    }
}

#[async_trait(?Send)]
impl CodeLoader for RecordingLoader {
    async fn load_code_resource(&self, url: &str, tag: &str) -> Result<CodeHandle, LoadError> {
        if self.failing.borrow().contains(url) {
            return Err(LoadError::Execution {
                url: url.to_owned(),
                message: String::from("script error"),
            });
        }
        self.loads
            .borrow_mut()
            .push((url.to_owned(), tag.to_owned()));
        let published = self.publishers.borrow().get(url).cloned();
        if let Some((key, guest)) = published {
            self.interfaces.publish(key, FakeGuest::interface(&guest));
        }
        let id = self.next_id.get() + 1;
        self.next_id.set(id);
        Ok(CodeHandle::new(format!("code-{id}"), url))
    }

    fn remove_code_resource(&self, handle: &CodeHandle) {
        self.removed.borrow_mut().push(handle.clone());
    }
}

pub(crate) const CDN: &str = "https://cdn.example.com";

pub(crate) fn v(text: &str) -> Version {
    Version::parse(text).expect("valid version")
}

pub(crate) fn base_url(guest_id: &str, version: &str) -> String {
    format!("{CDN}/{guest_id}/{version}/")
}

/// A host session wired to fakes, driven by a [`LocalPool`].
pub(crate) struct Harness {
    pub pool: LocalPool,
    pub sink: Rc<RecordingSink>,
    pub fetcher: Rc<StaticFetcher>,
    pub loader: Rc<RecordingLoader>,
    pub interfaces: Rc<InterfaceRegistry>,
    pub host: GuestHost,
    guests: HashMap<(String, String), Rc<FakeGuest>>,
}

impl Harness {
    pub(crate) fn new() -> Self {
        Self::with_quirks(QuirksTable::default())
    }

    pub(crate) fn with_quirks(quirks: QuirksTable) -> Self {
        let pool = LocalPool::new();
        let sink = Rc::new(RecordingSink::new());
        let fetcher = Rc::new(StaticFetcher::default());
        let interfaces = Rc::new(InterfaceRegistry::new());
        let loader = Rc::new(RecordingLoader::new(Rc::clone(&interfaces)));
        let services = HostServices::new(
            Rc::clone(&fetcher) as Rc<dyn DescriptorFetcher>,
            Rc::clone(&loader) as Rc<dyn CodeLoader>,
            Rc::clone(&interfaces),
            Rc::new(pool.spawner()),
        )
        .with_quirks(quirks)
        .with_sink(Rc::clone(&sink) as Rc<dyn ObservabilitySink>);
        Self {
            pool,
            sink,
            fetcher,
            loader,
            interfaces,
            host: GuestHost::new(services),
            guests: HashMap::new(),
        }
    }

    /// Publishes a guest version whose entrypoints are `main.js`,
    /// `vendor.js`, and `theme.css`. Loading `main.js` publishes the guest.
    pub(crate) fn publish_version(
        &mut self,
        guest_id: &str,
        version: &str,
        script: GuestScript,
    ) -> Rc<FakeGuest> {
        let base = base_url(guest_id, version);
        self.fetcher.insert(
            guest_id,
            version,
            ModuleDescriptor::new(
                vec![
                    String::from("vendor.js"),
                    String::from("main.js"),
                    String::from("theme.css"),
                ],
                base.clone(),
            ),
        );
        let guest = FakeGuest::new(script);
        self.loader.publish_on_load(
            &format!("{base}main.js"),
            InterfaceKey::new(guest_id, &v(version)),
            Rc::clone(&guest),
        );
        self.guests
            .insert((guest_id.to_owned(), version.to_owned()), Rc::clone(&guest));
        guest
    }

    pub(crate) fn guest(&self, guest_id: &str, version: &str) -> Rc<FakeGuest> {
        Rc::clone(
            self.guests
                .get(&(guest_id.to_owned(), version.to_owned()))
                .expect("guest version was published"),
        )
    }

    pub(crate) fn register(&self, guest_id: &str, versions: &[&str]) {
        self.host
            .register_guest(guest_id, versions.iter().map(|text| v(text)))
            .expect("register guest");
    }

    /// Starts a mount on the pool and runs it until it stalls.
    ///
    /// The returned cell holds the outcome once the mount finishes.
    pub(crate) fn spawn_mount(&mut self, guest_id: &str, major: u32, minor: u32) -> MountOutcome {
        let slot = self.host.slot(guest_id).expect("guest is registered");
        let outcome = MountOutcome::default();
        let finished = Rc::clone(&outcome);
        self.pool
            .spawner()
            .spawn_local(async move {
                let result = slot.mount(major, minor).await;
                *finished.borrow_mut() = Some(result);
            })
            .expect("spawn mount");
        self.pool.run_until_stalled();
        outcome
    }

    /// Runs a mount that is expected to finish without outside help.
    pub(crate) fn mount(
        &mut self,
        guest_id: &str,
        major: u32,
        minor: u32,
    ) -> Result<Version, HostError> {
        self.spawn_mount(guest_id, major, minor)
            .borrow_mut()
            .take()
            .expect("mount finished")
    }
}

/// Outcome cell filled by [`Harness::spawn_mount`].
pub(crate) type MountOutcome = Rc<RefCell<Option<Result<Version, HostError>>>>;
