//! The tracking engine tying store, channels, policy, aggregation and the
//! callback registry together.

use crate::aggregate::{self, Badge, LinkTarget, Scope};
use crate::bulk::{self, BulkRequest, DismissKind};
use crate::catalog::{CategoryInfo, CategoryTree, TagLevels};
use crate::channels::{ChannelDescriptor, ChannelMessage, ChannelSubscriptions, Effect, TrackingMessage};
use crate::classify::{Classification, Policy};
use crate::error::{Result, TrackerError};
use crate::incoming::{ArrivalKind, IncomingFilter, IncomingTracker};
use crate::preferences::ViewerPreferences;
use crate::registry::{CallbackRegistry, Subscription, SubscriptionId};
use crate::state::{AppliedDiff, StateStore, TopicPatch};
use crate::types::{Counts, GroupId, NotificationLevel, TopicId, TopicState, UserId};
use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::{Mutex, RwLock};
use serde::Deserialize;
use std::collections::{BTreeSet, HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, trace, warn};

/// Tracker configuration, usually built from the session bootstrap.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// The viewer whose state is tracked.
    pub viewer_id: UserId,

    /// Current group memberships.
    pub group_ids: Vec<GroupId>,

    pub preferences: ViewerPreferences,

    /// Category hierarchy with per-category default levels.
    pub categories: Vec<CategoryInfo>,

    /// Per-tag default levels.
    pub tag_levels: TagLevels,

    /// Open the per-user and per-group channels on construction.
    pub auto_connect: bool,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            viewer_id: UserId(0),
            group_ids: Vec::new(),
            preferences: ViewerPreferences::default(),
            categories: Vec::new(),
            tag_levels: TagLevels::default(),
            auto_connect: true,
        }
    }
}

impl TrackerConfig {
    pub fn for_viewer(viewer_id: u64) -> Self {
        Self {
            viewer_id: UserId(viewer_id),
            ..Default::default()
        }
    }

    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| TrackerError::Config(e.to_string()))
    }

    /// Channels the viewer should listen on.
    pub fn channels(&self) -> Vec<ChannelDescriptor> {
        std::iter::once(ChannelDescriptor::PerUser(self.viewer_id))
            .chain(self.group_ids.iter().map(|g| ChannelDescriptor::PerGroup(*g)))
            .collect()
    }
}

/// Read-only inputs owned by other collaborators.
struct Context {
    prefs: ViewerPreferences,
    categories: CategoryTree,
    tags: TagLevels,
}

impl Context {
    fn policy(&self) -> Policy<'_> {
        Policy::new(&self.prefs, &self.categories, &self.tags)
    }
}

/// A notification pass waiting to run.
enum Pass {
    /// Registrations whose scope held a changed record before or after.
    Changed(Vec<AppliedDiff>),
    /// Every registration (policy inputs changed).
    Everything,
}

/// Serializes notification passes. A pass requested while callbacks are
/// running is queued and run after the current one, with counts computed
/// when it runs.
#[derive(Default)]
struct PassQueue {
    running: bool,
    pending: VecDeque<Pass>,
}

/// Client-side topic tracking engine. One per session.
///
/// All mutation happens synchronously inside the call that caused it and is
/// followed by at most one notification pass. Locks are released before any
/// callback runs.
pub struct TopicTracker {
    viewer_id: UserId,

    /// Topic records.
    state: RwLock<StateStore>,

    context: RwLock<Context>,

    channels: Mutex<ChannelSubscriptions>,

    groups: RwLock<BTreeSet<GroupId>>,

    registry: CallbackRegistry,

    incoming: Mutex<IncomingTracker>,

    /// Inbound queue fed by the bus.
    inbox_tx: Sender<ChannelMessage>,
    inbox_rx: Receiver<ChannelMessage>,

    /// Outbound dismiss requests for the API client.
    outbox: Mutex<Option<Sender<BulkRequest>>>,

    passes: Mutex<PassQueue>,

    /// Number of notification passes performed.
    message_count: AtomicU64,
}

impl TopicTracker {
    pub fn new(config: TrackerConfig) -> Result<Self> {
        let categories = CategoryTree::new(&config.categories)?;
        let (inbox_tx, inbox_rx) = unbounded();

        let mut channels = ChannelSubscriptions::new(config.viewer_id);
        if config.auto_connect {
            channels.connect(&config.channels());
        }

        Ok(Self {
            viewer_id: config.viewer_id,
            state: RwLock::new(StateStore::new()),
            context: RwLock::new(Context {
                prefs: config.preferences,
                categories,
                tags: config.tag_levels,
            }),
            channels: Mutex::new(channels),
            groups: RwLock::new(config.group_ids.into_iter().collect()),
            registry: CallbackRegistry::new(),
            incoming: Mutex::new(IncomingTracker::new()),
            inbox_tx,
            inbox_rx,
            outbox: Mutex::new(None),
            passes: Mutex::new(PassQueue::default()),
            message_count: AtomicU64::new(0),
        })
    }

    pub fn viewer_id(&self) -> UserId {
        self.viewer_id
    }

    // --- Bootstrap ---

    /// Load topic metadata fetched for a list route.
    pub fn load_states(&self, records: Vec<TopicState>) {
        let diffs = {
            let cutoff = self.context.read().prefs.treat_as_new_topic_start_date;
            self.state.write().bulk_load(records, cutoff)
        };
        debug!(count = diffs.len(), "loaded topic states");
        self.notify(&diffs);
    }

    /// Forget topics, e.g. ones the server says the viewer can no longer see.
    pub fn remove_topics(&self, topic_ids: &[TopicId]) {
        let diffs: Vec<_> = {
            let mut state = self.state.write();
            topic_ids.iter().filter_map(|id| state.remove(*id)).collect()
        };
        self.notify(&diffs);
    }

    // --- Channels ---

    /// Open channels; returns the ones that were not already open.
    pub fn connect(&self, channels: &[ChannelDescriptor]) -> Vec<ChannelDescriptor> {
        self.channels.lock().connect(channels)
    }

    /// Open a channel resuming after a bootstrap-supplied bus id.
    pub fn connect_from(&self, channel: ChannelDescriptor, last_id: i64) -> bool {
        self.channels.lock().connect_from(channel, last_id)
    }

    pub fn disconnect(&self, channel: &ChannelDescriptor) -> bool {
        self.channels.lock().disconnect(channel)
    }

    pub fn connected(&self) -> Vec<ChannelDescriptor> {
        self.channels.lock().connected()
    }

    /// Sender the bus collaborator pushes messages into; see [`pump`](Self::pump).
    pub fn inbox(&self) -> Sender<ChannelMessage> {
        self.inbox_tx.clone()
    }

    /// Process every queued inbound message. Returns how many changed state.
    pub fn pump(&self) -> usize {
        let mut applied = 0;
        while let Ok(message) = self.inbox_rx.try_recv() {
            if self.deliver(&message) {
                applied += 1;
            }
        }
        applied
    }

    /// Handle one delivered message. Never fails: anything unusable is
    /// logged and dropped. Returns true if the store changed.
    pub fn deliver(&self, message: &ChannelMessage) -> bool {
        let Some(dispatch) = self.channels.lock().accept(message) else {
            return false;
        };
        trace!(
            channel = %dispatch.channel,
            message_type = dispatch.message.message_type(),
            "dispatching message"
        );

        let diffs = self.apply_effect(dispatch.effect);
        let changed = diffs.iter().any(|d| !d.is_noop());

        if let Some(kind) = arrival_kind(&dispatch.message) {
            for diff in diffs.iter().filter(|d| !d.is_noop()) {
                self.observe_arrival(kind, diff.topic_id);
            }
        }

        self.notify(&diffs);
        changed
    }

    fn apply_effect(&self, effect: Effect) -> Vec<AppliedDiff> {
        let mut state = self.state.write();
        match effect {
            Effect::Upsert(topic_id, patch) => vec![state.upsert(topic_id, &patch)],
            Effect::UpdateExisting(topic_id, patch) => {
                if state.get(topic_id).is_none() {
                    trace!(%topic_id, "ignoring update for unknown topic");
                    return Vec::new();
                }
                vec![state.upsert(topic_id, &patch)]
            }
            Effect::Archive(topic_id, groups) => {
                let Some(record) = state.get(topic_id) else {
                    return Vec::new();
                };
                let loses_visibility =
                    !record.group_ids.is_empty() && record.group_ids.is_subset(&groups);
                if loses_visibility {
                    state.remove(topic_id).into_iter().collect()
                } else {
                    let patch = TopicPatch {
                        remove_groups: groups,
                        ..TopicPatch::default()
                    };
                    vec![state.upsert(topic_id, &patch)]
                }
            }
            Effect::MarkSeen(topic_ids) => {
                let ids: BTreeSet<_> = topic_ids.into_iter().collect();
                state.mark_seen_where(|r| ids.contains(&r.topic_id))
            }
            Effect::Remove(topic_id) => state.remove(topic_id).into_iter().collect(),
            Effect::Nothing => Vec::new(),
        }
    }

    fn observe_arrival(&self, kind: ArrivalKind, topic_id: TopicId) {
        let state = self.state.read();
        let Some(record) = state.get(topic_id) else {
            return;
        };
        let context = self.context.read();
        let policy = context.policy();
        let muted = policy.effective_level(record) == NotificationLevel::Muted
            || policy.muted_by_preferences(record);
        let class = policy.classify(record);
        self.incoming
            .lock()
            .observe(kind, record, class, muted, &context.categories);
    }

    // --- Group membership ---

    /// Start following a group inbox.
    pub fn join_group(&self, group_id: GroupId) {
        self.groups.write().insert(group_id);
        self.connect(&[ChannelDescriptor::PerGroup(group_id)]);
    }

    /// Stop following a group inbox: closes its channel, strips the group
    /// from every record, and removes topics reachable only through it.
    pub fn leave_group(&self, group_id: GroupId) {
        self.groups.write().remove(&group_id);
        self.disconnect(&ChannelDescriptor::PerGroup(group_id));

        let diffs = {
            let mut state = self.state.write();
            let single = BTreeSet::from([group_id]);
            let mut diffs = state.remove_where(|r| r.group_ids == single);
            diffs.extend(state.update_where(|r| {
                r.group_ids.contains(&group_id).then(|| TopicPatch {
                    remove_groups: single.clone(),
                    ..TopicPatch::default()
                })
            }));
            diffs
        };
        debug!(%group_id, affected = diffs.len(), "left group");
        self.notify(&diffs);
    }

    pub fn groups(&self) -> Vec<GroupId> {
        self.groups.read().iter().copied().collect()
    }

    // --- Queries ---

    /// Copy of a topic's record.
    pub fn get(&self, topic_id: TopicId) -> Option<TopicState> {
        self.state.read().get(topic_id).cloned()
    }

    pub fn topic_ids(&self) -> Vec<TopicId> {
        self.state.read().topic_ids()
    }

    pub fn len(&self) -> usize {
        self.state.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.read().is_empty()
    }

    pub fn classify(&self, topic_id: TopicId) -> Option<Classification> {
        let state = self.state.read();
        let record = state.get(topic_id)?;
        Some(self.context.read().policy().classify(record))
    }

    pub fn count(&self, scope: &Scope) -> Counts {
        let state = self.state.read();
        let context = self.context.read();
        aggregate::count(&state, scope, &context.policy())
    }

    pub fn link_target(&self, scope: &Scope) -> LinkTarget {
        let counts = self.count(scope);
        aggregate::link_target(counts, &self.context.read().prefs)
    }

    pub fn badge(&self, scope: &Scope) -> Option<Badge> {
        let counts = self.count(scope);
        aggregate::badge(counts, &self.context.read().prefs)
    }

    pub fn preferences(&self) -> ViewerPreferences {
        self.context.read().prefs.clone()
    }

    /// Number of notification passes so far.
    pub fn message_count(&self) -> u64 {
        self.message_count.load(Ordering::SeqCst)
    }

    // --- Collaborator inputs ---

    /// Replace viewer preferences and refresh every registered scope.
    pub fn set_preferences(&self, prefs: ViewerPreferences) {
        self.context.write().prefs = prefs;
        self.notify_all();
    }

    pub fn set_categories(&self, categories: &[CategoryInfo]) -> Result<()> {
        let tree = CategoryTree::new(categories)?;
        debug!(categories = tree.len(), "category tree replaced");
        self.context.write().categories = tree;
        self.notify_all();
        Ok(())
    }

    pub fn set_tag_levels(&self, tags: TagLevels) {
        self.context.write().tags = tags;
        self.notify_all();
    }

    /// Local topic-level notification change (e.g. from the topic footer).
    pub fn set_notification_level(&self, topic_id: TopicId, level: NotificationLevel) -> Result<()> {
        let diff = {
            let mut state = self.state.write();
            if state.get(topic_id).is_none() {
                return Err(TrackerError::TopicNotFound(topic_id));
            }
            state.upsert(topic_id, &TopicPatch::new().level(level))
        };
        self.notify(&[diff]);
        Ok(())
    }

    // --- Callbacks ---

    /// Register interest in `scope`. The callback receives fresh counts after
    /// any mutation that could change them.
    pub fn register<F>(&self, scope: Scope, callback: F) -> Subscription
    where
        F: FnMut(&Scope, Counts) + Send + 'static,
    {
        self.registry.register(scope, callback)
    }

    /// Unregister by id; no-op for unknown ids.
    pub fn unregister(&self, id: SubscriptionId) -> bool {
        self.registry.unregister(id)
    }

    pub fn active_callbacks(&self) -> usize {
        self.registry.active_count()
    }

    // --- Bulk mutations ---

    /// Attach the API collaborator's request queue.
    pub fn attach_outbox(&self, sender: Sender<BulkRequest>) {
        *self.outbox.lock() = Some(sender);
    }

    /// Mark every topic in `scope` fully read.
    pub fn dismiss(&self, scope: &Scope) -> Vec<TopicId> {
        self.dismiss_with(scope, DismissKind::All)
    }

    /// Apply a dismiss locally, notify once, and queue the server request.
    /// Returns the topics whose state changed.
    pub fn dismiss_with(&self, scope: &Scope, kind: DismissKind) -> Vec<TopicId> {
        let diffs = {
            let mut state = self.state.write();
            let context = self.context.read();
            bulk::dismiss(&mut state, scope, kind, &context.policy())
        };
        let topic_ids: Vec<TopicId> = diffs.iter().map(|d| d.topic_id).collect();
        debug!(%scope, ?kind, affected = topic_ids.len(), "dismissed");

        self.notify(&diffs);
        self.send_request(BulkRequest {
            scope: scope.clone(),
            kind,
            topic_ids: topic_ids.clone(),
        });
        topic_ids
    }

    fn send_request(&self, request: BulkRequest) {
        let mut outbox = self.outbox.lock();
        let Some(sender) = outbox.as_ref() else {
            return;
        };
        if sender.send(request).is_err() {
            warn!("bulk request receiver gone, detaching outbox");
            *outbox = None;
        }
    }

    // --- Incoming ---

    pub fn track_incoming(&self, filter: IncomingFilter, scope: Scope) {
        self.incoming.lock().track(filter, scope);
    }

    pub fn stop_tracking_incoming(&self) {
        self.incoming.lock().stop();
    }

    pub fn incoming_count(&self) -> usize {
        self.incoming.lock().count()
    }

    pub fn incoming_topic_ids(&self) -> Vec<TopicId> {
        self.incoming.lock().topic_ids().to_vec()
    }

    pub fn reset_incoming(&self) {
        self.incoming.lock().reset();
    }

    // --- Teardown ---

    /// Drop every callback and close every channel.
    pub fn shutdown(&self) {
        self.registry.clear();
        let mut channels = self.channels.lock();
        for channel in channels.connected() {
            channels.disconnect(&channel);
        }
    }

    // --- Notification ---

    /// One notification pass for a batch of diffs: every registration whose
    /// scope contained a changed topic before or after the change is invoked
    /// once with fresh counts.
    fn notify(&self, diffs: &[AppliedDiff]) {
        let changed: Vec<AppliedDiff> = diffs.iter().filter(|d| !d.is_noop()).cloned().collect();
        if changed.is_empty() {
            return;
        }
        self.run_pass(Pass::Changed(changed));
    }

    /// Notification pass for every registration (policy inputs changed).
    fn notify_all(&self) {
        self.run_pass(Pass::Everything);
    }

    /// Run `pass`, or queue it if another pass is dispatching (including a
    /// mutation made from inside a callback). The dispatching caller drains
    /// the queue before returning.
    fn run_pass(&self, pass: Pass) {
        {
            let mut queue = self.passes.lock();
            if queue.running {
                trace!(queued = queue.pending.len() + 1, "deferring notification pass");
                queue.pending.push_back(pass);
                return;
            }
            queue.running = true;
        }
        let _reset = PassReset(&self.passes);

        let mut next = Some(pass);
        while let Some(pass) = next {
            let deliveries = self.deliveries(&pass);
            self.finish_pass(deliveries);

            let mut queue = self.passes.lock();
            next = queue.pending.pop_front();
            if next.is_none() {
                queue.running = false;
            }
        }
    }

    fn deliveries(&self, pass: &Pass) -> Vec<(SubscriptionId, Counts)> {
        let state = self.state.read();
        let context = self.context.read();
        let tree = &context.categories;

        let affected = match pass {
            Pass::Changed(changed) => self.registry.scopes_where(|scope| {
                changed.iter().any(|d| {
                    d.before.as_ref().is_some_and(|k| scope.matches(k, tree))
                        || d.after.as_ref().is_some_and(|k| scope.matches(k, tree))
                })
            }),
            Pass::Everything => self.registry.scopes_where(|_| true),
        };
        compute_deliveries(&state, &context, affected)
    }

    fn finish_pass(&self, deliveries: Vec<(SubscriptionId, Counts)>) {
        let pass = self.message_count.fetch_add(1, Ordering::SeqCst) + 1;
        let invoked = self.registry.dispatch(deliveries);
        trace!(pass, invoked, "notification pass");
    }
}

/// Unblocks the pass queue if a callback panics mid-dispatch.
struct PassReset<'a>(&'a Mutex<PassQueue>);

impl Drop for PassReset<'_> {
    fn drop(&mut self) {
        if std::thread::panicking() {
            let mut queue = self.0.lock();
            queue.running = false;
            queue.pending.clear();
        }
    }
}

/// Counts per affected registration, computing each distinct scope once.
fn compute_deliveries(
    state: &StateStore,
    context: &Context,
    affected: Vec<(SubscriptionId, Scope)>,
) -> Vec<(SubscriptionId, Counts)> {
    let mut index: HashMap<Scope, usize> = HashMap::new();
    let mut scopes = Vec::new();
    let slots: Vec<(SubscriptionId, usize)> = affected
        .into_iter()
        .map(|(id, scope)| {
            let next = scopes.len();
            let slot = *index.entry(scope.clone()).or_insert(next);
            if slot == next {
                scopes.push(scope);
            }
            (id, slot)
        })
        .collect();

    let counts = aggregate::count_all(state, &scopes, &context.policy());
    slots.into_iter().map(|(id, slot)| (id, counts[slot])).collect()
}

fn arrival_kind(message: &TrackingMessage) -> Option<ArrivalKind> {
    match message {
        TrackingMessage::NewTopic { .. } => Some(ArrivalKind::NewTopic),
        TrackingMessage::Latest { .. } => Some(ArrivalKind::Latest),
        TrackingMessage::Unread { .. } => Some(ArrivalKind::Unread),
        _ => None,
    }
}

impl Drop for TopicTracker {
    fn drop(&mut self) {
        self.registry.clear();
    }
}
