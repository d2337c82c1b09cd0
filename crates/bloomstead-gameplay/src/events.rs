//! Event bus for inter-system communication.
//!
//! Managers never call into the presentation layer directly. They hold an
//! [`EventSender`] and publish [`GameEvent`]s; the owner of the [`EventBus`]
//! calls [`EventBus::pump`] to fan every queued event out to the subscribers
//! registered for its [`EventKind`]. Dispatch is synchronous and in order.

use bloomstead_common::{CropId, InventoryId, MaterialId, RecipeId, TilePos};
use crossbeam_channel::{unbounded, Receiver, Sender};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::trace;

use crate::tilemap::TileChange;

/// Default number of events kept by the debug history.
pub const DEFAULT_HISTORY_CAPACITY: usize = 100;

/// What an inventory mutation did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InventoryAction {
    /// Items were added
    Add,
    /// Items were removed from a slot
    Remove,
    /// Items moved into an empty slot
    Move,
    /// Items merged onto a matching stack
    Merge,
    /// Two slots swapped contents
    Swap,
    /// Items arrived from another inventory
    TransferIn,
    /// Items left for another inventory
    TransferOut,
    /// Items were consumed (crafting)
    Consume,
    /// All slots were emptied
    Clear,
    /// Contents were replaced from a save
    Restore,
}

impl InventoryAction {
    /// Returns the tag used in logs and serialized events.
    #[must_use]
    pub const fn tag(self) -> &'static str {
        match self {
            Self::Add => "add",
            Self::Remove => "remove",
            Self::Move => "move",
            Self::Merge => "merge",
            Self::Swap => "swap",
            Self::TransferIn => "transfer_in",
            Self::TransferOut => "transfer_out",
            Self::Consume => "consume",
            Self::Clear => "clear",
            Self::Restore => "restore",
        }
    }
}

/// Contents of one occupied slot, as carried by inventory events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotSnapshot {
    /// Material in the slot
    pub item_id: MaterialId,
    /// Quantity in the slot
    pub quantity: u32,
}

/// Event types that can be sent through the event bus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum GameEvent {
    /// An inventory changed. `slots` is the full resulting contents and is
    /// the source of truth for consumers.
    InventoryUpdated {
        /// Inventory that changed
        inventory_id: InventoryId,
        /// What happened
        action: InventoryAction,
        /// Full slot contents after the change
        slots: Vec<Option<SlotSnapshot>>,
    },
    /// The active hotbar entry changed
    HotbarSelected {
        /// Hotbar index (0-4)
        index: usize,
    },
    /// A recipe was crafted
    CraftCompleted {
        /// Recipe used
        recipe_id: RecipeId,
        /// Material produced
        result: MaterialId,
        /// Quantity produced
        quantity: u32,
    },
    /// A seed went into the ground
    CropPlanted {
        /// Tile position
        position: TilePos,
        /// Crop planted
        crop_id: CropId,
        /// In-game day of planting
        day: u32,
    },
    /// A crop was watered
    CropWatered {
        /// Tile position
        position: TilePos,
        /// In-game day of watering
        day: u32,
    },
    /// A crop finished growing. Fires once per crop.
    CropGrown {
        /// Tile position
        position: TilePos,
        /// Crop that finished
        crop_id: CropId,
    },
    /// A grown crop was harvested
    CropHarvested {
        /// Tile position
        position: TilePos,
        /// Crop harvested
        crop_id: CropId,
        /// Material handed out
        produce: MaterialId,
    },
    /// Crops and the current day were replaced from saved state
    CropsRestored {
        /// Restored day number
        day: u32,
        /// Crops now planted
        crops: usize,
    },
    /// The in-game day advanced
    DayChanged {
        /// New day number
        day: u32,
    },
    /// A map tile was placed or removed
    TileChanged {
        /// The recorded change
        change: TileChange,
    },
    /// Game state was written to a persistence backend
    GameSaved {
        /// Backend tag
        provider: String,
    },
    /// Game state was restored from a persistence backend
    GameLoaded {
        /// Backend tag
        provider: String,
    },
}

/// Discriminant of [`GameEvent`], used as the dispatch table key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// [`GameEvent::InventoryUpdated`]
    InventoryUpdated,
    /// [`GameEvent::HotbarSelected`]
    HotbarSelected,
    /// [`GameEvent::CraftCompleted`]
    CraftCompleted,
    /// [`GameEvent::CropPlanted`]
    CropPlanted,
    /// [`GameEvent::CropWatered`]
    CropWatered,
    /// [`GameEvent::CropGrown`]
    CropGrown,
    /// [`GameEvent::CropHarvested`]
    CropHarvested,
    /// [`GameEvent::CropsRestored`]
    CropsRestored,
    /// [`GameEvent::DayChanged`]
    DayChanged,
    /// [`GameEvent::TileChanged`]
    TileChanged,
    /// [`GameEvent::GameSaved`]
    GameSaved,
    /// [`GameEvent::GameLoaded`]
    GameLoaded,
}

impl GameEvent {
    /// Returns the kind of this event.
    #[must_use]
    pub const fn kind(&self) -> EventKind {
        match self {
            Self::InventoryUpdated { .. } => EventKind::InventoryUpdated,
            Self::HotbarSelected { .. } => EventKind::HotbarSelected,
            Self::CraftCompleted { .. } => EventKind::CraftCompleted,
            Self::CropPlanted { .. } => EventKind::CropPlanted,
            Self::CropWatered { .. } => EventKind::CropWatered,
            Self::CropGrown { .. } => EventKind::CropGrown,
            Self::CropHarvested { .. } => EventKind::CropHarvested,
            Self::CropsRestored { .. } => EventKind::CropsRestored,
            Self::DayChanged { .. } => EventKind::DayChanged,
            Self::TileChanged { .. } => EventKind::TileChanged,
            Self::GameSaved { .. } => EventKind::GameSaved,
            Self::GameLoaded { .. } => EventKind::GameLoaded,
        }
    }
}

/// Cloneable publishing handle held by managers.
#[derive(Debug, Clone)]
pub struct EventSender {
    sender: Sender<GameEvent>,
}

impl EventSender {
    /// Queues an event for the next [`EventBus::pump`].
    pub fn emit(&self, event: GameEvent) {
        // Only fails once the bus is gone, at which point nobody listens.
        let _ = self.sender.send(event);
    }

    /// A sender whose events go nowhere. Useful for managers built in
    /// isolation.
    #[must_use]
    pub fn detached() -> Self {
        let (sender, _) = unbounded();
        Self { sender }
    }
}

/// Subscription handle returned by [`EventBus::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Handler = Box<dyn FnMut(&GameEvent)>;

/// One recorded event in the debug history.
#[derive(Debug, Clone)]
pub struct HistoryEntry {
    /// Dispatch sequence number
    pub sequence: u64,
    /// Wall clock time of dispatch (Unix milliseconds)
    pub timestamp_ms: u64,
    /// The event
    pub event: GameEvent,
}

/// Bounded ring buffer of recently dispatched events.
#[derive(Debug, Clone)]
pub struct EventHistory {
    entries: VecDeque<HistoryEntry>,
    capacity: usize,
    next_sequence: u64,
}

impl EventHistory {
    /// Creates a history keeping at most `capacity` events.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
            next_sequence: 0,
        }
    }

    /// Records an event, evicting the oldest once full.
    pub fn record(&mut self, event: &GameEvent) {
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        let timestamp_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        self.entries.push_back(HistoryEntry {
            sequence: self.next_sequence,
            timestamp_ms,
            event: event.clone(),
        });
        self.next_sequence += 1;
    }

    /// Recorded events, oldest first.
    pub fn entries(&self) -> impl Iterator<Item = &HistoryEntry> {
        self.entries.iter()
    }

    /// Number of recorded events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Checks if nothing has been recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Maximum number of entries kept.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Drops all entries.
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

/// Event bus with a typed dispatch table.
pub struct EventBus {
    sender: Sender<GameEvent>,
    receiver: Receiver<GameEvent>,
    handlers: HashMap<EventKind, Vec<(SubscriptionId, Handler)>>,
    catch_all: Vec<(SubscriptionId, Handler)>,
    next_subscription: u64,
    history: Option<EventHistory>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("pending", &self.receiver.len())
            .field("subscribers", &self.subscriber_count())
            .field("history", &self.history.as_ref().map(EventHistory::len))
            .finish()
    }
}

impl EventBus {
    /// Creates a new event bus without debug history.
    #[must_use]
    pub fn new() -> Self {
        let (sender, receiver) = unbounded();
        Self {
            sender,
            receiver,
            handlers: HashMap::new(),
            catch_all: Vec::new(),
            next_subscription: 1,
            history: None,
        }
    }

    /// Creates a bus that records the last `capacity` events.
    #[must_use]
    pub fn with_history(capacity: usize) -> Self {
        let mut bus = Self::new();
        bus.enable_history(capacity);
        bus
    }

    /// Turns on the debug history.
    pub fn enable_history(&mut self, capacity: usize) {
        self.history = Some(EventHistory::new(capacity));
    }

    /// Turns off the debug history and drops its contents.
    pub fn disable_history(&mut self) {
        self.history = None;
    }

    /// Returns the debug history, if enabled.
    #[must_use]
    pub fn history(&self) -> Option<&EventHistory> {
        self.history.as_ref()
    }

    /// Creates a new sender handle for publishing events.
    #[must_use]
    pub fn sender(&self) -> EventSender {
        EventSender {
            sender: self.sender.clone(),
        }
    }

    /// Queues an event directly on the bus.
    pub fn publish(&self, event: GameEvent) {
        let _ = self.sender.send(event);
    }

    /// Registers a handler for one kind of event.
    pub fn subscribe<F>(&mut self, kind: EventKind, handler: F) -> SubscriptionId
    where
        F: FnMut(&GameEvent) + 'static,
    {
        let id = self.allocate_id();
        self.handlers
            .entry(kind)
            .or_default()
            .push((id, Box::new(handler)));
        id
    }

    /// Registers a handler that sees every event.
    pub fn subscribe_all<F>(&mut self, handler: F) -> SubscriptionId
    where
        F: FnMut(&GameEvent) + 'static,
    {
        let id = self.allocate_id();
        self.catch_all.push((id, Box::new(handler)));
        id
    }

    /// Removes a handler. Returns false if it was not registered.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.subscriber_count();
        for list in self.handlers.values_mut() {
            list.retain(|(sub, _)| *sub != id);
        }
        self.catch_all.retain(|(sub, _)| *sub != id);
        self.subscriber_count() != before
    }

    /// Total number of registered handlers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.handlers.values().map(Vec::len).sum::<usize>() + self.catch_all.len()
    }

    /// Returns the number of queued events.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.receiver.len()
    }

    /// Dispatches all queued events, including any queued by handlers
    /// while pumping. Returns the number of events dispatched.
    pub fn pump(&mut self) -> usize {
        let mut dispatched = 0;
        while let Ok(event) = self.receiver.try_recv() {
            trace!(kind = ?event.kind(), "dispatching event");
            if let Some(history) = self.history.as_mut() {
                history.record(&event);
            }
            if let Some(list) = self.handlers.get_mut(&event.kind()) {
                for (_, handler) in list.iter_mut() {
                    handler(&event);
                }
            }
            for (_, handler) in &mut self.catch_all {
                handler(&event);
            }
            dispatched += 1;
        }
        dispatched
    }

    fn allocate_id(&mut self) -> SubscriptionId {
        let id = SubscriptionId(self.next_subscription);
        self.next_subscription += 1;
        id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn day(n: u32) -> GameEvent {
        GameEvent::DayChanged { day: n }
    }

    #[test]
    fn test_dispatch_by_kind() {
        let mut bus = EventBus::new();
        let days = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&days);
        bus.subscribe(EventKind::DayChanged, move |event| {
            if let GameEvent::DayChanged { day } = event {
                sink.borrow_mut().push(*day);
            }
        });

        let sender = bus.sender();
        sender.emit(day(2));
        sender.emit(GameEvent::HotbarSelected { index: 1 });
        sender.emit(day(3));

        assert_eq!(bus.pending_count(), 3);
        assert_eq!(bus.pump(), 3);
        assert_eq!(*days.borrow(), vec![2, 3]);
        assert_eq!(bus.pending_count(), 0);
    }

    #[test]
    fn test_catch_all_and_unsubscribe() {
        let mut bus = EventBus::new();
        let count = Rc::new(RefCell::new(0));
        let counter = Rc::clone(&count);
        let id = bus.subscribe_all(move |_| *counter.borrow_mut() += 1);

        bus.publish(day(1));
        bus.pump();
        assert_eq!(*count.borrow(), 1);

        assert!(bus.unsubscribe(id));
        assert!(!bus.unsubscribe(id));
        bus.publish(day(2));
        bus.pump();
        assert_eq!(*count.borrow(), 1);
    }

    #[test]
    fn test_handler_can_publish_during_pump() {
        let mut bus = EventBus::new();
        let follow_up = bus.sender();
        bus.subscribe(EventKind::CropGrown, move |_| {
            follow_up.emit(GameEvent::HotbarSelected { index: 0 });
        });
        let seen = Rc::new(RefCell::new(false));
        let flag = Rc::clone(&seen);
        bus.subscribe(EventKind::HotbarSelected, move |_| *flag.borrow_mut() = true);

        bus.publish(GameEvent::CropGrown {
            position: TilePos::new(1, 1),
            crop_id: CropId::new("carrot"),
        });
        assert_eq!(bus.pump(), 2);
        assert!(*seen.borrow());
    }

    #[test]
    fn test_history_evicts_oldest() {
        let mut bus = EventBus::with_history(3);
        for n in 1..=5 {
            bus.publish(day(n));
        }
        bus.pump();

        let history = bus.history().expect("history enabled");
        assert_eq!(history.len(), 3);
        let days: Vec<_> = history
            .entries()
            .map(|entry| match entry.event {
                GameEvent::DayChanged { day } => day,
                _ => 0,
            })
            .collect();
        assert_eq!(days, vec![3, 4, 5]);
        assert_eq!(history.entries().next().map(|e| e.sequence), Some(2));
    }

    #[test]
    fn test_history_disabled_by_default() {
        let mut bus = EventBus::new();
        bus.publish(day(1));
        bus.pump();
        assert!(bus.history().is_none());
    }

    #[test]
    fn test_detached_sender_does_not_panic() {
        let sender = EventSender::detached();
        sender.emit(day(1));
    }
}
