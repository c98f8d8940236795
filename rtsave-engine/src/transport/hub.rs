//! In-process realtime hub backed by yrs.
//!
//! ```text
//! HubTransport A ──┐                        ┌──► HubTransport B
//!  (yrs Doc)       │   HubFrame (bincode)   │     (yrs Doc)
//!                  ├──► HubRoom ────────────┤
//! HubTransport C ──┘   authority Doc +      └──► HubTransport C
//!                      broadcast fan-out
//! ```
//!
//! Every participant keeps a yrs map named [`MAP_NAME`] with one JSON string
//! per editor-session-type. Concurrent writes to the same key resolve
//! last-write-wins; writes to different keys merge.

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{broadcast, mpsc, RwLock};
use tokio::task::JoinHandle;
use uuid::Uuid;
use yrs::updates::decoder::Decode;
use yrs::{Doc, Map, ReadTxn, StateVector, Transact, Update};

use super::{HubFrame, RealtimeTransport, TransportEvent};
use crate::error::SaverError;

/// Name of the shared yrs map holding the peer records.
pub const MAP_NAME: &str = "saver";

/// Traffic counters of one room.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HubStats {
    pub frames_published: u64,
    pub participants: usize,
}

/// One channel: authoritative document plus fan-out.
struct HubRoom {
    authority: Mutex<Doc>,
    sender: broadcast::Sender<Arc<Vec<u8>>>,
    frames_published: AtomicU64,
    participants: AtomicUsize,
}

impl HubRoom {
    fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            authority: Mutex::new(Doc::new()),
            sender,
            frames_published: AtomicU64::new(0),
            participants: AtomicUsize::new(0),
        }
    }

    /// Full authority state as a single update.
    fn snapshot(&self) -> Vec<u8> {
        let doc = self.authority.lock().unwrap_or_else(|e| e.into_inner());
        let txn = doc.transact();
        txn.encode_state_as_update_v1(&StateVector::default())
    }

    /// Fold a frame into the authority and fan it out.
    fn publish(&self, frame: &HubFrame) -> Result<usize, SaverError> {
        let update = Update::decode_v1(&frame.update)
            .map_err(|e| SaverError::Realtime(format!("bad update: {e}")))?;
        {
            let doc = self.authority.lock().unwrap_or_else(|e| e.into_inner());
            let mut txn = doc.transact_mut();
            txn.apply_update(update)
                .map_err(|e| SaverError::Realtime(format!("apply update: {e}")))?;
        }
        let encoded = Arc::new(frame.encode()?);
        self.frames_published.fetch_add(1, Ordering::Relaxed);
        Ok(self.sender.send(encoded).unwrap_or(0))
    }
}

/// Room registry: channel name → room.
pub struct SharedMapHub {
    rooms: RwLock<HashMap<String, Arc<HubRoom>>>,
    capacity: usize,
}

impl SharedMapHub {
    pub fn new(capacity: usize) -> Arc<Self> {
        Arc::new(Self {
            rooms: RwLock::new(HashMap::new()),
            capacity,
        })
    }

    /// Create a participant for `channel`. Nothing happens until `join`.
    pub fn connect(self: &Arc<Self>, channel: impl Into<String>) -> HubTransport {
        HubTransport::new(self.clone(), channel)
    }

    async fn room(&self, channel: &str) -> Arc<HubRoom> {
        {
            let rooms = self.rooms.read().await;
            if let Some(room) = rooms.get(channel) {
                return room.clone();
            }
        }

        let mut rooms = self.rooms.write().await;
        rooms
            .entry(channel.to_string())
            .or_insert_with(|| Arc::new(HubRoom::new(self.capacity)))
            .clone()
    }

    pub async fn stats(&self, channel: &str) -> HubStats {
        match self.rooms.read().await.get(channel) {
            Some(room) => HubStats {
                frames_published: room.frames_published.load(Ordering::Relaxed),
                participants: room.participants.load(Ordering::Relaxed),
            },
            None => HubStats::default(),
        }
    }

    pub async fn room_count(&self) -> usize {
        self.rooms.read().await.len()
    }
}

/// One participant of a hub channel.
pub struct HubTransport {
    hub: Arc<SharedMapHub>,
    channel: String,
    peer_id: Uuid,
    doc: Arc<Mutex<Doc>>,
    room: Mutex<Option<Arc<HubRoom>>>,
    reader: Mutex<Option<JoinHandle<()>>>,
}

impl HubTransport {
    fn new(hub: Arc<SharedMapHub>, channel: impl Into<String>) -> Self {
        Self {
            hub,
            channel: channel.into(),
            peer_id: Uuid::new_v4(),
            doc: Arc::new(Mutex::new(Doc::new())),
            room: Mutex::new(None),
            reader: Mutex::new(None),
        }
    }

    fn joined_room(&self) -> Option<Arc<HubRoom>> {
        self.room.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Write changed keys into the local doc; returns the update if any key moved.
    fn write_entries(&self, entries: &serde_json::Map<String, serde_json::Value>) -> Option<Vec<u8>> {
        let doc = self.doc.lock().unwrap_or_else(|e| e.into_inner());
        let map = doc.get_or_insert_map(MAP_NAME);
        let mut txn = doc.transact_mut();
        let mut changed = false;
        for (key, value) in entries {
            let encoded = value.to_string();
            let current = map.get(&txn, key).map(|v| v.to_string(&txn));
            if current.as_deref() != Some(encoded.as_str()) {
                map.insert(&mut txn, key.as_str(), encoded);
                changed = true;
            }
        }
        changed.then(|| txn.encode_update_v1())
    }
}

fn apply_to(doc: &Mutex<Doc>, bytes: &[u8]) -> Result<(), SaverError> {
    let update =
        Update::decode_v1(bytes).map_err(|e| SaverError::Realtime(format!("bad update: {e}")))?;
    let doc = doc.lock().unwrap_or_else(|e| e.into_inner());
    let mut txn = doc.transact_mut();
    txn.apply_update(update)
        .map_err(|e| SaverError::Realtime(format!("apply update: {e}")))
}

#[async_trait]
impl RealtimeTransport for HubTransport {
    async fn join(&self) -> Result<mpsc::Receiver<TransportEvent>, SaverError> {
        let room = self.hub.room(&self.channel).await;
        // Subscribe before snapshotting so nothing falls in between;
        // replayed updates are idempotent.
        let mut rx = room.sender.subscribe();
        apply_to(&self.doc, &room.snapshot())?;
        room.participants.fetch_add(1, Ordering::Relaxed);

        let (event_tx, event_rx) = mpsc::channel(64);
        let _ = event_tx.send(TransportEvent::Ready).await;

        let doc = self.doc.clone();
        let peer_id = self.peer_id;
        let reader_room = room.clone();
        let handle = tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(bytes) => {
                        let frame = match HubFrame::decode(&bytes) {
                            Ok(frame) => frame,
                            Err(e) => {
                                log::warn!("dropping undecodable frame: {e}");
                                continue;
                            }
                        };
                        if frame.peer_id == peer_id {
                            continue;
                        }
                        if let Err(e) = apply_to(&doc, &frame.update) {
                            log::warn!("dropping frame from {}: {e}", frame.peer_id);
                            continue;
                        }
                        if event_tx.send(TransportEvent::Remote).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        log::warn!("lagged {missed} frames, resyncing from hub");
                        if apply_to(&doc, &reader_room.snapshot()).is_ok()
                            && event_tx.send(TransportEvent::Remote).await.is_err()
                        {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        let _ = event_tx.send(TransportEvent::Abort).await;
                        break;
                    }
                }
            }
        });

        *self.room.lock().unwrap_or_else(|e| e.into_inner()) = Some(room);
        if let Some(old) = self.reader.lock().unwrap_or_else(|e| e.into_inner()).replace(handle) {
            old.abort();
        }
        Ok(event_rx)
    }

    fn user_doc(&self) -> String {
        let doc = self.doc.lock().unwrap_or_else(|e| e.into_inner());
        let map = doc.get_or_insert_map(MAP_NAME);
        let txn = doc.transact();
        let entries: BTreeMap<String, serde_json::Value> = map
            .iter(&txn)
            .map(|(key, value)| {
                let raw = value.to_string(&txn);
                let parsed = serde_json::from_str(&raw).unwrap_or(serde_json::Value::String(raw));
                (key.to_string(), parsed)
            })
            .collect();
        serde_json::to_string(&entries).unwrap_or_else(|_| "{}".to_string())
    }

    async fn content_update(&self, doc: &str) -> Result<(), SaverError> {
        let value: serde_json::Value = serde_json::from_str(doc)?;
        let Some(entries) = value.as_object() else {
            return Err(SaverError::Realtime("user doc must be a JSON object".into()));
        };
        let Some(room) = self.joined_room() else {
            return Err(SaverError::Realtime("not joined".into()));
        };

        if let Some(update) = self.write_entries(entries) {
            let frame = HubFrame::new(self.peer_id, self.channel.clone(), update);
            room.publish(&frame)?;
        }
        Ok(())
    }

    async fn settle(&self) {
        // content_update hands the frame to the room synchronously
        tokio::task::yield_now().await;
    }

    async fn leave(&self) {
        if let Some(handle) = self.reader.lock().unwrap_or_else(|e| e.into_inner()).take() {
            handle.abort();
        }
        if let Some(room) = self.room.lock().unwrap_or_else(|e| e.into_inner()).take() {
            room.participants.fetch_sub(1, Ordering::Relaxed);
        }
    }
}
