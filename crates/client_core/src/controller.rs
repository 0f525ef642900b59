//! Reconciliation between user intents, remote outcomes and live events.

use std::{
    collections::HashSet,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex, PoisonError,
    },
};

use futures::StreamExt;
use shared::{
    domain::{ClientId, TalkId},
    protocol::Talk,
};
use tokio::{sync::broadcast, task::JoinHandle};
use tracing::{debug, info, warn};

use crate::{
    error::RemoteError,
    store::{ClientState, Dispatch, DraftField, ErrorRecord, Store, StoreAction, SyncOperation},
    transport::{TalkApi, TalkStream},
};

#[derive(Debug, Clone, Copy)]
pub struct ControllerConfig {
    /// Generated once per process; stamps this instance's creations.
    pub client_id: ClientId,
}

#[derive(Debug)]
pub enum SubmitOutcome {
    /// A required field was empty; nothing was dispatched.
    Rejected,
    Confirmed(Talk),
    /// The optimistic entry was removed again.
    RolledBack(RemoteError),
}

#[derive(Debug)]
pub enum DeleteOutcome {
    Removed,
    /// The talk stays visible.
    Kept(RemoteError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LiveMerge {
    Added,
    Echo,
    Duplicate,
}

fn merge_live_talk(store: &Store, own: ClientId, talk: Talk) -> LiveMerge {
    if talk.client_id == Some(own) {
        debug!(talk_id = ?talk.id, "live: suppressed own echo");
        return LiveMerge::Echo;
    }
    let mut outcome = LiveMerge::Duplicate;
    store.dispatch_with(|state| {
        if talk.id.is_some() && state.talks.iter().any(|known| known.id == talk.id) {
            return Vec::new();
        }
        outcome = LiveMerge::Added;
        vec![StoreAction::AddTalk { talk }]
    });
    if outcome == LiveMerge::Duplicate {
        debug!("live: skipped talk already present");
    }
    outcome
}

/// Keeps the fetched list and appends the local entries it cannot know about yet:
/// optimistic ones and this client's confirmed creations missing from the fetch.
fn merge_initial_load(state: &ClientState, own: ClientId, fetched: Vec<Talk>) -> Vec<Talk> {
    let listed: HashSet<TalkId> = fetched.iter().filter_map(|talk| talk.id).collect();
    let mut merged = fetched;
    merged.extend(
        state
            .talks
            .iter()
            .filter(|talk| match talk.id {
                None => true,
                Some(id) => talk.client_id == Some(own) && !listed.contains(&id),
            })
            .cloned(),
    );
    merged
}

enum LiveTask {
    Idle,
    Running(JoinHandle<()>),
    Closed,
}

pub struct SyncController {
    api: Arc<dyn TalkApi>,
    store: Arc<Store>,
    client_id: ClientId,
    started: AtomicBool,
    live_task: Mutex<LiveTask>,
}

impl SyncController {
    pub fn new(config: ControllerConfig, api: Arc<dyn TalkApi>) -> Arc<Self> {
        Arc::new(Self {
            api,
            store: Arc::new(Store::default()),
            client_id: config.client_id,
            started: AtomicBool::new(false),
            live_task: Mutex::new(LiveTask::Idle),
        })
    }

    pub fn client_id(&self) -> ClientId {
        self.client_id
    }

    pub fn state(&self) -> Arc<ClientState> {
        self.store.snapshot()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Dispatch> {
        self.store.subscribe()
    }

    /// Pass-through for actions the UI owns, such as field edits.
    pub fn dispatch(&self, action: StoreAction) -> Arc<ClientState> {
        self.store.dispatch(action)
    }

    pub fn set_input(&self, key: DraftField, value: impl Into<String>) -> Arc<ClientState> {
        self.store.dispatch(StoreAction::SetInput {
            key,
            value: value.into(),
        })
    }

    fn failure_action(&self, operation: SyncOperation, err: &RemoteError) -> StoreAction {
        warn!(%operation, error = %err, "sync: remote call failed");
        StoreAction::SetError {
            error: ErrorRecord::new(operation, err.to_string()),
        }
    }

    /// Optimistically inserts the draft as a talk, clears the draft, then asks the
    /// backend to persist it.
    pub async fn submit(&self) -> SubmitOutcome {
        let client_id = self.client_id;
        let mut pending = None;
        self.store.dispatch_with(|state| {
            if !state.draft.is_complete() {
                return Vec::new();
            }
            let talk = state.draft.to_new_talk(client_id).into_talk(None);
            pending = Some(talk.clone());
            vec![StoreAction::AddTalk { talk }, StoreAction::ClearInput]
        });
        let Some(pending) = pending else {
            debug!("sync: submit ignored, draft incomplete");
            return SubmitOutcome::Rejected;
        };

        match self.api.create_talk(pending.to_new_talk()).await {
            Ok(confirmed) => {
                info!(talk_id = ?confirmed.id, "sync: create confirmed");
                self.store.dispatch(StoreAction::ConfirmTalk {
                    pending,
                    confirmed: confirmed.clone(),
                });
                SubmitOutcome::Confirmed(confirmed)
            }
            Err(err) => {
                let error = self.failure_action(SyncOperation::Create, &err);
                self.store
                    .dispatch_with(|_| vec![StoreAction::RollbackTalk { pending }, error]);
                SubmitOutcome::RolledBack(err)
            }
        }
    }

    /// Removes a talk only once the backend confirms the delete.
    pub async fn delete(&self, id: TalkId) -> DeleteOutcome {
        match self.api.delete_talk(id).await {
            Ok(()) => {
                info!(talk_id = id.0, "sync: delete confirmed");
                self.store.dispatch(StoreAction::RemoveTalk { id });
                DeleteOutcome::Removed
            }
            Err(err) => {
                let error = self.failure_action(SyncOperation::Delete, &err);
                self.store.dispatch(error);
                DeleteOutcome::Kept(err)
            }
        }
    }

    /// Opens the live channel, performs the initial load, then keeps merging live
    /// events in the background. Events that arrive while the load is in flight are
    /// held back and applied after it. Returns once the initial load is applied;
    /// later calls do nothing.
    pub async fn start(&self) {
        if self.started.swap(true, Ordering::SeqCst) {
            warn!("sync: already started");
            return;
        }

        let mut live = match self.api.subscribe_created_talks().await {
            Ok(stream) => Some(stream),
            Err(err) => {
                let error = self.failure_action(SyncOperation::Subscribe, &err);
                self.store.dispatch(error);
                None
            }
        };

        let load = self.api.list_talks();
        tokio::pin!(load);
        let mut buffered = Vec::new();
        let listed = loop {
            let Some(stream) = live.as_mut() else {
                break load.as_mut().await;
            };
            let mut ended = false;
            tokio::select! {
                listed = &mut load => break listed,
                next = stream.next() => match next {
                    Some(talk) => buffered.push(talk),
                    None => ended = true,
                },
            }
            if ended {
                info!("live: channel closed during initial load");
                live = None;
            }
        };

        match listed {
            Ok(talks) => {
                info!(count = talks.len(), "sync: initial load complete");
                let own = self.client_id;
                self.store.dispatch_with(|state| {
                    vec![StoreAction::SetTalks {
                        talks: merge_initial_load(state, own, talks),
                    }]
                });
            }
            Err(err) => {
                let error = self.failure_action(SyncOperation::List, &err);
                self.store.dispatch(error);
            }
        }

        if !buffered.is_empty() {
            debug!(count = buffered.len(), "live: replaying buffered events");
        }
        for talk in buffered {
            merge_live_talk(&self.store, self.client_id, talk);
        }

        if let Some(stream) = live {
            let mut live_task = self
                .live_task
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            if let LiveTask::Closed = *live_task {
                info!("live: shut down during initial load, dropping channel");
            } else {
                *live_task = LiveTask::Running(self.spawn_live_task(stream));
            }
        }
    }

    fn spawn_live_task(&self, mut stream: TalkStream) -> JoinHandle<()> {
        let store = Arc::clone(&self.store);
        let own = self.client_id;
        tokio::spawn(async move {
            while let Some(talk) = stream.next().await {
                merge_live_talk(&store, own, talk);
            }
            info!("live: channel closed");
        })
    }

    /// Releases the live subscription, including one a running `start` has not
    /// handed over yet. Returns false if the controller was already shut down.
    pub fn shutdown(&self) -> bool {
        let previous = std::mem::replace(
            &mut *self
                .live_task
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
            LiveTask::Closed,
        );
        match previous {
            LiveTask::Running(handle) => {
                handle.abort();
                info!("live: unsubscribed");
                true
            }
            LiveTask::Idle => true,
            LiveTask::Closed => false,
        }
    }
}

impl Drop for SyncController {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
#[path = "tests/controller_tests.rs"]
mod tests;
