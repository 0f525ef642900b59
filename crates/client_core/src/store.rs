//! Local state store: the client-visible view and its single mutation entry point.

use std::{
    fmt,
    str::FromStr,
    sync::{Arc, Mutex, PoisonError},
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use shared::{
    domain::{ClientId, TalkId},
    protocol::{NewTalk, Talk},
};
use tokio::sync::broadcast;
use tracing::debug;

const DISPATCH_CHANNEL_CAPACITY: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DraftField {
    Name,
    Description,
    SpeakerName,
    SpeakerBio,
}

impl DraftField {
    pub const ALL: [DraftField; 4] = [
        DraftField::Name,
        DraftField::Description,
        DraftField::SpeakerName,
        DraftField::SpeakerBio,
    ];

    pub fn key(self) -> &'static str {
        match self {
            DraftField::Name => "name",
            DraftField::Description => "description",
            DraftField::SpeakerName => "speakerName",
            DraftField::SpeakerBio => "speakerBio",
        }
    }
}

impl fmt::Display for DraftField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for DraftField {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DraftField::ALL
            .into_iter()
            .find(|field| field.key() == s)
            .ok_or_else(|| format!("unknown draft field '{s}'"))
    }
}

/// Field values of the talk being typed, before submission.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Draft {
    pub name: String,
    pub description: String,
    pub speaker_name: String,
    pub speaker_bio: String,
}

impl Draft {
    pub fn get(&self, field: DraftField) -> &str {
        match field {
            DraftField::Name => &self.name,
            DraftField::Description => &self.description,
            DraftField::SpeakerName => &self.speaker_name,
            DraftField::SpeakerBio => &self.speaker_bio,
        }
    }

    fn slot(&mut self, field: DraftField) -> &mut String {
        match field {
            DraftField::Name => &mut self.name,
            DraftField::Description => &mut self.description,
            DraftField::SpeakerName => &mut self.speaker_name,
            DraftField::SpeakerBio => &mut self.speaker_bio,
        }
    }

    /// Every required field is non-empty. Whitespace counts as content.
    pub fn is_complete(&self) -> bool {
        DraftField::ALL
            .into_iter()
            .all(|field| !self.get(field).is_empty())
    }

    pub fn to_new_talk(&self, client_id: ClientId) -> NewTalk {
        NewTalk {
            name: self.name.clone(),
            description: self.description.clone(),
            speaker_name: self.speaker_name.clone(),
            speaker_bio: self.speaker_bio.clone(),
            client_id: Some(client_id),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncOperation {
    List,
    Create,
    Delete,
    Subscribe,
}

impl fmt::Display for SyncOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            SyncOperation::List => "list",
            SyncOperation::Create => "create",
            SyncOperation::Delete => "delete",
            SyncOperation::Subscribe => "subscribe",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorRecord {
    pub operation: SyncOperation,
    pub message: String,
    pub at: DateTime<Utc>,
}

impl ErrorRecord {
    pub fn new(operation: SyncOperation, message: impl Into<String>) -> Self {
        Self {
            operation,
            message: message.into(),
            at: Utc::now(),
        }
    }
}

/// One immutable snapshot. Transitions share the parts they leave untouched.
#[derive(Debug, Clone, Default)]
pub struct ClientState {
    pub draft: Arc<Draft>,
    pub talks: Arc<Vec<Talk>>,
    pub errors: Arc<Vec<ErrorRecord>>,
}

impl ClientState {
    pub fn pending_talks(&self) -> impl Iterator<Item = &Talk> {
        self.talks.iter().filter(|talk| talk.is_pending())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StoreAction {
    SetTalks {
        talks: Vec<Talk>,
    },
    AddTalk {
        talk: Talk,
    },
    RemoveTalk {
        id: TalkId,
    },
    SetInput {
        key: DraftField,
        value: String,
    },
    ClearInput,
    SetError {
        error: ErrorRecord,
    },
    /// Swap an optimistic entry for the record the backend confirmed.
    ConfirmTalk {
        pending: Talk,
        confirmed: Talk,
    },
    /// Drop an optimistic entry whose create failed.
    RollbackTalk {
        pending: Talk,
    },
    #[serde(other)]
    Unknown,
}

impl StoreAction {
    pub fn kind(&self) -> &'static str {
        match self {
            StoreAction::SetTalks { .. } => "SET_TALKS",
            StoreAction::AddTalk { .. } => "ADD_TALK",
            StoreAction::RemoveTalk { .. } => "REMOVE_TALK",
            StoreAction::SetInput { .. } => "SET_INPUT",
            StoreAction::ClearInput => "CLEAR_INPUT",
            StoreAction::SetError { .. } => "SET_ERROR",
            StoreAction::ConfirmTalk { .. } => "CONFIRM_TALK",
            StoreAction::RollbackTalk { .. } => "ROLLBACK_TALK",
            StoreAction::Unknown => "UNKNOWN",
        }
    }
}

fn position_of_pending(talks: &[Talk], pending: &Talk) -> Option<usize> {
    talks
        .iter()
        .position(|talk| talk.is_pending() && talk == pending)
}

/// Pure transition. Never touches `state`; untouched parts are shared with the result.
pub fn reduce(state: &ClientState, action: &StoreAction) -> ClientState {
    match action {
        StoreAction::SetTalks { talks } => ClientState {
            talks: Arc::new(talks.clone()),
            ..state.clone()
        },
        StoreAction::AddTalk { talk } => {
            let mut talks = Vec::with_capacity(state.talks.len() + 1);
            talks.extend(state.talks.iter().cloned());
            talks.push(talk.clone());
            ClientState {
                talks: Arc::new(talks),
                ..state.clone()
            }
        }
        StoreAction::RemoveTalk { id } => {
            let Some(index) = state.talks.iter().position(|talk| talk.id == Some(*id)) else {
                return state.clone();
            };
            let mut talks = state.talks.as_ref().clone();
            talks.remove(index);
            ClientState {
                talks: Arc::new(talks),
                ..state.clone()
            }
        }
        StoreAction::SetInput { key, value } => {
            let mut draft = state.draft.as_ref().clone();
            *draft.slot(*key) = value.clone();
            ClientState {
                draft: Arc::new(draft),
                ..state.clone()
            }
        }
        StoreAction::ClearInput => ClientState {
            draft: Arc::new(Draft::default()),
            ..state.clone()
        },
        StoreAction::SetError { error } => {
            let mut errors = state.errors.as_ref().clone();
            errors.push(error.clone());
            ClientState {
                errors: Arc::new(errors),
                ..state.clone()
            }
        }
        StoreAction::ConfirmTalk { pending, confirmed } => {
            let already_present = confirmed.id.is_some()
                && state.talks.iter().any(|talk| talk.id == confirmed.id);
            let mut talks = state.talks.as_ref().clone();
            match (position_of_pending(&talks, pending), already_present) {
                (Some(index), false) => talks[index] = confirmed.clone(),
                (Some(index), true) => {
                    talks.remove(index);
                }
                (None, false) => talks.push(confirmed.clone()),
                (None, true) => return state.clone(),
            }
            ClientState {
                talks: Arc::new(talks),
                ..state.clone()
            }
        }
        StoreAction::RollbackTalk { pending } => {
            let Some(index) = position_of_pending(&state.talks, pending) else {
                return state.clone();
            };
            let mut talks = state.talks.as_ref().clone();
            talks.remove(index);
            ClientState {
                talks: Arc::new(talks),
                ..state.clone()
            }
        }
        StoreAction::Unknown => state.clone(),
    }
}

/// An applied action together with the snapshot it produced.
#[derive(Debug, Clone)]
pub struct Dispatch {
    pub action: StoreAction,
    pub state: Arc<ClientState>,
}

/// Serializes every transition behind one lock and announces each one to subscribers
/// in the order it was applied.
pub struct Store {
    current: Mutex<Arc<ClientState>>,
    dispatches: broadcast::Sender<Dispatch>,
}

impl Default for Store {
    fn default() -> Self {
        Self::new(ClientState::default())
    }
}

impl Store {
    pub fn new(initial: ClientState) -> Self {
        let (dispatches, _) = broadcast::channel(DISPATCH_CHANNEL_CAPACITY);
        Self {
            current: Mutex::new(Arc::new(initial)),
            dispatches,
        }
    }

    pub fn snapshot(&self) -> Arc<ClientState> {
        Arc::clone(&self.current.lock().unwrap_or_else(PoisonError::into_inner))
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Dispatch> {
        self.dispatches.subscribe()
    }

    pub fn dispatch(&self, action: StoreAction) -> Arc<ClientState> {
        self.dispatch_with(|_| vec![action])
    }

    /// Computes actions from the current snapshot and applies them without letting any
    /// other dispatch interleave.
    pub fn dispatch_with<F>(&self, plan: F) -> Arc<ClientState>
    where
        F: FnOnce(&ClientState) -> Vec<StoreAction>,
    {
        let mut current = self.current.lock().unwrap_or_else(PoisonError::into_inner);
        let actions = {
            let snapshot: &ClientState = &current;
            plan(snapshot)
        };
        for action in actions {
            if action == StoreAction::Unknown {
                debug!("store: ignoring unknown action");
                continue;
            }
            let next = Arc::new(reduce(&current, &action));
            debug!(
                action = action.kind(),
                talks = next.talks.len(),
                "store: applied"
            );
            *current = Arc::clone(&next);
            let _ = self.dispatches.send(Dispatch {
                action,
                state: next,
            });
        }
        Arc::clone(&current)
    }
}

#[cfg(test)]
#[path = "tests/store_tests.rs"]
mod tests;
