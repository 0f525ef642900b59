//! Client-side synchronization of the talk list: an immutable-snapshot store, the
//! remote talk contract, and the controller that reconciles the two.

pub mod controller;
pub mod error;
pub mod protocol_client;
pub mod store;
pub mod transport;

pub use controller::{ControllerConfig, DeleteOutcome, SubmitOutcome, SyncController};
pub use error::RemoteError;
pub use protocol_client::HttpTalkApi;
pub use store::{
    reduce, ClientState, Dispatch, Draft, DraftField, ErrorRecord, Store, StoreAction,
    SyncOperation,
};
pub use transport::{TalkApi, TalkStream};
