//! Stream/recording controller using the Actor pattern.
//!
//! One controller runs per mounted view. It subscribes to the view's topics
//! through the router, folds pushed events into a [`ViewState`], issues
//! recording and playback commands against a [`RecordingApi`], and publishes
//! a [`StreamView`] snapshot after every change.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────┐ ControllerCommand ┌─────────────────┐  spawn  ┌──────────────┐
//! │ StreamController │──────────────────▶│ ControllerActor │────────▶│ RecordingApi │
//! └──────────────────┘                   └─────────────────┘◀────────└──────────────┘
//!          ▲                               ▲       │        Completion
//!          │ watch<StreamView>             │       │
//!          └───────────────────────────────┼───────┘
//!                                RoutedEvent (router)
//! ```
//!
//! Server objects always replace mirrors wholesale. Socket events and REST
//! replies are applied in the order the actor sees them, so whichever
//! arrives last wins.
//!
//! # Panic-Free Guarantees
//!
//! All operations in this module follow the panic-free policy:
//! - No `.unwrap()` or `.expect()` in production code
//! - Late REST results are dropped, never applied to a closed view
//! - Channel operations handle closure gracefully

use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tracing::{debug, warn};

use crate::api::RecordingApi;
use crate::channel::ChannelSpec;
use crate::error::Result;
use crate::router::RouterHandle;

mod actor;
mod commands;
mod handle;
mod view;

pub use actor::ControllerActor;
pub use commands::{Completion, ControllerCommand};
pub use handle::StreamController;
pub use view::{DeleteToken, StreamTarget, StreamView, ViewPhase, ViewState};

/// Mounts a view of `target` streamed over the channel `spec` describes.
///
/// Subscribes to the session topic, plus the task topic when the target
/// names a task, through a single subscription so that events keep their
/// socket order. The session's recordings are loaded before the controller
/// actor starts; a failed listing is logged and the view starts empty.
///
/// # Errors
///
/// Returns `ControllerError::Router` if the router has stopped.
pub async fn mount(
    target: StreamTarget,
    spec: ChannelSpec,
    router: RouterHandle,
    api: Arc<dyn RecordingApi>,
) -> Result<StreamController> {
    let subscription = router.subscribe_all(spec, target.topics()).await?;

    let mut state = ViewState::new(target);
    match api.list_recordings(Some(&state.target().session_id)).await {
        Ok(recordings) => {
            debug!(count = recordings.len(), "Recordings loaded");
            state.replace_recordings(recordings);
        }
        Err(e) => warn!(view = %state.target(), error = %e, "Failed to load recordings"),
    }

    let (view_tx, view_rx) = watch::channel(state.snapshot());
    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();

    let actor = ControllerActor::new(state, api, router, subscription, cmd_rx, view_tx);
    tokio::spawn(actor.run());

    Ok(StreamController::new(cmd_tx, view_rx))
}
