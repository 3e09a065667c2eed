use lib_common::core::{DispatcherHandle, DropzoneState};
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    // Every source and the listener registry
    pub dropzone: Arc<DropzoneState>,
    // Command queue of the update dispatcher
    pub dispatcher: DispatcherHandle,
}

impl AppState {
    pub fn new(dropzone: Arc<DropzoneState>, dispatcher: DispatcherHandle) -> Self {
        Self { dropzone, dispatcher }
    }
}
