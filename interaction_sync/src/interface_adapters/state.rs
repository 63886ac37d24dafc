use crate::use_cases::SessionHandle;

#[derive(Clone)]
pub struct AppState {
    // Channels into the host session task.
    pub session: SessionHandle,
}
