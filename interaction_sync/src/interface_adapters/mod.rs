// Interface adapters: wire DTOs, relay endpoints and the participant-side relay client.

pub mod clients;
pub mod http;
pub mod net;
pub mod protocol;
pub mod state;
pub mod utils;
