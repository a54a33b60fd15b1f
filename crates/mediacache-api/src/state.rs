//! Application state shared by every handler.

use mediacache_services::MediaServer;

pub struct AppState {
    pub media: MediaServer,
}

impl AppState {
    pub fn new(media: MediaServer) -> Self {
        Self { media }
    }
}
