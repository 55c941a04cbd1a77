pub mod chat_task;
pub mod focus_task;
pub mod profile_task;
pub mod protocol;
pub mod rest;
pub mod state;
pub mod ws_handler;

#[cfg(test)]
pub mod testing;

// Re-export the handlers to make them easily accessible to the binary that
// will build the web server router.
pub use rest::{
    get_focus_handler, get_profile_handler, list_focus_areas_handler, reset_profile_handler,
    resolve_signs_handler, select_focus_handler, update_profile_handler, validate_place_handler,
};
pub use ws_handler::chat_ws_handler;
