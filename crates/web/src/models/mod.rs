//! Types stored in the server-side session.

pub mod flash;
pub mod session;

pub use flash::{Flash, FlashKind, push_flash, take_flashes};
pub use session::keys as session_keys;
