//! HTTP request handlers.

pub mod admin;
pub mod entries;
pub mod list;
pub mod upload;

pub use admin::{health_check, init_tenant};
pub use entries::{create_entry, delete_entry, get_entry, update_entry};
pub use list::list_entries;
pub use upload::upload_entries;
