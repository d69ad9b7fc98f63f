pub mod api_log;
pub mod file_config;
pub mod group;
pub mod health;
pub mod host;
pub mod host_key;
pub mod host_log;
pub mod inventory;
pub mod schema;
pub mod session;
pub mod user;

pub use api_log::NewApiLogEntry;
pub use file_config::{HostFileConfig, NewHostFileConfig};
pub use group::Group;
pub use health::{HostHealthData, UpsertHealthData};
pub use host::{Host, NewHost, UpdateHost};
pub use host_key::HostKey;
pub use host_log::{HostLog, LogFilter, LogPage, NewHostLog};
pub use inventory::Inventory;
pub use session::Session;
pub use user::{NewUser, UpdateUser, User, UserRole};
