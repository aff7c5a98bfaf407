//! The Elm Architecture (TEA) implementation for the hive dashboard.
//!
//! - `Model`: pure dashboard state
//! - `Message`: inputs to the update function
//! - `Command`: side effects returned by the update function
//! - `update`: the only place the model changes

pub mod command;
pub mod message;
pub mod model;
pub mod update;

pub use command::{AttachTarget, Command};
pub use message::Message;
pub use model::{Model, Notification, NotificationLevel};
pub use update::update;
