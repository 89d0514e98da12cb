pub mod auth;
pub mod config;
pub mod events;
pub mod fb;
pub mod fetch;
pub mod photos;
pub mod render;
pub mod tasks {
    pub mod lister;
    pub mod rotation;
}
