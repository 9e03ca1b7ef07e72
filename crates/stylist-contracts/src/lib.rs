pub mod chat;
pub mod closet;
pub mod errors;
pub mod events;
pub mod models;
pub mod transcript;
