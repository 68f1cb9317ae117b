pub mod battle;
pub mod events;
pub mod health;
