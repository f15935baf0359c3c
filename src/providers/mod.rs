pub mod discord;
pub mod ivao;
