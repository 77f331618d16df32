// Library interface for the aletheia relay
// This allows tests and the binary to import modules

pub mod backend;
pub mod card;
pub mod relay;
pub mod telegram;
pub mod whatsapp;
