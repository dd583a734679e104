pub mod collate;
pub mod command;
pub mod info;
pub mod stream;
