pub mod daemon;
pub mod init;
pub mod stability;
pub mod status;
