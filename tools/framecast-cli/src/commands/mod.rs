pub mod check;
pub mod export;
pub mod init;
pub mod trim;
pub mod validate;
