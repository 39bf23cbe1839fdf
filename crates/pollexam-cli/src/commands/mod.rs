pub mod import;
pub mod init;
pub mod preset;
pub mod serve;
pub mod simulate;
pub mod status;
pub mod template;
pub mod validate;
