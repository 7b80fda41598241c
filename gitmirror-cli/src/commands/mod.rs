pub mod init;
pub mod logs;
pub mod serve;
pub mod status;
pub mod sync;
