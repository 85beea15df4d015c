pub mod clip;
pub mod ema;
pub mod init;
pub mod metrics;
