pub mod upstart;
pub mod watch;
