pub mod args;
pub mod connect;
pub mod logging;
pub mod output;
pub mod provision;
