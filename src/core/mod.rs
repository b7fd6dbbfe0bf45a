pub mod catalog;
pub mod config;
pub mod executions;
pub mod form;
pub mod gateway;
pub mod ids;
pub mod poller;
pub mod session;
pub mod terminal;
