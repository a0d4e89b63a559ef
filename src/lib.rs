pub mod account;
pub mod actions;
pub mod backend;
pub mod billing;
pub mod cli;
pub mod config;
pub mod error;
pub mod web;
