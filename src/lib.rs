// ABOUTME: Library crate for replwatch exposing the session stack, client, poller and CLI

#![allow(missing_docs)]

pub mod cli;
pub mod client;
pub mod config;
pub mod poller;
pub mod session;
pub mod transport;
