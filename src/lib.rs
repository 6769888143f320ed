//! exonchat: conversation engine for a website chat widget.

pub mod agent;
pub mod auth;
pub mod backend;
pub mod cli;
pub mod config;
pub mod error;
pub mod flow;
pub mod render;
pub mod schedule;
pub mod session;
pub mod transport;
pub mod widget;
