//! The cloud riddle web app: page-state machine, caption parsing, vision
//! client and the axum front end.

pub mod emoji;
pub mod extract;
pub mod pages;
pub mod session;
pub mod vision;
pub mod web;
