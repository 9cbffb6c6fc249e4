//! Data persistence components.

pub mod storage;
