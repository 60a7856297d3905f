//! Shared helpers for the integration test suite.
//!
//! Everything runs against the in-memory store and mock channel adapters;
//! no database or provider credentials are required.
#![allow(dead_code)] // each test binary uses a different subset

pub mod builders;
pub mod mock_adapter;
