// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

pub mod config;
pub mod credential;
pub mod error;
pub mod run;
#[cfg(test)]
pub mod test_support;

pub use run::run;
