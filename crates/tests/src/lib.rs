//! Cross-crate integration tests for the Cadenza controller

#[cfg(test)]
mod controller_integration;
