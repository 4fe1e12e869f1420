//! Astro Assist: conversational astrology assistant.

pub mod admin;
pub mod channels;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod gateways;
pub mod history;
pub mod http;
pub mod llm;
pub mod onboarding;
pub mod presence;
pub mod queue;
pub mod store;
pub mod worker;

#[cfg(test)]
mod testing;
