//! Upstream gateways. Each wraps one unreliable dependency and owns its
//! failure policy so callers never see a raw transport error.

pub mod generation;
pub mod memory;
pub mod prediction;

pub use generation::{
    sanitize_reply, strip_deliberation, truncate_at_sentence, GenerationGateway, APOLOGY,
};
pub use memory::{HttpMemoryGateway, MemoryGateway};
pub use prediction::{
    HoroscopePeriod, HttpPredictionGateway, LifeArea, OutlookPeriod, PredictionGateway,
    PredictionQuery,
};
