//! Core types for the Gur controller

pub mod envelope;
pub mod trial_record;
