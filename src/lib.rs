//! Vigil Console Library
//!
//! Client-side session controller for a live weapon-detection viewing page
//!
//! ## Architecture (6 Components)
//!
//! 1. AlertStore - Detection board and novelty watermark
//! 2. AlertFetcher - Recent-alert HTTP reads
//! 3. AlertPoller - Recurring fetch loop
//! 4. StreamGateway - Backend start/stop adapter
//! 5. StreamSession - Viewing session state machine
//! 6. PresentationHub - Renderer-facing event distribution
//!
//! ## Design Principles
//!
//! - Owned state: every component is an instance, no ambient globals
//! - Single responsibility per module
//! - No failure is fatal: every error path lands in a re-enterable state

pub mod alert_fetcher;
pub mod alert_poller;
pub mod alert_store;
pub mod error;
pub mod presentation_hub;
pub mod state;
pub mod stream_gateway;
pub mod stream_session;

pub use error::{Error, Result};
pub use state::{ConsoleConfig, ConsoleState};
