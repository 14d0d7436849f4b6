// Domain layer: duel rules, independent of transport and runtime.

pub mod clock;
pub mod entities;
pub mod errors;
pub mod hints;
pub mod ledger;
pub mod ports;
pub mod scoring;
pub mod session;

pub use clock::{ClockSample, RoundClock};
pub use entities::{FinalScore, HINT_QUOTA, Item, PlayerId, ROUND_COUNT, Round, SessionId};
pub use errors::DuelError;
pub use session::{DuelSession, GuessReceipt, HintReveal, RehydratedState, Transition};
