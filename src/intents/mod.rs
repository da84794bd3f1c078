//! Entry and Exit Intent Pipelines (spec §4.5, §4.6): turning a consumed
//! delivery into a trade, and a detected exit condition into a closed
//! trade, both through a validate -> size/detect -> approve -> place ->
//! reconcile sequence.

pub mod entry;
pub mod exit;
pub mod sizing;

pub use entry::TradeIntentInput;
pub use exit::ExitDetection;
