//! Message shapes passed between live-pipeline stages.

use crate::chain::ws::WsLog;
use crate::record::EnrichedRecord;

/// What the listener hands to the processor: a log tagged with the
/// internal subscription id it arrived on.
#[derive(Debug, Clone)]
pub struct ListenerOutput {
    pub subscription_id: u64,
    pub event_log: WsLog,
}

/// What the processor hands to the writer.
#[derive(Debug, Clone)]
pub struct ProcessorOutput {
    pub subscription_id: u64,
    pub record: EnrichedRecord,
}
