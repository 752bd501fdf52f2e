//! Engine metrics

use prometheus::{
    register_int_counter, register_int_counter_vec, IntCounter, IntCounterVec,
};

lazy_static::lazy_static! {
    pub static ref SYNC_CYCLES_TOTAL: IntCounter = register_int_counter!(
        "recon_sync_cycles_total",
        "Completed sync cycles"
    )
    .unwrap();

    pub static ref SYNC_CYCLES_SKIPPED: IntCounter = register_int_counter!(
        "recon_sync_cycles_skipped_total",
        "Cycles skipped because the previous cycle overran its deadline"
    )
    .unwrap();

    pub static ref SYNC_ERRORS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "recon_sync_errors_total",
        "Source sync failures",
        &["source"]
    )
    .unwrap();

    pub static ref RECORDS_UPSERTED_TOTAL: IntCounterVec = register_int_counter_vec!(
        "recon_records_upserted_total",
        "Reconciliation rows written, by leg",
        &["leg"]
    )
    .unwrap();

    pub static ref RECORDS_SKIPPED_TOTAL: IntCounterVec = register_int_counter_vec!(
        "recon_records_skipped_total",
        "Source records dropped as undecodable",
        &["source"]
    )
    .unwrap();

    pub static ref AUTO_LINKS_TOTAL: IntCounter = register_int_counter!(
        "recon_lump_sum_auto_links_total",
        "Received payments auto-linked to remittance emails"
    )
    .unwrap();
}
