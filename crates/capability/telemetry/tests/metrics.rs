use cfx_telemetry::{
    metrics, record_envelope_published, record_heartbeat_sent, record_row_skipped,
};

#[test]
fn counters_accumulate_into_snapshot() {
    let before = metrics().snapshot();
    record_envelope_published();
    record_envelope_published();
    record_row_skipped();
    record_heartbeat_sent();
    let after = metrics().snapshot();

    assert_eq!(after.envelopes_published - before.envelopes_published, 2);
    assert_eq!(after.rows_skipped - before.rows_skipped, 1);
    assert_eq!(after.heartbeats_sent - before.heartbeats_sent, 1);
}
