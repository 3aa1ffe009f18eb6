pub fn generate_starter_config() -> String {
    r#"# =============================================================================
# TXORDER CONFIGURATION
# =============================================================================
# Config file locations (in order of precedence):
#   1. Path specified via --config argument
#   2. ~/.config/txorder/config.yml
#   3. /etc/txorder/config.yml
#
# Any value may reference an environment variable with $env{VAR_NAME}.

# Channel this node orders for. Used to label block fill metrics.
channel_id: mychannel

# =============================================================================
# SEQUENCE
# =============================================================================
# How a transaction id maps to its position in the delivery order.

sequence:
  # Regex with a named capture group 'seq' holding a decimal integer
  pattern: '^(?P<seq>\d+)$'
  # Malformed transaction ids: 'reject', 'drop', or 'zero' (treat as sequence 0)
  on_parse_error: reject
  # Same sequence pushed twice before release: 'reject' or 'overwrite'
  on_duplicate: reject

# =============================================================================
# ORDERER
# =============================================================================
# Block cutting. A batch is cut when adding the next transaction would exceed
# preferred_max_bytes, when it holds max_message_count transactions, or when
# batch_timeout has passed since its first transaction arrived. A single
# transaction larger than preferred_max_bytes forms a batch of its own.

orderer:
  batch_size:
    preferred_max_bytes: 524288
    max_message_count: 10
  batch_timeout: 2s
  channel_capacity: 1000

# =============================================================================
# DISPATCHER
# =============================================================================
# Ordered one-at-a-time release, used by 'txorder dispatch'. Producers never
# wait on the consumer; when more than high_water_mark envelopes are waiting a
# warning is logged.

dispatcher:
  queue_capacity: 100000
  signal_capacity: 100000
  high_water_mark: 50000
"#
    .to_string()
}
