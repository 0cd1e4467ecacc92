// ============================================================================
// Topic Pattern Matching
// ============================================================================
//
// AMQP-style binding patterns over dot-separated routing keys:
// - `*` matches exactly one segment
// - `#` matches zero or more segments
//
// `order.*` matches `order.created` but not `order.payment.failed`;
// `shipping.#` matches `shipping.arranged` and `shipping.label.printed`.
//
// ============================================================================

/// Does `pattern` match `routing_key`?
pub fn matches(pattern: &str, routing_key: &str) -> bool {
    let pattern: Vec<&str> = pattern.split('.').collect();
    let key: Vec<&str> = routing_key.split('.').collect();
    matches_segments(&pattern, &key)
}

fn matches_segments(pattern: &[&str], key: &[&str]) -> bool {
    match pattern.split_first() {
        None => key.is_empty(),
        Some((&"#", rest)) => {
            // `#` may swallow zero segments or one-and-recurse
            matches_segments(rest, key)
                || (!key.is_empty() && matches_segments(pattern, &key[1..]))
        }
        Some((&segment, rest)) => match key.split_first() {
            Some((&head, tail)) if segment == "*" || segment == head => {
                matches_segments(rest, tail)
            }
            _ => false,
        },
    }
}
