//! Round-robin allocation of recipients to senders.

use crate::error::{OutreachError, OutreachResult};

/// Partition `recipients` into `sender_count` buckets; position `i` lands in bucket
/// `i % sender_count`, keeping input order within each bucket.
///
/// Every bucket index in `0..sender_count` is present in the result, possibly empty.
/// Items are returned with their original position so outcomes can be traced back.
pub fn allocate<T>(recipients: Vec<T>, sender_count: usize) -> OutreachResult<Vec<Vec<(usize, T)>>> {
    if sender_count == 0 {
        return Err(OutreachError::configuration(
            "cannot allocate recipients: the sender pool is empty",
        ));
    }

    let mut buckets: Vec<Vec<(usize, T)>> = (0..sender_count)
        .map(|_| Vec::with_capacity(recipients.len() / sender_count + 1))
        .collect();

    for (position, recipient) in recipients.into_iter().enumerate() {
        buckets[position % sender_count].push((position, recipient));
    }

    Ok(buckets)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn values<T: Clone>(bucket: &[(usize, T)]) -> Vec<T> {
        bucket.iter().map(|(_, v)| v.clone()).collect()
    }

    #[test]
    fn test_five_recipients_two_senders() {
        let buckets = allocate(vec!["a", "b", "c", "d", "e"], 2).unwrap();
        assert_eq!(buckets.len(), 2);
        assert_eq!(values(&buckets[0]), vec!["a", "c", "e"]);
        assert_eq!(values(&buckets[1]), vec!["b", "d"]);
    }

    #[test]
    fn test_bucket_is_position_mod_sender_count() {
        for sender_count in 1..=6 {
            let buckets = allocate((0..23).collect::<Vec<usize>>(), sender_count).unwrap();
            assert_eq!(buckets.len(), sender_count);

            let mut seen = Vec::new();
            for (bucket_index, bucket) in buckets.iter().enumerate() {
                for (position, value) in bucket {
                    assert_eq!(position, value);
                    assert_eq!(position % sender_count, bucket_index);
                    seen.push(*position);
                }
                assert!(bucket.windows(2).all(|w| w[0].0 < w[1].0));
            }
            seen.sort_unstable();
            assert_eq!(seen, (0..23).collect::<Vec<_>>());
        }
    }

    #[test]
    fn test_more_senders_than_recipients_leaves_empty_buckets() {
        let buckets = allocate(vec!["a"], 4).unwrap();
        assert_eq!(buckets.len(), 4);
        assert_eq!(buckets[0].len(), 1);
        assert!(buckets[1..].iter().all(Vec::is_empty));
    }

    #[test]
    fn test_zero_senders_is_configuration_error() {
        let err = allocate(vec!["a"], 0).unwrap_err();
        assert!(matches!(err, OutreachError::Configuration(_)));
    }

    #[test]
    fn test_allocation_is_deterministic() {
        let input = vec!["x", "y", "z", "w"];
        assert_eq!(
            allocate(input.clone(), 3).unwrap(),
            allocate(input, 3).unwrap()
        );
    }
}
