//! Sequential batch processing with per-item failure isolation.
//!
//! [`run_batch`] walks the inputs in order, hands each one to a transform,
//! and records the outcome. A failing (or panicking) transform becomes a
//! [`ItemResult::Failure`] at that position; the batch keeps going.
//!
//! ## Progress contract
//!
//! For `n` inputs the sink sees exactly:
//!
//! ```text
//! (0, Some(n))            primed before the first item
//! (1, Some(n)) … (n, Some(n))   once per finished item
//! (n, None)               batch finished, back to "not running"
//! ```
//!
//! ## Cancellation
//!
//! The token is checked before each item and again after its transform
//! returns. Once cancellation is observed nothing else runs, the sink is not
//! called again, and the caller gets `Err(Cancelled)` instead of a partial
//! result list.

use std::any::Any;
use std::panic::{AssertUnwindSafe, catch_unwind};

use crate::task::CancelToken;
use crate::types::{BatchProgress, Cancelled, InputRef, ItemError, ItemResult};

/// Process `inputs` in order.
///
/// `transform` receives the input and its 1-based sequence number (used for
/// output naming). `progress` receives the running counters described in the
/// [module docs](self).
pub fn run_batch<T, F, P>(
    inputs: &[InputRef],
    token: &CancelToken,
    mut transform: F,
    mut progress: P,
) -> Result<Vec<ItemResult<T>>, Cancelled>
where
    F: FnMut(&InputRef, usize) -> Result<T, ItemError>,
    P: FnMut(BatchProgress),
{
    token.check()?;
    let total = inputs.len();
    progress(BatchProgress::started(total));

    let mut results = Vec::with_capacity(total);
    for (index, input) in inputs.iter().enumerate() {
        token.check()?;

        let outcome = catch_unwind(AssertUnwindSafe(|| transform(input, index + 1)));
        token.check()?;

        let result = match outcome {
            Ok(result) => ItemResult::from(result),
            Err(payload) => ItemResult::Failure(ItemError::Panicked(panic_message(&*payload))),
        };
        if let ItemResult::Failure(err) = &result {
            tracing::warn!(input = %input, "item failed: {err}");
        }
        results.push(result);

        progress(BatchProgress {
            completed: index + 1,
            total: Some(total),
        });
    }

    progress(BatchProgress {
        completed: total,
        total: None,
    });
    Ok(results)
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::BatchSummary;
    use std::path::PathBuf;

    fn inputs(names: &[&str]) -> Vec<InputRef> {
        names.iter().map(|n| InputRef::from(*n)).collect()
    }

    fn ok_transform(input: &InputRef, _seq: usize) -> Result<PathBuf, ItemError> {
        Ok(PathBuf::from(format!("out/{}", input.file_name())))
    }

    #[test]
    fn all_successes_in_order_with_increasing_progress() {
        let items = inputs(&["a.jpg", "b.jpg", "c.jpg", "d.jpg"]);
        let mut seen = Vec::new();
        let results = run_batch(&items, &CancelToken::new(), ok_transform, |p| seen.push(p)).unwrap();

        assert_eq!(results.len(), 4);
        for (result, input) in results.iter().zip(&items) {
            assert_eq!(
                result.success(),
                Some(&PathBuf::from(format!("out/{}", input.file_name())))
            );
        }

        let completed: Vec<usize> = seen[1..5].iter().map(|p| p.completed).collect();
        assert_eq!(completed, vec![1, 2, 3, 4]);
        assert_eq!(seen[0], BatchProgress::started(4));
        assert_eq!(
            seen.last(),
            Some(&BatchProgress {
                completed: 4,
                total: None
            })
        );
        assert_eq!(seen.len(), 6);
    }

    #[test]
    fn failure_is_isolated_to_its_position() {
        let items = inputs(&["a.jpg", "b.jpg", "c.jpg"]);
        let results = run_batch(
            &items,
            &CancelToken::new(),
            |input, seq| {
                if seq == 2 {
                    Err(ItemError::Decode(input.to_string()))
                } else {
                    ok_transform(input, seq)
                }
            },
            |_| {},
        )
        .unwrap();

        assert!(results[0].is_success());
        assert_eq!(results[1].failure(), Some(&ItemError::Decode("b.jpg".into())));
        assert!(results[2].is_success());
        assert_eq!(BatchSummary::from_results(&results).to_string(), "2 succeeded, 1 failed");
    }

    #[test]
    fn panic_becomes_failure_and_batch_continues() {
        let items = inputs(&["a.jpg", "b.jpg"]);
        let results = run_batch(
            &items,
            &CancelToken::new(),
            |input, seq| {
                if seq == 1 {
                    panic!("decoder exploded");
                }
                ok_transform(input, seq)
            },
            |_| {},
        )
        .unwrap();

        assert_eq!(
            results[0].failure(),
            Some(&ItemError::Panicked("decoder exploded".into()))
        );
        assert!(results[1].is_success());
    }

    #[test]
    fn sequence_numbers_are_one_based() {
        let items = inputs(&["a", "b", "c"]);
        let mut seqs = Vec::new();
        run_batch(
            &items,
            &CancelToken::new(),
            |_, seq| {
                seqs.push(seq);
                Ok(())
            },
            |_| {},
        )
        .unwrap();
        assert_eq!(seqs, vec![1, 2, 3]);
    }

    #[test]
    fn cancellation_mid_batch_stops_processing_and_progress() {
        let items = inputs(&["a", "b", "c", "d"]);
        let token = CancelToken::new();
        let mut processed = 0;
        let mut seen = Vec::new();

        let result = run_batch(
            &items,
            &token,
            |input, seq| {
                processed += 1;
                if seq == 2 {
                    token.cancel();
                }
                ok_transform(input, seq)
            },
            |p| seen.push(p),
        );

        assert_eq!(result, Err(Cancelled));
        assert_eq!(processed, 2);
        // primed + item 1 only; item 2 finished after the cancel request
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[1].completed, 1);
    }

    #[test]
    fn already_cancelled_token_runs_nothing() {
        let token = CancelToken::new();
        token.cancel();
        let mut calls = 0;
        let result = run_batch(
            &inputs(&["a"]),
            &token,
            |input, seq| ok_transform(input, seq),
            |_| calls += 1,
        );
        assert_eq!(result, Err(Cancelled));
        assert_eq!(calls, 0);
    }

    #[test]
    fn empty_batch_primes_and_finishes() {
        let mut seen = Vec::new();
        let results = run_batch::<PathBuf, _, _>(&[], &CancelToken::new(), ok_transform, |p| seen.push(p))
            .unwrap();
        assert!(results.is_empty());
        assert_eq!(seen, vec![BatchProgress::started(0), BatchProgress::IDLE]);
    }
}
