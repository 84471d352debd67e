//! Property-based tests for core components using proptest.

use proptest::prelude::*;

use papersum_core::extract::{extract, render_sections};
use papersum_core::providers::RateLimiter;
use papersum_core::providers::rate_limiter::WINDOW;
use papersum_core::types::SynthesisResult;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

fn paused_runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .start_paused(true)
        .build()
        .unwrap()
}

// --- Rate limiter properties ---

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn limiter_never_exceeds_window_budget(
        limit in 1usize..6,
        gaps_ms in prop::collection::vec(0u64..40_000, 1..30),
    ) {
        let admitted = paused_runtime().block_on(async {
            let limiter = RateLimiter::new(limit);
            let mut times = Vec::with_capacity(gaps_ms.len());
            for gap in &gaps_ms {
                tokio::time::sleep(Duration::from_millis(*gap)).await;
                times.push(limiter.admit().await);
            }
            times
        });

        // Admission times are monotonic and any `limit + 1` consecutive
        // admissions span at least a full window.
        for pair in admitted.windows(2) {
            prop_assert!(pair[0] <= pair[1]);
        }
        for span in admitted.windows(limit + 1) {
            prop_assert!(span[limit].duration_since(span[0]) >= WINDOW);
        }
    }

    #[test]
    fn limiter_concurrent_callers_never_exceed_budget(
        limit in 1usize..5,
        callers in 1usize..15,
    ) {
        let admitted = paused_runtime().block_on(async {
            let limiter = Arc::new(RateLimiter::new(limit));
            let start = Instant::now();
            let handles: Vec<_> = (0..callers)
                .map(|_| {
                    let limiter = limiter.clone();
                    tokio::spawn(async move { limiter.admit().await })
                })
                .collect();
            let mut times = Vec::with_capacity(callers);
            for handle in handles {
                times.push(handle.await.unwrap().duration_since(start));
            }
            times.sort();
            times
        });

        for span in admitted.windows(limit + 1) {
            prop_assert!(span[limit] - span[0] >= WINDOW);
        }
        // Unthrottled callers are admitted immediately.
        prop_assert!(admitted.iter().take(limit).all(|t| t.is_zero()));
    }
}

// --- Extraction properties ---

fn field_text() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9 ,.]{9,80}[a-z0-9.]"
}

proptest! {
    #[test]
    fn canonical_layout_round_trips(
        beginner_title in field_text(),
        intermediate_title in field_text(),
        beginner_overview in field_text(),
        intermediate_overview in field_text(),
        beginner_summary in field_text(),
        intermediate_summary in field_text(),
    ) {
        let result = SynthesisResult {
            beginner_title,
            intermediate_title,
            beginner_overview,
            intermediate_overview,
            beginner_summary,
            intermediate_summary,
        };
        prop_assert_eq!(extract(&render_sections(&result)), Some(result));
    }

    #[test]
    fn extraction_never_panics(text in "\\PC{0,400}") {
        let _ = extract(&text);
    }

    #[test]
    fn extracted_fields_meet_minimum_length(
        lines in prop::collection::vec(
            "(BEGINNER|INTERMEDIATE)_(TITLE|OVERVIEW|SUMMARY): [a-z ]{0,20}",
            1..14,
        ),
    ) {
        if let Some(result) = extract(&lines.join("\n")) {
            for field in papersum_core::types::SummaryField::ALL {
                prop_assert!(result.get(field).chars().count() >= 10);
            }
        }
    }
}
