//! Chunked batch healing with bounded concurrency.
//!
//! Items are processed in chunks of `max_concurrent`; a chunk's validations
//! run concurrently and the next chunk starts only after the previous one
//! finished, with a short pause in between to pace upstream hosts. Results
//! are written back positionally, so output order always matches input
//! order regardless of completion order inside a chunk.

use futures_util::future::join_all;
use tokio::time::sleep;

use crate::ImageHealer;
use crate::types::ImageRecord;

pub(crate) async fn heal_many<R: ImageRecord>(
    healer: &ImageHealer,
    mut items: Vec<R>,
    max_concurrent: usize,
) -> Vec<R> {
    let max_concurrent = max_concurrent.max(1);
    if items.is_empty() {
        return items;
    }

    let total_chunks = items.len().div_ceil(max_concurrent);
    for (chunk_index, chunk) in items.chunks_mut(max_concurrent).enumerate() {
        let outcomes = join_all(
            chunk
                .iter()
                .map(|item| healer.validate_and_heal(item.image_url())),
        )
        .await;
        for (item, outcome) in chunk.iter_mut().zip(outcomes) {
            item.set_image_url(outcome.url);
        }
        // Pause between chunks, not after the last one.
        if chunk_index + 1 < total_chunks {
            sleep(healer.config.chunk_delay).await;
        }
    }
    items
}

#[cfg(test)]
mod tests {
    use super::heal_many;
    use crate::types::ImageRecord;
    use crate::{HealerConfig, ImageHealer};
    use std::time::Duration;
    use tokio::time::Instant;

    #[derive(Debug, Clone)]
    struct Item {
        id: usize,
        url: Option<String>,
    }

    impl Item {
        fn new(id: usize, url: Option<&str>) -> Self {
            Self {
                id,
                url: url.map(String::from),
            }
        }
    }

    impl ImageRecord for Item {
        fn image_url(&self) -> Option<&str> {
            self.url.as_deref()
        }

        fn set_image_url(&mut self, url: String) {
            self.url = Some(url);
        }
    }

    fn healer() -> ImageHealer {
        ImageHealer::new(HealerConfig {
            chunk_delay_ms: Some(1),
            ..HealerConfig::default()
        })
    }

    // Every URL here short-circuits before any network I/O: blocked
    // literals, local placeholders, and missing values.
    fn hermetic_items(count: usize) -> Vec<Item> {
        (0..count)
            .map(|id| match id % 3 {
                0 => Item::new(id, Some("http://10.0.0.1/internal.png")),
                1 => Item::new(id, Some("/api/placeholder/150/150")),
                _ => Item::new(id, None),
            })
            .collect()
    }

    #[tokio::test]
    async fn preserves_length_and_order() {
        let healed = heal_many(&healer(), hermetic_items(12), 5).await;
        assert_eq!(healed.len(), 12);
        for (position, item) in healed.iter().enumerate() {
            assert_eq!(item.id, position);
        }
    }

    #[tokio::test]
    async fn writes_back_through_the_record_trait() {
        let healed = heal_many(&healer(), hermetic_items(6), 2).await;
        for item in &healed {
            match item.id % 3 {
                // Trusted local URLs pass through untouched.
                1 => assert_eq!(item.url.as_deref(), Some("/api/placeholder/150/150")),
                // Blocked literals and missing values become the placeholder.
                _ => assert_eq!(item.url.as_deref(), Some("/api/placeholder/300/200")),
            }
        }
    }

    // Paused clock: elapsed time is exactly the sum of the sleeps, so the
    // pacing invariant is assertable without wall-clock tolerance.
    #[tokio::test(start_paused = true)]
    async fn delays_between_chunks_but_not_after_the_last() {
        let healer = ImageHealer::new(HealerConfig {
            chunk_delay_ms: Some(120),
            ..HealerConfig::default()
        });
        let start = Instant::now();
        // 5 items in chunks of 2 -> three chunks, two pauses.
        let healed = heal_many(&healer, hermetic_items(5), 2).await;
        assert_eq!(healed.len(), 5);
        // A pause after the final chunk would read 360 here.
        assert_eq!(start.elapsed(), Duration::from_millis(240));
    }

    #[tokio::test]
    async fn zero_concurrency_clamps_instead_of_stalling() {
        let healed = heal_many(&healer(), hermetic_items(3), 0).await;
        assert_eq!(healed.len(), 3);
    }

    #[tokio::test]
    async fn empty_batch_is_a_no_op() {
        let healed = heal_many(&healer(), Vec::<Item>::new(), 5).await;
        assert!(healed.is_empty());
    }
}
