// Proximity clustering of text observations into dialogue bubbles

use tracing::debug;

use crate::core::types::{BubbleCluster, Rect, TextObservation};

/// Threshold used when there is nothing to take a median from
const DEFAULT_THRESHOLD: f32 = 20.0;

#[derive(Debug, Clone, Copy, Default)]
pub struct BubbleClusterer;

impl BubbleClusterer {
    pub fn new() -> Self {
        Self
    }

    /// 2× the median observation height (upper median for even counts)
    pub fn adaptive_threshold(observations: &[TextObservation]) -> f32 {
        if observations.is_empty() {
            return DEFAULT_THRESHOLD;
        }
        let mut heights: Vec<f32> = observations.iter().map(|o| o.bbox.height).collect();
        heights.sort_by(f32::total_cmp);
        heights[heights.len() / 2] * 2.0
    }

    pub fn cluster(&self, observations: Vec<TextObservation>) -> Vec<BubbleCluster> {
        let threshold = Self::adaptive_threshold(&observations);
        self.cluster_with_threshold(observations, threshold)
    }

    /// Merge clusters while any pair sits strictly closer than `threshold`.
    ///
    /// Output order is unspecified and `index` is left at 0.
    pub fn cluster_with_threshold(
        &self,
        observations: Vec<TextObservation>,
        threshold: f32,
    ) -> Vec<BubbleCluster> {
        if observations.is_empty() {
            return Vec::new();
        }
        let input_count = observations.len();

        let mut groups: Vec<(Rect, Vec<TextObservation>)> = observations
            .into_iter()
            .map(|o| (o.bbox, vec![o]))
            .collect();

        let mut merged = true;
        while merged {
            merged = false;
            let mut i = 0;
            while i < groups.len() {
                let mut j = i + 1;
                while j < groups.len() {
                    if groups[i].0.edge_distance(&groups[j].0) < threshold {
                        let (rect, members) = groups.swap_remove(j);
                        groups[i].0 = groups[i].0.union(&rect);
                        groups[i].1.extend(members);
                        merged = true;
                    } else {
                        j += 1;
                    }
                }
                i += 1;
            }
        }

        debug!(
            "Clustered {} observations into {} bubbles (threshold {:.1})",
            input_count,
            groups.len(),
            threshold
        );

        groups
            .into_iter()
            .map(|(bbox, mut members)| {
                members.sort_by(|a, b| a.bbox.y.total_cmp(&b.bbox.y));
                let text = members
                    .iter()
                    .map(|o| o.text.as_str())
                    .collect::<Vec<_>>()
                    .join(" ");
                BubbleCluster::new(bbox, text, members)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn obs(x: f32, y: f32, w: f32, h: f32, text: &str) -> TextObservation {
        TextObservation {
            bbox: Rect::new(x, y, w, h),
            text: text.to_string(),
            confidence: 0.9,
        }
    }

    #[test]
    fn test_adaptive_threshold() {
        assert_eq!(BubbleClusterer::adaptive_threshold(&[]), 20.0);
        let observations = vec![
            obs(0.0, 0.0, 10.0, 30.0, "a"),
            obs(0.0, 0.0, 10.0, 10.0, "b"),
            obs(0.0, 0.0, 10.0, 20.0, "c"),
        ];
        assert_eq!(BubbleClusterer::adaptive_threshold(&observations), 40.0);
    }

    #[test]
    fn test_merge_requires_distance_strictly_below_threshold() {
        let clusterer = BubbleClusterer::new();
        let observations = vec![
            obs(0.0, 0.0, 50.0, 20.0, "top"),
            obs(0.0, 25.0, 50.0, 20.0, "middle"),
            // gap of exactly 40 to the middle line
            obs(0.0, 85.0, 50.0, 20.0, "bottom"),
        ];
        let clusters = clusterer.cluster_with_threshold(observations, 40.0);
        assert_eq!(clusters.len(), 2);

        let merged = clusters.iter().find(|c| c.observations.len() == 2).unwrap();
        assert_eq!(merged.text, "top middle");
        assert_eq!(merged.bbox, Rect::new(0.0, 0.0, 50.0, 45.0));

        let observations = vec![
            obs(0.0, 0.0, 50.0, 20.0, "top"),
            obs(0.0, 25.0, 50.0, 20.0, "middle"),
            obs(0.0, 84.0, 50.0, 20.0, "bottom"),
        ];
        assert_eq!(clusterer.cluster_with_threshold(observations, 40.0).len(), 1);
    }

    #[test]
    fn test_text_joined_top_first_regardless_of_input_order() {
        let clusters = BubbleClusterer::new().cluster(vec![
            obs(0.0, 30.0, 40.0, 20.0, "second"),
            obs(0.0, 0.0, 40.0, 20.0, "first"),
        ]);
        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0].text, "first second");
    }

    #[test]
    fn test_partition_keeps_every_observation() {
        let observations: Vec<_> = (0..12)
            .map(|i| {
                let col = (i % 4) as f32;
                let row = (i / 4) as f32;
                obs(col * 70.0, row * 45.0, 20.0, 15.0, &format!("t{}", i))
            })
            .collect();
        let clusters = BubbleClusterer::new().cluster(observations.clone());

        let mut seen: Vec<String> = clusters
            .iter()
            .flat_map(|c| c.observations.iter().map(|o| o.text.clone()))
            .collect();
        seen.sort();
        let mut expected: Vec<String> = observations.iter().map(|o| o.text.clone()).collect();
        expected.sort();
        assert_eq!(seen, expected);
    }

    #[test]
    fn test_reclustering_output_is_idempotent() {
        let clusterer = BubbleClusterer::new();
        let observations = vec![
            obs(0.0, 0.0, 30.0, 20.0, "a"),
            obs(0.0, 22.0, 30.0, 20.0, "b"),
            obs(200.0, 0.0, 30.0, 20.0, "c"),
            obs(200.0, 300.0, 30.0, 20.0, "d"),
        ];
        let threshold = BubbleClusterer::adaptive_threshold(&observations);
        let first = clusterer.cluster_with_threshold(observations, threshold);

        let as_observations: Vec<_> = first
            .iter()
            .map(|c| TextObservation {
                bbox: c.bbox,
                text: c.text.clone(),
                confidence: 1.0,
            })
            .collect();
        let second = clusterer.cluster_with_threshold(as_observations, threshold);

        assert_eq!(first.len(), 3);
        assert_eq!(second.len(), first.len());
    }
}
