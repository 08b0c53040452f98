// Manga reading order: rows top to bottom, right to left within a row

use crate::core::types::BubbleCluster;

/// Minimum vertical overlap (relative to the shorter box) for two bubbles to share a row
const ROW_OVERLAP_RATIO: f32 = 0.3;

#[derive(Debug, Clone, Copy, Default)]
pub struct ReadingOrderResolver;

impl ReadingOrderResolver {
    pub fn new() -> Self {
        Self
    }

    /// Order bubbles for reading and assign dense indices `0..n`
    pub fn resolve(&self, mut bubbles: Vec<BubbleCluster>) -> Vec<BubbleCluster> {
        if bubbles.len() <= 1 {
            for bubble in &mut bubbles {
                bubble.index = 0;
            }
            return bubbles;
        }

        let mut rows = partition_into_rows(bubbles);
        rows.sort_by(|a, b| a[0].bbox.y.total_cmp(&b[0].bbox.y));

        rows.into_iter()
            .flat_map(|mut row| {
                row.sort_by(|a, b| b.bbox.x.total_cmp(&a.bbox.x));
                row
            })
            .enumerate()
            .map(|(index, mut bubble)| {
                bubble.index = index;
                bubble
            })
            .collect()
    }
}

fn partition_into_rows(mut bubbles: Vec<BubbleCluster>) -> Vec<Vec<BubbleCluster>> {
    bubbles.sort_by(|a, b| a.bbox.y.total_cmp(&b.bbox.y));

    let mut rows: Vec<Vec<BubbleCluster>> = Vec::new();
    for bubble in bubbles {
        match rows
            .iter_mut()
            .find(|row| row.iter().any(|member| overlaps_vertically(&bubble, member)))
        {
            Some(row) => row.push(bubble),
            None => rows.push(vec![bubble]),
        }
    }
    rows
}

fn overlaps_vertically(a: &BubbleCluster, b: &BubbleCluster) -> bool {
    let overlap = a.bbox.max_y().min(b.bbox.max_y()) - a.bbox.y.max(b.bbox.y);
    let min_height = a.bbox.height.min(b.bbox.height);
    min_height > 0.0 && overlap / min_height > ROW_OVERLAP_RATIO
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::Rect;

    fn bubble(x: f32, y: f32, w: f32, h: f32, text: &str) -> BubbleCluster {
        BubbleCluster::new(Rect::new(x, y, w, h), text.to_string(), vec![])
    }

    fn texts(bubbles: &[BubbleCluster]) -> Vec<&str> {
        bubbles.iter().map(|b| b.text.as_str()).collect()
    }

    #[test]
    fn test_rows_top_to_bottom_right_to_left() {
        let resolved = ReadingOrderResolver::new().resolve(vec![
            bubble(10.0, 200.0, 50.0, 40.0, "bottom-left"),
            bubble(10.0, 10.0, 50.0, 40.0, "top-left"),
            bubble(300.0, 20.0, 50.0, 40.0, "top-right"),
            bubble(300.0, 205.0, 50.0, 40.0, "bottom-right"),
        ]);
        assert_eq!(
            texts(&resolved),
            vec!["top-right", "top-left", "bottom-right", "bottom-left"]
        );
        let indices: Vec<usize> = resolved.iter().map(|b| b.index).collect();
        assert_eq!(indices, vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_distinct_rows_follow_vertical_order() {
        let resolved = ReadingOrderResolver::new().resolve(vec![
            bubble(0.0, 300.0, 20.0, 20.0, "c"),
            bubble(500.0, 0.0, 20.0, 20.0, "a"),
            bubble(100.0, 150.0, 20.0, 20.0, "b"),
        ]);
        assert_eq!(texts(&resolved), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_overlap_must_exceed_ratio() {
        // 0..100 and 70..170 overlap by exactly 30% of the shorter height
        let resolved = ReadingOrderResolver::new().resolve(vec![
            bubble(0.0, 0.0, 20.0, 100.0, "upper-left"),
            bubble(100.0, 70.0, 20.0, 100.0, "lower-right"),
        ]);
        assert_eq!(texts(&resolved), vec!["upper-left", "lower-right"]);

        let resolved = ReadingOrderResolver::new().resolve(vec![
            bubble(0.0, 0.0, 20.0, 100.0, "left"),
            bubble(100.0, 69.0, 20.0, 100.0, "right"),
        ]);
        assert_eq!(texts(&resolved), vec!["right", "left"]);
    }

    #[test]
    fn test_zero_height_never_shares_row() {
        let resolved = ReadingOrderResolver::new().resolve(vec![
            bubble(0.0, 10.0, 20.0, 0.0, "flat"),
            bubble(100.0, 0.0, 20.0, 40.0, "tall"),
        ]);
        assert_eq!(texts(&resolved), vec!["tall", "flat"]);
    }

    #[test]
    fn test_singleton_and_empty() {
        let mut single = bubble(0.0, 0.0, 10.0, 10.0, "only");
        single.index = 7;
        let resolved = ReadingOrderResolver::new().resolve(vec![single]);
        assert_eq!(resolved[0].index, 0);
        assert!(ReadingOrderResolver::new().resolve(vec![]).is_empty());
    }
}
