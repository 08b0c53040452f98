// Page layout: grouping observations into bubbles and ordering them for reading

pub mod clustering;
pub mod reading_order;

pub use clustering::BubbleClusterer;
pub use reading_order::ReadingOrderResolver;
