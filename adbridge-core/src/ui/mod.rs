//! UI-tree introspection: hierarchy extraction and element matching.

mod element;
mod hierarchy;
mod resolver;

pub use element::{Bounds, UiElement};
pub use hierarchy::{HierarchyExtractor, parse_hierarchy};
pub use resolver::{
    DEFAULT_MIN_SIMILARITY, MatchCriteria, ScoredElement, find_element, find_elements, similarity,
};
