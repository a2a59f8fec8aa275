//! Fairness-ordered pickers for the content and image pools
//!
//! Both pools rotate the same way: least `usage_count` first, then the
//! oldest `last_used_at` with never-used items ahead of everything. Ties keep
//! pool order, so the sort must stay stable.

pub mod content;
pub mod image;

use std::cmp::Ordering;

use crate::models::Rotatable;

pub use content::{ContentQuery, ContentSelector};
pub use image::{CategoryImageMap, ImageSelector};

/// Rotation ordering: usage ascending, then last use ascending (null first)
pub fn rotation_cmp<T: Rotatable>(a: &T, b: &T) -> Ordering {
    // Option orders None before Some
    a.usage_count()
        .cmp(&b.usage_count())
        .then_with(|| a.last_used_at().cmp(&b.last_used_at()))
}

/// Sort candidates into rotation order, keeping pool order on ties
pub fn rotation_order<T: Rotatable>(candidates: &mut [T]) {
    candidates.sort_by(rotation_cmp);
}

/// Head of the rotation order, or None for an empty candidate set
pub fn least_used<T: Rotatable, I: IntoIterator<Item = T>>(candidates: I) -> Option<T> {
    // min_by keeps the first of several equal minima
    candidates.into_iter().min_by(rotation_cmp)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Duration, Utc};

    #[derive(Debug, Clone, PartialEq)]
    struct Slot {
        name: &'static str,
        usage: u32,
        last: Option<DateTime<Utc>>,
    }

    impl Rotatable for Slot {
        fn usage_count(&self) -> u32 {
            self.usage
        }

        fn last_used_at(&self) -> Option<DateTime<Utc>> {
            self.last
        }
    }

    fn slot(name: &'static str, usage: u32, last: Option<DateTime<Utc>>) -> Slot {
        Slot { name, usage, last }
    }

    #[test]
    fn test_usage_dominates() {
        let now = Utc::now();
        let picked = least_used(vec![slot("a", 2, None), slot("b", 1, Some(now))]).unwrap();
        assert_eq!(picked.name, "b");
    }

    #[test]
    fn test_never_used_first() {
        let now = Utc::now();
        let picked = least_used(vec![slot("a", 0, Some(now)), slot("b", 0, None)]).unwrap();
        assert_eq!(picked.name, "b");
    }

    #[test]
    fn test_oldest_use_first() {
        let now = Utc::now();
        let picked = least_used(vec![
            slot("recent", 1, Some(now)),
            slot("old", 1, Some(now - Duration::hours(5))),
        ])
        .unwrap();
        assert_eq!(picked.name, "old");
    }

    #[test]
    fn test_ties_keep_pool_order() {
        let mut slots = vec![slot("a", 0, None), slot("b", 0, None), slot("c", 0, None)];
        assert_eq!(least_used(slots.clone()).unwrap().name, "a");

        rotation_order(&mut slots);
        let names: Vec<_> = slots.iter().map(|s| s.name).collect();
        assert_eq!(names, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_empty() {
        assert!(least_used(Vec::<Slot>::new()).is_none());
    }
}
