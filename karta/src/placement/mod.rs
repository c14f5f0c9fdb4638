//! Collision-aware placement of icons and labels.

use std::collections::HashMap;

use karta_types::Rect;

mod label;
pub mod text_layout;

pub use label::{place_label, IconSpec, LabelCandidate, PlacedLabel};

type Bucket = (i64, i64);

/// Spatial hash of the boxes accepted so far.
#[derive(Debug, Clone)]
pub struct DisplacementLayer {
    shift: u32,
    regions: HashMap<Bucket, Vec<Rect>, ahash::RandomState>,
    allowed_area: Option<Rect>,
}

impl DisplacementLayer {
    /// Creates an empty layer with buckets of `2^shift` pixels.
    pub fn new(shift: u32, allowed_area: Option<Rect>) -> Self {
        Self {
            shift: shift.min(62),
            regions: HashMap::default(),
            allowed_area,
        }
    }

    /// Number of boxes stored in the layer, counting every bucket they were inserted into.
    pub fn len(&self) -> usize {
        self.regions.values().map(Vec::len).sum()
    }

    /// True if no box was accepted yet.
    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    fn buckets(&self, rect: &Rect) -> Vec<Bucket> {
        let mut buckets: Vec<Bucket> = rect
            .corners()
            .iter()
            .map(|corner| {
                (
                    (corner.x.floor() as i64) >> self.shift,
                    (corner.y.floor() as i64) >> self.shift,
                )
            })
            .collect();
        buckets.sort_unstable();
        buckets.dedup();
        buckets
    }

    fn is_free(&self, rect: &Rect) -> bool {
        if let Some(allowed) = &self.allowed_area {
            if !allowed.contains(rect) {
                return false;
            }
        }

        self.buckets(rect).iter().all(|bucket| {
            self.regions
                .get(bucket)
                .map_or(true, |boxes| boxes.iter().all(|b| !b.intersects(rect)))
        })
    }

    fn insert(&mut self, rect: Rect) {
        for bucket in self.buckets(&rect) {
            self.regions.entry(bucket).or_default().push(rect);
        }
    }
}

/// Named displacement layers of one tile render.
#[derive(Debug, Clone)]
pub struct Displacement {
    layers: HashMap<String, DisplacementLayer, ahash::RandomState>,
    shift: u32,
    allowed_area: Option<Rect>,
}

impl Displacement {
    /// Creates an empty set. Layers are created on first use with the given bucket shift and
    /// allowed area.
    pub fn new(shift: u32, allowed_area: Option<Rect>) -> Self {
        Self {
            layers: HashMap::default(),
            shift,
            allowed_area,
        }
    }

    /// Layer by name.
    pub fn layer(&self, name: &str) -> Option<&DisplacementLayer> {
        self.layers.get(name)
    }

    /// Checks the group of boxes against all the named layers and, if none of them collides,
    /// stores every box in every layer.
    ///
    /// Returns `true` if the group was accepted. The first accepted box wins: a later box
    /// overlapping it is rejected.
    pub fn check_and_set(&mut self, layers: &[String], boxes: &[Rect]) -> bool {
        for name in layers {
            if !self.layers.contains_key(name) {
                self.layers.insert(
                    name.clone(),
                    DisplacementLayer::new(self.shift, self.allowed_area),
                );
            }
        }

        let is_free = layers.iter().all(|name| {
            self.layers
                .get(name)
                .map_or(true, |layer| boxes.iter().all(|rect| layer.is_free(rect)))
        });

        if !is_free {
            return false;
        }

        for name in layers {
            if let Some(layer) = self.layers.get_mut(name) {
                for rect in boxes {
                    layer.insert(*rect);
                }
            }
        }

        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(names: &[&str]) -> Vec<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    #[test]
    fn first_box_wins() {
        let a = Rect::new(10.0, 10.0, 30.0, 20.0);
        let b = Rect::new(25.0, 15.0, 45.0, 25.0);
        let layers = names(&["default"]);

        let mut displacement = Displacement::new(6, None);
        assert!(displacement.check_and_set(&layers, &[a]));
        assert!(!displacement.check_and_set(&layers, &[b]));

        let mut displacement = Displacement::new(6, None);
        assert!(displacement.check_and_set(&layers, &[b]));
        assert!(!displacement.check_and_set(&layers, &[a]));
    }

    #[test]
    fn touching_boxes_do_not_collide() {
        let layers = names(&["default"]);
        let mut displacement = Displacement::new(4, None);
        assert!(displacement.check_and_set(&layers, &[Rect::new(0.0, 0.0, 10.0, 10.0)]));
        assert!(displacement.check_and_set(&layers, &[Rect::new(10.0, 0.0, 20.0, 10.0)]));
    }

    #[test]
    fn group_is_accepted_as_a_whole() {
        let layers = names(&["default"]);
        let mut displacement = Displacement::new(6, None);
        assert!(displacement.check_and_set(&layers, &[Rect::new(100.0, 100.0, 110.0, 110.0)]));

        let free = Rect::new(0.0, 0.0, 10.0, 10.0);
        let taken = Rect::new(105.0, 105.0, 120.0, 120.0);
        assert!(!displacement.check_and_set(&layers, &[free, taken]));

        // Nothing of the rejected group was stored.
        assert!(displacement.check_and_set(&layers, &[free]));
    }

    #[test]
    fn layers_are_independent() {
        let rect = Rect::new(0.0, 0.0, 10.0, 10.0);
        let mut displacement = Displacement::new(6, None);
        assert!(displacement.check_and_set(&names(&["icons"]), &[rect]));
        assert!(displacement.check_and_set(&names(&["labels"]), &[rect]));
        assert!(!displacement.check_and_set(&names(&["labels", "other"]), &[rect]));
        assert_eq!(displacement.layer("other").map(|l| l.is_empty()), Some(true));
    }

    #[test]
    fn allowed_area() {
        let layers = names(&["default"]);
        let mut displacement = Displacement::new(6, Some(Rect::new(-64.0, -64.0, 320.0, 320.0)));
        assert!(displacement.check_and_set(&layers, &[Rect::new(-60.0, 0.0, -40.0, 10.0)]));
        assert!(!displacement.check_and_set(&layers, &[Rect::new(300.0, 0.0, 330.0, 10.0)]));
    }

    #[test]
    fn box_is_stored_in_each_corner_bucket_once() {
        let layers = names(&["default"]);
        let mut displacement = Displacement::new(4, None);
        displacement.check_and_set(&layers, &[Rect::new(0.0, 0.0, 4.0, 4.0)]);
        assert_eq!(displacement.layer("default").map(|l| l.len()), Some(1));

        displacement.check_and_set(&layers, &[Rect::new(8.0, 8.0, 24.0, 24.0)]);
        assert_eq!(displacement.layer("default").map(|l| l.len()), Some(5));
    }
}
