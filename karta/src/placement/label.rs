use karta_types::{Point2, Rect};

use super::text_layout::TextBlock;
use super::Displacement;
use crate::style::TextPlacement;

/// Distance between an icon (or the anchor) and a label placed around it.
const LABEL_GAP: f64 = 2.0;

/// Size and position of an icon relative to its anchor, in pixels.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct IconSpec {
    /// Icon width.
    pub width: f64,
    /// Icon height.
    pub height: f64,
    /// Point of the icon placed at the anchor, as a fraction of its size.
    pub anchor: [f64; 2],
    /// Shift of the icon from the anchor.
    pub offset: [f64; 2],
}

impl IconSpec {
    fn bounds(&self, anchor: Point2) -> Rect {
        let x = anchor.x - self.width * self.anchor[0] + self.offset[0];
        let y = anchor.y - self.height * self.anchor[1] + self.offset[1];
        Rect::new(x, y, x + self.width, y + self.height)
    }
}

/// Icon and label of one object waiting for placement.
#[derive(Debug, Clone)]
pub struct LabelCandidate<'a> {
    /// Anchor point in tile pixels.
    pub anchor: Point2,
    /// Icon drawn at the anchor.
    pub icon: Option<IconSpec>,
    /// Text of the label.
    pub text: Option<&'a TextBlock>,
    /// Positions of the text around the icon, tried in order. Empty means centered text.
    pub placements: &'a [TextPlacement],
    /// Shift of the text box from its computed position.
    pub text_offset: [f64; 2],
}

/// Accepted boxes of a label.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct PlacedLabel {
    /// Box of the icon.
    pub icon: Option<Rect>,
    /// Box of the text block.
    pub text: Option<Rect>,
}

/// Finds the first position of the label that does not collide with anything placed before and
/// reserves its boxes in the displacement layers.
pub fn place_label(
    displacement: &mut Displacement,
    layers: &[String],
    candidate: &LabelCandidate,
) -> Option<PlacedLabel> {
    let icon = candidate.icon.map(|icon| icon.bounds(candidate.anchor));

    let Some(text) = candidate.text else {
        let icon = icon?;
        return displacement
            .check_and_set(layers, &[icon])
            .then_some(PlacedLabel {
                icon: Some(icon),
                text: None,
            });
    };

    let [offset_x, offset_y] = candidate.text_offset;
    let text_boxes: Vec<Rect> = if candidate.placements.is_empty() {
        let center = Point2::new(candidate.anchor.x + offset_x, candidate.anchor.y + offset_y);
        vec![text.bounds(center)]
    } else {
        let reference = icon.unwrap_or_else(|| {
            Rect::new(
                candidate.anchor.x,
                candidate.anchor.y,
                candidate.anchor.x,
                candidate.anchor.y,
            )
        });
        let origin = reference.center();
        let reach_x = reference.width() / 2.0 + LABEL_GAP + text.width / 2.0;
        let reach_y = reference.height() / 2.0 + LABEL_GAP + text.height / 2.0;

        candidate
            .placements
            .iter()
            .map(|placement| {
                let (dx, dy) = placement.direction();
                let center = Point2::new(
                    origin.x + dx * reach_x + offset_x,
                    origin.y + dy * reach_y + offset_y,
                );
                text.bounds(center)
            })
            .collect()
    };

    for text_box in text_boxes {
        let mut group = vec![text_box];
        group.extend(icon);

        if displacement.check_and_set(layers, &group) {
            return Some(PlacedLabel {
                icon,
                text: Some(text_box),
            });
        }
    }

    None
}
