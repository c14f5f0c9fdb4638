use karta_types::Point2;

use super::props::GridDef;
use super::random::XorShift32;

/// Lattice points of a grid layer falling into a tile, in tile pixel coordinates.
///
/// The lattice is anchored in global pixel space (`tile index * tile_size`), so neighbouring
/// tiles generate the same points in their shared padding. Every lattice cell gets its own
/// random generator seeded from the cell indices, which keeps the jitter stable between
/// redraws. Points are sorted top to bottom, then left to right.
pub fn grid_points(
    grid: &GridDef,
    tile_x: i64,
    tile_y: i64,
    tile_size: f64,
    padding: f64,
) -> Vec<Point2> {
    if grid.step <= 0.0 || !grid.step.is_finite() {
        log::warn!("Invalid grid step {}", grid.step);
        return vec![];
    }

    let step = grid.step;
    let origin_x = tile_x as f64 * tile_size;
    let origin_y = tile_y as f64 * tile_size;
    let (min_x, max_x) = (origin_x - padding, origin_x + tile_size + padding);
    let (min_y, max_y) = (origin_y - padding, origin_y + tile_size + padding);

    // Jitter can move a point into the area from a neighbouring cell.
    let reach = grid.jitter.abs().ceil() + step;
    let first_row = ((min_y - reach) / step).floor() as i64;
    let last_row = ((max_y + reach) / step).ceil() as i64;

    let mut points = vec![];
    for j in first_row..=last_row {
        let row_offset = (j as f64 * grid.skew).rem_euclid(step);
        let first_col = ((min_x - reach - row_offset) / step).floor() as i64;
        let last_col = ((max_x + reach - row_offset) / step).ceil() as i64;

        for i in first_col..=last_col {
            let mut rng = XorShift32::for_cell(i, j);
            let dx = (rng.next_f64() * 2.0 - 1.0) * grid.jitter;
            let dy = (rng.next_f64() * 2.0 - 1.0) * grid.jitter;

            let x = i as f64 * step + row_offset + dx;
            let y = j as f64 * step + dy;
            if x >= min_x && x < max_x && y >= min_y && y < max_y {
                points.push(Point2::new(x - origin_x, y - origin_y));
            }
        }
    }

    points.sort_by(|a, b| a.y.total_cmp(&b.y).then(a.x.total_cmp(&b.x)));
    points
}
