//! Synthetic star fields: noise-free circular Gaussian point sources on a flat
//! background, plus helpers to lay stars out and add noise.

use common::Buffer2;
use glam::DVec2;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// A rendered point source.
#[derive(Debug, Clone, Copy)]
pub struct SyntheticStar {
    pub pos: DVec2,
    pub amplitude: f64,
    pub sigma: f64,
}

impl SyntheticStar {
    pub fn new(x: f64, y: f64, amplitude: f64, sigma: f64) -> Self {
        Self {
            pos: DVec2::new(x, y),
            amplitude,
            sigma,
        }
    }
}

/// Render stars onto a flat background.
///
/// Each star only touches pixels within 8 sigma of its center.
pub fn render_star_field(
    width: usize,
    height: usize,
    background: f64,
    stars: &[SyntheticStar],
) -> Buffer2<f64> {
    let mut image = Buffer2::new_filled(width, height, background);

    for star in stars {
        let reach = (8.0 * star.sigma).ceil();
        let x_min = (star.pos.x - reach).floor().max(0.0) as usize;
        let y_min = (star.pos.y - reach).floor().max(0.0) as usize;
        let x_max = ((star.pos.x + reach).ceil().max(0.0) as usize).min(width);
        let y_max = ((star.pos.y + reach).ceil().max(0.0) as usize).min(height);
        let two_sigma2 = 2.0 * star.sigma * star.sigma;

        for y in y_min..y_max {
            for x in x_min..x_max {
                let d = DVec2::new(x as f64, y as f64) - star.pos;
                image[(x, y)] += star.amplitude * (-d.length_squared() / two_sigma2).exp();
            }
        }
    }

    image
}

/// Lay out `count` stars on a jittered grid, keeping `margin` pixels clear of
/// every edge.
///
/// Fractional parts of the coordinates stay in `[0.05, 0.45)` so rounding and
/// truncation of a position agree.
pub fn grid_positions(
    count: usize,
    width: usize,
    height: usize,
    margin: f64,
    seed: u64,
) -> Vec<DVec2> {
    let mut rng = StdRng::seed_from_u64(seed);
    let columns = (count as f64).sqrt().ceil() as usize;
    let rows = count.div_ceil(columns);
    let step_x = (width as f64 - 2.0 * margin) / columns as f64;
    let step_y = (height as f64 - 2.0 * margin) / rows as f64;

    (0..count)
        .map(|i| {
            let cell_x = margin + (i % columns) as f64 * step_x + step_x / 2.0;
            let cell_y = margin + (i / columns) as f64 * step_y + step_y / 2.0;
            let x = (cell_x + rng.random_range(-3.0..3.0)).floor() + rng.random_range(0.05..0.45);
            let y = (cell_y + rng.random_range(-3.0..3.0)).floor() + rng.random_range(0.05..0.45);
            DVec2::new(x, y)
        })
        .collect()
}

/// Add uniform noise in `[-amplitude, amplitude]` to every pixel.
pub fn add_uniform_noise(image: &mut Buffer2<f64>, amplitude: f64, seed: u64) {
    let mut rng = StdRng::seed_from_u64(seed);
    let (width, height) = (image.width(), image.height());
    for y in 0..height {
        for x in 0..width {
            image[(x, y)] += rng.random_range(-amplitude..=amplitude);
        }
    }
}
