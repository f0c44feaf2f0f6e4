/// Easing curves mapping linear progress in `[0, 1]` onto eased progress.
#[derive(Debug, Clone, Copy, Default)]
pub enum Easing {
    /// No easing.
    #[default]
    Linear,
    QuadIn,
    QuadOut,
    CubicIn,
    CubicOut,
    CubicInOut,
    /// CSS `cubic-bezier(x1, y1, x2, y2)`.
    Bezier(f64, f64, f64, f64),
    Custom(fn(f64) -> f64),
}

impl Easing {
    /// The CSS `ease` curve.
    pub const EASE: Easing = Easing::Bezier(0.25, 0.1, 0.25, 1.0);
    pub const EASE_IN: Easing = Easing::Bezier(0.42, 0.0, 1.0, 1.0);
    pub const EASE_OUT: Easing = Easing::Bezier(0.0, 0.0, 0.58, 1.0);
    pub const EASE_IN_OUT: Easing = Easing::Bezier(0.42, 0.0, 0.58, 1.0);

    /// Apply the easing function to a linear fraction.
    pub fn apply(&self, t: f64) -> f64 {
        match *self {
            Easing::Linear => t,
            Easing::QuadIn => t * t,
            Easing::QuadOut => -t * (t - 2.0),
            Easing::CubicIn => t * t * t,
            Easing::CubicOut => {
                let f = t - 1.0;
                f * f * f + 1.0
            }
            Easing::CubicInOut => {
                if t < 0.5 {
                    4.0 * t * t * t
                } else {
                    0.5 * (2.0 * t - 2.0).powi(3) + 1.0
                }
            }
            Easing::Bezier(x1, y1, x2, y2) => cubic_bezier(x1, y1, x2, y2, t),
            Easing::Custom(f) => f(t),
        }
    }
}

impl PartialEq for Easing {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Easing::Bezier(a, b, c, d), Easing::Bezier(e, f, g, h)) => {
                a == e && b == f && c == g && d == h
            }
            (Easing::Custom(a), Easing::Custom(b)) => std::ptr::eq(*a as *const (), *b as *const ()),
            _ => std::mem::discriminant(self) == std::mem::discriminant(other),
        }
    }
}

fn cubic_bezier(x1: f64, y1: f64, x2: f64, y2: f64, fraction: f64) -> f64 {
    if fraction <= 0.0 {
        return 0.0;
    }
    if fraction >= 1.0 {
        return 1.0;
    }

    let cx = 3.0 * x1;
    let bx = 3.0 * (x2 - x1) - cx;
    let ax = 1.0 - cx - bx;

    let cy = 3.0 * y1;
    let by = 3.0 * (y2 - y1) - cy;
    let ay = 1.0 - cy - by;

    fn sample_curve(a: f64, b: f64, c: f64, t: f64) -> f64 {
        ((a * t + b) * t + c) * t
    }

    fn sample_derivative(a: f64, b: f64, c: f64, t: f64) -> f64 {
        (3.0 * a * t + 2.0 * b) * t + c
    }

    // Newton-Raphson for the parametric t whose x matches the fraction.
    let mut t = fraction;
    let mut converged = false;
    for _ in 0..8 {
        let x = sample_curve(ax, bx, cx, t) - fraction;
        if x.abs() < 1e-7 {
            converged = true;
            break;
        }
        let dx = sample_derivative(ax, bx, cx, t);
        if dx.abs() < 1e-7 {
            break;
        }
        t = (t - x / dx).clamp(0.0, 1.0);
    }

    if !converged {
        let mut t0 = 0.0;
        let mut t1 = 1.0;
        t = fraction;
        for _ in 0..32 {
            let delta = sample_curve(ax, bx, cx, t) - fraction;
            if delta.abs() < 1e-7 {
                break;
            }
            if delta > 0.0 {
                t1 = t;
            } else {
                t0 = t;
            }
            t = 0.5 * (t0 + t1);
        }
    }

    sample_curve(ay, by, cy, t)
}

#[cfg(test)]
#[path = "tests/easing_tests.rs"]
mod tests;
