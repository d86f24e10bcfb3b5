///Represents a vector in 2D space.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Vec2 {
    ///Value along the x-axis.
    /// Positive direction is to the right.
    pub x: f64,
    ///Value along the y-axis.
    /// Positive direction is down, matching screen space.
    pub y: f64,
}

impl Vec2 {
    pub const ZERO: Vec2 = Vec2 { x: 0.0, y: 0.0 };

    pub fn new(x: f64, y: f64) -> Self {
        Vec2 { x, y }
    }

    ///Unit vector pointing along `angle` (radians), scaled to `length`.
    #[cfg(test)]
    pub fn from_angle(angle: f64, length: f64) -> Vec2 {
        Vec2 {
            x: angle.cos() * length,
            y: angle.sin() * length,
        }
    }

    ///Returns the magnitude of the vector.
    pub fn magnitude(&self) -> f64 {
        (self.x * self.x + self.y * self.y).sqrt()
    }

    ///Returns the normalized vector.
    pub fn normalize(&self) -> Vec2 {
        let mag = self.magnitude();
        if mag == 0.0 {
            Vec2::ZERO
        } else {
            Vec2 {
                x: self.x / mag,
                y: self.y / mag,
            }
        }
    }

    ///Returns the scaled vector.
    pub fn scale(&self, scalar: f64) -> Vec2 {
        Vec2 {
            x: self.x * scalar,
            y: self.y * scalar,
        }
    }

    ///Returns the sum of two vectors.
    pub fn add(&self, other: &Vec2) -> Vec2 {
        Vec2 {
            x: self.x + other.x,
            y: self.y + other.y,
        }
    }

    pub fn is_zero(&self) -> bool {
        self.x == 0.0 && self.y == 0.0
    }
}

///Direction pointing from `from` to `to`; zero when the points coincide.
pub fn direction(from: (f64, f64), to: (f64, f64)) -> Vec2 {
    Vec2::new(to.0 - from.0, to.1 - from.1).normalize()
}
