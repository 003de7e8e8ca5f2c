//! Integer pixel geometry in the root-window frame of a display.

use std::fmt;
use std::str::FromStr;

use crate::errors::ParseValueError;

#[cfg_attr(feature = "serde-full", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Linear interpolation towards `to`; `t` is clamped to `[0, 1]`.
    pub fn lerp(self, to: Point, t: f64) -> Point {
        let t = t.clamp(0.0, 1.0);
        let x = self.x as f64 + (to.x - self.x) as f64 * t;
        let y = self.y as f64 + (to.y - self.y) as f64 * t;
        Point::new(x.round() as i32, y.round() as i32)
    }
}

impl fmt::Display for Point {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({},{})", self.x, self.y)
    }
}

#[cfg_attr(feature = "serde-full", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash)]
pub struct Size {
    pub width: i32,
    pub height: i32,
}

impl Size {
    pub const fn new(width: i32, height: i32) -> Self {
        Self { width, height }
    }
}

/// Rectangle in the same layout the accessibility tree reports locations.
#[cfg_attr(feature = "serde-full", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash)]
pub struct Rect {
    pub left: i32,
    pub top: i32,
    pub width: i32,
    pub height: i32,
}

impl Rect {
    pub const fn new(left: i32, top: i32, width: i32, height: i32) -> Self {
        Self {
            left,
            top,
            width,
            height,
        }
    }

    pub fn right(&self) -> i32 {
        self.left + self.width
    }

    pub fn bottom(&self) -> i32 {
        self.top + self.height
    }

    pub fn size(&self) -> Size {
        Size::new(self.width, self.height)
    }

    pub fn is_empty(&self) -> bool {
        self.width <= 0 || self.height <= 0
    }

    pub fn center_point(&self) -> Point {
        Point::new(self.left + self.width / 2, self.top + self.height / 2)
    }

    pub fn contains(&self, p: Point) -> bool {
        p.x >= self.left && p.x < self.right() && p.y >= self.top && p.y < self.bottom()
    }

    /// Shrinks the rectangle by `dx`/`dy` on each side, never below zero size.
    pub fn with_inset(&self, dx: i32, dy: i32) -> Rect {
        let width = (self.width - 2 * dx).max(0);
        let height = (self.height - 2 * dy).max(0);
        Rect::new(self.left + dx, self.top + dy, width, height)
    }

    /// Point at the given fractions of the width and height.
    pub fn relative_point(&self, fx: f64, fy: f64) -> Point {
        Point::new(
            self.left + (self.width as f64 * fx).round() as i32,
            self.top + (self.height as f64 * fy).round() as i32,
        )
    }
}

impl fmt::Display for Rect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "({}, {}) - ({} x {})",
            self.left, self.top, self.width, self.height
        )
    }
}

/// Clockwise display rotation.
#[cfg_attr(feature = "serde-full", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash)]
pub enum Rotation {
    #[default]
    #[cfg_attr(feature = "serde-full", serde(rename = "0"))]
    R0,
    #[cfg_attr(feature = "serde-full", serde(rename = "90"))]
    R90,
    #[cfg_attr(feature = "serde-full", serde(rename = "180"))]
    R180,
    #[cfg_attr(feature = "serde-full", serde(rename = "270"))]
    R270,
}

impl Rotation {
    pub fn degrees(&self) -> u16 {
        match self {
            Rotation::R0 => 0,
            Rotation::R90 => 90,
            Rotation::R180 => 180,
            Rotation::R270 => 270,
        }
    }

    pub fn from_degrees(degrees: i32) -> Result<Self, ParseValueError> {
        match degrees.rem_euclid(360) {
            0 => Ok(Rotation::R0),
            90 => Ok(Rotation::R90),
            180 => Ok(Rotation::R180),
            270 => Ok(Rotation::R270),
            _ => Err(ParseValueError::Rotation(degrees.to_string())),
        }
    }

    /// Whether width and height swap relative to the panel's native orientation.
    pub fn is_transposed(&self) -> bool {
        matches!(self, Rotation::R90 | Rotation::R270)
    }
}

impl FromStr for Rotation {
    type Err = ParseValueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let degrees: i32 = s
            .trim()
            .parse()
            .map_err(|_| ParseValueError::Rotation(s.to_string()))?;
        Rotation::from_degrees(degrees)
    }
}
