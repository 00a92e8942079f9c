use std::ops::{Add, Mul, Sub};

/// A single UI vertex: screen-space position, atlas/texture UV, RGBA color.
#[repr(C)]
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
pub struct Vertex {
    pub position: [f32; 2],
    pub tex_coords: [f32; 2],
    pub color: [f32; 4],
}

/// Per-batch uniform block shared by the vertex and fragment stages.
///
/// Screen size turns pixel positions into NDC; rect size and corner radii
/// drive the rounded-corner coverage in the fragment shader.
#[repr(C)]
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
pub struct BatchUniforms {
    pub screen_size: [f32; 2],
    pub rect_size: [f32; 2],
    pub corner_radii: [f32; 4],
    pub opacity: f32,
    pub _pad: [f32; 3],
}

impl Default for BatchUniforms {
    fn default() -> Self {
        Self {
            screen_size: [1.0, 1.0],
            rect_size: [0.0, 0.0],
            corner_radii: [0.0; 4],
            opacity: 1.0,
            _pad: [0.0; 3],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Size {
    pub width: f32,
    pub height: f32,
}

impl Mul<f32> for Size {
    type Output = Size;

    fn mul(self, rhs: f32) -> Self::Output {
        Size {
            width: self.width * rhs,
            height: self.height * rhs,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Position {
    pub x: f32,
    pub y: f32,
}

impl Add for Position {
    type Output = Position;
    fn add(self, other: Position) -> Self::Output {
        Position {
            x: self.x + other.x,
            y: self.y + other.y,
        }
    }
}

impl Sub for Position {
    type Output = Position;
    fn sub(self, other: Position) -> Self::Output {
        Position {
            x: self.x - other.x,
            y: self.y - other.y,
        }
    }
}

impl Mul<f32> for Position {
    type Output = Position;
    fn mul(self, factor: f32) -> Self::Output {
        Position {
            x: self.x * factor,
            y: self.y * factor,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rectangle {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Rectangle {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn contains(&self, position: Position) -> bool {
        position.x >= self.x
            && position.x <= self.x + self.width
            && position.y >= self.y
            && position.y <= self.y + self.height
    }

    pub fn pos(&self) -> Position {
        Position {
            x: self.x,
            y: self.y,
        }
    }

    pub fn size(&self) -> Size {
        Size {
            width: self.width,
            height: self.height,
        }
    }

    /// Clamp to a `width` x `height` frame and return integer scissor bounds.
    ///
    /// wgpu validates scissor rectangles against the render target, so
    /// out-of-frame batch rects must be clipped before binding. Returns
    /// `None` when nothing of the rectangle is visible.
    pub fn to_scissor(&self, width: u32, height: u32) -> Option<(u32, u32, u32, u32)> {
        let x0 = self.x.max(0.0) as u32;
        let y0 = self.y.max(0.0) as u32;
        let x1 = ((self.x + self.width).max(0.0) as u32).min(width);
        let y1 = ((self.y + self.height).max(0.0) as u32).min(height);
        if x0 >= x1 || y0 >= y1 {
            return None;
        }
        Some((x0, y0, x1 - x0, y1 - y0))
    }
}
