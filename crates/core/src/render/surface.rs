use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Rgba {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: f32,
}

impl Rgba {
    pub const fn new(r: u8, g: u8, b: u8, a: f32) -> Self {
        Self { r, g, b, a }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GradientStop {
    pub offset: f32,
    pub color: Rgba,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum Paint {
    Solid(Rgba),
    /// Linear gradient from `from_y` to `to_y` along the vertical axis.
    Vertical {
        from_y: f32,
        to_y: f32,
        stops: &'static [GradientStop],
    },
}

/// Glowing circle outline composited additively over the bars.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Ring {
    pub center_x: f32,
    pub center_y: f32,
    pub radius: f32,
    pub hue: f32,
    pub alpha: f32,
    pub line_width: f32,
    pub glow: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Backdrop {
    pub url: Option<String>,
    pub zoom: f32,
}

/// Caller-provided drawing target sized to the viewport.
pub trait Surface {
    /// Logical size in CSS-style pixels; may change between frames.
    fn size(&self) -> (f32, f32);
    fn fill_rect(&mut self, rect: Rect, paint: Paint);
    fn stroke_ring(&mut self, ring: Ring);
    fn set_backdrop(&mut self, backdrop: &Backdrop);
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum DrawCommand {
    FillRect { rect: Rect, paint: Paint },
    StrokeRing(Ring),
    Backdrop(Backdrop),
}

/// Surface that records draw commands, for headless hosts and inspection.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CommandSurface {
    width: f32,
    height: f32,
    commands: Vec<DrawCommand>,
}

impl CommandSurface {
    pub fn new(width: f32, height: f32) -> Self {
        Self {
            width,
            height,
            commands: Vec::new(),
        }
    }

    pub fn resize(&mut self, width: f32, height: f32) {
        self.width = width;
        self.height = height;
    }

    pub fn commands(&self) -> &[DrawCommand] {
        &self.commands
    }

    pub fn take_commands(&mut self) -> Vec<DrawCommand> {
        std::mem::take(&mut self.commands)
    }
}

impl Surface for CommandSurface {
    fn size(&self) -> (f32, f32) {
        (self.width, self.height)
    }

    fn fill_rect(&mut self, rect: Rect, paint: Paint) {
        self.commands.push(DrawCommand::FillRect { rect, paint });
    }

    fn stroke_ring(&mut self, ring: Ring) {
        self.commands.push(DrawCommand::StrokeRing(ring));
    }

    fn set_backdrop(&mut self, backdrop: &Backdrop) {
        self.commands.push(DrawCommand::Backdrop(backdrop.clone()));
    }
}
