use crate::domain::RowColor;
use ratatui::style::Color;

// Dark surfaces with an orange accent. Row colours come from the domain palette; everything
// else in the timeline uses the roles below.
pub const BG: Color = Color::Rgb(11, 13, 16);
pub const SURFACE: Color = Color::Rgb(17, 21, 27);
pub const BAR_BG: Color = Color::Rgb(14, 18, 24);

pub const FG: Color = Color::Rgb(229, 231, 235);
pub const MUTED: Color = Color::Rgb(156, 163, 175);
pub const DIM: Color = Color::Rgb(107, 114, 128);
pub const BORDER: Color = Color::Rgb(55, 65, 81);

pub const ACCENT: Color = Color::Rgb(255, 159, 26);
pub const ACCENT_BG: Color = Color::Rgb(44, 32, 16);

pub const SUCCESS: Color = Color::Rgb(134, 239, 172); // loading finished
pub const ERROR: Color = Color::Rgb(248, 113, 113);

pub fn row_color(color: RowColor) -> Color {
    Color::Rgb(color.r, color.g, color.b)
}

/// Row colour pulled toward the background, for baselines and connectors.
pub fn faint(color: RowColor, strength: f32) -> Color {
    let (br, bg, bb) = (11.0, 13.0, 16.0);
    let mix = |channel: u8, base: f32| -> u8 {
        (base + (f32::from(channel) - base) * strength.clamp(0.0, 1.0)).round() as u8
    };
    Color::Rgb(mix(color.r, br), mix(color.g, bg), mix(color.b, bb))
}
