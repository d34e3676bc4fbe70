use eframe::egui::{self, Color32, CornerRadius, Stroke};
use music_mini_player::config::ThemeChoice;

/// Colors for one appearance, before window opacity is applied.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Palette {
    pub background: Color32,
    pub foreground: Color32,
    pub muted: Color32,
    pub accent: Color32,
    pub overlay: Color32,
    pub error: Color32,
}

impl Palette {
    pub fn for_choice(choice: ThemeChoice) -> Self {
        match choice {
            ThemeChoice::Dark => Self {
                background: Color32::from_rgb(18, 20, 28),
                foreground: Color32::from_rgb(236, 238, 244),
                muted: Color32::from_rgb(150, 156, 172),
                accent: Color32::from_rgb(250, 80, 110),
                overlay: Color32::from_rgb(15, 23, 42),
                error: Color32::from_rgb(220, 80, 80),
            },
            ThemeChoice::Light => Self {
                background: Color32::from_rgb(246, 246, 249),
                foreground: Color32::from_rgb(24, 26, 32),
                muted: Color32::from_rgb(104, 108, 122),
                accent: Color32::from_rgb(220, 40, 80),
                overlay: Color32::from_rgb(240, 240, 245),
                error: Color32::from_rgb(190, 40, 40),
            },
        }
    }

    /// Window fill with `opacity` folded into the alpha channel.
    pub fn window_fill(&self, opacity: f32) -> Color32 {
        let alpha = (opacity.clamp(0.0, 1.0) * 255.0).round() as u8;
        let [r, g, b, _] = self.background.to_array();
        Color32::from_rgba_unmultiplied(r, g, b, alpha)
    }
}

pub fn toggled(choice: ThemeChoice) -> ThemeChoice {
    match choice {
        ThemeChoice::Dark => ThemeChoice::Light,
        ThemeChoice::Light => ThemeChoice::Dark,
    }
}

pub fn apply_style(ctx: &egui::Context, choice: ThemeChoice, palette: &Palette) {
    let mut style = (*ctx.style()).clone();
    style.visuals = match choice {
        ThemeChoice::Dark => egui::Visuals::dark(),
        ThemeChoice::Light => egui::Visuals::light(),
    };

    style.visuals.window_fill = Color32::TRANSPARENT;
    style.visuals.panel_fill = Color32::TRANSPARENT;
    style.visuals.override_text_color = Some(palette.foreground);
    style.visuals.hyperlink_color = palette.accent;
    style.visuals.selection.bg_fill = palette.accent;
    style.visuals.slider_trailing_fill = true;

    let radius = CornerRadius::same(6);
    for widget in [
        &mut style.visuals.widgets.inactive,
        &mut style.visuals.widgets.hovered,
        &mut style.visuals.widgets.active,
    ] {
        widget.corner_radius = radius;
        widget.bg_stroke = Stroke::NONE;
    }
    style.visuals.widgets.inactive.weak_bg_fill = Color32::TRANSPARENT;

    style.spacing.item_spacing = egui::vec2(6.0, 4.0);
    style.spacing.button_padding = egui::vec2(6.0, 2.0);
    ctx.set_style(style);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opacity_only_touches_alpha() {
        let palette = Palette::for_choice(ThemeChoice::Dark);
        let fill = palette.window_fill(0.5);
        assert_eq!(fill.a(), 128);

        let opaque = palette.window_fill(4.0);
        assert_eq!(opaque, palette.background);
    }

    #[test]
    fn toggle_flips_between_appearances() {
        assert_eq!(toggled(ThemeChoice::Dark), ThemeChoice::Light);
        assert_eq!(toggled(toggled(ThemeChoice::Dark)), ThemeChoice::Dark);
    }
}
