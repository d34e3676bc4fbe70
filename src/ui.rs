use eframe::egui::{self, PointerButton, ResizeDirection, ViewportCommand};
use music_mini_player::config::Corner;

const RESIZE_EDGE: f32 = 6.0;
const DRAG_STRIP_HEIGHT: f32 = 28.0;
const STRIP_PADDING_MIN: f32 = 4.0;
const STRIP_PADDING_MAX: f32 = 16.0;

/// Horizontal strip with a centered content column.
#[derive(Debug, Copy, Clone)]
pub struct StripMetrics {
    total_width: f32,
    content_width: f32,
}

impl StripMetrics {
    pub fn padded(total_width: f32, padding: f32) -> Self {
        let total = total_width.max(1.0);
        let margin = padding.clamp(0.0, total / 2.0);
        Self {
            total_width: total,
            content_width: (total - 2.0 * margin).max(1.0),
        }
    }

    pub fn for_width(total_width: f32) -> Self {
        let padding = (total_width * 0.04).clamp(STRIP_PADDING_MIN, STRIP_PADDING_MAX);
        Self::padded(total_width, padding)
    }

    pub fn content_width(&self) -> f32 {
        self.content_width
    }

    pub fn show<R>(&self, ui: &mut egui::Ui, builder: impl FnOnce(&mut egui::Ui) -> R) -> R {
        ui.allocate_ui_with_layout(
            egui::vec2(self.total_width, 0.0),
            egui::Layout::left_to_right(egui::Align::Center),
            |row| {
                let margin = (self.total_width - self.content_width).max(0.0) / 2.0;
                if margin > 0.0 {
                    row.add_space(margin);
                }
                let result = row
                    .allocate_ui_with_layout(
                        egui::vec2(self.content_width, 0.0),
                        egui::Layout::top_down(egui::Align::Center),
                        builder,
                    )
                    .inner;
                if margin > 0.0 {
                    row.add_space(margin);
                }
                result
            },
        )
        .inner
    }
}

/// Top-left window position that keeps `window` `margin` away from `corner`.
pub fn anchored_position(
    corner: Corner,
    monitor: egui::Vec2,
    window: egui::Vec2,
    margin: f32,
) -> egui::Pos2 {
    let left = margin;
    let right = (monitor.x - window.x - margin).max(0.0);
    let top = margin;
    let bottom = (monitor.y - window.y - margin).max(0.0);
    match corner {
        Corner::TopLeft => egui::pos2(left, top),
        Corner::TopRight => egui::pos2(right, top),
        Corner::BottomLeft => egui::pos2(left, bottom),
        Corner::BottomRight => egui::pos2(right, bottom),
    }
}

/// Ease `current` toward `target`; returns the new value and whether it is still moving.
pub fn step_alpha(current: f32, target: f32) -> (f32, bool) {
    let target = target.clamp(0.0, 1.0);
    let next = egui::lerp(current..=target, 0.2);
    if (next - target).abs() > 0.01 {
        (next, true)
    } else {
        (target, false)
    }
}

/// Edge resize and drag-to-move for the undecorated window.
///
/// `reserved` is left alone so buttons in the drag strip stay clickable.
pub fn handle_borderless_window_interactions(
    ctx: &egui::Context,
    root_rect: egui::Rect,
    reserved: &[egui::Rect],
) {
    let (pointer_pos, primary_pressed) = ctx.input(|i| {
        (
            i.pointer.latest_pos(),
            i.pointer.button_pressed(PointerButton::Primary),
        )
    });

    let Some(pos) = pointer_pos else {
        return;
    };
    if !root_rect.expand(RESIZE_EDGE).contains(pos) {
        return;
    }

    if let Some(direction) = resize_direction(root_rect, pos) {
        ctx.set_cursor_icon(resize_cursor(direction));
        if primary_pressed && !ctx.is_using_pointer() {
            ctx.send_viewport_cmd(ViewportCommand::BeginResize(direction));
        }
        return;
    }

    let in_drag_strip = pos.y <= root_rect.top() + DRAG_STRIP_HEIGHT
        && root_rect.contains(pos)
        && !reserved.iter().any(|rect| rect.contains(pos));

    if in_drag_strip {
        ctx.set_cursor_icon(egui::CursorIcon::Move);
        if primary_pressed && !ctx.is_using_pointer() {
            ctx.send_viewport_cmd(ViewportCommand::StartDrag);
        }
    }
}

fn resize_direction(rect: egui::Rect, pos: egui::Pos2) -> Option<ResizeDirection> {
    let near_left = pos.x <= rect.left() + RESIZE_EDGE;
    let near_right = pos.x >= rect.right() - RESIZE_EDGE;
    let near_top = pos.y <= rect.top() + RESIZE_EDGE;
    let near_bottom = pos.y >= rect.bottom() - RESIZE_EDGE;

    match (near_left, near_right, near_top, near_bottom) {
        (true, _, true, _) => Some(ResizeDirection::NorthWest),
        (_, true, true, _) => Some(ResizeDirection::NorthEast),
        (true, _, _, true) => Some(ResizeDirection::SouthWest),
        (_, true, _, true) => Some(ResizeDirection::SouthEast),
        (true, _, _, _) => Some(ResizeDirection::West),
        (_, true, _, _) => Some(ResizeDirection::East),
        (_, _, true, _) => Some(ResizeDirection::North),
        (_, _, _, true) => Some(ResizeDirection::South),
        _ => None,
    }
}

fn resize_cursor(direction: ResizeDirection) -> egui::CursorIcon {
    match direction {
        ResizeDirection::North => egui::CursorIcon::ResizeNorth,
        ResizeDirection::South => egui::CursorIcon::ResizeSouth,
        ResizeDirection::East => egui::CursorIcon::ResizeEast,
        ResizeDirection::West => egui::CursorIcon::ResizeWest,
        ResizeDirection::NorthEast => egui::CursorIcon::ResizeNorthEast,
        ResizeDirection::SouthEast => egui::CursorIcon::ResizeSouthEast,
        ResizeDirection::NorthWest => egui::CursorIcon::ResizeNorthWest,
        ResizeDirection::SouthWest => egui::CursorIcon::ResizeSouthWest,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn anchors_each_corner() {
        let monitor = egui::vec2(1440.0, 900.0);
        let window = egui::vec2(360.0, 150.0);
        assert_eq!(
            anchored_position(Corner::TopLeft, monitor, window, 20.0),
            egui::pos2(20.0, 20.0)
        );
        assert_eq!(
            anchored_position(Corner::BottomRight, monitor, window, 20.0),
            egui::pos2(1060.0, 730.0)
        );
    }

    #[test]
    fn anchoring_never_goes_negative() {
        let pos = anchored_position(
            Corner::BottomRight,
            egui::vec2(100.0, 100.0),
            egui::vec2(360.0, 150.0),
            20.0,
        );
        assert_eq!(pos, egui::pos2(0.0, 0.0));
    }

    #[test]
    fn alpha_settles_on_target() {
        let mut alpha = 0.0;
        let mut moving = true;
        for _ in 0..100 {
            (alpha, moving) = step_alpha(alpha, 1.0);
            if !moving {
                break;
            }
        }
        assert!(!moving);
        assert_eq!(alpha, 1.0);
    }

    #[test]
    fn corners_resize_diagonally() {
        let rect = egui::Rect::from_min_size(egui::pos2(0.0, 0.0), egui::vec2(300.0, 120.0));
        assert_eq!(
            resize_direction(rect, egui::pos2(1.0, 1.0)),
            Some(ResizeDirection::NorthWest)
        );
        assert_eq!(
            resize_direction(rect, egui::pos2(299.0, 60.0)),
            Some(ResizeDirection::East)
        );
        assert_eq!(resize_direction(rect, egui::pos2(150.0, 60.0)), None);
    }
}
